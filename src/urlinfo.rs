use publicsuffix::{List, Psl};
use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;
use url::{Host, Url};

/// The decomposed form of one input URL. Built once per extraction call
/// and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    /// Input with the default scheme prepended when none was present.
    pub normalized: String,
    pub scheme: String,
    /// Lowercased host with IPv6 brackets stripped; empty when no
    /// host-like token could be recovered.
    pub host: String,
    /// Explicit non-default port, if any.
    pub port: Option<u16>,
    pub path: String,
    /// Public-suffix-aware apex domain (`example.co.uk`, not
    /// `bar.example.co.uk`). None for IP hosts and single-label hosts.
    pub registrable_domain: Option<String>,
    /// Everything below the registrable domain, dot-separated.
    pub subdomain: Option<String>,
    /// The label directly left of the public suffix (`example` for
    /// `www.example.co.uk`).
    pub domain_label: Option<String>,
    pub host_is_ip: bool,
}

fn suffix_list() -> &'static List {
    static PSL: OnceLock<List> = OnceLock::new();
    PSL.get_or_init(|| {
        include_str!("../data/public_suffix_list.dat")
            .parse()
            .expect("bundled public suffix list parses")
    })
}

fn scheme_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").unwrap())
}

/// Prepend the plain scheme when the input carries none.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if scheme_re().is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Total parser: always yields a best-effort `UrlParts`, never fails.
pub fn parse(raw: &str) -> UrlParts {
    let normalized = normalize(raw);

    match Url::parse(&normalized) {
        Ok(url) => {
            let (host, host_is_ip) = match url.host() {
                Some(Host::Domain(d)) => (d.to_lowercase(), false),
                Some(Host::Ipv4(a)) => (a.to_string(), true),
                Some(Host::Ipv6(a)) => (a.to_string(), true),
                None => (String::new(), false),
            };
            let (registrable_domain, subdomain, domain_label) = if host_is_ip {
                (None, None, None)
            } else {
                split_domain(&host)
            };
            UrlParts {
                normalized,
                scheme: url.scheme().to_string(),
                host,
                port: url.port(),
                path: url.path().to_string(),
                registrable_domain,
                subdomain,
                domain_label,
                host_is_ip,
            }
        }
        Err(_) => fallback_parse(&normalized),
    }
}

/// Manual recovery for inputs `url::Url` rejects (embedded whitespace,
/// empty authority, stray control bytes). Mirrors the scheme/authority
/// split of a URL without validating it.
fn fallback_parse(normalized: &str) -> UrlParts {
    let (scheme, rest) = match normalized.find("://") {
        Some(idx) => (normalized[..idx].to_ascii_lowercase(), &normalized[idx + 3..]),
        None => ("http".to_string(), normalized),
    };

    let authority_end = rest
        .find(|c| c == '/' || c == '?' || c == '#')
        .unwrap_or(rest.len());
    let authority = &rest[..authority_end];
    let path = match rest[authority_end..].find(['?', '#']) {
        Some(idx) => rest[authority_end..authority_end + idx].to_string(),
        None => rest[authority_end..].to_string(),
    };

    // Userinfo ends at the last '@' of the authority.
    let host_port = match authority.rfind('@') {
        Some(idx) => &authority[idx + 1..],
        None => authority,
    };

    let (host, port) = if let Some(stripped) = host_port.strip_prefix('[') {
        match stripped.find(']') {
            Some(end) => {
                let port = stripped[end + 1..]
                    .strip_prefix(':')
                    .and_then(|p| p.parse().ok());
                (stripped[..end].to_string(), port)
            }
            None => (stripped.to_string(), None),
        }
    } else {
        match host_port.rsplit_once(':') {
            Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty() => {
                (h.to_string(), p.parse().ok())
            }
            _ => (host_port.to_string(), None),
        }
    };

    let host: String = host
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let host_is_ip = is_ip_literal(&host);
    let (registrable_domain, subdomain, domain_label) = if host_is_ip {
        (None, None, None)
    } else {
        split_domain(&host)
    };

    UrlParts {
        normalized: normalized.to_string(),
        scheme,
        host,
        port,
        path,
        registrable_domain,
        subdomain,
        domain_label,
        host_is_ip,
    }
}

fn split_domain(host: &str) -> (Option<String>, Option<String>, Option<String>) {
    if host.is_empty() {
        return (None, None, None);
    }
    let Some(domain) = suffix_list().domain(host.as_bytes()) else {
        return (None, None, None);
    };
    let registrable = match std::str::from_utf8(domain.as_bytes()) {
        Ok(s) => s.to_string(),
        Err(_) => return (None, None, None),
    };

    let subdomain = if host.len() > registrable.len() {
        let stem = &host[..host.len() - registrable.len() - 1];
        (!stem.is_empty()).then(|| stem.to_string())
    } else {
        None
    };

    let suffix_len = domain.suffix().as_bytes().len();
    let domain_label = if registrable.len() > suffix_len {
        Some(registrable[..registrable.len() - suffix_len - 1].to_string())
    } else {
        None
    };

    (Some(registrable), subdomain, domain_label)
}

/// Accepts IPv4 and IPv6 literal forms, bracketed or not.
pub fn is_ip_literal(host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    let inner = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    inner.parse::<IpAddr>().is_ok()
}

/// Registrable domain of an absolute URL found in page content.
pub fn registrable_domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    match parsed.host()? {
        Host::Domain(d) => {
            let host = d.to_lowercase();
            split_domain(&host).0
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepends_default_scheme() {
        let parts = parse("example.com/login");
        assert_eq!(parts.normalized, "http://example.com/login");
        assert_eq!(parts.scheme, "http");
        assert_eq!(parts.host, "example.com");
    }

    #[test]
    fn keeps_existing_scheme() {
        let parts = parse("https://example.com");
        assert_eq!(parts.scheme, "https");
        assert_eq!(parts.registrable_domain.as_deref(), Some("example.com"));
        assert_eq!(parts.subdomain, None);
    }

    #[test]
    fn multi_part_suffixes_use_the_list() {
        let parts = parse("https://bar.foo.co.uk/x");
        assert_eq!(parts.registrable_domain.as_deref(), Some("foo.co.uk"));
        assert_eq!(parts.subdomain.as_deref(), Some("bar"));
        assert_eq!(parts.domain_label.as_deref(), Some("foo"));

        let parts = parse("http://shop.example.com.au");
        assert_eq!(parts.registrable_domain.as_deref(), Some("example.com.au"));
    }

    #[test]
    fn deep_subdomains_are_preserved() {
        let parts = parse("https://a.b.example.com");
        assert_eq!(parts.subdomain.as_deref(), Some("a.b"));
        assert_eq!(parts.registrable_domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn ipv4_host_detected() {
        let parts = parse("http://192.168.1.1/login");
        assert!(parts.host_is_ip);
        assert_eq!(parts.host, "192.168.1.1");
        assert_eq!(parts.registrable_domain, None);
    }

    #[test]
    fn bracketed_ipv6_host_detected() {
        let parts = parse("http://[2001:db8::1]:8080/");
        assert!(parts.host_is_ip);
        assert_eq!(parts.port, Some(8080));
        assert!(is_ip_literal("[::1]"));
        assert!(is_ip_literal("::1"));
        assert!(!is_ip_literal("example.com"));
    }

    #[test]
    fn default_ports_are_elided() {
        assert_eq!(parse("http://example.com:80/").port, None);
        assert_eq!(parse("https://example.com:443/").port, None);
        assert_eq!(parse("http://example.com:8080/").port, Some(8080));
    }

    #[test]
    fn malformed_inputs_never_panic_and_keep_host_tokens() {
        let parts = parse("http://exa mple.com/path");
        assert_eq!(parts.host, "example.com");

        let parts = parse("not a url at all");
        assert!(!parts.normalized.is_empty());

        let parts = parse("");
        assert_eq!(parts.host, "");
        assert_eq!(parts.registrable_domain, None);
    }

    #[test]
    fn userinfo_does_not_leak_into_host() {
        let parts = parse("http://admin@example.com/");
        assert_eq!(parts.host, "example.com");
    }

    #[test]
    fn registrable_domain_of_absolute_refs() {
        assert_eq!(
            registrable_domain_of("https://cdn.vendor.co.uk/app.js").as_deref(),
            Some("vendor.co.uk")
        );
        assert_eq!(registrable_domain_of("http://10.0.0.1/x"), None);
        assert_eq!(registrable_domain_of("not-absolute"), None);
    }
}
