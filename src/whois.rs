use crate::probes::ProbeOutcome;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Registration record reduced to the two timestamps the features need.
/// Registries returning several dates are collapsed deterministically:
/// earliest creation, latest expiration, both UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoisRecord {
    pub created: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
}

pub struct WhoisClient {
    budget: Duration,
}

impl WhoisClient {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    /// Query the registration record for a registrable domain.
    pub async fn lookup(&self, domain: &str) -> ProbeOutcome<WhoisRecord> {
        if !valid_query_domain(domain) {
            return ProbeOutcome::Failure(format!("invalid domain for whois: {domain}"));
        }

        let primary = server_for(domain);
        match self.query(primary, domain).await {
            Ok(text) => {
                let record = parse_record(&text);
                if record.created.is_some() || record.expires.is_some() {
                    return ProbeOutcome::Success(record);
                }
                debug!("no dates in {primary} response for {domain}, trying IANA");
            }
            Err(QueryError::Elapsed) => return ProbeOutcome::Timeout,
            Err(QueryError::Io(e)) => {
                debug!("whois query to {primary} failed for {domain}: {e}");
            }
        }

        // Thin registries answer with a referral-only record; IANA at
        // least knows the registry's own dates for the TLD zone.
        match self.query("whois.iana.org", domain).await {
            Ok(text) => {
                let record = parse_record(&text);
                if record.created.is_some() || record.expires.is_some() {
                    ProbeOutcome::Success(record)
                } else {
                    ProbeOutcome::Failure("no parseable dates in whois response".to_string())
                }
            }
            Err(QueryError::Elapsed) => ProbeOutcome::Timeout,
            Err(QueryError::Io(e)) => ProbeOutcome::Failure(e),
        }
    }

    async fn query(&self, server: &str, domain: &str) -> Result<String, QueryError> {
        let mut stream = timeout(self.budget, TcpStream::connect(format!("{server}:43")))
            .await
            .map_err(|_| QueryError::Elapsed)?
            .map_err(|e| QueryError::Io(e.to_string()))?;

        stream
            .write_all(format!("{domain}\r\n").as_bytes())
            .await
            .map_err(|e| QueryError::Io(e.to_string()))?;

        let mut response = String::new();
        timeout(self.budget, stream.read_to_string(&mut response))
            .await
            .map_err(|_| QueryError::Elapsed)?
            .map_err(|e| QueryError::Io(e.to_string()))?;

        if response.is_empty() {
            return Err(QueryError::Io("empty whois response".to_string()));
        }
        Ok(response)
    }
}

enum QueryError {
    Elapsed,
    Io(String),
}

fn valid_query_domain(domain: &str) -> bool {
    !domain.is_empty()
        && domain.contains('.')
        && domain.len() < 255
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// WHOIS server by TLD, IANA for everything unlisted.
fn server_for(domain: &str) -> &'static str {
    let tld = domain.rsplit('.').next().unwrap_or(domain);
    match tld {
        "com" | "net" => "whois.verisign-grs.com",
        "org" => "whois.pir.org",
        "info" => "whois.afilias.net",
        "io" => "whois.nic.io",
        "co" => "whois.nic.co",
        "us" => "whois.nic.us",
        "uk" => "whois.nic.uk",
        "de" => "whois.denic.de",
        "fr" => "whois.afnic.fr",
        "it" => "whois.nic.it",
        "nl" => "whois.domain-registry.nl",
        "au" => "whois.auda.org.au",
        "ca" => "whois.cira.ca",
        "jp" => "whois.jprs.jp",
        "cn" => "whois.cnnic.cn",
        "ru" => "whois.tcinet.ru",
        "br" => "whois.registro.br",
        "in" => "whois.registry.in",
        "mx" => "whois.mx",
        "tk" => "whois.dot.tk",
        "ml" => "whois.dot.ml",
        "ga" => "whois.dot.ga",
        "cf" => "whois.dot.cf",
        _ => "whois.iana.org",
    }
}

fn creation_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)creation\s*date[:\s]+([^\r\n]+)",
            r"(?i)created(?:\s*on)?[:\s]+([^\r\n]+)",
            r"(?i)registered(?:\s*on)?[:\s]+([^\r\n]+)",
            r"(?i)registration\s*(?:date|time)[:\s]+([^\r\n]+)",
            r"(?i)domain\s*created[:\s]+([^\r\n]+)",
            r"(?i)created_date[:\s]+([^\r\n]+)",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

fn expiry_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)registry\s*expiry\s*date[:\s]+([^\r\n]+)",
            r"(?i)expir(?:y|ation)\s*date[:\s]+([^\r\n]+)",
            r"(?i)expires?(?:\s*on)?[:\s]+([^\r\n]+)",
            r"(?i)paid-till[:\s]+([^\r\n]+)",
            r"(?i)renewal\s*date[:\s]+([^\r\n]+)",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

/// Pull creation and expiration timestamps out of a raw WHOIS response.
pub fn parse_record(text: &str) -> WhoisRecord {
    let created = collect_dates(text, creation_patterns()).into_iter().min();
    let expires = collect_dates(text, expiry_patterns()).into_iter().max();
    WhoisRecord { created, expires }
}

fn collect_dates(text: &str, patterns: &[Regex]) -> Vec<DateTime<Utc>> {
    let mut dates = Vec::new();
    for re in patterns {
        for caps in re.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                if let Some(date) = parse_date(m.as_str()) {
                    dates.push(date);
                }
            }
        }
    }
    dates
}

/// Registries disagree wildly on date formats; try the common ones.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let first_token = raw.split_whitespace().next().unwrap_or(raw);

    for candidate in [raw, first_token] {
        if let Ok(dt) = DateTime::parse_from_rfc3339(candidate) {
            return Some(dt.with_timezone(&Utc));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(candidate, fmt) {
                return Some(Utc.from_utc_datetime(&dt));
            }
        }
        for fmt in ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%d-%b-%Y", "%d.%m.%Y"] {
            if let Ok(d) = NaiveDate::parse_from_str(candidate, fmt) {
                return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verisign_style_response() {
        let text = "\
   Domain Name: EXAMPLE.COM\r\n\
   Creation Date: 1995-08-14T04:00:00Z\r\n\
   Registry Expiry Date: 2026-08-13T04:00:00Z\r\n";
        let record = parse_record(text);
        assert_eq!(
            record.created.unwrap(),
            Utc.with_ymd_and_hms(1995, 8, 14, 4, 0, 0).unwrap()
        );
        assert_eq!(
            record.expires.unwrap(),
            Utc.with_ymd_and_hms(2026, 8, 13, 4, 0, 0).unwrap()
        );
    }

    #[test]
    fn parses_date_only_and_dotted_formats() {
        assert_eq!(
            parse_date("2024-10-10"),
            Some(Utc.with_ymd_and_hms(2024, 10, 10, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_date("10.10.2024"),
            Some(Utc.with_ymd_and_hms(2024, 10, 10, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_date("14-aug-1995"),
            Some(Utc.with_ymd_and_hms(1995, 8, 14, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn trailing_annotations_are_ignored() {
        assert_eq!(
            parse_date("2020-01-02 (registry local time)"),
            Some(Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn multiple_dates_reduce_deterministically() {
        let text = "\
Created: 2001-05-01\n\
Creation Date: 2000-01-01T00:00:00Z\n\
Expiry date: 2025-01-01\n\
Registry Expiry Date: 2027-06-01T00:00:00Z\n";
        let record = parse_record(text);
        assert_eq!(
            record.created.unwrap(),
            Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            record.expires.unwrap(),
            Utc.with_ymd_and_hms(2027, 6, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn invalid_domains_are_rejected_before_any_query() {
        assert!(!valid_query_domain(""));
        assert!(!valid_query_domain("no-dot"));
        assert!(!valid_query_domain("bad domain.com"));
        assert!(valid_query_domain("example.co.uk"));
    }

    #[test]
    fn server_table_covers_common_tlds() {
        assert_eq!(server_for("example.com"), "whois.verisign-grs.com");
        assert_eq!(server_for("example.co.uk"), "whois.nic.uk");
        assert_eq!(server_for("example.zz"), "whois.iana.org");
    }
}
