use crate::urlinfo;
use scraper::{Html, Selector};

/// Verdict over a page's form handlers: any form posting to an empty,
/// `about:blank`, or foreign-domain target is suspicious.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormVerdict {
    NoForms,
    Benign,
    Suspicious,
}

/// Externality signals computed over one fetched document. Ratios are
/// percentages of absolute references pointing off the page's registrable
/// domain; `None` marks the "no applicable tags" sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSignals {
    pub request_url_pct: Option<f64>,
    pub anchor_pct: Option<f64>,
    pub tag_link_pct: Option<f64>,
    pub form_verdict: FormVerdict,
}

/// Placeholder hrefs phishing kits use to keep anchors inert.
const PLACEHOLDER_HREFS: [&str; 6] = [
    "",
    "#",
    "#content",
    "#skip",
    "javascript:void(0)",
    "javascript::void(0)",
];

/// Analyze a fetched document against the page's registrable domain.
/// Pure and synchronous; the parsed DOM never outlives this call.
pub fn analyze(body: &str, page_domain: &str) -> PageSignals {
    let doc = Html::parse_document(body);

    PageSignals {
        request_url_pct: resource_externality(&doc, page_domain),
        anchor_pct: anchor_suspicion(&doc, page_domain),
        tag_link_pct: tag_link_externality(&doc, page_domain),
        form_verdict: form_handlers(&doc, page_domain),
    }
}

fn is_external(reference: &str, page_domain: &str) -> bool {
    match urlinfo::registrable_domain_of(reference) {
        Some(domain) => domain != page_domain,
        None => false,
    }
}

/// Embedded resources: images, media, scripts and stylesheets loaded by
/// absolute URL.
fn resource_externality(doc: &Html, page_domain: &str) -> Option<f64> {
    let selector = Selector::parse("img, video, audio, script, link").unwrap();
    let mut total = 0usize;
    let mut external = 0usize;

    for element in doc.select(&selector) {
        let reference = element
            .value()
            .attr("src")
            .or_else(|| element.value().attr("href"))
            .unwrap_or("");
        if reference.starts_with("http") {
            total += 1;
            if is_external(reference, page_domain) {
                external += 1;
            }
        }
    }

    percentage(external, total)
}

/// Anchors: placeholder hrefs count as suspicious regardless of domain.
fn anchor_suspicion(doc: &Html, page_domain: &str) -> Option<f64> {
    let selector = Selector::parse("a[href]").unwrap();
    let mut total = 0usize;
    let mut suspicious = 0usize;

    for element in doc.select(&selector) {
        let href = element.value().attr("href").unwrap_or("").trim();
        total += 1;
        if PLACEHOLDER_HREFS.contains(&href) {
            suspicious += 1;
        } else if href.starts_with("http") && is_external(href, page_domain) {
            suspicious += 1;
        }
    }

    percentage(suspicious, total)
}

/// Metadata tags: every absolute href/src/content reference counts once.
fn tag_link_externality(doc: &Html, page_domain: &str) -> Option<f64> {
    let selector = Selector::parse("meta, script, link").unwrap();
    let mut total = 0usize;
    let mut external = 0usize;

    for element in doc.select(&selector) {
        for attr in ["href", "src", "content"] {
            let value = element.value().attr(attr).unwrap_or("");
            if value.starts_with("http") {
                total += 1;
                if is_external(value, page_domain) {
                    external += 1;
                }
            }
        }
    }

    percentage(external, total)
}

fn form_handlers(doc: &Html, page_domain: &str) -> FormVerdict {
    let selector = Selector::parse("form").unwrap();
    let mut seen = false;

    for element in doc.select(&selector) {
        seen = true;
        let action = element.value().attr("action").unwrap_or("").trim();

        if action.is_empty() || action == "about:blank" {
            return FormVerdict::Suspicious;
        }
        if action.starts_with("http") {
            let action_domain = urlinfo::registrable_domain_of(action).unwrap_or_default();
            if action_domain != page_domain {
                return FormVerdict::Suspicious;
            }
        }
    }

    if seen {
        FormVerdict::Benign
    } else {
        FormVerdict::NoForms
    }
}

fn percentage(part: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| (part as f64 / total as f64) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_ratio_counts_only_absolute_refs() {
        let body = r#"<html><body>
            <img src="/local.png">
            <img src="https://cdn.other.com/a.png">
            <script src="https://example.com/app.js"></script>
            <link href="https://tracker.net/pixel.css">
        </body></html>"#;
        let signals = analyze(body, "example.com");
        // 3 absolute refs, 2 external.
        let pct = signals.request_url_pct.unwrap();
        assert!((pct - 66.666).abs() < 0.01);
    }

    #[test]
    fn no_applicable_tags_yields_sentinel() {
        let signals = analyze("<html><body><p>hi</p></body></html>", "example.com");
        assert_eq!(signals.request_url_pct, None);
        assert_eq!(signals.anchor_pct, None);
        assert_eq!(signals.tag_link_pct, None);
        assert_eq!(signals.form_verdict, FormVerdict::NoForms);
    }

    #[test]
    fn placeholder_anchors_are_suspicious_regardless_of_domain() {
        let body = r##"<html><body>
            <a href="#">x</a>
            <a href="javascript:void(0)">y</a>
            <a href="/about">ok</a>
            <a href="https://example.com/contact">ok</a>
        </body></html>"##;
        let signals = analyze(body, "example.com");
        assert_eq!(signals.anchor_pct, Some(50.0));
    }

    #[test]
    fn external_anchors_count_against_the_page() {
        let body = r#"<html><body>
            <a href="https://phish.other.net/a">a</a>
            <a href="https://example.com/b">b</a>
        </body></html>"#;
        let signals = analyze(body, "example.com");
        assert_eq!(signals.anchor_pct, Some(50.0));
    }

    #[test]
    fn subdomain_refs_of_the_same_apex_are_internal() {
        let body = r#"<a href="https://static.example.com/a">a</a>"#;
        let signals = analyze(body, "example.com");
        assert_eq!(signals.anchor_pct, Some(0.0));
    }

    #[test]
    fn empty_form_action_is_suspicious() {
        let signals = analyze(r#"<form action=""></form>"#, "example.com");
        assert_eq!(signals.form_verdict, FormVerdict::Suspicious);

        let signals = analyze(r#"<form action="about:blank"></form>"#, "example.com");
        assert_eq!(signals.form_verdict, FormVerdict::Suspicious);
    }

    #[test]
    fn foreign_form_target_is_suspicious_local_is_benign() {
        let signals = analyze(
            r#"<form action="https://collector.evil.io/post"></form>"#,
            "example.com",
        );
        assert_eq!(signals.form_verdict, FormVerdict::Suspicious);

        let signals = analyze(
            r#"<form action="https://example.com/login"></form>
               <form action="/login"></form>"#,
            "example.com",
        );
        assert_eq!(signals.form_verdict, FormVerdict::Benign);
    }

    #[test]
    fn meta_refresh_content_counts_as_tag_link() {
        let body = r#"<html><head>
            <meta http-equiv="refresh" content="https://redirect.target.com/">
            <link rel="stylesheet" href="https://example.com/style.css">
        </head></html>"#;
        let signals = analyze(body, "example.com");
        assert_eq!(signals.tag_link_pct, Some(50.0));
    }
}
