use crate::config::Config;
use crate::content::{self, FormVerdict, PageSignals};
use crate::error::AppError;
use crate::fetch::PageFetcher;
use crate::probes::{DnsProber, ProbeOutcome, TlsProber, TlsState};
use crate::types::Signal;
use crate::urlinfo::{self, UrlParts};
use crate::whois::{WhoisClient, WhoisRecord};
use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// A named, versioned, fixed-order list of feature names a classifier
/// artifact expects. The order is a cross-process contract: reordering
/// silently corrupts predictions, so it lives here once and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSchema {
    Lexical8,
    Discriminative10,
    Full30,
}

const LEXICAL8_NAMES: [&str; 8] = [
    "having_IP_Address",
    "having_At_Symbol",
    "URL_Length",
    "double_slash_redirecting",
    "HTTPS_token",
    "Shortining_Service",
    "Prefix_Suffix",
    "having_Sub_Domain",
];

const DISCRIMINATIVE10_NAMES: [&str; 10] = [
    "having_IP_Address",
    "having_Sub_Domain",
    "SSLfinal_State",
    "Domain_registeration_length",
    "Request_URL",
    "URL_of_Anchor",
    "Links_in_tags",
    "SFH",
    "age_of_domain",
    "DNSRecord",
];

const FULL30_NAMES: [&str; 30] = [
    "having_IP_Address",
    "URL_Length",
    "Shortining_Service",
    "having_At_Symbol",
    "double_slash_redirecting",
    "Prefix_Suffix",
    "having_Sub_Domain",
    "SSLfinal_State",
    "Domain_registeration_length",
    "Favicon",
    "port",
    "HTTPS_token",
    "Request_URL",
    "URL_of_Anchor",
    "Links_in_tags",
    "SFH",
    "Submitting_to_email",
    "Abnormal_URL",
    "Redirect",
    "on_mouseover",
    "RightClick",
    "popUpWidnow",
    "Iframe",
    "age_of_domain",
    "DNSRecord",
    "web_traffic",
    "Page_Rank",
    "Google_Index",
    "Links_pointing_to_page",
    "Statistical_report",
];

/// Fallback signals for the discriminative schema, calibrated against the
/// training distribution.
const DISCRIMINATIVE10_DEFAULTS: [(&str, i8); 10] = [
    ("having_IP_Address", 1),
    ("having_Sub_Domain", 1),
    ("SSLfinal_State", 1),
    ("Domain_registeration_length", 1),
    ("Request_URL", 1),
    ("URL_of_Anchor", 0),
    ("Links_in_tags", 0),
    ("SFH", -1),
    ("age_of_domain", 1),
    ("DNSRecord", -1),
];

/// Most common training-data values per feature; the full schema falls
/// back to these, and its twenty non-live features emit them constantly.
const TRAINING_DEFAULTS: [(&str, i8); 30] = [
    ("having_IP_Address", 1),
    ("URL_Length", -1),
    ("Shortining_Service", 1),
    ("having_At_Symbol", 1),
    ("double_slash_redirecting", 1),
    ("Prefix_Suffix", -1),
    ("having_Sub_Domain", 1),
    ("SSLfinal_State", 1),
    ("Domain_registeration_length", 1),
    ("Favicon", 1),
    ("port", 1),
    ("HTTPS_token", 1),
    ("Request_URL", 1),
    ("URL_of_Anchor", 0),
    ("Links_in_tags", 0),
    ("SFH", -1),
    ("Submitting_to_email", 1),
    ("Abnormal_URL", 1),
    ("Redirect", 0),
    ("on_mouseover", 1),
    ("RightClick", 1),
    ("popUpWidnow", 1),
    ("Iframe", 1),
    ("age_of_domain", 1),
    ("DNSRecord", -1),
    ("web_traffic", 1),
    ("Page_Rank", 1),
    ("Google_Index", 1),
    ("Links_pointing_to_page", 1),
    ("Statistical_report", 1),
];

/// Features computed from live evidence; everything else in a schema is a
/// constant provider over its default table.
const LIVE_FEATURES: [&str; 17] = [
    "having_IP_Address",
    "having_Sub_Domain",
    "SSLfinal_State",
    "Domain_registeration_length",
    "Request_URL",
    "URL_of_Anchor",
    "Links_in_tags",
    "SFH",
    "age_of_domain",
    "DNSRecord",
    "URL_Length",
    "Shortining_Service",
    "having_At_Symbol",
    "double_slash_redirecting",
    "Prefix_Suffix",
    "port",
    "HTTPS_token",
];

const SHORTENERS: [&str; 27] = [
    "bit.ly",
    "goo.gl",
    "t.co",
    "tinyurl.com",
    "ow.ly",
    "is.gd",
    "buff.ly",
    "bit.do",
    "lnkd.in",
    "db.tt",
    "qr.ae",
    "adf.ly",
    "cur.lv",
    "tiny.cc",
    "tr.im",
    "su.pr",
    "v.gd",
    "soo.gd",
    "shorte.st",
    "x.co",
    "cl.ly",
    "s.id",
    "rebrand.ly",
    "cutt.ly",
    "ulvis.net",
    "short.io",
    "1url.com",
];

impl FeatureSchema {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "lexical8" => Some(FeatureSchema::Lexical8),
            "discriminative10" => Some(FeatureSchema::Discriminative10),
            "full30" => Some(FeatureSchema::Full30),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FeatureSchema::Lexical8 => "lexical8",
            FeatureSchema::Discriminative10 => "discriminative10",
            FeatureSchema::Full30 => "full30",
        }
    }

    pub fn feature_names(&self) -> &'static [&'static str] {
        match self {
            FeatureSchema::Lexical8 => &LEXICAL8_NAMES,
            FeatureSchema::Discriminative10 => &DISCRIMINATIVE10_NAMES,
            FeatureSchema::Full30 => &FULL30_NAMES,
        }
    }

    pub fn defaults(&self) -> &'static [(&'static str, i8)] {
        match self {
            FeatureSchema::Discriminative10 => &DISCRIMINATIVE10_DEFAULTS,
            FeatureSchema::Lexical8 | FeatureSchema::Full30 => &TRAINING_DEFAULTS,
        }
    }

    pub fn len(&self) -> usize {
        self.feature_names().len()
    }

    /// The lexical schema never leaves the parser.
    pub fn needs_probes(&self) -> bool {
        !matches!(self, FeatureSchema::Lexical8)
    }

    pub fn default_for(&self, feature: &str) -> Signal {
        self.defaults()
            .iter()
            .find(|(name, _)| *name == feature)
            .and_then(|(_, v)| Signal::from_value(*v))
            .unwrap_or(Signal::Neutral)
    }
}

pub fn is_live_feature(name: &str) -> bool {
    LIVE_FEATURES.contains(&name)
}

/// Everything the feature functions may consult for one URL. Gathered
/// once per extraction; probe failures stay visible here and each feature
/// decides its own fallback.
#[derive(Debug)]
pub struct Evidence {
    pub dns: ProbeOutcome<Vec<IpAddr>>,
    pub whois: ProbeOutcome<WhoisRecord>,
    pub tls: ProbeOutcome<TlsState>,
    pub page: ProbeOutcome<PageSignals>,
    pub now: DateTime<Utc>,
}

impl Evidence {
    /// Evidence for a schema that consults no probes.
    pub fn unavailable() -> Self {
        Self {
            dns: ProbeOutcome::Failure("probe not requested".to_string()),
            whois: ProbeOutcome::Failure("probe not requested".to_string()),
            tls: ProbeOutcome::Failure("probe not requested".to_string()),
            page: ProbeOutcome::Failure("probe not requested".to_string()),
            now: Utc::now(),
        }
    }
}

/// Calibrated decision bands, in percent of external references.
const REQUEST_URL_LOW: f64 = 22.0;
const REQUEST_URL_HIGH: f64 = 61.0;
const ANCHOR_LOW: f64 = 31.0;
const ANCHOR_HIGH: f64 = 67.0;
const TAG_LINK_LOW: f64 = 17.0;
const TAG_LINK_HIGH: f64 = 81.0;

const SHORT_URL_LEN: usize = 54;
const LONG_URL_LEN: usize = 75;
const MIN_REGISTRATION_DAYS: i64 = 365;
const MIN_DOMAIN_AGE_DAYS: i64 = 180;

/// Invoke every feature of the schema in its fixed order and validate the
/// resulting length. A mismatch is a hard error, never padded.
pub fn assemble(
    schema: FeatureSchema,
    raw: &str,
    parts: &UrlParts,
    evidence: &Evidence,
) -> Result<Vec<Signal>, AppError> {
    let vector: Vec<Signal> = schema
        .feature_names()
        .iter()
        .map(|name| evaluate(name, schema, raw, parts, evidence))
        .collect();

    if vector.len() != schema.len() {
        return Err(AppError::SchemaMismatch(format!(
            "assembled {} features, schema {} expects {}",
            vector.len(),
            schema.name(),
            schema.len()
        )));
    }
    Ok(vector)
}

fn evaluate(
    name: &str,
    schema: FeatureSchema,
    raw: &str,
    parts: &UrlParts,
    ev: &Evidence,
) -> Signal {
    match name {
        "having_IP_Address" => having_ip(parts),
        "having_Sub_Domain" => having_subdomain(parts),
        "SSLfinal_State" => ssl_state(parts, &ev.tls),
        "Domain_registeration_length" => {
            registration_length(parts, &ev.whois, schema.default_for(name))
        }
        "Request_URL" => request_url(parts, &ev.page, schema.default_for(name)),
        "URL_of_Anchor" => url_of_anchor(parts, &ev.page, schema.default_for(name)),
        "Links_in_tags" => links_in_tags(parts, &ev.page, schema.default_for(name)),
        "SFH" => server_form_handler(&ev.page, schema.default_for(name)),
        "age_of_domain" => domain_age(parts, &ev.whois, ev.now, schema.default_for(name)),
        "DNSRecord" => dns_record(parts, &ev.dns),
        "URL_Length" => url_length(parts),
        "Shortining_Service" => shortening_service(parts),
        "having_At_Symbol" => at_symbol(raw),
        "double_slash_redirecting" => double_slash_redirecting(parts),
        "Prefix_Suffix" => prefix_suffix(parts),
        "port" => nonstandard_port(parts),
        "HTTPS_token" => https_token(parts),
        // The remaining schema entries carry no live signal; they emit
        // their training-calibrated constant.
        other => schema.default_for(other),
    }
}

fn having_ip(parts: &UrlParts) -> Signal {
    if parts.host_is_ip {
        Signal::Suspicious
    } else {
        Signal::Benign
    }
}

fn having_subdomain(parts: &UrlParts) -> Signal {
    match parts.subdomain.as_deref() {
        None => Signal::Benign,
        Some(sub) if sub.contains('.') => Signal::Suspicious,
        Some(_) => Signal::Neutral,
    }
}

fn ssl_state(parts: &UrlParts, tls: &ProbeOutcome<TlsState>) -> Signal {
    if parts.scheme != "https" {
        return Signal::Suspicious;
    }
    match tls {
        ProbeOutcome::Success(TlsState::Verified) => Signal::Benign,
        ProbeOutcome::Success(TlsState::CertificateError) => Signal::Suspicious,
        ProbeOutcome::Success(TlsState::Unreachable) => Signal::Neutral,
        ProbeOutcome::Timeout | ProbeOutcome::Failure(_) => Signal::Neutral,
    }
}

fn registration_length(
    parts: &UrlParts,
    whois: &ProbeOutcome<WhoisRecord>,
    default: Signal,
) -> Signal {
    if parts.registrable_domain.is_none() {
        return default;
    }
    match whois {
        ProbeOutcome::Success(record) => match (record.created, record.expires) {
            (Some(created), Some(expires)) => {
                if (expires - created).num_days() <= MIN_REGISTRATION_DAYS {
                    Signal::Suspicious
                } else {
                    Signal::Benign
                }
            }
            _ => default,
        },
        _ => default,
    }
}

fn domain_age(
    parts: &UrlParts,
    whois: &ProbeOutcome<WhoisRecord>,
    now: DateTime<Utc>,
    default: Signal,
) -> Signal {
    if parts.registrable_domain.is_none() {
        return default;
    }
    match whois {
        ProbeOutcome::Success(WhoisRecord {
            created: Some(created),
            ..
        }) => {
            if (now - *created).num_days() <= MIN_DOMAIN_AGE_DAYS {
                Signal::Suspicious
            } else {
                Signal::Benign
            }
        }
        _ => default,
    }
}

fn request_url(parts: &UrlParts, page: &ProbeOutcome<PageSignals>, default: Signal) -> Signal {
    let ProbeOutcome::Success(signals) = page else {
        return default;
    };
    if parts.registrable_domain.is_none() {
        return Signal::Suspicious;
    }
    match signals.request_url_pct {
        None => Signal::Benign,
        Some(pct) if pct < REQUEST_URL_LOW => Signal::Benign,
        Some(pct) if pct <= REQUEST_URL_HIGH => Signal::Neutral,
        Some(_) => Signal::Suspicious,
    }
}

fn url_of_anchor(parts: &UrlParts, page: &ProbeOutcome<PageSignals>, default: Signal) -> Signal {
    let ProbeOutcome::Success(signals) = page else {
        return default;
    };
    if parts.registrable_domain.is_none() {
        return Signal::Neutral;
    }
    match signals.anchor_pct {
        None => Signal::Benign,
        Some(pct) if pct < ANCHOR_LOW => Signal::Benign,
        Some(pct) if pct <= ANCHOR_HIGH => Signal::Neutral,
        Some(_) => Signal::Suspicious,
    }
}

fn links_in_tags(parts: &UrlParts, page: &ProbeOutcome<PageSignals>, default: Signal) -> Signal {
    let ProbeOutcome::Success(signals) = page else {
        return default;
    };
    if parts.registrable_domain.is_none() {
        return Signal::Neutral;
    }
    match signals.tag_link_pct {
        None => Signal::Benign,
        Some(pct) if pct < TAG_LINK_LOW => Signal::Benign,
        Some(pct) if pct <= TAG_LINK_HIGH => Signal::Neutral,
        Some(_) => Signal::Suspicious,
    }
}

fn server_form_handler(page: &ProbeOutcome<PageSignals>, default: Signal) -> Signal {
    let ProbeOutcome::Success(signals) = page else {
        return default;
    };
    match signals.form_verdict {
        FormVerdict::Suspicious => Signal::Suspicious,
        FormVerdict::Benign | FormVerdict::NoForms => Signal::Benign,
    }
}

fn dns_record(parts: &UrlParts, dns: &ProbeOutcome<Vec<IpAddr>>) -> Signal {
    if parts.host.is_empty() {
        return Signal::Suspicious;
    }
    match dns {
        ProbeOutcome::Success(_) => Signal::Benign,
        ProbeOutcome::Failure(_) => Signal::Suspicious,
        ProbeOutcome::Timeout => Signal::Neutral,
    }
}

fn url_length(parts: &UrlParts) -> Signal {
    let len = parts.normalized.len();
    if len < SHORT_URL_LEN {
        Signal::Benign
    } else if len <= LONG_URL_LEN {
        Signal::Neutral
    } else {
        Signal::Suspicious
    }
}

fn shortening_service(parts: &UrlParts) -> Signal {
    let registrable = parts.registrable_domain.as_deref().unwrap_or("");
    if SHORTENERS.contains(&registrable) {
        Signal::Suspicious
    } else {
        Signal::Benign
    }
}

fn at_symbol(raw: &str) -> Signal {
    if raw.contains('@') {
        Signal::Suspicious
    } else {
        Signal::Benign
    }
}

fn double_slash_redirecting(parts: &UrlParts) -> Signal {
    let after = match parts.normalized.find("://") {
        Some(idx) => &parts.normalized[idx + 3..],
        None => parts.normalized.as_str(),
    };
    if after.contains("//") {
        Signal::Suspicious
    } else {
        Signal::Benign
    }
}

fn prefix_suffix(parts: &UrlParts) -> Signal {
    if parts
        .domain_label
        .as_deref()
        .is_some_and(|label| label.contains('-'))
    {
        Signal::Suspicious
    } else {
        Signal::Benign
    }
}

fn nonstandard_port(parts: &UrlParts) -> Signal {
    match parts.port {
        None | Some(80) | Some(443) => Signal::Benign,
        Some(_) => Signal::Suspicious,
    }
}

fn https_token(parts: &UrlParts) -> Signal {
    if parts.host.contains("https") {
        Signal::Suspicious
    } else {
        Signal::Benign
    }
}

/// Gathers live evidence and assembles the schema's vector. One instance
/// serves the whole process; every extraction is stateless.
pub struct FeatureExtractor {
    schema: FeatureSchema,
    dns: DnsProber,
    tls: TlsProber,
    whois: WhoisClient,
    fetcher: PageFetcher,
}

impl FeatureExtractor {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            schema: config.schema,
            dns: DnsProber::new(config.dns_timeout),
            tls: TlsProber::new(config.tls_timeout, &config.user_agent)?,
            whois: WhoisClient::new(config.whois_timeout),
            fetcher: PageFetcher::new(
                config.fetch_timeout,
                config.browser_timeout,
                config.browser_fallback,
                &config.user_agent,
            )?,
        })
    }

    pub fn schema(&self) -> FeatureSchema {
        self.schema
    }

    /// The core entry point: raw URL in, fixed-order vector out. Fails
    /// only when the schema contract cannot be met; individual feature
    /// failures degrade to their documented defaults.
    pub async fn extract(&self, raw: &str) -> Result<Vec<Signal>, AppError> {
        let parts = urlinfo::parse(raw);
        let evidence = if self.schema.needs_probes() {
            self.gather(&parts).await
        } else {
            Evidence::unavailable()
        };
        assemble(self.schema, raw, &parts, &evidence)
    }

    /// Run the probes concurrently, each under its own budget. The
    /// aggregate deadline is the slowest single budget, not their sum.
    async fn gather(&self, parts: &UrlParts) -> Evidence {
        let dns = self.dns.resolve(&parts.host);

        let whois = async {
            match parts.registrable_domain.as_deref() {
                Some(domain) => self.whois.lookup(domain).await,
                None => ProbeOutcome::Failure("no registrable domain".to_string()),
            }
        };

        let tls = async {
            if parts.scheme == "https" {
                self.tls.verify(&parts.normalized).await
            } else {
                ProbeOutcome::Failure("plain scheme".to_string())
            }
        };

        let page = async {
            match self.fetcher.fetch(&parts.normalized).await {
                ProbeOutcome::Success(body) => ProbeOutcome::Success(content::analyze(
                    &body,
                    parts.registrable_domain.as_deref().unwrap_or(""),
                )),
                ProbeOutcome::Timeout => ProbeOutcome::Timeout,
                ProbeOutcome::Failure(reason) => ProbeOutcome::Failure(reason),
            }
        };

        let (dns, whois, tls, page) = tokio::join!(dns, whois, tls, page);
        Evidence {
            dns,
            whois,
            tls,
            page,
            now: Utc::now(),
        }
    }
}
