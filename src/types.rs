use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ternary feature signal. Every feature function is total over this
/// domain: -1 benign, 0 neutral/indeterminate, 1 suspicious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Signal {
    Benign,
    Neutral,
    Suspicious,
}

impl Signal {
    pub fn value(self) -> i8 {
        match self {
            Signal::Benign => -1,
            Signal::Neutral => 0,
            Signal::Suspicious => 1,
        }
    }

    pub fn from_value(v: i8) -> Option<Self> {
        match v {
            -1 => Some(Signal::Benign),
            0 => Some(Signal::Neutral),
            1 => Some(Signal::Suspicious),
            _ => None,
        }
    }
}

impl From<Signal> for i8 {
    fn from(s: Signal) -> i8 {
        s.value()
    }
}

impl TryFrom<i8> for Signal {
    type Error = String;

    fn try_from(v: i8) -> Result<Self, Self::Error> {
        Signal::from_value(v).ok_or_else(|| format!("signal out of range: {v}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Phishing,
    Legitimate,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Phishing => "phishing",
            Verdict::Legitimate => "legitimate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "phishing" => Some(Verdict::Phishing),
            "legitimate" => Some(Verdict::Legitimate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub url: String,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub url: String,
    pub prediction: Verdict,
    pub confidence: f64,
    pub checked_at: DateTime<Utc>,
    pub user: String,
}

/// One persisted verdict row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlCheck {
    pub id: Uuid,
    pub url: String,
    pub prediction: Verdict,
    pub confidence: f64,
    pub user: String,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_checks: u64,
    pub phishing: u64,
    pub legitimate: u64,
    pub average_confidence: f64,
    pub last_checked: Option<DateTime<Utc>>,
}
