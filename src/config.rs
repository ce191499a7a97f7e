use crate::error::AppError;
use crate::features::FeatureSchema;
use std::env;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub model_path: String,
    pub schema: FeatureSchema,
    pub dns_timeout: Duration,
    pub whois_timeout: Duration,
    pub fetch_timeout: Duration,
    pub browser_timeout: Duration,
    pub tls_timeout: Duration,
    pub browser_fallback: bool,
    pub user_agent: String,
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .unwrap_or(8000);

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "data/url_checks.db".to_string());
        let model_path =
            env::var("MODEL_PATH").unwrap_or_else(|_| "models/classifier.json".to_string());

        let schema_name =
            env::var("FEATURE_SCHEMA").unwrap_or_else(|_| "discriminative10".to_string());
        let schema = FeatureSchema::from_name(&schema_name).ok_or_else(|| {
            AppError::Config(format!(
                "unknown FEATURE_SCHEMA '{schema_name}' (expected lexical8, discriminative10 or full30)"
            ))
        })?;

        let browser_fallback = env::var("BROWSER_FALLBACK")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let user_agent = env::var("USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());

        Ok(Config {
            port,
            database_path,
            model_path,
            schema,
            dns_timeout: secs_from_env("DNS_TIMEOUT_SECS", 3),
            whois_timeout: secs_from_env("WHOIS_TIMEOUT_SECS", 5),
            fetch_timeout: secs_from_env("FETCH_TIMEOUT_SECS", 10),
            browser_timeout: secs_from_env("BROWSER_TIMEOUT_SECS", 8),
            tls_timeout: secs_from_env("TLS_TIMEOUT_SECS", 3),
            browser_fallback,
            user_agent,
        })
    }
}

fn secs_from_env(key: &str, default: u64) -> Duration {
    let secs = env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}
