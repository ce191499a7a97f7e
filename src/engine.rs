use crate::config::Config;
use crate::error::AppError;
use crate::features::FeatureExtractor;
use crate::model::Classifier;
use crate::storage::VerdictStore;
use crate::types::{PredictRequest, PredictResponse, StatsResponse, UrlCheck, Verdict};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_URL_LEN: usize = 2048;

/// Ties the extractor, the classifier artifact and the verdict store
/// together behind the single `check` entry point.
pub struct DetectionEngine {
    extractor: FeatureExtractor,
    classifier: Classifier,
    store: Arc<VerdictStore>,
}

impl DetectionEngine {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        info!(
            "initializing detection engine (schema {}, model {})",
            config.schema.name(),
            config.model_path
        );

        let extractor = FeatureExtractor::new(config)?;
        let classifier = Classifier::load_or_default(&config.model_path, config.schema)?;
        let store = Arc::new(VerdictStore::open(&config.database_path)?);

        Ok(Self {
            extractor,
            classifier,
            store,
        })
    }

    pub async fn check(&self, request: PredictRequest) -> Result<PredictResponse, AppError> {
        validate_request(&request)?;
        let user = request.user.unwrap_or_else(|| "anonymous".to_string());

        let vector = self.extractor.extract(&request.url).await?;
        debug!(
            "extracted {} signals for {}: {:?}",
            vector.len(),
            request.url,
            vector.iter().map(|s| s.value()).collect::<Vec<_>>()
        );

        let (legitimate, phishing) = self.classifier.predict_proba(&vector)?;
        let prediction = if self.classifier.predict(&vector)? == 1 {
            Verdict::Phishing
        } else {
            Verdict::Legitimate
        };
        let confidence = (legitimate.max(phishing) * 10_000.0).round() / 100.0;

        let check = UrlCheck {
            id: Uuid::new_v4(),
            url: request.url.clone(),
            prediction,
            confidence,
            user: user.clone(),
            checked_at: Utc::now(),
        };

        metrics::counter!("verdicts_total", "verdict" => prediction.as_str()).increment(1);

        // Persistence is a sink: log asynchronously, never fail the
        // verdict over it.
        let store = Arc::clone(&self.store);
        let row = check.clone();
        tokio::spawn(async move {
            if let Err(e) = store.record(&row) {
                warn!("failed to log verdict for {}: {e}", row.url);
            }
        });

        info!(
            "{} -> {} ({confidence}%)",
            check.url,
            prediction.as_str()
        );

        Ok(PredictResponse {
            url: check.url,
            prediction,
            confidence,
            checked_at: check.checked_at,
            user,
        })
    }

    pub fn history(&self, limit: u32) -> Result<Vec<UrlCheck>, AppError> {
        self.store.recent(limit)
    }

    pub fn stats(&self) -> Result<StatsResponse, AppError> {
        self.store.stats()
    }

    pub fn model_version(&self) -> &str {
        self.classifier.version()
    }
}

fn validate_request(request: &PredictRequest) -> Result<(), AppError> {
    if request.url.trim().is_empty() {
        return Err(AppError::InvalidInput("No URL provided".to_string()));
    }
    if request.url.len() > MAX_URL_LEN {
        return Err(AppError::InvalidInput(format!(
            "URL exceeds {MAX_URL_LEN} bytes"
        )));
    }
    Ok(())
}
