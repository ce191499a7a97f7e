use crate::error::AppError;
use crate::features::{self, FeatureSchema};
use crate::types::Signal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// On-disk classifier artifact: a linear model over the active schema's
/// signals, stored with the feature-name list it was trained against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierArtifact {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub intercept: f64,
}

pub struct Classifier {
    artifact: ClassifierArtifact,
}

impl Classifier {
    /// Load the artifact, or write a default one on first run. Either way
    /// the result is validated against the active schema before serving.
    pub fn load_or_default(path: &str, schema: FeatureSchema) -> Result<Self, AppError> {
        let artifact = if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)?;
            let artifact: ClassifierArtifact = serde_json::from_str(&content)
                .map_err(|e| AppError::Model(format!("unreadable artifact {path}: {e}")))?;
            info!(
                "loaded classifier {} ({} features) from {path}",
                artifact.version,
                artifact.feature_names.len()
            );
            artifact
        } else {
            warn!("classifier artifact not found at {path}, writing default weights");
            let artifact = Self::default_artifact(schema);
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(&artifact)?)?;
            artifact
        };

        let classifier = Self { artifact };
        classifier.validate_schema(schema)?;
        Ok(classifier)
    }

    fn default_artifact(schema: FeatureSchema) -> ClassifierArtifact {
        let feature_names: Vec<String> = schema
            .feature_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        // Constant schema entries get zero weight.
        let weights = feature_names
            .iter()
            .map(|name| {
                if features::is_live_feature(name) {
                    0.35
                } else {
                    0.0
                }
            })
            .collect();

        ClassifierArtifact {
            version: "default".to_string(),
            trained_at: Utc::now(),
            feature_names,
            weights,
            intercept: -0.5,
        }
    }

    /// The artifact's feature list must match the active schema exactly,
    /// count and order both; anything else silently corrupts predictions
    /// downstream, so it aborts startup instead.
    pub fn validate_schema(&self, schema: FeatureSchema) -> Result<(), AppError> {
        let expected = schema.feature_names();
        if self.artifact.feature_names.len() != expected.len() {
            return Err(AppError::SchemaMismatch(format!(
                "classifier expects {} features, schema {} provides {}",
                self.artifact.feature_names.len(),
                schema.name(),
                expected.len()
            )));
        }
        for (idx, (got, want)) in self
            .artifact
            .feature_names
            .iter()
            .zip(expected.iter())
            .enumerate()
        {
            if got != want {
                return Err(AppError::SchemaMismatch(format!(
                    "feature {idx} is '{got}' in the artifact but '{want}' in schema {}",
                    schema.name()
                )));
            }
        }
        if self.artifact.weights.len() != expected.len() {
            return Err(AppError::SchemaMismatch(format!(
                "classifier has {} weights for {} features",
                self.artifact.weights.len(),
                expected.len()
            )));
        }
        Ok(())
    }

    pub fn version(&self) -> &str {
        &self.artifact.version
    }

    /// Probability pair (legitimate, phishing).
    pub fn predict_proba(&self, vector: &[Signal]) -> Result<(f64, f64), AppError> {
        if vector.len() != self.artifact.weights.len() {
            return Err(AppError::SchemaMismatch(format!(
                "vector of length {} against classifier of {}",
                vector.len(),
                self.artifact.weights.len()
            )));
        }
        let z = self.artifact.intercept
            + vector
                .iter()
                .zip(self.artifact.weights.iter())
                .map(|(signal, weight)| f64::from(signal.value()) * weight)
                .sum::<f64>();
        let phishing = sigmoid(z);
        Ok((1.0 - phishing, phishing))
    }

    /// Dataset-label prediction: 1 phishing, -1 legitimate.
    pub fn predict(&self, vector: &[Signal]) -> Result<i8, AppError> {
        let (_, phishing) = self.predict_proba(vector)?;
        Ok(if phishing >= 0.5 { 1 } else { -1 })
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier_for(schema: FeatureSchema) -> Classifier {
        Classifier {
            artifact: Classifier::default_artifact(schema),
        }
    }

    #[test]
    fn default_artifact_matches_every_schema() {
        for schema in [
            FeatureSchema::Lexical8,
            FeatureSchema::Discriminative10,
            FeatureSchema::Full30,
        ] {
            let c = classifier_for(schema);
            c.validate_schema(schema).unwrap();
        }
    }

    #[test]
    fn mismatched_schema_is_rejected_loudly() {
        let c = classifier_for(FeatureSchema::Discriminative10);
        let err = c.validate_schema(FeatureSchema::Full30).unwrap_err();
        assert!(matches!(err, AppError::SchemaMismatch(_)));

        // Same length, different order.
        let mut artifact = Classifier::default_artifact(FeatureSchema::Discriminative10);
        artifact.feature_names.swap(0, 1);
        let c = Classifier { artifact };
        let err = c
            .validate_schema(FeatureSchema::Discriminative10)
            .unwrap_err();
        assert!(matches!(err, AppError::SchemaMismatch(_)));
    }

    #[test]
    fn wrong_length_vector_is_rejected() {
        let c = classifier_for(FeatureSchema::Discriminative10);
        let short = vec![Signal::Benign; 9];
        assert!(c.predict_proba(&short).is_err());
    }

    #[test]
    fn all_benign_scores_legitimate_all_suspicious_scores_phishing() {
        let c = classifier_for(FeatureSchema::Discriminative10);

        let benign = vec![Signal::Benign; 10];
        assert_eq!(c.predict(&benign).unwrap(), -1);
        let (legit, phish) = c.predict_proba(&benign).unwrap();
        assert!(legit > phish);

        let suspicious = vec![Signal::Suspicious; 10];
        assert_eq!(c.predict(&suspicious).unwrap(), 1);
        let (legit, phish) = c.predict_proba(&suspicious).unwrap();
        assert!(phish > legit);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let c = classifier_for(FeatureSchema::Lexical8);
        let mixed = vec![
            Signal::Benign,
            Signal::Suspicious,
            Signal::Neutral,
            Signal::Benign,
            Signal::Suspicious,
            Signal::Neutral,
            Signal::Benign,
            Signal::Suspicious,
        ];
        let (legit, phish) = c.predict_proba(&mixed).unwrap();
        assert!((legit + phish - 1.0).abs() < 1e-12);
    }
}
