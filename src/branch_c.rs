//! Branch C — safety NLP classifier (spec §4.4). A local encoder
//! classifier returning a continuous risk score; no training happens
//! here, only inference against a pre-trained model.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::config::SafetyNlpConfig;
use crate::error::SafetyNlpError;
use crate::types::{BranchId, BranchResult, CriticalSignals};

const MODEL_HIGH_RISK_THRESHOLD: f64 = 0.90;

#[async_trait]
pub trait SafetyClassifier: Send + Sync {
    /// Returns a continuous risk score in `0.0..=1.0`.
    async fn classify(&self, text: &str) -> Result<f64, SafetyNlpError>;
}

/// HTTP client for a locally hosted encoder-classifier server.
pub struct HttpSafetyClassifier {
    client: reqwest::Client,
    config: SafetyNlpConfig,
}

impl HttpSafetyClassifier {
    pub fn new(config: SafetyNlpConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(serde::Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[derive(serde::Deserialize)]
struct ClassifyResponse {
    risk: f64,
}

#[async_trait]
impl SafetyClassifier for HttpSafetyClassifier {
    async fn classify(&self, text: &str) -> Result<f64, SafetyNlpError> {
        let timeout = std::time::Duration::from_millis(self.config.timeout_ms);
        let resp = self
            .client
            .post(&self.config.endpoint)
            .timeout(timeout)
            .json(&ClassifyRequest { text })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SafetyNlpError::Timeout(timeout)
                } else {
                    SafetyNlpError::InferenceFailed(e.to_string())
                }
            })?;

        let body: ClassifyResponse = resp
            .json()
            .await
            .map_err(|e| SafetyNlpError::InferenceFailed(format!("invalid response: {e}")))?;

        if !(0.0..=1.0).contains(&body.risk) {
            return Err(SafetyNlpError::InferenceFailed(format!(
                "risk out of range: {}",
                body.risk
            )));
        }
        Ok(body.risk)
    }
}

/// Deterministic mock classifier for tests: keyword-weighted risk, no
/// network dependency.
pub struct MockSafetyClassifier {
    pub risky_terms: Vec<&'static str>,
}

impl Default for MockSafetyClassifier {
    fn default() -> Self {
        Self {
            risky_terms: vec!["bomb", "explosive", "kill", "weapon", "poison", "hack into"],
        }
    }
}

#[async_trait]
impl SafetyClassifier for MockSafetyClassifier {
    async fn classify(&self, text: &str) -> Result<f64, SafetyNlpError> {
        let lowered = text.to_lowercase();
        let hits = self.risky_terms.iter().filter(|t| lowered.contains(*t)).count();
        Ok((hits as f64 * 0.4).min(1.0))
    }
}

pub struct SafetyBranch {
    classifier: Arc<dyn SafetyClassifier>,
}

impl SafetyBranch {
    pub fn new(classifier: Arc<dyn SafetyClassifier>) -> Self {
        Self { classifier }
    }

    pub async fn analyze(&self, normalized: &str) -> Result<BranchResult, SafetyNlpError> {
        let start = Instant::now();
        let risk = self.classifier.classify(normalized).await?;

        let score = (risk * 100.0).round().clamp(0.0, 100.0) as u8;
        let critical_signals = CriticalSignals {
            model_high_risk: risk >= MODEL_HIGH_RISK_THRESHOLD,
            ..Default::default()
        };

        let mut features = HashMap::new();
        features.insert("risk".to_string(), serde_json::json!(risk));

        Ok(BranchResult::new(
            BranchId::C,
            score,
            risk,
            critical_signals,
            features,
            start.elapsed().as_millis() as u64,
        ))
    }
}
