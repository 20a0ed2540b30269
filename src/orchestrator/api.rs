//! The ingress HTTP API (spec §6): one POST `/analyze` endpoint plus a
//! `/healthz` liveness probe.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::normalizer::MAX_INPUT_CHARS;
use crate::types::FinalStatus;

use super::Orchestrator;

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Build the `/analyze` + `/healthz` router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn serve(state: ApiState, port: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let router = router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "promptwarden listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining in-flight requests");
}

/// Tagged payload shapes the producer may send. `extract_text` returns the
/// text to analyze, or `None` for a legitimately-empty payload, clearly
/// distinct from a parse failure (the request simply never deserializes).
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub text: Option<String>,
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,
    pub lang: Option<String>,
    pub request_id: Option<String>,
    #[allow(dead_code)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub action: &'static str,
    pub reason: String,
    #[serde(rename = "sanitizedBody")]
    pub sanitized_body: Option<SanitizedBody>,
    pub request_id: Option<String>,
    pub degraded: bool,
    pub timing_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SanitizedBody {
    pub messages: Vec<SanitizedMessage>,
}

#[derive(Debug, Serialize)]
pub struct SanitizedMessage {
    pub content: SanitizedContent,
}

#[derive(Debug, Serialize)]
pub struct SanitizedContent {
    pub parts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn reason_for(status: FinalStatus, degraded_branch_count: usize) -> String {
    match status {
        FinalStatus::Blocked => "arbiter_block".to_string(),
        FinalStatus::Sanitized => "arbiter_sanitize".to_string(),
        FinalStatus::Allowed if degraded_branch_count == 3 => "service_unavailable".to_string(),
        FinalStatus::Allowed => "no_action_specified".to_string(),
    }
}

async fn analyze(State(state): State<ApiState>, Json(req): Json<AnalyzeRequest>) -> (StatusCode, Json<serde_json::Value>) {
    let text = match req.text.as_deref() {
        Some(t) if !t.is_empty() => t,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::to_value(ErrorResponse {
                    error: "text required".to_string(),
                })
                .unwrap()),
            );
        }
    };

    if text.chars().count() > MAX_INPUT_CHARS {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::to_value(ErrorResponse {
                error: "text required".to_string(),
            })
            .unwrap()),
        );
    }

    let client_id = req.client_id.unwrap_or_default();
    let outcome = state.orchestrator.analyze(text, &client_id, req.request_id).await;

    let degraded = outcome.degraded_branch_count == 3;
    let reason = reason_for(outcome.verdict.final_status, outcome.degraded_branch_count);

    let sanitized_body = outcome.redacted_text.map(|text| SanitizedBody {
        messages: vec![SanitizedMessage {
            content: SanitizedContent { parts: vec![text] },
        }],
    });

    let response = AnalyzeResponse {
        action: outcome.verdict.final_status.as_action(),
        reason,
        sanitized_body,
        request_id: Some(outcome.request_id),
        degraded,
        timing_ms: outcome.total_timing.as_millis() as u64,
    };

    (StatusCode::OK, Json(serde_json::to_value(response).unwrap()))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    pipeline_version: &'static str,
    catalogue_loaded: bool,
    vector_store_reachable: bool,
}

async fn healthz(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let health = state.orchestrator.health_check().await;
    let status_code = if health.is_healthy() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status_code,
        Json(HealthResponse {
            status: if health.is_healthy() { "ok" } else { "degraded" },
            pipeline_version: super::PIPELINE_VERSION,
            catalogue_loaded: health.catalogue_loaded,
            vector_store_reachable: health.vector_store_reachable,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch_a::catalogue::Catalogue;
    use crate::branch_a::{shared_catalogue, HeuristicsBranch};
    use crate::branch_b::embeddings::MockEmbeddings;
    use crate::branch_b::{shared_thresholds, SemanticBranch};
    use crate::branch_c::{MockSafetyClassifier, SafetyBranch};
    use crate::config::{FirewallConfig, SemanticThresholds};
    use crate::observability::NoopObserver;
    use crate::orchestrator::event_sink::{EventSink, NullEventWriter};
    use crate::pii::patterns::MockNlpEntityProvider;
    use crate::pii::PiiDetector;
    use crate::orchestrator::Orchestrator;
    use std::sync::Arc;

    #[test]
    fn reason_mapping_matches_spec_enumerated_strings() {
        assert_eq!(reason_for(FinalStatus::Blocked, 0), "arbiter_block");
        assert_eq!(reason_for(FinalStatus::Sanitized, 0), "arbiter_sanitize");
        assert_eq!(reason_for(FinalStatus::Allowed, 3), "service_unavailable");
        assert_eq!(reason_for(FinalStatus::Allowed, 0), "no_action_specified");
    }

    #[test]
    fn timing_conversion_never_panics_on_small_durations() {
        let d = Duration::from_millis(0);
        assert_eq!(d.as_millis() as u64, 0);
    }

    /// `MockVectorStore::ping` always returns `true`; to exercise the
    /// degraded health path we need a store whose `ping` can be toggled.
    struct TogglePingStore {
        reachable: bool,
    }

    #[async_trait::async_trait]
    impl crate::branch_b::vector_store::VectorStore for TogglePingStore {
        async fn query_dual(
            &self,
            _embedding: &[f32],
            _top_k: usize,
        ) -> Result<crate::branch_b::vector_store::DualSearchResult, crate::error::VectorStoreError> {
            Ok(crate::branch_b::vector_store::DualSearchResult::default())
        }

        async fn ping(&self) -> bool {
            self.reachable
        }
    }

    fn test_state(vector_store_reachable: bool) -> ApiState {
        let config = FirewallConfig::default();
        let branch_a = HeuristicsBranch::new(shared_catalogue(Catalogue::load_default().unwrap()));
        let branch_b = SemanticBranch::new(
            Arc::new(MockEmbeddings::new(16)),
            Arc::new(TogglePingStore { reachable: vector_store_reachable }),
            shared_thresholds(SemanticThresholds::default()),
            5,
            Arc::new(NoopObserver),
        );
        let branch_c = SafetyBranch::new(Arc::new(MockSafetyClassifier::default()));
        let pii = PiiDetector::new(Arc::new(MockNlpEntityProvider::default()), config.pii.clone());
        let shared_config = crate::config::shared(config);
        let (sink, _handle) = EventSink::spawn(64, Arc::new(NullEventWriter), Arc::new(NoopObserver));
        let orchestrator = Arc::new(Orchestrator::new(branch_a, branch_b, branch_c, pii, shared_config, sink, Arc::new(NoopObserver)));
        ApiState { orchestrator }
    }

    #[tokio::test]
    async fn healthz_reports_ok_when_vector_store_reachable() {
        let state = test_state(true);
        let (status, Json(body)) = healthz(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert!(body.catalogue_loaded);
        assert!(body.vector_store_reachable);
    }

    #[tokio::test]
    async fn healthz_reports_degraded_when_vector_store_unreachable() {
        let state = test_state(false);
        let (status, Json(body)) = healthz(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert!(!body.vector_store_reachable);
    }
}
