//! Tracing-based observer that emits structured log events.
//!
//! Uses the existing `tracing` infrastructure so events appear alongside
//! normal application logs, with no extra dependencies. Good for local
//! development and as the default production backend.

use crate::observability::traits::{Observer, ObserverEvent, ObserverMetric};

/// Observer that logs events and metrics via `tracing`.
pub struct LogObserver;

impl Observer for LogObserver {
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::AnalysisStart {
                request_id,
                client_id,
                text_len,
            } => {
                tracing::info!(
                    request_id,
                    client_id,
                    text_len,
                    "observer: analysis.start"
                );
            }
            ObserverEvent::BranchCompleted {
                request_id,
                branch,
                score,
                degraded,
                timed_out,
                duration,
            } => {
                tracing::info!(
                    request_id,
                    branch = branch.as_str(),
                    score,
                    degraded,
                    timed_out,
                    duration_ms = duration.as_millis() as u64,
                    "observer: branch.completed"
                );
            }
            ObserverEvent::ArbiterDecided {
                request_id,
                status,
                combined_score,
                decision_source,
                boost_count,
            } => {
                tracing::info!(
                    request_id,
                    action = status.as_action(),
                    combined_score,
                    decision_source = decision_source.as_str(),
                    boost_count,
                    "observer: arbiter.decided"
                );
            }
            ObserverEvent::PiiRedacted {
                request_id,
                entity_count,
            } => {
                tracing::info!(request_id, entity_count, "observer: pii.redacted");
            }
            ObserverEvent::VectorStoreQueryFailed {
                request_id,
                fallback,
                error,
            } => {
                tracing::warn!(
                    request_id,
                    fallback,
                    error = error.as_str(),
                    "observer: vector_store.query_failed"
                );
            }
            ObserverEvent::EventSinkDropped { request_id } => {
                tracing::warn!(request_id, "observer: event_sink.dropped");
            }
            ObserverEvent::CatalogueReloaded { component, success } => {
                tracing::info!(component, success, "observer: catalogue.reloaded");
            }
            ObserverEvent::Error { component, message } => {
                tracing::warn!(component, error = message.as_str(), "observer: error");
            }
        }
    }

    fn record_metric(&self, metric: &ObserverMetric) {
        match metric {
            ObserverMetric::RequestLatency(d) => {
                tracing::debug!(
                    latency_ms = d.as_millis() as u64,
                    "observer: metric.request_latency"
                );
            }
            ObserverMetric::BranchLatency(branch, d) => {
                tracing::debug!(
                    branch = branch.as_str(),
                    latency_ms = d.as_millis() as u64,
                    "observer: metric.branch_latency"
                );
            }
            ObserverMetric::EventSinkQueueDepth(n) => {
                tracing::debug!(queue_depth = n, "observer: metric.event_sink_queue_depth");
            }
            ObserverMetric::DegradedRequests(n) => {
                tracing::debug!(count = n, "observer: metric.degraded_requests");
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}
