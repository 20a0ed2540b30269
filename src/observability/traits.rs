//! Core observer trait and event/metric types.

use std::time::Duration;

use crate::types::{BranchId, DecisionSource, FinalStatus};

/// Provider-agnostic observer for pipeline lifecycle events and metrics.
///
/// Implementations can log to tracing, export to OpenTelemetry, or do
/// nothing at all. The orchestrator and branches record events at key
/// points and the observer decides what to do with them.
///
/// Thread-safe and cheaply cloneable behind `Arc<dyn Observer>`.
pub trait Observer: Send + Sync {
    /// Record a discrete lifecycle event.
    fn record_event(&self, event: &ObserverEvent);

    /// Record a numeric metric sample.
    fn record_metric(&self, metric: &ObserverMetric);

    /// Flush any buffered data. No-op by default.
    fn flush(&self) {}

    /// Shut down the observer backend, flushing remaining data. After
    /// shutdown, further calls to `record_event` / `record_metric` may
    /// silently no-op. Default implementation calls `flush()`.
    fn shutdown(&self) {
        self.flush();
    }

    /// Human-readable backend name (e.g. "noop", "log", "otel").
    fn name(&self) -> &str;
}

/// Discrete lifecycle events the pipeline can emit.
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// Orchestrator accepted a request and is about to fan out.
    AnalysisStart {
        request_id: String,
        client_id: String,
        text_len: usize,
    },

    /// One branch finished (or was cancelled/timed out).
    BranchCompleted {
        request_id: String,
        branch: BranchId,
        score: u8,
        degraded: bool,
        timed_out: bool,
        duration: Duration,
    },

    /// The arbiter produced a verdict.
    ArbiterDecided {
        request_id: String,
        status: FinalStatus,
        combined_score: u8,
        decision_source: DecisionSource,
        boost_count: usize,
    },

    /// The PII detector redacted at least one entity.
    PiiRedacted {
        request_id: String,
        entity_count: usize,
    },

    /// Branch B's vector store query failed outright or fell back to
    /// single-side scoring.
    VectorStoreQueryFailed {
        request_id: String,
        fallback: bool,
        error: String,
    },

    /// The event sink's bounded queue dropped an event (back-pressure).
    EventSinkDropped { request_id: String },

    /// A component's background reload (e.g. Branch A's catalogue) ran.
    CatalogueReloaded { component: String, success: bool },

    /// An error occurred in a component, recovered locally.
    Error { component: String, message: String },
}

/// Numeric metric samples.
#[derive(Debug, Clone)]
pub enum ObserverMetric {
    /// End-to-end request latency (histogram-style).
    RequestLatency(Duration),
    /// Latency of a single branch.
    BranchLatency(BranchId, Duration),
    /// Current event-sink queue depth (gauge).
    EventSinkQueueDepth(u64),
    /// Count of requests handled in degraded mode (monotonic counter
    /// delta; callers add 1 per occurrence).
    DegradedRequests(u64),
}

#[cfg(test)]
mod tests {
    use crate::observability::traits::*;

    #[test]
    fn event_variants_are_constructible() {
        let _ = ObserverEvent::AnalysisStart {
            request_id: "r1".into(),
            client_id: "c1".into(),
            text_len: 42,
        };
        let _ = ObserverEvent::BranchCompleted {
            request_id: "r1".into(),
            branch: BranchId::A,
            score: 10,
            degraded: false,
            timed_out: false,
            duration: Duration::from_millis(3),
        };
        let _ = ObserverEvent::ArbiterDecided {
            request_id: "r1".into(),
            status: FinalStatus::Allowed,
            combined_score: 5,
            decision_source: DecisionSource::Arbiter,
            boost_count: 0,
        };
        let _ = ObserverEvent::PiiRedacted {
            request_id: "r1".into(),
            entity_count: 2,
        };
        let _ = ObserverEvent::VectorStoreQueryFailed {
            request_id: "r1".into(),
            fallback: true,
            error: "timeout".into(),
        };
        let _ = ObserverEvent::EventSinkDropped {
            request_id: "r1".into(),
        };
        let _ = ObserverEvent::CatalogueReloaded {
            component: "branch_a".into(),
            success: true,
        };
        let _ = ObserverEvent::Error {
            component: "branch_b".into(),
            message: "timeout".into(),
        };
    }

    #[test]
    fn metric_variants_are_constructible() {
        let _ = ObserverMetric::RequestLatency(Duration::from_millis(42));
        let _ = ObserverMetric::BranchLatency(BranchId::B, Duration::from_millis(20));
        let _ = ObserverMetric::EventSinkQueueDepth(3);
        let _ = ObserverMetric::DegradedRequests(1);
    }
}
