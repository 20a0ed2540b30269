//! Test-only observer that captures all events into a shared vector.
//!
//! Used by orchestrator/arbiter tests to assert on event emission without
//! scraping tracing output.

use std::sync::{Arc, Mutex};

use crate::observability::traits::{Observer, ObserverEvent, ObserverMetric};

/// Observer that records all events for test assertions.
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<ObserverEvent>>>,
    metrics: Arc<Mutex<Vec<ObserverMetric>>>,
}

impl RecordingObserver {
    /// Create a new recording observer and return handles to the captured
    /// data.
    pub fn new() -> (Self, Arc<Mutex<Vec<ObserverEvent>>>, Arc<Mutex<Vec<ObserverMetric>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let metrics = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                events: Arc::clone(&events),
                metrics: Arc::clone(&metrics),
            },
            events,
            metrics,
        )
    }
}

impl Observer for RecordingObserver {
    fn record_event(&self, event: &ObserverEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn record_metric(&self, metric: &ObserverMetric) {
        self.metrics.lock().unwrap().push(metric.clone());
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BranchId, DecisionSource, FinalStatus};

    #[test]
    fn captures_events() {
        let (obs, events, _) = RecordingObserver::new();

        obs.record_event(&ObserverEvent::AnalysisStart {
            request_id: "r1".into(),
            client_id: "c1".into(),
            text_len: 5,
        });
        obs.record_event(&ObserverEvent::ArbiterDecided {
            request_id: "r1".into(),
            status: FinalStatus::Allowed,
            combined_score: 0,
            decision_source: DecisionSource::Arbiter,
            boost_count: 0,
        });

        let captured = events.lock().unwrap();
        assert_eq!(captured.len(), 2);
        assert!(matches!(captured[0], ObserverEvent::AnalysisStart { .. }));
        assert!(matches!(captured[1], ObserverEvent::ArbiterDecided { .. }));
    }

    #[test]
    fn captures_metrics() {
        let (obs, _, metrics) = RecordingObserver::new();

        obs.record_metric(&ObserverMetric::BranchLatency(
            BranchId::A,
            std::time::Duration::from_millis(2),
        ));

        let captured = metrics.lock().unwrap();
        assert_eq!(captured.len(), 1);
    }

    #[test]
    fn name_is_recording() {
        let (obs, _, _) = RecordingObserver::new();
        assert_eq!(obs.name(), "recording");
    }
}
