//! Fan-out observer: forwards every event/metric to a list of backends.
//!
//! Used to combine e.g. `log` with `otel` without either backend needing
//! to know about the other.

use crate::observability::traits::{Observer, ObserverEvent, ObserverMetric};

pub struct MultiObserver {
    observers: Vec<Box<dyn Observer>>,
}

impl MultiObserver {
    pub fn new(observers: Vec<Box<dyn Observer>>) -> Self {
        Self { observers }
    }
}

impl Observer for MultiObserver {
    fn record_event(&self, event: &ObserverEvent) {
        for obs in &self.observers {
            obs.record_event(event);
        }
    }

    fn record_metric(&self, metric: &ObserverMetric) {
        for obs in &self.observers {
            obs.record_metric(metric);
        }
    }

    fn flush(&self) {
        for obs in &self.observers {
            obs.flush();
        }
    }

    fn shutdown(&self) {
        for obs in &self.observers {
            obs.shutdown();
        }
    }

    fn name(&self) -> &str {
        "multi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::log::LogObserver;
    use crate::observability::noop::NoopObserver;

    #[test]
    fn multi_forwards_to_all_backends() {
        let multi = MultiObserver::new(vec![Box::new(LogObserver), Box::new(NoopObserver)]);
        assert_eq!(multi.name(), "multi");
        multi.record_event(&ObserverEvent::EventSinkDropped {
            request_id: "r1".into(),
        });
        multi.flush();
        multi.shutdown();
    }

    #[test]
    fn multi_with_no_backends_is_harmless() {
        let multi = MultiObserver::new(vec![]);
        multi.record_event(&ObserverEvent::EventSinkDropped {
            request_id: "r1".into(),
        });
    }
}
