//! Zero-overhead observer that discards everything. Default backend.

use crate::observability::traits::{Observer, ObserverEvent, ObserverMetric};

pub struct NoopObserver;

impl Observer for NoopObserver {
    fn record_event(&self, _event: &ObserverEvent) {}

    fn record_metric(&self, _metric: &ObserverMetric) {}

    fn name(&self) -> &str {
        "noop"
    }
}
