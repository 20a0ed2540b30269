//! Observability subsystem: trait-based event and metric recording.
//!
//! Provides a pluggable [`Observer`] trait with multiple backends:
//!
//! | Backend | Description |
//! |---------|-------------|
//! | `noop`  | Zero overhead, discards everything (default) |
//! | `log`   | Emits structured events via `tracing` |
//! | `multi` | Fan-out to multiple backends simultaneously |
//!
//! The [`create_observer`] factory builds the right backend from
//! [`ObservabilityConfig`]. Backends can be combined with `+` syntax
//! (e.g. `"log+noop"`), though in practice only `log` carries data today.

mod log;
mod multi;
mod noop;
pub mod traits;

#[cfg(test)]
pub mod recording;

pub use self::log::LogObserver;
pub use self::multi::MultiObserver;
pub use self::noop::NoopObserver;
pub use self::traits::{Observer, ObserverEvent, ObserverMetric};

use crate::config::optional_env;
use crate::error::ConfigError;

/// Configuration for the observability backend.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Backend name: "none", "noop", or "log".
    pub backend: String,
}

impl ObservabilityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            backend: optional_env("OBSERVABILITY_BACKEND")?.unwrap_or_else(|| "log".to_string()),
        })
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            backend: "none".into(),
        }
    }
}

/// Create an observer from configuration.
///
/// Returns a [`NoopObserver`] for "none"/"noop" (or unknown values), a
/// [`LogObserver`] for "log", and a [`MultiObserver`] for compound
/// backends like "log+noop".
pub fn create_observer(config: &ObservabilityConfig) -> Box<dyn Observer> {
    match config.backend.as_str() {
        "log" => Box::new(LogObserver),
        backend if backend.contains('+') => {
            let observers: Vec<Box<dyn Observer>> = backend
                .split('+')
                .map(|b| match b {
                    "log" => Box::new(LogObserver) as Box<dyn Observer>,
                    _ => Box::new(NoopObserver) as Box<dyn Observer>,
                })
                .collect();
            Box::new(MultiObserver::new(observers))
        }
        _ => Box::new(NoopObserver),
    }
}
