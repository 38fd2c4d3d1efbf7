//! Scalar metrics for SRFR training
//!
//! The loss engine and trainer write step-indexed scalars through the
//! [`MetricsSink`] trait. Sinks are write-only from the caller's point of
//! view; the in-memory sink additionally keeps a history for inspection.

pub mod aggregators;
pub mod exporters;

pub use aggregators::{LastValue, LossAggregator, RunningMean};
pub use exporters::PrometheusSink;

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::info;

/// Step-indexed scalar sink
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSink: Send + Sync {
    /// Record `value` for `name` at `step`
    fn log_scalar(&self, name: &str, value: f64, step: usize);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn log_scalar(&self, _name: &str, _value: f64, _step: usize) {}
}

/// Emits each scalar as a `tracing` event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn log_scalar(&self, name: &str, value: f64, step: usize) {
        info!(target: "srfr::summary", metric = name, value, step, "scalar summary");
    }
}

/// Keeps every scalar in memory, grouped by name
#[derive(Debug, Default)]
pub struct InMemorySink {
    history: Mutex<HashMap<String, Vec<(usize, f64)>>>,
}

impl InMemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// `(step, value)` pairs recorded for `name`, oldest first
    pub fn values(&self, name: &str) -> Vec<(usize, f64)> {
        self.history.lock().get(name).cloned().unwrap_or_default()
    }

    /// Most recent value recorded for `name`
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.history
            .lock()
            .get(name)
            .and_then(|values| values.last())
            .map(|(_, value)| *value)
    }

    /// Names that received at least one value
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.history.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop all recorded values
    pub fn clear(&self) {
        self.history.lock().clear();
    }
}

impl MetricsSink for InMemorySink {
    fn log_scalar(&self, name: &str, value: f64, step: usize) {
        self.history
            .lock()
            .entry(name.to_string())
            .or_default()
            .push((step, value));
    }
}
