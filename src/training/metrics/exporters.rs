//! Prometheus export of scalar summaries
//!
//! Each distinct summary name becomes a gauge in a caller-owned registry,
//! holding the latest value; the step is exported as a companion gauge.

use std::collections::HashMap;

use parking_lot::Mutex;
use prometheus::{Gauge, Opts, Registry};
use tracing::warn;

use super::MetricsSink;
use crate::error::Result;

/// Sink backed by Prometheus gauges
pub struct PrometheusSink {
    registry: Registry,
    namespace: String,
    gauges: Mutex<HashMap<String, Gauge>>,
    step: Gauge,
}

impl PrometheusSink {
    /// Register a sink in `registry` under `namespace`
    pub fn new(registry: Registry, namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let step = Gauge::with_opts(
            Opts::new("summary_step", "Step of the most recent scalar summary").namespace(namespace.clone()),
        )?;
        registry.register(Box::new(step.clone()))?;
        Ok(Self {
            registry,
            namespace,
            gauges: Mutex::new(HashMap::new()),
            step,
        })
    }

    /// Registry the gauges live in
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn gauge(&self, name: &str) -> Result<Gauge> {
        let mut gauges = self.gauges.lock();
        if let Some(gauge) = gauges.get(name) {
            return Ok(gauge.clone());
        }
        let gauge = Gauge::with_opts(
            Opts::new(metric_name(name), format!("Latest value of '{}'", name))
                .namespace(self.namespace.clone()),
        )?;
        self.registry.register(Box::new(gauge.clone()))?;
        gauges.insert(name.to_string(), gauge.clone());
        Ok(gauge)
    }
}

impl MetricsSink for PrometheusSink {
    fn log_scalar(&self, name: &str, value: f64, step: usize) {
        match self.gauge(name) {
            Ok(gauge) => {
                gauge.set(value);
                self.step.set(step as f64);
            }
            Err(e) => warn!("Dropping summary '{}': {}", name, e),
        }
    }
}

/// Summary names like "Perceptual Loss" become `perceptual_loss`
fn metric_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if out.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
