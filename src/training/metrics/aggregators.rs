//! Loss aggregators applied to per-step losses
//!
//! The trainer passes each step's loss through a caller-supplied aggregator
//! and reports what it returns; the aggregator decides whether that is the
//! latest value, a running mean, or anything else.

/// Stateful reduction over a stream of loss values
pub trait LossAggregator: Send {
    /// Aggregator name
    fn name(&self) -> &str;

    /// Feed one value and return the aggregate so far
    fn update(&mut self, value: f64) -> f64;

    /// Current aggregate without feeding a value, `None` before any update
    fn result(&self) -> Option<f64>;

    /// Forget all state
    fn reset(&mut self);
}

/// Arithmetic mean of everything seen since the last reset
#[derive(Debug, Clone, Default)]
pub struct RunningMean {
    total: f64,
    count: usize,
}

impl RunningMean {
    /// Empty mean
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of values seen
    pub fn count(&self) -> usize {
        self.count
    }
}

impl LossAggregator for RunningMean {
    fn name(&self) -> &str {
        "running_mean"
    }

    fn update(&mut self, value: f64) -> f64 {
        self.total += value;
        self.count += 1;
        self.total / self.count as f64
    }

    fn result(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total / self.count as f64)
    }

    fn reset(&mut self) {
        self.total = 0.0;
        self.count = 0;
    }
}

/// Returns the value it was given
#[derive(Debug, Clone, Default)]
pub struct LastValue {
    last: Option<f64>,
}

impl LossAggregator for LastValue {
    fn name(&self) -> &str {
        "last_value"
    }

    fn update(&mut self, value: f64) -> f64 {
        self.last = Some(value);
        value
    }

    fn result(&self) -> Option<f64> {
        self.last
    }

    fn reset(&mut self) {
        self.last = None;
    }
}
