//! Utility functions for the SRFR system

/// Logging setup
pub mod logging {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    use crate::error::{Error, Result};

    /// Filter directive for `level`: crate events at `level`, everything else at warn
    pub fn default_directive(level: &str) -> String {
        format!("srfr={},warn", level)
    }

    /// Install the global tracing subscriber
    ///
    /// `RUST_LOG` takes precedence over `level`. With `json` set, events are
    /// written as JSON lines including the current span. Calling it again is
    /// a no-op.
    pub fn init_logging(level: &str, json: bool) -> Result<()> {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(default_directive(level))
                .map_err(|e| Error::config(format!("invalid log level '{}': {}", level, e)))?,
        };

        let layer = if json {
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_filter(env_filter)
                .boxed()
        } else {
            fmt::layer().with_target(false).with_filter(env_filter).boxed()
        };

        // A second call leaves the first subscriber in place
        if let Err(e) = tracing_subscriber::registry().with(layer).try_init() {
            tracing::debug!("Tracing subscriber already installed: {}", e);
        }
        Ok(())
    }

}
