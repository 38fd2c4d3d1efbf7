//! Error types for the SRFR system

use thiserror::Error;

/// Main error type for SRFR operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Embedding shapes that cannot be reconciled during accumulation
    #[error("Shape error: {0}")]
    Shape(String),

    /// A trainable variable received no gradient from its loss
    #[error("Disconnected gradient graph on {tape}: trainable variable #{parameter} has no gradient")]
    DisconnectedGradient {
        /// Tape the gradient was requested from
        tape: String,
        /// Index of the variable in the model's trainable set
        parameter: usize,
    },

    /// Perceptual loss requested without a feature extractor
    #[error("Perceptual loss requires a feature extractor, none was configured")]
    MissingFeatureExtractor,

    /// Verification metric computation failed
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Tensor operation error
    #[error("Tensor operation error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Metrics registry error
    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Other errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for SRFR operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a shape error
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    /// Create an evaluation error
    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    /// Whether this error came out of verification scoring rather than
    /// the optimisation itself
    pub fn is_evaluation_failure(&self) -> bool {
        matches!(self, Self::Evaluation(_))
    }
}
