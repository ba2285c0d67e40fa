//! Error types for the training core
//!
//! Two conditions get dedicated variants because callers need to react to
//! them by kind: configuration problems (rejected eagerly at setup) and
//! autograd graph misuse (fatal for the current step, never retried).

/// Errors produced by the training core.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    /// Invalid or inconsistent configuration, detected at setup time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A gradient was requested from a tensor or graph that cannot provide
    /// one (input not tracked, or graph already freed).
    #[error("invalid autograd graph state: {0}")]
    InvalidGraphState(String),

    /// Underlying libtorch failure.
    #[error("torch error: {0}")]
    Torch(#[from] tch::TchError),

    /// Dataset array shape mismatch.
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrainError {
    /// Shorthand for a configuration error with a formatted message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, TrainError>;
