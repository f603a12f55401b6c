//! Error types for srun-core
//!
//! Errors are grouped by how the orchestration layer reacts to them:
//! transient and protocol failures are retried under a backoff policy,
//! configuration failures are surfaced immediately, and delivery failures
//! are only logged and reported as their own events.

use thiserror::Error;

/// Result type alias for srun-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Network or timeout failure while talking to the portal
    #[error("Transient error: {0}")]
    Transient(String),

    /// Invalid or missing configuration (interface, DNS settings, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The portal understood the request and rejected it
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Webhook or DNS update delivery failure
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// The event queue no longer accepts events
    #[error("Event queue is closed")]
    QueueClosed,

    /// The event queue could not be drained before the deadline
    #[error("Event queue close timed out with {pending} event(s) undelivered")]
    QueueTimeout {
        /// Events still buffered or in flight when the deadline elapsed
        pending: usize,
    },

    /// The operation was cancelled by a shutdown signal
    #[error("Operation cancelled")]
    Cancelled,

    /// IO errors (config file loading)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a delivery error
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Whether a backoff policy may retry after this error
    ///
    /// Configuration problems and cancellation are final; everything else
    /// is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::Cancelled)
    }
}

/// Send/timeout failures are transient; a client that cannot even be built
/// is a configuration problem.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::Config(err.to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
