//! Domain errors for the runcheck engine.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by the remote execution platform client.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Network or connection error
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid or missing API token (HTTP 401)
    #[error("Platform rejected the API token")]
    Unauthorized,

    /// Resource not found (HTTP 404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Any other non-success response
    #[error("Platform returned {status} for {operation}: {body}")]
    Status {
        /// Client operation that made the request
        operation: &'static str,
        /// HTTP status of the response
        status: StatusCode,
        /// Response body, as returned
        body: String,
    },

    /// Response body could not be decoded
    #[error("Failed to decode {operation} response: {message}")]
    Decode {
        /// Client operation that made the request
        operation: &'static str,
        /// Decoder error
        message: String,
    },
}

impl PlatformError {
    /// Returns true when the platform reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound(_))
    }
}

/// Result type for platform client calls.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Engine-level errors.
///
/// `InvalidRequest` and `Usage` are fatal to a single assertion or spec,
/// never to the whole process. `AggregateFailure` is the process-level
/// outcome of a pass with failing specs.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A run request names neither or both of an actor and a task
    #[error("Invalid run request: {0}")]
    InvalidRequest(String),

    /// A matcher or expectation was used with the wrong arguments
    #[error("Invalid usage: {0}")]
    Usage(String),

    /// The platform client failed
    #[error("Remote invocation failed: {0}")]
    Platform(#[from] PlatformError),

    /// A state store could not be read or written
    #[error("State storage error: {0}")]
    Storage(String),

    /// JSON or YAML could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration or test input
    #[error("Configuration error: {0}")]
    Config(String),

    /// The pass finished with failing specs
    #[error("{failing_specs} failing spec(s), {failed_expectations} failed expectation(s)")]
    AggregateFailure {
        /// Specs with at least one failed expectation
        failing_specs: usize,
        /// Failed expectations across all specs
        failed_expectations: usize,
    },

    /// The process was asked to stop. State was checkpointed first.
    #[error("Interrupted by {signal}")]
    Interrupted {
        /// Signal name, e.g. `SIGTERM`
        signal: &'static str,
        /// Status the process exits with
        exit_code: i32,
    },
}

/// Result type used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}
