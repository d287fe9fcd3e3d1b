//! Error types for the tracer adapter.

use thiserror::Error;

/// Result type alias for tracer operations.
pub type Result<T> = std::result::Result<T, TracerError>;

/// Errors raised while setting up a tracer.
///
/// Once a tracer is running nothing it does returns an error: reporting
/// failures are logged and swallowed so request processing never sees them.
#[derive(Debug, Error)]
pub enum TracerError {
    /// The configuration is unusable (missing service name, bad sampler).
    #[error("Configuration error: {0}")]
    Configuration(String),
}
