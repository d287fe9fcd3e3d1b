//! Error types for request instrumentation.

use std::fmt;

use axum::http::StatusCode;
use hookspan_tracer::{Span, TracerError, tags};
use thiserror::Error;

/// Result type alias for instrumentation setup.
pub type Result<T> = std::result::Result<T, HookspanError>;

/// Errors that can stop instrumentation from being set up.
///
/// Only startup can fail. Per-request instrumentation never returns errors.
#[derive(Debug, Error)]
pub enum HookspanError {
    /// The tracer could not be initialized.
    #[error("Tracer error: {0}")]
    Tracer(#[from] TracerError),
}

/// Error details recorded on a span.
///
/// Handlers can insert one into their response extensions so the error hook
/// records the real failure instead of the status text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Human-readable message. Never empty.
    pub message: String,
    /// Longer diagnostic text (debug output or cause chain).
    pub stack: Option<String>,
}

impl ErrorReport {
    /// Report with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            message: if message.trim().is_empty() {
                "unknown error".to_string()
            } else {
                message
            },
            stack: None,
        }
    }

    /// Attach diagnostic text.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Report from any error-like value: `Display` for the message, `Debug`
    /// for the stack.
    pub fn from_error<E: fmt::Display + fmt::Debug + ?Sized>(error: &E) -> Self {
        Self::new(error.to_string()).with_stack(format!("{:?}", error))
    }

    /// Report from a standard error, with its cause chain as the stack.
    pub fn from_std_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut stack = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push_str("\nCaused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new(error.to_string()).with_stack(stack)
    }

    /// Report for an error response that carried no details.
    pub fn from_status(status: StatusCode) -> Self {
        Self::new(
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string()),
        )
    }

    /// Tag a span with `error`, `error.message` and `error.stack`.
    pub fn record_on(&self, span: &Span) {
        span.set_tag(tags::ERROR, true);
        span.set_tag(tags::ERROR_MESSAGE, self.message.clone());
        if let Some(stack) = &self.stack {
            span.set_tag(tags::ERROR_STACK, stack.clone());
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("outer failure")]
    struct Outer {
        #[source]
        inner: std::io::Error,
    }

    #[test]
    fn test_empty_message_is_replaced() {
        assert_eq!(ErrorReport::new("  ").message, "unknown error");
    }

    #[test]
    fn test_from_std_error_walks_causes() {
        let err = Outer {
            inner: std::io::Error::other("disk on fire"),
        };
        let report = ErrorReport::from_std_error(&err);
        assert_eq!(report.message, "outer failure");
        assert_eq!(
            report.stack.as_deref(),
            Some("outer failure\nCaused by: disk on fire")
        );
    }

    #[test]
    fn test_from_error_uses_debug_for_stack() {
        let report = ErrorReport::from_error("plain");
        assert_eq!(report.message, "plain");
        assert_eq!(report.stack.as_deref(), Some("\"plain\""));
    }

    #[test]
    fn test_from_status() {
        let report = ErrorReport::from_status(StatusCode::BAD_GATEWAY);
        assert_eq!(report.message, "Bad Gateway");
        assert!(report.stack.is_none());
    }

    #[test]
    fn test_tracer_error_conversion() {
        let err: HookspanError = TracerError::Configuration("service name is required".into()).into();
        assert_eq!(
            err.to_string(),
            "Tracer error: Configuration error: service name is required"
        );
    }
}
