//! hookspan-server: demo ping server with request lifecycle tracing
//!
//! Serves `GET /hello` and `POST /hello` through decorated handlers so every
//! request produces a root span, lifecycle phase spans and a handler span.

pub mod config;
pub mod server;
pub mod session;

pub use config::{Config, ConfigValidationError, HOOKSPAN_DIR};
pub use server::{Hello, PingServer, RouteError, ServerConfig};
pub use session::{SessionId, SessionMetadata};
