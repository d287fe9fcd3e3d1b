//! hookspan: request lifecycle spans for HTTP servers
//!
//! This crate turns each inbound request into a span tree:
//! - Root span per request, continuing an inbound `uber-trace-id` when present
//! - One lifecycle span per phase (`preParsing()`, `preValidation()`, ...),
//!   at most one open at a time
//! - Handler spans via [`decorate`], recording the response body or error
//! - Error tags on the root span, status code and finish on response
//! - A Tower [`TracingLayer`] that drives the hooks for axum/hyper services
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use axum::{Router, routing::get};
//! use hookspan::{PluginConfig, TracingPlugin};
//!
//! # async fn run() -> hookspan::Result<()> {
//! let plugin = Arc::new(TracingPlugin::register(PluginConfig::new("ping-server"))?);
//! let app: Router = Router::new()
//!     .route("/health", get(|| async { "ok" }))
//!     .layer(plugin.layer());
//! // ... serve `app` ...
//! plugin.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decorator;
pub mod error;
pub mod hooks;
pub mod layer;
pub mod lifecycle;
pub mod propagator;
pub mod state;

pub use config::{PluginConfig, PluginOptions};
pub use decorator::{Decorated, HandlerSpan, decorate, decorate_named, handler_name};
pub use error::{ErrorReport, HookspanError, Result};
pub use hooks::{HookPoint, LifecycleHooks, TracingPlugin};
pub use layer::{TracedFuture, TracingLayer, TracingService};
pub use lifecycle::Phase;
pub use propagator::{ContextPropagator, RequestHead};
pub use state::TraceState;

pub use hookspan_tracer as tracer;
