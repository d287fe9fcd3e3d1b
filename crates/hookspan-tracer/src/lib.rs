//! Span tracer adapter.
//!
//! This crate is the single tracing client a process uses, built on the
//! OpenTelemetry SDK:
//!
//! - **Tracer**: `initialize` from configuration, `start_span`, `extract`/`inject`, `close`
//! - **Span**: clonable handles with tags and an idempotent `finish`
//! - **Propagation**: `uber-trace-id` / `uberctx-*` HTTP headers via the Jaeger propagator
//! - **Sampler**: `const` and `probabilistic` policies mapped to SDK samplers
//! - **Reporters**: logging, in-memory, and buffered JSONL files, fed by a span exporter
//!
//! # Usage
//!
//! ```rust,no_run
//! use hookspan_tracer::{StartSpanOptions, Tracer, TracerConfig, tags};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tracer = Tracer::initialize(TracerConfig::new("ping-server")).unwrap();
//!
//!     let root = tracer.start_span(
//!         "GET - /hello",
//!         StartSpanOptions::default().with_tag(tags::HTTP_METHOD, "GET"),
//!     );
//!     let child = tracer.start_span(
//!         "preHandler()",
//!         StartSpanOptions::default().child_of(root.context().clone()),
//!     );
//!     child.finish();
//!     root.finish();
//!
//!     tracer.close().await;
//! }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod context;
pub mod error;
mod exporter;
pub mod propagation;
pub mod reporter;
pub mod sampler;
pub mod span;
pub mod tags;
pub mod tracer;
pub mod types;
pub mod writer;

pub use context::{SpanContext, SpanId, TraceId};
pub use error::{Result, TracerError};
pub use propagation::{BAGGAGE_PREFIX, Carrier, TRACE_HEADER};
pub use reporter::{
    CompositeReporter, FileReporter, InMemoryReporter, LoggingReporter, NoopReporter, Reporter,
    ReporterConfig, SharedReporter,
};
pub use sampler::SamplerConfig;
pub use span::{Span, StartSpanOptions};
pub use tags::Tags;
pub use tracer::{SpanStats, Tracer, TracerConfig, TracerOptions};
pub use types::{FinishedSpan, Process};
pub use writer::{SpanWriter, WriteError, WriterConfig};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
///
/// Tracing must keep working after an unrelated panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
