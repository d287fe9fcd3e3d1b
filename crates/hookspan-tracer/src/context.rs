//! Span identity: the tracing client's span context plus the baggage we carry.

use std::collections::BTreeMap;

use opentelemetry::trace::SpanContext as OtelSpanContext;
pub use opentelemetry::trace::{SpanId, TraceId};

/// The propagated identity of a span.
///
/// This is what crosses process boundaries in headers and what a child span
/// needs from its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanContext {
    inner: OtelSpanContext,
    parent_id: Option<SpanId>,
    baggage: BTreeMap<String, String>,
}

impl SpanContext {
    pub(crate) fn new(
        inner: OtelSpanContext,
        parent_id: Option<SpanId>,
        baggage: BTreeMap<String, String>,
    ) -> Self {
        Self {
            inner,
            parent_id,
            baggage,
        }
    }

    /// Trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.inner.trace_id()
    }

    /// This span's ID.
    pub fn span_id(&self) -> SpanId {
        self.inner.span_id()
    }

    /// The parent span's ID, `None` for a trace root or an extracted context.
    pub fn parent_id(&self) -> Option<SpanId> {
        self.parent_id
    }

    /// Whether spans of this trace get reported.
    pub fn is_sampled(&self) -> bool {
        self.inner.is_sampled()
    }

    /// Whether this context was extracted from another process.
    pub fn is_remote(&self) -> bool {
        self.inner.is_remote()
    }

    /// Baggage items carried to every descendant.
    pub fn baggage(&self) -> &BTreeMap<String, String> {
        &self.baggage
    }

    /// Look up a baggage item.
    pub fn baggage_item(&self, key: &str) -> Option<&str> {
        self.baggage.get(key).map(String::as_str)
    }

    /// The underlying OpenTelemetry span context.
    pub fn as_otel(&self) -> &OtelSpanContext {
        &self.inner
    }
}
