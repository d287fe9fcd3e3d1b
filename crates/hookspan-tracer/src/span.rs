//! Live span handles.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use opentelemetry::trace::Span as _;
use opentelemetry_sdk::trace::Span as SdkSpan;

use crate::context::SpanContext;
use crate::lock;
use crate::tags::{self, Tags};
use crate::tracer::SpanCounters;

/// Options for [`Tracer::start_span`](crate::Tracer::start_span).
#[derive(Debug, Clone, Default)]
pub struct StartSpanOptions {
    /// Parent context; `None` starts a new trace.
    pub child_of: Option<SpanContext>,
    /// Initial tags.
    pub tags: Tags,
    /// Extra baggage merged over the parent's.
    pub baggage: BTreeMap<String, String>,
}

impl StartSpanOptions {
    /// Start the span as a child of `parent`.
    pub fn child_of(mut self, parent: SpanContext) -> Self {
        self.child_of = Some(parent);
        self
    }

    /// Add an initial tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add baggage items.
    pub fn with_baggage(mut self, baggage: BTreeMap<String, String>) -> Self {
        self.baggage.extend(baggage);
        self
    }
}

/// A started span.
///
/// Cloning yields another handle to the same span. `finish` may be called from
/// any handle; only the first call ends the underlying SDK span, later calls
/// are no-ops.
#[derive(Clone)]
pub struct Span {
    inner: Arc<SpanInner>,
}

struct SpanInner {
    context: SpanContext,
    operation_name: String,
    tags: Mutex<Tags>,
    sdk: Mutex<SdkSpan>,
    finished: AtomicBool,
    counters: Arc<SpanCounters>,
}

impl Span {
    pub(crate) fn new(
        sdk: SdkSpan,
        context: SpanContext,
        operation_name: String,
        tags: Tags,
        counters: Arc<SpanCounters>,
    ) -> Self {
        counters.on_start();
        Self {
            inner: Arc::new(SpanInner {
                context,
                operation_name,
                tags: Mutex::new(tags),
                sdk: Mutex::new(sdk),
                finished: AtomicBool::new(false),
                counters,
            }),
        }
    }

    /// The span's propagated identity.
    pub fn context(&self) -> &SpanContext {
        &self.inner.context
    }

    /// The span's name.
    pub fn operation_name(&self) -> &str {
        &self.inner.operation_name
    }

    /// Set a tag. Ignored once the span is finished.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> &Self {
        let mut tags = lock(&self.inner.tags);
        if !self.is_finished() {
            let (key, value) = (key.into(), value.into());
            lock(&self.inner.sdk).set_attribute(tags::to_attribute(&key, &value));
            tags.insert(key, value);
        }
        self
    }

    /// Read back a tag set so far.
    pub fn tag(&self, key: &str) -> Option<serde_json::Value> {
        lock(&self.inner.tags).get(key).cloned()
    }

    /// Whether `finish` has been called.
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// End the span; sampled spans are exported to the reporter.
    ///
    /// Returns `false` if the span was already finished.
    pub fn finish(&self) -> bool {
        {
            let _tags = lock(&self.inner.tags);
            if self.inner.finished.swap(true, Ordering::AcqRel) {
                tracing::debug!(
                    operation = %self.inner.operation_name,
                    span_id = %self.inner.context.span_id(),
                    "Span already finished"
                );
                return false;
            }
        }

        lock(&self.inner.sdk).end();
        self.inner.counters.on_finish();
        true
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("operation_name", &self.inner.operation_name)
            .field("trace_id", &self.inner.context.trace_id())
            .field("span_id", &self.inner.context.span_id())
            .field("parent_id", &self.inner.context.parent_id())
            .field("finished", &self.is_finished())
            .finish()
    }
}
