//! Handler spans.
//!
//! Wrap a route handler so its execution gets a child span of the request's
//! root. When the handler starts, the open lifecycle span is finished. When it
//! completes, the span records the serialized output or the error. Requests
//! without a root span run the handler untouched.
//!
//! ```rust,ignore
//! async fn get_hello(_: ()) -> Result<Hello, Infallible> { ... }
//!
//! let hello = decorate(get_hello);
//! let output = hello.call(Some(&trace_state), ()).await;
//! ```

use std::borrow::Cow;
use std::fmt;

use hookspan_tracer::{Span, StartSpanOptions, tags};
use serde::Serialize;

use crate::error::ErrorReport;
use crate::lifecycle;
use crate::state::TraceState;

/// Best-effort name of a function type: its last path segment.
///
/// Closures report the name of the function that defines them.
pub fn handler_name<H: ?Sized>() -> &'static str {
    let full = std::any::type_name::<H>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::")
        .find(|segment| !segment.is_empty() && !segment.starts_with('{'))
        .unwrap_or(base)
}

/// Names and opens handler spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSpan {
    name: Cow<'static, str>,
}

impl HandlerSpan {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self { name: name.into() }
    }

    /// Span named after the handler's function.
    pub fn for_handler<H>(_handler: &H) -> Self {
        Self::new(handler_name::<H>())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Span operation name, `"<name>()"`.
    pub fn span_name(&self) -> String {
        format!("{}()", self.name)
    }

    /// Run a handler future inside this span.
    ///
    /// The handler's result is returned unchanged. If the future is dropped
    /// before completing, the span is finished and tagged `cancelled`.
    pub async fn run<F, T, E>(&self, trace: Option<&TraceState>, handler: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        T: Serialize,
        E: fmt::Display + fmt::Debug,
    {
        let Some(guard) = trace.and_then(|state| self.open(state)) else {
            return handler.await;
        };

        let result = handler.await;
        match &result {
            Ok(output) => guard.succeed(output),
            Err(error) => guard.fail(&ErrorReport::from_error(error)),
        }
        result
    }

    fn open(&self, state: &TraceState) -> Option<HandlerGuard> {
        let root = state.root_span()?;
        lifecycle::finish_lifecycle(state);
        let span = state.tracer().start_span(
            self.span_name(),
            StartSpanOptions::default().child_of(root.context().clone()),
        );
        Some(HandlerGuard { span })
    }
}

/// Finishes the handler span exactly once, even if the handler never
/// completes.
struct HandlerGuard {
    span: Span,
}

impl HandlerGuard {
    fn succeed<T: Serialize>(&self, output: &T) {
        let body = serde_json::to_string(output).unwrap_or_else(|e| {
            tracing::warn!(
                operation = %self.span.operation_name(),
                error = %e,
                "Handler output is not serializable"
            );
            format!("<unserializable: {}>", e)
        });
        self.span.set_tag(tags::RESPONSE_BODY, body);
        self.span.finish();
    }

    fn fail(&self, error: &ErrorReport) {
        error.record_on(&self.span);
        self.span.finish();
    }
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        if !self.span.is_finished() {
            self.span.set_tag(tags::CANCELLED, true);
            self.span.finish();
        }
    }
}

/// A handler wrapped with a [`HandlerSpan`].
#[derive(Debug, Clone)]
pub struct Decorated<H> {
    handler: H,
    span: HandlerSpan,
}

/// Wrap a handler, naming its span after the handler function.
pub fn decorate<H>(handler: H) -> Decorated<H> {
    let span = HandlerSpan::for_handler(&handler);
    Decorated { handler, span }
}

/// Wrap a handler with an explicit span name.
pub fn decorate_named<H>(name: impl Into<Cow<'static, str>>, handler: H) -> Decorated<H> {
    Decorated {
        handler,
        span: HandlerSpan::new(name),
    }
}

impl<H> Decorated<H> {
    pub fn span(&self) -> &HandlerSpan {
        &self.span
    }

    /// Invoke the handler with `args` inside its span.
    pub async fn call<A, Fut, T, E>(&self, trace: Option<&TraceState>, args: A) -> Result<T, E>
    where
        H: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize,
        E: fmt::Display + fmt::Debug,
    {
        self.span.run(trace, (self.handler)(args)).await
    }
}
