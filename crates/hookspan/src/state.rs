//! Request-scoped trace state.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hookspan_tracer::{Span, Tracer};

/// The spans one request currently owns.
#[derive(Debug, Default)]
pub(crate) struct RequestTrace {
    /// Top-level span for the whole request.
    pub(crate) root: Option<Span>,
    /// Span of the active lifecycle phase, replaced at each boundary.
    pub(crate) lifecycle: Option<Span>,
}

/// Per-request trace state, shared by the hooks and handlers of one request.
///
/// Hosts keep it in the request's extensions. Clones refer to the same
/// state. A state without a root span (tracing disabled for this request)
/// turns every lifecycle operation into a no-op.
#[derive(Clone)]
pub struct TraceState {
    tracer: Tracer,
    inner: Arc<Mutex<RequestTrace>>,
}

impl TraceState {
    /// State with no root span.
    pub fn untraced(tracer: Tracer) -> Self {
        Self {
            tracer,
            inner: Arc::new(Mutex::new(RequestTrace::default())),
        }
    }

    /// State rooted at `root`.
    pub fn with_root(tracer: Tracer, root: Span) -> Self {
        let state = Self::untraced(tracer);
        state.with_trace(|trace| trace.root = Some(root));
        state
    }

    /// The tracer spans for this request are created with.
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// The request's root span, unless it has been finished.
    pub fn root_span(&self) -> Option<Span> {
        self.with_trace(|trace| trace.root.clone())
    }

    /// The open lifecycle span, if any.
    pub fn lifecycle_span(&self) -> Option<Span> {
        self.with_trace(|trace| trace.lifecycle.clone())
    }

    /// Whether a root span is attached.
    pub fn is_traced(&self) -> bool {
        self.with_trace(|trace| trace.root.is_some())
    }

    pub(crate) fn with_trace<R>(&self, f: impl FnOnce(&mut RequestTrace) -> R) -> R {
        f(&mut lock(&self.inner))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl fmt::Debug for TraceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (root, lifecycle) =
            self.with_trace(|trace| (trace.root.clone(), trace.lifecycle.clone()));
        f.debug_struct("TraceState")
            .field("root", &root)
            .field("lifecycle", &lifecycle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookspan_tracer::{StartSpanOptions, TracerConfig};

    #[test]
    fn test_untraced_state() {
        let tracer = Tracer::initialize(TracerConfig::new("state-tests")).unwrap();
        let state = TraceState::untraced(tracer);
        assert!(!state.is_traced());
        assert!(state.root_span().is_none());
        assert!(state.lifecycle_span().is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let tracer = Tracer::initialize(TracerConfig::new("state-tests")).unwrap();
        let root = tracer.start_span("root", StartSpanOptions::default());
        let state = TraceState::with_root(tracer, root.clone());
        let other = state.clone();

        other.with_trace(|trace| trace.root = None);
        assert!(!state.is_traced());
        root.finish();
    }
}
