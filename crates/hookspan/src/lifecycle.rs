//! Lifecycle phase spans.
//!
//! A request owns at most one open lifecycle span at a time. Entering a phase
//! finishes the previous phase span and starts a new child of the root; the
//! request's end finishes whatever is still open, lifecycle first.

use std::fmt;

use hookspan_tracer::{StartSpanOptions, tags};

use crate::error::ErrorReport;
use crate::state::TraceState;

/// Request lifecycle phases that get their own span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    PreParsing,
    PreValidation,
    PreHandler,
    PreSerialization,
}

impl Phase {
    /// Phases in the order a request passes through them.
    pub const ALL: [Phase; 4] = [
        Phase::PreParsing,
        Phase::PreValidation,
        Phase::PreHandler,
        Phase::PreSerialization,
    ];

    /// Phases that run before the handler.
    pub const BEFORE_HANDLER: [Phase; 3] =
        [Phase::PreParsing, Phase::PreValidation, Phase::PreHandler];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::PreParsing => "preParsing",
            Phase::PreValidation => "preValidation",
            Phase::PreHandler => "preHandler",
            Phase::PreSerialization => "preSerialization",
        }
    }

    /// Span operation name, `"<phase>()"`.
    pub fn span_name(&self) -> String {
        format!("{}()", self.name())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Finish the open lifecycle span and start one for `phase`.
///
/// Spans are finished outside the state lock. Returns false when the request
/// is untraced or already finished.
pub fn enter_phase(state: &TraceState, phase: Phase) -> bool {
    let Some(previous) =
        state.with_trace(|trace| trace.root.is_some().then(|| trace.lifecycle.take()))
    else {
        return false;
    };
    if let Some(span) = previous {
        span.finish();
    }

    let tracer = state.tracer().clone();
    let (entered, displaced) = state.with_trace(|trace| match &trace.root {
        Some(root) => {
            let span = tracer.start_span(
                phase.span_name(),
                StartSpanOptions::default().child_of(root.context().clone()),
            );
            (true, trace.lifecycle.replace(span))
        }
        None => (false, None),
    });
    // Another caller entered a phase between the two locks
    if let Some(span) = displaced {
        span.finish();
    }
    entered
}

/// Finish the open lifecycle span, if any.
pub fn finish_lifecycle(state: &TraceState) -> bool {
    match state.with_trace(|trace| trace.lifecycle.take()) {
        Some(span) => span.finish(),
        None => false,
    }
}

/// Tag the root span with an error.
pub fn record_error(state: &TraceState, error: &ErrorReport) {
    if let Some(root) = state.root_span() {
        error.record_on(&root);
    }
}

/// Finish the request: the lifecycle span first, then the root.
///
/// `status` is recorded on the root when known. Only the first call has any
/// effect; the root is detached from the state as it finishes.
pub fn finish_request(state: &TraceState, status: Option<u16>) -> bool {
    let (lifecycle, root) = state.with_trace(|trace| (trace.lifecycle.take(), trace.root.take()));
    if let Some(span) = lifecycle {
        span.finish();
    }
    let Some(root) = root else {
        return false;
    };
    if let Some(status) = status {
        root.set_tag(tags::HTTP_STATUS_CODE, status);
    }
    root.finish()
}

/// Finish a request that ended without a response, e.g. a dropped connection.
pub fn close_request(state: &TraceState) -> bool {
    let finished = finish_request(state, None);
    if finished {
        tracing::debug!("Request closed before a response was sent");
    }
    finished
}
