//! Hook bindings and the tracing plugin.

use std::fmt;
use std::sync::Arc;

use hookspan_tracer::{SharedReporter, Tracer, TracerOptions};

use crate::config::PluginConfig;
use crate::error::{ErrorReport, Result};
use crate::layer::TracingLayer;
use crate::lifecycle::{self, Phase};
use crate::propagator::{ContextPropagator, RequestHead};
use crate::state::TraceState;

/// Host extension points the plugin binds to, in invocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    OnRequest,
    PreParsing,
    PreValidation,
    PreHandler,
    PreSerialization,
    OnError,
    OnResponse,
    OnClose,
}

impl HookPoint {
    pub const ORDER: [HookPoint; 8] = [
        HookPoint::OnRequest,
        HookPoint::PreParsing,
        HookPoint::PreValidation,
        HookPoint::PreHandler,
        HookPoint::PreSerialization,
        HookPoint::OnError,
        HookPoint::OnResponse,
        HookPoint::OnClose,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HookPoint::OnRequest => "onRequest",
            HookPoint::PreParsing => Phase::PreParsing.name(),
            HookPoint::PreValidation => Phase::PreValidation.name(),
            HookPoint::PreHandler => Phase::PreHandler.name(),
            HookPoint::PreSerialization => Phase::PreSerialization.name(),
            HookPoint::OnError => "onError",
            HookPoint::OnResponse => "onResponse",
            HookPoint::OnClose => "onClose",
        }
    }

    /// The lifecycle phase this hook opens a span for.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            HookPoint::PreParsing => Some(Phase::PreParsing),
            HookPoint::PreValidation => Some(Phase::PreValidation),
            HookPoint::PreHandler => Some(Phase::PreHandler),
            HookPoint::PreSerialization => Some(Phase::PreSerialization),
            _ => None,
        }
    }
}

impl From<Phase> for HookPoint {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::PreParsing => HookPoint::PreParsing,
            Phase::PreValidation => HookPoint::PreValidation,
            Phase::PreHandler => HookPoint::PreHandler,
            Phase::PreSerialization => HookPoint::PreSerialization,
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Callbacks a host invokes as a request moves through its lifecycle.
///
/// Every callback must return without failing the request.
pub trait LifecycleHooks: Send + Sync {
    /// A request arrived. Returns the state later hooks receive.
    fn on_request(&self, request: &RequestHead<'_>) -> TraceState;

    /// A lifecycle phase is starting.
    fn on_phase(&self, state: &TraceState, phase: Phase);

    /// The request failed.
    fn on_error(&self, state: &TraceState, error: &ErrorReport);

    /// The response was sent. `status` is `None` when the service itself
    /// failed before producing one.
    fn on_response(&self, state: &TraceState, status: Option<u16>);

    /// The request ended without a response.
    fn on_close(&self, state: &TraceState);
}

/// Traces every request with a root span, lifecycle spans and error tags.
#[derive(Debug, Clone)]
pub struct TracingPlugin {
    propagator: ContextPropagator,
}

impl TracingPlugin {
    /// Initialize the tracer from configuration.
    ///
    /// Fails only when the configuration is invalid.
    pub fn register(config: PluginConfig) -> Result<Self> {
        Self::register_with(config, TracerOptions::default())
    }

    /// Like [`register`](Self::register) with extra tracer options.
    /// Static tags from `config.options` are merged into `options`.
    pub fn register_with(config: PluginConfig, options: TracerOptions) -> Result<Self> {
        let state = config.static_carrier();
        let options = options.with_tags(config.options.tags);
        let tracer = Tracer::initialize_with(config.tracer, options)?;
        tracing::info!(
            service = %tracer.service_name(),
            static_entries = state.len(),
            "Registered tracing plugin"
        );
        Ok(Self::from_tracer(tracer, state))
    }

    /// Convenience for tests and embedders that collect spans themselves.
    pub fn register_with_reporter(config: PluginConfig, reporter: SharedReporter) -> Result<Self> {
        Self::register_with(config, TracerOptions::default().with_reporter(reporter))
    }

    /// Plugin around an existing tracer.
    pub fn from_tracer(tracer: Tracer, state: hookspan_tracer::Carrier) -> Self {
        Self {
            propagator: ContextPropagator::new(tracer, state),
        }
    }

    pub fn tracer(&self) -> &Tracer {
        self.propagator.tracer()
    }

    /// Tower layer that drives this plugin's hooks.
    pub fn layer(self: &Arc<Self>) -> TracingLayer {
        TracingLayer::new(Arc::clone(self))
    }

    /// Flush and close the tracer. Await once at server shutdown.
    pub async fn shutdown(&self) {
        self.tracer().close().await;
    }
}

impl LifecycleHooks for TracingPlugin {
    fn on_request(&self, request: &RequestHead<'_>) -> TraceState {
        tracing::trace!(hook = %HookPoint::OnRequest, method = %request.method, url = request.url());
        self.propagator.on_request(request)
    }

    fn on_phase(&self, state: &TraceState, phase: Phase) {
        if !lifecycle::enter_phase(state, phase) {
            tracing::trace!(hook = %HookPoint::from(phase), "Request is not traced");
        }
    }

    fn on_error(&self, state: &TraceState, error: &ErrorReport) {
        tracing::debug!(hook = %HookPoint::OnError, error = %error, "Recording request error");
        lifecycle::record_error(state, error);
    }

    fn on_response(&self, state: &TraceState, status: Option<u16>) {
        tracing::trace!(hook = %HookPoint::OnResponse, status = ?status);
        lifecycle::finish_request(state, status);
    }

    fn on_close(&self, state: &TraceState) {
        tracing::trace!(hook = %HookPoint::OnClose);
        lifecycle::close_request(state);
    }
}
