//! Tower middleware that drives [`LifecycleHooks`] for every request.
//!
//! The layer calls `on_request` and the pre-handler phases before the inner
//! service runs and stores the returned [`TraceState`] in the request's
//! extensions, where handlers pick it up. When the response is ready it runs
//! `preSerialization` (or `on_error` for failures) and `on_response`. If the
//! response future is dropped first, `on_close` runs instead.
//!
//! Axum parses and validates inside the handler's extractors, after this
//! layer hands the request on. The pre-handler phase spans are therefore
//! entered back to back in `call`: they record phase order, not the time
//! spent parsing or validating. Handlers wrapped with
//! [`decorate`](crate::decorate) get a span covering their own execution.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use axum::http::{Request, Response};
use pin_project_lite::pin_project;
use tower::{Layer, Service};

use crate::error::ErrorReport;
use crate::hooks::LifecycleHooks;
use crate::lifecycle::Phase;
use crate::propagator::RequestHead;
use crate::state::TraceState;

/// Layer that wraps services with [`TracingService`].
#[derive(Clone)]
pub struct TracingLayer {
    hooks: Arc<dyn LifecycleHooks>,
}

impl TracingLayer {
    pub fn new<H: LifecycleHooks + 'static>(hooks: Arc<H>) -> Self {
        Self { hooks }
    }
}

impl fmt::Debug for TracingLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingLayer").finish_non_exhaustive()
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService {
            inner,
            hooks: Arc::clone(&self.hooks),
        }
    }
}

/// Service produced by [`TracingLayer`].
#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
    hooks: Arc<dyn LifecycleHooks>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TracingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: fmt::Display + fmt::Debug,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = TracedFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    /// Start the request trace and mark the pre-handler phases.
    ///
    /// The phase spans open and close here, before the inner service runs.
    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let state = self
            .hooks
            .on_request(&RequestHead::new(req.method(), req.uri(), req.headers()));
        for phase in Phase::BEFORE_HANDLER {
            self.hooks.on_phase(&state, phase);
        }
        req.extensions_mut().insert(state.clone());

        TracedFuture {
            inner: self.inner.call(req),
            guard: CloseGuard {
                hooks: Arc::clone(&self.hooks),
                state: Some(state),
            },
        }
    }
}

pin_project! {
    /// Response future of [`TracingService`].
    pub struct TracedFuture<F> {
        #[pin]
        inner: F,
        guard: CloseGuard,
    }
}

impl<F, ResBody, E> Future for TracedFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    E: fmt::Display + fmt::Debug,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));

        if let Some(state) = this.guard.state.take() {
            let hooks = &this.guard.hooks;
            match &result {
                Ok(response) => {
                    match failure(response) {
                        Some(report) => hooks.on_error(&state, &report),
                        None => hooks.on_phase(&state, Phase::PreSerialization),
                    }
                    hooks.on_response(&state, Some(response.status().as_u16()));
                }
                Err(e) => {
                    hooks.on_error(&state, &ErrorReport::from_error(e));
                    hooks.on_response(&state, None);
                }
            }
        }

        Poll::Ready(result)
    }
}

/// The error a response represents, if any: an attached [`ErrorReport`], or
/// the status text of a 5xx.
fn failure<B>(response: &Response<B>) -> Option<ErrorReport> {
    if let Some(report) = response.extensions().get::<ErrorReport>() {
        return Some(report.clone());
    }
    let status = response.status();
    status
        .is_server_error()
        .then(|| ErrorReport::from_status(status))
}

/// Runs `on_close` unless the response completed.
struct CloseGuard {
    hooks: Arc<dyn LifecycleHooks>,
    state: Option<TraceState>,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.hooks.on_close(&state);
        }
    }
}
