//! The ping server: a small axum app whose handlers run inside handler spans.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use hookspan::{ErrorReport, TraceState, TracingPlugin, decorate, decorate_named};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Configuration for the ping server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
    /// Whether to enable request logging (HTTP layer).
    pub enable_http_trace: bool,
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            enable_http_trace: true,
        }
    }
}

/// Response body of `/hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub hello: String,
}

impl Hello {
    fn world() -> Self {
        Self {
            hello: "world".to_string(),
        }
    }
}

/// Failures of the demo routes.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let report = ErrorReport::from_std_error(&self);
        let body = Json(serde_json::json!({
            "error": {
                "type": "unavailable",
                "message": self.to_string(),
            }
        }));
        (StatusCode::SERVICE_UNAVAILABLE, Extension(report), body).into_response()
    }
}

struct AppState {
    service_name: String,
}

/// The ping server.
pub struct PingServer {
    config: ServerConfig,
    plugin: Arc<TracingPlugin>,
}

impl PingServer {
    pub fn new(config: ServerConfig, plugin: Arc<TracingPlugin>) -> Self {
        Self { config, plugin }
    }

    pub fn plugin(&self) -> &Arc<TracingPlugin> {
        &self.plugin
    }

    /// Build the axum router, wrapped in the tracing layer.
    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            service_name: self.plugin.tracer().service_name().to_string(),
        });

        let mut router = Router::new()
            .route("/hello", get(handle_get_hello).post(handle_post_hello))
            .route("/unavailable", get(handle_unavailable))
            .route("/health", get(handle_health))
            .fallback(handle_not_found)
            .with_state(state)
            .layer(self.plugin.layer());

        if self.config.enable_http_trace {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Run until `shutdown` resolves, then close the tracer.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            service = %self.plugin.tracer().service_name(),
            "Starting ping server"
        );
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;
        self.plugin.shutdown().await;
        result
    }
}

async fn get_hello(_: ()) -> Result<Hello, Infallible> {
    Ok(Hello::world())
}

async fn post_hello(_: ()) -> Result<Hello, Infallible> {
    Ok(Hello::world())
}

async fn check_upstream(upstream: &'static str) -> Result<Hello, RouteError> {
    Err(RouteError::Unavailable(upstream.to_string()))
}

fn trace_of(request: &Request) -> Option<TraceState> {
    request.extensions().get::<TraceState>().cloned()
}

/// Handle GET /hello
async fn handle_get_hello(request: Request) -> Json<Hello> {
    let trace = trace_of(&request);
    match decorate(get_hello).call(trace.as_ref(), ()).await {
        Ok(hello) => Json(hello),
        Err(never) => match never {},
    }
}

/// Handle POST /hello
async fn handle_post_hello(request: Request) -> Json<Hello> {
    let trace = trace_of(&request);
    match decorate(post_hello).call(trace.as_ref(), ()).await {
        Ok(hello) => Json(hello),
        Err(never) => match never {},
    }
}

/// Handle GET /unavailable, a handler that always fails.
async fn handle_unavailable(request: Request) -> Result<Json<Hello>, RouteError> {
    let trace = trace_of(&request);
    let hello = decorate_named("check_upstream", check_upstream)
        .call(trace.as_ref(), "inventory")
        .await?;
    Ok(Json(hello))
}

/// Handle GET /health
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": state.service_name,
    }))
}

async fn handle_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": { "type": "not_found" } })),
    )
}
