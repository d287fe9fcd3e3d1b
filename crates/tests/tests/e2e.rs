//! Cross-crate integration and E2E tests
//!
//! These tests start the ping server on a real socket and verify the span
//! trees produced for full HTTP request flows.

use std::sync::Arc;
use std::time::Duration;

use hookspan::tracer::{
    InMemoryReporter, ReporterConfig, SpanWriter, TracerConfig, TracerOptions, tags,
};
use hookspan::{PluginConfig, TracingPlugin};
use hookspan_server::{PingServer, ServerConfig};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Get an available port for testing.
fn get_test_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

struct RunningServer {
    port: u16,
    plugin: Arc<TracingPlugin>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl RunningServer {
    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Stop the server and wait for the tracer to close.
    async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap().unwrap();
    }
}

async fn start_server(plugin: TracingPlugin) -> RunningServer {
    let port = get_test_port();
    let plugin = Arc::new(plugin);
    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{}", port).parse().unwrap(),
        enable_http_trace: false,
    };
    let server = PingServer::new(config, Arc::clone(&plugin));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        server
            .run_with_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    RunningServer {
        port,
        plugin,
        shutdown: shutdown_tx,
        handle,
    }
}

async fn start_in_memory() -> (RunningServer, Arc<InMemoryReporter>) {
    let reporter = Arc::new(InMemoryReporter::new());
    let plugin =
        TracingPlugin::register_with_reporter(PluginConfig::new("ping-server"), reporter.clone())
            .unwrap();
    (start_server(plugin).await, reporter)
}

/// E2E Test: inbound trace context is continued by the request's span tree
#[tokio::test]
async fn test_e2e_get_hello_continues_inbound_trace() {
    let (server, reporter) = start_in_memory().await;

    let client = reqwest::Client::new();
    let response = client
        .get(server.url("/hello"))
        .header("uber-trace-id", "4bf92f3577b34da6a3ce929d0e0e4736:00f067aa0ba902b7:0:1")
        .header("uberctx-tenant", "acme")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"hello": "world"}));

    let root = reporter.find("GET - /hello").unwrap();
    assert_eq!(root.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
    assert_eq!(root.parent_span_id.as_deref(), Some("00f067aa0ba902b7"));
    assert_eq!(root.baggage.get("tenant").map(String::as_str), Some("acme"));
    assert_eq!(root.tag(tags::SPAN_KIND), Some(&json!("server")));
    assert_eq!(root.tag(tags::HTTP_METHOD), Some(&json!("GET")));
    assert_eq!(root.tag(tags::HTTP_URL), Some(&json!("/hello")));
    assert_eq!(root.tag(tags::HTTP_STATUS_CODE), Some(&json!(200)));

    let names: Vec<_> = reporter
        .spans()
        .into_iter()
        .map(|s| s.operation_name)
        .collect();
    assert_eq!(
        names,
        [
            "preParsing()",
            "preValidation()",
            "preHandler()",
            "get_hello()",
            "preSerialization()",
            "GET - /hello"
        ]
    );
    for span in reporter.spans().iter().filter(|s| s.span_id != root.span_id) {
        assert_eq!(span.trace_id, root.trace_id);
        assert_eq!(span.parent_span_id.as_ref(), Some(&root.span_id));
    }

    assert_eq!(server.plugin.tracer().stats().open(), 0);
    server.stop().await;
    assert!(reporter.is_closed());
}

/// E2E Test: requests without propagation headers start new traces
#[tokio::test]
async fn test_e2e_post_hello_starts_new_trace() {
    let (server, reporter) = start_in_memory().await;

    let response = reqwest::Client::new()
        .post(server.url("/hello"))
        .json(&json!({"ping": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let root = reporter.find("POST - /hello").unwrap();
    assert!(root.is_root());
    assert!(!root.is_error());
    let handler = reporter.find("post_hello()").unwrap();
    assert_eq!(
        handler.tag(tags::RESPONSE_BODY),
        Some(&json!(r#"{"hello":"world"}"#))
    );

    server.stop().await;
}

/// E2E Test: a failing handler tags both its span and the root
#[tokio::test]
async fn test_e2e_failing_handler() {
    let (server, reporter) = start_in_memory().await;

    let response = reqwest::get(server.url("/unavailable")).await.unwrap();
    assert_eq!(response.status(), 503);

    let handler = reporter.find("check_upstream()").unwrap();
    assert!(handler.is_error());
    let root = reporter.find("GET - /unavailable").unwrap();
    assert!(root.is_error());
    assert_eq!(
        root.tag(tags::ERROR_MESSAGE),
        Some(&json!("upstream unavailable: inventory"))
    );
    assert!(reporter.find("preHandler()").is_some());
    assert!(reporter.find("preSerialization()").is_none());
    assert_eq!(server.plugin.tracer().stats().open(), 0);

    server.stop().await;
}

/// E2E Test: concurrent requests keep separate span trees
#[tokio::test]
async fn test_e2e_concurrent_requests() {
    let (server, reporter) = start_in_memory().await;
    let client = reqwest::Client::new();

    let requests = (0..8).map(|_| {
        let client = client.clone();
        let url = server.url("/hello");
        tokio::spawn(async move { client.get(url).send().await.unwrap().status() })
    });
    for request in requests.collect::<Vec<_>>() {
        assert_eq!(request.await.unwrap(), 200);
    }

    let roots: Vec<_> = reporter
        .spans()
        .into_iter()
        .filter(|s| s.operation_name == "GET - /hello")
        .collect();
    assert_eq!(roots.len(), 8);
    let mut trace_ids: Vec<_> = roots.iter().map(|s| s.trace_id.as_str()).collect();
    trace_ids.sort_unstable();
    trace_ids.dedup();
    assert_eq!(trace_ids.len(), 8);

    let stats = server.plugin.tracer().stats();
    assert_eq!(stats.started, stats.finished);
    server.stop().await;
}

/// E2E Test: spans reach the JSONL file once the server shuts down
#[tokio::test]
async fn test_e2e_spans_written_to_file_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let span_file = dir.path().join("spans.jsonl");
    let config = PluginConfig {
        tracer: TracerConfig::new("ping-server").with_reporter(ReporterConfig {
            trace_path: Some(span_file.clone()),
            session_mode: true,
            flush_interval_ms: 60_000,
            ..Default::default()
        }),
        ..Default::default()
    }
    .with_tag("service-version", "2.0.0");
    let plugin = TracingPlugin::register_with(config, TracerOptions::default()).unwrap();
    let server = start_server(plugin).await;

    let response = reqwest::get(server.url("/hello")).await.unwrap();
    assert_eq!(response.status(), 200);
    server.stop().await;

    let spans = SpanWriter::read_spans(&span_file).unwrap();
    assert_eq!(spans.len(), 6);
    let root = spans
        .iter()
        .find(|s| s.operation_name == "GET - /hello")
        .unwrap();
    assert_eq!(root.process.service_name, "ping-server");
    assert_eq!(root.process.tags["service-version"], json!("2.0.0"));
}
