//! Inbound context extraction and root span creation.

use axum::http::{HeaderMap, Method, Uri};
use hookspan_tracer::{Carrier, StartSpanOptions, Tracer, propagation, tags};

use crate::state::TraceState;

/// The parts of an inbound request the tracing hooks look at.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
}

impl<'a> RequestHead<'a> {
    pub fn new(method: &'a Method, uri: &'a Uri, headers: &'a HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    /// Root span name, `"<METHOD> - <url>"`.
    pub fn operation_name(&self) -> String {
        format!("{} - {}", self.method, self.url())
    }

    /// Path and query of the request.
    pub fn url(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.uri.path())
    }
}

/// Collect request headers into a carrier.
///
/// Names are lowercase. Values that are not valid text are skipped and only
/// the first value of a repeated header is kept.
pub fn header_carrier(headers: &HeaderMap) -> Carrier {
    let mut carrier = Carrier::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        carrier
            .entry(name.as_str().to_string())
            .or_insert_with(|| value.to_string());
    }
    carrier
}

/// Merge inbound headers with static state.
///
/// Inbound entries win; static entries only fill keys the request did not
/// send.
pub fn merge_carrier(inbound: Carrier, fallback: &Carrier) -> Carrier {
    let mut merged = inbound;
    for (key, value) in fallback {
        merged
            .entry(key.to_ascii_lowercase())
            .or_insert_with(|| value.clone());
    }
    merged
}

/// Starts one root span per inbound request.
#[derive(Debug, Clone)]
pub struct ContextPropagator {
    tracer: Tracer,
    state: Carrier,
}

impl ContextPropagator {
    /// Propagator using `state` as fallback propagation entries.
    pub fn new(tracer: Tracer, state: Carrier) -> Self {
        Self { tracer, state }
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Start the root span for a request and wrap it in fresh state.
    ///
    /// A missing or malformed trace header starts a new trace; this never
    /// fails the request.
    pub fn on_request(&self, request: &RequestHead<'_>) -> TraceState {
        let carrier = merge_carrier(header_carrier(request.headers), &self.state);
        let parent = self.tracer.extract(&carrier);

        let mut options = StartSpanOptions::default()
            .with_tag(tags::SPAN_KIND, tags::SPAN_KIND_RPC_SERVER)
            .with_tag(tags::HTTP_METHOD, request.method.as_str())
            .with_tag(tags::HTTP_URL, request.url());
        options = match parent {
            Some(parent) => options.child_of(parent),
            None => options.with_baggage(propagation::extract_baggage(&carrier)),
        };

        let root = self.tracer.start_span(request.operation_name(), options);
        tracing::trace!(
            trace_id = %root.context().trace_id(),
            span_id = %root.context().span_id(),
            operation = %root.operation_name(),
            "Started request span"
        );
        TraceState::with_root(self.tracer.clone(), root)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use axum::http::HeaderValue;
    use hookspan_tracer::{InMemoryReporter, SpanId, TraceId, TracerConfig, TracerOptions};
    use serde_json::json;

    fn tracer() -> (Tracer, Arc<InMemoryReporter>) {
        let reporter = Arc::new(InMemoryReporter::new());
        let tracer = Tracer::initialize_with(
            TracerConfig::new("propagator-tests"),
            TracerOptions::default().with_reporter(reporter.clone()),
        )
        .unwrap();
        (tracer, reporter)
    }

    fn head<'a>(method: &'a Method, uri: &'a Uri, headers: &'a HeaderMap) -> RequestHead<'a> {
        RequestHead::new(method, uri, headers)
    }

    #[test]
    fn test_merge_prefers_inbound() {
        let inbound = Carrier::from([("uberctx-tenant".to_string(), "from-header".to_string())]);
        let fallback = Carrier::from([
            ("uberctx-tenant".to_string(), "from-state".to_string()),
            ("Uberctx-Region".to_string(), "eu".to_string()),
        ]);
        let merged = merge_carrier(inbound, &fallback);
        assert_eq!(merged["uberctx-tenant"], "from-header");
        assert_eq!(merged["uberctx-region"], "eu");
    }

    #[test]
    fn test_header_carrier_skips_non_text() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ok", HeaderValue::from_static("yes"));
        headers.insert("x-bin", HeaderValue::from_bytes(b"\xff\xfe").unwrap());
        let carrier = header_carrier(&headers);
        assert_eq!(carrier.len(), 1);
        assert_eq!(carrier["x-ok"], "yes");
    }

    #[test]
    fn test_root_span_without_parent() {
        let (tracer, _reporter) = tracer();
        let propagator = ContextPropagator::new(tracer, Carrier::new());
        let (method, uri, headers) = (Method::GET, Uri::from_static("/hello?x=1"), HeaderMap::new());

        let state = propagator.on_request(&head(&method, &uri, &headers));
        let root = state.root_span().unwrap();
        assert_eq!(root.operation_name(), "GET - /hello?x=1");
        assert!(root.context().parent_id().is_none());
        assert_eq!(root.tag(tags::SPAN_KIND), Some(json!("server")));
        assert_eq!(root.tag(tags::HTTP_METHOD), Some(json!("GET")));
        assert_eq!(root.tag(tags::HTTP_URL), Some(json!("/hello?x=1")));
    }

    #[test]
    fn test_root_span_continues_inbound_trace() {
        let (tracer, _reporter) = tracer();
        let propagator = ContextPropagator::new(tracer, Carrier::new());
        let mut headers = HeaderMap::new();
        headers.insert(
            "uber-trace-id",
            HeaderValue::from_static("4bf92f3577b34da6:a3ce929d0e0e4736:0:1"),
        );
        headers.insert("uberctx-tenant", HeaderValue::from_static("acme"));
        let (method, uri) = (Method::POST, Uri::from_static("/hello"));

        let state = propagator.on_request(&head(&method, &uri, &headers));
        let ctx = state.root_span().unwrap().context().clone();
        assert_eq!(ctx.trace_id(), TraceId::from_hex("4bf92f3577b34da6").unwrap());
        assert_eq!(ctx.parent_id(), Some(SpanId::from_hex("a3ce929d0e0e4736").unwrap()));
        assert_eq!(ctx.baggage_item("tenant"), Some("acme"));
    }

    #[test]
    fn test_malformed_header_starts_new_trace() {
        let (tracer, _reporter) = tracer();
        let propagator = ContextPropagator::new(tracer, Carrier::new());
        let mut headers = HeaderMap::new();
        headers.insert("uber-trace-id", HeaderValue::from_static("not-a-trace"));
        let (method, uri) = (Method::GET, Uri::from_static("/"));

        let state = propagator.on_request(&head(&method, &uri, &headers));
        let root = state.root_span().unwrap();
        assert!(root.context().parent_id().is_none());
    }

    #[test]
    fn test_static_state_fills_gaps() {
        let (tracer, _reporter) = tracer();
        let state = Carrier::from([
            (
                "uber-trace-id".to_string(),
                "00000000000000aa:00000000000000bb:0:1".to_string(),
            ),
            ("uberctx-region".to_string(), "eu".to_string()),
        ]);
        let propagator = ContextPropagator::new(tracer, state);
        let (method, uri, headers) = (Method::GET, Uri::from_static("/"), HeaderMap::new());

        let ctx = propagator
            .on_request(&head(&method, &uri, &headers))
            .root_span()
            .unwrap()
            .context()
            .clone();
        assert_eq!(ctx.trace_id(), TraceId::from_hex("aa").unwrap());
        assert_eq!(ctx.baggage_item("region"), Some("eu"));
    }
}
