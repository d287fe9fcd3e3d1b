//! Demo of the tracer simulating one request moving through lifecycle phases.

use std::time::Duration;

use hookspan_tracer::{
    Carrier, ReporterConfig, StartSpanOptions, Tracer, TracerConfig, WriterConfig, tags,
};
use serde::Serialize;

#[derive(Serialize)]
struct Hello {
    hello: String,
}

#[tokio::main]
async fn main() {
    let span_dir = std::env::temp_dir().join("hookspan-demo");
    let config = TracerConfig::new("demo-service").with_reporter(ReporterConfig {
        log_spans: true,
        trace_path: Some(span_dir.clone()),
        ..Default::default()
    });
    let tracer = Tracer::initialize(config).expect("valid tracer config");

    // Pretend an upstream service called us
    let inbound = Carrier::from([
        ("uber-trace-id".to_string(), "4bf92f3577b34da6:a3ce929d0e0e4736:0:1".to_string()),
        ("uberctx-tenant".to_string(), "acme".to_string()),
    ]);
    let parent = tracer.extract(&inbound);

    let mut root_options = StartSpanOptions::default()
        .with_tag(tags::SPAN_KIND, tags::SPAN_KIND_RPC_SERVER)
        .with_tag(tags::HTTP_METHOD, "GET")
        .with_tag(tags::HTTP_URL, "/hello");
    if let Some(parent) = parent {
        root_options = root_options.child_of(parent);
    }
    let root = tracer.start_span("GET - /hello", root_options);

    for phase in ["preParsing", "preValidation", "preHandler"] {
        let span = tracer.start_span(
            format!("{}()", phase),
            StartSpanOptions::default().child_of(root.context().clone()),
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
        span.finish();
    }

    let handler = tracer.start_span(
        "get_hello()",
        StartSpanOptions::default().child_of(root.context().clone()),
    );
    let output = Hello {
        hello: "world".to_string(),
    };
    handler.set_tag(
        tags::RESPONSE_BODY,
        serde_json::to_string(&output).unwrap_or_default(),
    );
    handler.finish();

    root.set_tag(tags::HTTP_STATUS_CODE, 200);
    root.finish();

    // Outbound propagation for a downstream call
    let mut outbound = Carrier::new();
    tracer.inject(root.context(), &mut outbound);
    println!("Outbound headers: {:?}", outbound);

    tracer.close().await;
    println!(
        "Spans written to {}",
        WriterConfig::daily_rotation(span_dir).current_file_path().display()
    );
}
