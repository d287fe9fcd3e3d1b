//! The process-wide tracer.
//!
//! A thin adapter over an OpenTelemetry SDK tracer provider: the SDK owns ID
//! generation, sampling and span export; this type adds the Jaeger header
//! format, baggage, tags and span counters.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use opentelemetry::trace::{Span as _, TraceContextExt, Tracer as _, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider};
use serde::{Deserialize, Serialize};

use crate::context::SpanContext;
use crate::error::{Result, TracerError};
use crate::exporter::ReporterExporter;
use crate::propagation::{self, Carrier};
use crate::reporter::{ReporterConfig, SharedReporter};
use crate::sampler::SamplerConfig;
use crate::span::{Span, StartSpanOptions};
use crate::tags::{self, Tags};
use crate::types::Process;

/// Instrumentation scope name of every span.
const SCOPE_NAME: &str = "hookspan";

/// Tracer configuration, resolved once at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Name of the service emitting spans. Required.
    pub service_name: Option<String>,
    /// Root span sampling policy.
    pub sampler: SamplerConfig,
    /// Where finished spans go.
    pub reporter: ReporterConfig,
}

impl TracerConfig {
    /// Config with a service name and default policies.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: Some(service_name.into()),
            ..Default::default()
        }
    }

    /// Set the sampler policy.
    pub fn with_sampler(mut self, sampler: SamplerConfig) -> Self {
        self.sampler = sampler;
        self
    }

    /// Set the reporter policy.
    pub fn with_reporter(mut self, reporter: ReporterConfig) -> Self {
        self.reporter = reporter;
        self
    }
}

/// Runtime options that are not plain configuration.
#[derive(Default, Clone)]
pub struct TracerOptions {
    /// Static tags attached to the process of every span.
    pub tags: Tags,
    /// Reporter overriding the configured policy.
    pub reporter: Option<SharedReporter>,
}

impl TracerOptions {
    /// Add static process tags.
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Use this reporter instead of the one built from configuration.
    pub fn with_reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }
}

/// Started/finished span counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpanStats {
    pub started: u64,
    pub finished: u64,
}

impl SpanStats {
    /// Spans started but not yet finished.
    pub fn open(&self) -> u64 {
        self.started.saturating_sub(self.finished)
    }
}

#[derive(Debug, Default)]
pub(crate) struct SpanCounters {
    started: AtomicU64,
    finished: AtomicU64,
}

impl SpanCounters {
    pub(crate) fn on_start(&self) {
        self.started.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn on_finish(&self) {
        self.finished.fetch_add(1, Ordering::AcqRel);
    }

    fn snapshot(&self) -> SpanStats {
        SpanStats {
            started: self.started.load(Ordering::Acquire),
            finished: self.finished.load(Ordering::Acquire),
        }
    }
}

/// Creates spans, extracts/injects context, and owns the reporter.
///
/// Cheap to clone; every clone shares the same provider, reporter and
/// counters, and all methods are safe to call concurrently.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

struct TracerInner {
    provider: SdkTracerProvider,
    tracer: SdkTracer,
    process: Process,
    sampler: SamplerConfig,
    reporter: SharedReporter,
    counters: Arc<SpanCounters>,
    closed: Arc<AtomicBool>,
}

impl Tracer {
    /// Build a tracer from configuration.
    ///
    /// Fails if the service name is missing or blank, or the sampler
    /// parameter is out of range.
    pub fn initialize(config: TracerConfig) -> Result<Self> {
        Self::initialize_with(config, TracerOptions::default())
    }

    /// Build a tracer from configuration plus runtime options.
    pub fn initialize_with(config: TracerConfig, options: TracerOptions) -> Result<Self> {
        let service_name = config
            .service_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| TracerError::Configuration("service name is required".to_string()))?
            .to_string();
        config
            .sampler
            .validate()
            .map_err(TracerError::Configuration)?;

        let reporter = options
            .reporter
            .unwrap_or_else(|| config.reporter.build());

        let mut process_tags = options.tags;
        process_tags.insert(
            tags::TRACER_VERSION.to_string(),
            env!("CARGO_PKG_VERSION").into(),
        );
        process_tags.insert(
            tags::CLIENT_UUID.to_string(),
            uuid::Uuid::new_v4().to_string().into(),
        );
        let process = Process {
            service_name: service_name.clone(),
            tags: process_tags,
        };

        let resource = Resource::builder_empty()
            .with_service_name(service_name.clone())
            .with_attributes(
                process
                    .tags
                    .iter()
                    .map(|(key, value)| tags::to_attribute(key, value)),
            )
            .build();
        let closed = Arc::new(AtomicBool::new(false));
        let exporter = ReporterExporter::new(reporter.clone(), process.clone(), closed.clone());
        let provider = SdkTracerProvider::builder()
            .with_sampler(config.sampler.to_sampler())
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build();
        let tracer = provider.tracer(SCOPE_NAME);

        tracing::info!(
            service = %service_name,
            sampler = config.sampler.type_name(),
            sampler_param = config.sampler.param(),
            reporter = reporter.name(),
            "Tracer initialized"
        );

        Ok(Self {
            inner: Arc::new(TracerInner {
                provider,
                tracer,
                process,
                sampler: config.sampler,
                reporter,
                counters: Arc::new(SpanCounters::default()),
                closed,
            }),
        })
    }

    /// The service name spans are reported under.
    pub fn service_name(&self) -> &str {
        &self.inner.process.service_name
    }

    /// The process reported with every span.
    pub fn process(&self) -> &Process {
        &self.inner.process
    }

    /// Extract a parent context from propagation headers.
    pub fn extract(&self, carrier: &Carrier) -> Option<SpanContext> {
        propagation::extract(carrier)
    }

    /// Write propagation headers for an outbound call.
    pub fn inject(&self, ctx: &SpanContext, carrier: &mut Carrier) {
        propagation::inject(ctx, carrier);
    }

    /// Start a span.
    ///
    /// Without a parent the span starts a new trace and the sampler decides
    /// whether it is reported; children inherit the parent's decision.
    pub fn start_span(&self, name: impl Into<String>, options: StartSpanOptions) -> Span {
        let StartSpanOptions {
            child_of,
            mut tags,
            baggage: extra_baggage,
        } = options;
        let name = name.into();

        let (parent_cx, parent_id, mut baggage) = match child_of {
            Some(parent) => (
                Context::new().with_remote_span_context(parent.as_otel().clone()),
                Some(parent.span_id()),
                parent.baggage().clone(),
            ),
            None => (Context::new(), None, Default::default()),
        };
        baggage.extend(extra_baggage);

        let attributes: Vec<KeyValue> = tags
            .iter()
            .map(|(key, value)| tags::to_attribute(key, value))
            .chain(baggage.iter().map(|(key, value)| {
                KeyValue::new(
                    format!("{}{}", tags::BAGGAGE_ATTRIBUTE_PREFIX, key),
                    value.clone(),
                )
            }))
            .collect();
        let builder = self
            .inner
            .tracer
            .span_builder(name.clone())
            .with_attributes(attributes);
        let mut sdk_span = self.inner.tracer.build_with_context(builder, &parent_cx);
        let span_context = sdk_span.span_context().clone();

        if parent_id.is_none() && span_context.is_sampled() {
            let sampler = &self.inner.sampler;
            let sampler_tags: [(&str, serde_json::Value); 2] = [
                (tags::SAMPLER_TYPE, sampler.type_name().into()),
                (tags::SAMPLER_PARAM, sampler.param().into()),
            ];
            for (key, value) in sampler_tags {
                sdk_span.set_attribute(tags::to_attribute(key, &value));
                tags.insert(key.to_string(), value);
            }
        }

        let context = SpanContext::new(span_context, parent_id, baggage);
        Span::new(
            sdk_span,
            context,
            name,
            tags,
            Arc::clone(&self.inner.counters),
        )
    }

    /// Counters of started and finished spans.
    pub fn stats(&self) -> SpanStats {
        self.inner.counters.snapshot()
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Shut down the provider, flush the reporter and stop reporting.
    ///
    /// Await this once at process teardown before exiting; later calls are
    /// no-ops.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let stats = self.stats();
        tracing::info!(
            service = %self.inner.process.service_name,
            started = stats.started,
            finished = stats.finished,
            "Closing tracer"
        );
        if let Err(e) = self.inner.provider.shutdown() {
            tracing::warn!(error = %e, "Tracer provider shutdown failed");
        }
        self.inner.reporter.close().await;
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("service_name", &self.inner.process.service_name)
            .field("sampler", &self.inner.sampler)
            .field("reporter", &self.inner.reporter.name())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{SpanId, TraceId};
    use crate::reporter::InMemoryReporter;
    use serde_json::json;

    fn tracer_with(config: TracerConfig) -> (Tracer, Arc<InMemoryReporter>) {
        let reporter = Arc::new(InMemoryReporter::new());
        let tracer = Tracer::initialize_with(
            config,
            TracerOptions::default()
                .with_tags(Tags::from([("service-version".to_string(), json!("2.0.0"))]))
                .with_reporter(reporter.clone()),
        )
        .unwrap();
        (tracer, reporter)
    }

    #[test]
    fn test_missing_service_name_is_configuration_error() {
        let err = Tracer::initialize(TracerConfig::default()).unwrap_err();
        assert!(matches!(err, TracerError::Configuration(_)));

        let blank = Tracer::initialize(TracerConfig::new("   "));
        assert!(blank.is_err());
    }

    #[test]
    fn test_invalid_sampler_is_configuration_error() {
        let config =
            TracerConfig::new("svc").with_sampler(SamplerConfig::Probabilistic { param: 2.0 });
        assert!(matches!(
            Tracer::initialize(config),
            Err(TracerError::Configuration(_))
        ));
    }

    #[test]
    fn test_root_span_carries_sampler_and_process_tags() {
        let (tracer, reporter) = tracer_with(TracerConfig::new("ping-server"));
        let span = tracer.start_span("root", StartSpanOptions::default());
        assert!(span.context().is_sampled());
        assert!(span.context().parent_id().is_none());
        span.finish();

        let record = reporter.find("root").unwrap();
        assert!(record.is_root());
        assert_eq!(record.tag(tags::SAMPLER_TYPE), Some(&json!("const")));
        assert_eq!(record.trace_id.len(), 32);
        assert_eq!(record.process.service_name, "ping-server");
        assert_eq!(record.process.tags["service-version"], json!("2.0.0"));
        assert!(record.process.tags.contains_key(tags::CLIENT_UUID));
    }

    #[test]
    fn test_unsampled_spans_are_counted_not_reported() {
        let (tracer, reporter) =
            tracer_with(TracerConfig::new("svc").with_sampler(SamplerConfig::Const { param: 0.0 }));
        let root = tracer.start_span("root", StartSpanOptions::default());
        let child = tracer.start_span(
            "child",
            StartSpanOptions::default().child_of(root.context().clone()),
        );
        assert!(!root.context().is_sampled());
        assert!(!child.context().is_sampled());
        child.finish();
        root.finish();

        assert!(reporter.is_empty());
        assert_eq!(tracer.stats(), SpanStats { started: 2, finished: 2 });
    }

    #[test]
    fn test_probabilistic_extremes() {
        let (none, none_reporter) = tracer_with(
            TracerConfig::new("svc").with_sampler(SamplerConfig::Probabilistic { param: 0.0 }),
        );
        let (all, all_reporter) = tracer_with(
            TracerConfig::new("svc").with_sampler(SamplerConfig::Probabilistic { param: 1.0 }),
        );
        for _ in 0..10 {
            none.start_span("op", StartSpanOptions::default()).finish();
            all.start_span("op", StartSpanOptions::default()).finish();
        }
        assert!(none_reporter.is_empty());
        assert_eq!(all_reporter.len(), 10);
        assert_eq!(
            all_reporter.spans()[0].tag(tags::SAMPLER_TYPE),
            Some(&json!("probabilistic"))
        );
    }

    #[test]
    fn test_sampled_remote_parent_overrides_sampler() {
        let (tracer, reporter) =
            tracer_with(TracerConfig::new("svc").with_sampler(SamplerConfig::Const { param: 0.0 }));
        let carrier = Carrier::from([("uber-trace-id".to_string(), "abc:def:0:1".to_string())]);
        let parent = tracer.extract(&carrier).unwrap();
        tracer
            .start_span("child", StartSpanOptions::default().child_of(parent))
            .finish();

        let record = reporter.find("child").unwrap();
        assert!(record.tag(tags::SAMPLER_TYPE).is_none());
    }

    #[test]
    fn test_extract_then_start_child() {
        let (tracer, _) = tracer_with(TracerConfig::new("svc"));
        let carrier = Carrier::from([(
            "uber-trace-id".to_string(),
            "abc:def:0:1".to_string(),
        )]);
        let parent = tracer.extract(&carrier).unwrap();
        let span = tracer.start_span("child", StartSpanOptions::default().child_of(parent));

        assert_eq!(span.context().trace_id(), TraceId::from_hex("abc").unwrap());
        assert_eq!(span.context().parent_id(), Some(SpanId::from_hex("def").unwrap()));
        assert!(!span.context().is_remote());
    }

    #[test]
    fn test_extract_never_fails() {
        let (tracer, _) = tracer_with(TracerConfig::new("svc"));
        assert!(tracer.extract(&Carrier::new()).is_none());
        let carrier = Carrier::from([("uber-trace-id".to_string(), "::::".to_string())]);
        assert!(tracer.extract(&carrier).is_none());
    }

    #[test]
    fn test_stats_track_open_spans() {
        let (tracer, _) = tracer_with(TracerConfig::new("svc"));
        let a = tracer.start_span("a", StartSpanOptions::default());
        let _b = tracer.start_span("b", StartSpanOptions::default());
        a.finish();
        assert_eq!(tracer.stats().open(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_stops_reporting() {
        let (tracer, reporter) = tracer_with(TracerConfig::new("svc"));
        let late = tracer.start_span("late", StartSpanOptions::default());

        tracer.close().await;
        tracer.close().await;
        assert!(tracer.is_closed());
        assert!(reporter.is_closed());

        late.finish();
        assert!(reporter.is_empty());
        assert_eq!(tracer.stats().finished, 1);
    }

    #[tokio::test]
    async fn test_concurrent_start_span() {
        let (tracer, reporter) = tracer_with(TracerConfig::new("svc"));
        let mut handles = Vec::new();
        for i in 0..16 {
            let tracer = tracer.clone();
            handles.push(tokio::spawn(async move {
                let span = tracer.start_span(format!("task-{}", i), StartSpanOptions::default());
                span.finish();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(reporter.len(), 16);
        assert_eq!(tracer.stats().open(), 0);
    }
}
