//! Span exporter feeding [`Reporter`]s.
//!
//! The SDK hands every ended, sampled span to this exporter, which turns it
//! into a [`FinishedSpan`] and passes it on. Export never blocks: reporters
//! only buffer.

use std::collections::BTreeMap;
use std::fmt;
use std::future::{Future, ready};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use opentelemetry::trace::SpanId;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{SpanData, SpanExporter};

use crate::reporter::SharedReporter;
use crate::tags::{self, Tags};
use crate::types::{FinishedSpan, Process};

pub(crate) struct ReporterExporter {
    reporter: SharedReporter,
    process: Process,
    closed: Arc<AtomicBool>,
}

impl ReporterExporter {
    pub(crate) fn new(reporter: SharedReporter, process: Process, closed: Arc<AtomicBool>) -> Self {
        Self {
            reporter,
            process,
            closed,
        }
    }

    fn finished_span(&self, span: SpanData) -> FinishedSpan {
        let context = &span.span_context;
        let trace_id = context.trace_id().to_string();
        let span_id = context.span_id().to_string();
        let flags = context.trace_flags().to_u8();
        let parent_span_id =
            (span.parent_span_id != SpanId::INVALID).then(|| span.parent_span_id.to_string());
        let duration_us = span
            .end_time
            .duration_since(span.start_time)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();

        let mut tags = Tags::new();
        let mut baggage = BTreeMap::new();
        for attribute in &span.attributes {
            let key = attribute.key.as_str();
            match key.strip_prefix(tags::BAGGAGE_ATTRIBUTE_PREFIX) {
                Some(item) => {
                    baggage.insert(item.to_string(), attribute.value.to_string());
                }
                None => {
                    tags.insert(key.to_string(), tags::from_attribute(&attribute.value));
                }
            }
        }

        FinishedSpan {
            trace_id,
            span_id,
            parent_span_id,
            operation_name: span.name.to_string(),
            flags,
            started_at: DateTime::<Utc>::from(span.start_time),
            duration_us,
            tags,
            baggage,
            process: self.process.clone(),
        }
    }
}

impl fmt::Debug for ReporterExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterExporter")
            .field("reporter", &self.reporter.name())
            .field("service_name", &self.process.service_name)
            .finish()
    }
}

impl SpanExporter for ReporterExporter {
    fn export(&self, batch: Vec<SpanData>) -> impl Future<Output = OTelSdkResult> + Send {
        for span in batch {
            if self.closed.load(Ordering::Acquire) {
                tracing::debug!(operation = %span.name, "Dropping span finished after tracer close");
                continue;
            }
            self.reporter.report(self.finished_span(span));
        }
        ready(Ok(()))
    }
}
