//! HTTP header propagation.
//!
//! Trace identity travels in the Jaeger header, encoded and decoded by
//! `opentelemetry-jaeger-propagator`:
//!
//! ```text
//! uber-trace-id: {trace-id}:{span-id}:{parent-span-id}:{flags}
//! ```
//!
//! Baggage items travel as one `uberctx-{key}` header each, values
//! percent-encoded.

use std::collections::BTreeMap;

use opentelemetry::Context;
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::TraceContextExt;
use opentelemetry_jaeger_propagator::Propagator;

use crate::context::SpanContext;

/// Header carrying the trace identity.
pub const TRACE_HEADER: &str = "uber-trace-id";
/// Prefix of baggage headers.
pub const BAGGAGE_PREFIX: &str = "uberctx-";

/// A text map of header name to header value.
pub type Carrier = BTreeMap<String, String>;

/// Read access to a carrier, matching header names case-insensitively.
struct CarrierExtractor<'a>(&'a Carrier);

impl Extractor for CarrierExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

struct CarrierInjector<'a>(&'a mut Carrier);

impl Injector for CarrierInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_ascii_lowercase(), value);
    }
}

/// Collect `uberctx-*` baggage items from a carrier.
pub fn extract_baggage(carrier: &Carrier) -> BTreeMap<String, String> {
    carrier
        .iter()
        .filter_map(|(name, value)| {
            let name = name.to_ascii_lowercase();
            let key = name.strip_prefix(BAGGAGE_PREFIX)?;
            if key.is_empty() {
                return None;
            }
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.clone());
            Some((key.to_string(), value))
        })
        .collect()
}

/// Extract a span context from a carrier.
///
/// Returns `None` when the trace header is missing or malformed; never fails.
pub fn extract(carrier: &Carrier) -> Option<SpanContext> {
    let cx = Propagator::new().extract_with_context(&Context::new(), &CarrierExtractor(carrier));
    let remote = cx.span().span_context().clone();
    if !remote.is_valid() {
        if let Some(header) = CarrierExtractor(carrier).get(TRACE_HEADER) {
            tracing::debug!(header = %header, "Ignoring malformed trace header");
        }
        return None;
    }
    Some(SpanContext::new(remote, None, extract_baggage(carrier)))
}

/// Write a span context (and its baggage) into a carrier.
pub fn inject(ctx: &SpanContext, carrier: &mut Carrier) {
    let cx = Context::new().with_remote_span_context(ctx.as_otel().clone());
    Propagator::new().inject_context(&cx, &mut CarrierInjector(carrier));
    for (key, value) in ctx.baggage() {
        carrier.insert(
            format!("{}{}", BAGGAGE_PREFIX, key),
            urlencoding::encode(value).into_owned(),
        );
    }
}
