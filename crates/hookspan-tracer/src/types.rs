//! Finished span records.
//!
//! These are what reporters receive and what the JSONL writer persists.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::tags::{self, Tags};

/// The service emitting spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    /// Service name from configuration.
    pub service_name: String,

    /// Static process-wide tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
}

/// An immutable record of a completed span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishedSpan {
    /// Trace ID, 32 lowercase hex digits.
    pub trace_id: String,

    /// Span ID, 16 lowercase hex digits.
    pub span_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,

    /// Human-readable name (e.g., "GET - /hello", "preHandler()").
    pub operation_name: String,

    /// Trace flags (bit 0 is "sampled").
    pub flags: u8,

    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,

    /// Duration in microseconds.
    pub duration_us: u64,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub baggage: BTreeMap<String, String>,

    pub process: Process,
}

impl FinishedSpan {
    /// Look up a tag value.
    pub fn tag(&self, key: &str) -> Option<&serde_json::Value> {
        self.tags.get(key)
    }

    /// Whether the span was tagged `error = true`.
    pub fn is_error(&self) -> bool {
        self.tag(tags::ERROR) == Some(&serde_json::Value::Bool(true))
    }

    /// Wall-clock end time derived from the start and duration.
    pub fn ended_at(&self) -> DateTime<Utc> {
        self.started_at + Duration::microseconds(self.duration_us as i64)
    }

    /// Whether this span has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }
}
