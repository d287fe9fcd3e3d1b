//! Span reporters.
//!
//! A reporter receives every sampled span when it finishes. `report` runs on
//! the request path, so it must not fail and must never touch IO; file output
//! is buffered and written in batches by a background task.

use std::mem;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::lock;
use crate::types::FinishedSpan;
use crate::writer::{SpanWriter, WriteError, WriterConfig};

/// Destination for finished spans.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Accept a finished span. Must not block on IO or panic.
    fn report(&self, span: FinishedSpan);

    /// Flush anything buffered and release resources.
    async fn close(&self) {}

    /// Reporter name for logs.
    fn name(&self) -> &str;
}

/// Shared reporter handle.
pub type SharedReporter = Arc<dyn Reporter>;

/// Reporter policy from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Log every finished span through `tracing`.
    pub log_spans: bool,
    /// Write spans as JSONL to this path (a file in session mode, a directory otherwise).
    pub trace_path: Option<PathBuf>,
    /// Write to a single file instead of daily rotated files.
    pub session_mode: bool,
    /// Flush to disk once this many spans are buffered.
    pub max_buffer: usize,
    /// Periodic flush interval in milliseconds.
    pub flush_interval_ms: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            log_spans: false,
            trace_path: None,
            session_mode: false,
            max_buffer: 100,
            flush_interval_ms: 1_000,
        }
    }
}

impl ReporterConfig {
    /// Build the reporter described by this policy.
    ///
    /// A file reporter that cannot be created is logged and left out; tracing
    /// degrades instead of failing startup.
    pub fn build(&self) -> SharedReporter {
        let mut reporters: Vec<SharedReporter> = Vec::new();

        if self.log_spans {
            reporters.push(Arc::new(LoggingReporter));
        }

        if let Some(path) = &self.trace_path {
            let writer_config = if self.session_mode {
                WriterConfig::session(path)
            } else {
                WriterConfig::daily_rotation(path)
            };
            match FileReporter::new(
                writer_config,
                self.max_buffer,
                Duration::from_millis(self.flush_interval_ms),
            ) {
                Ok(reporter) => reporters.push(reporter),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to create span file reporter");
                }
            }
        }

        match reporters.len() {
            0 => Arc::new(NoopReporter),
            1 => reporters.remove(0),
            _ => Arc::new(CompositeReporter::new(reporters)),
        }
    }
}

/// Discards every span.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn report(&self, _span: FinishedSpan) {}

    fn name(&self) -> &str {
        "noop"
    }
}

/// Logs every span at info level.
#[derive(Debug, Default)]
pub struct LoggingReporter;

impl Reporter for LoggingReporter {
    fn report(&self, span: FinishedSpan) {
        tracing::info!(
            service = %span.process.service_name,
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            parent_id = ?span.parent_span_id.as_ref().map(|id| id.to_string()),
            operation = %span.operation_name,
            duration_us = span.duration_us,
            error = span.is_error(),
            "Reporting span"
        );
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Keeps spans in memory. Meant for tests and local inspection.
#[derive(Debug, Default)]
pub struct InMemoryReporter {
    spans: Mutex<Vec<FinishedSpan>>,
    closed: AtomicBool,
}

impl InMemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All spans reported so far, in finish order.
    pub fn spans(&self) -> Vec<FinishedSpan> {
        lock(&self.spans).clone()
    }

    /// The first reported span with the given name.
    pub fn find(&self, operation_name: &str) -> Option<FinishedSpan> {
        lock(&self.spans)
            .iter()
            .find(|s| s.operation_name == operation_name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.spans).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.spans).clear();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Reporter for InMemoryReporter {
    fn report(&self, span: FinishedSpan) {
        lock(&self.spans).push(span);
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// Fans spans out to several reporters.
pub struct CompositeReporter {
    reporters: Vec<SharedReporter>,
    name: String,
}

impl CompositeReporter {
    pub fn new(reporters: Vec<SharedReporter>) -> Self {
        let names: Vec<&str> = reporters.iter().map(|r| r.name()).collect();
        let name = format!("composite({})", names.join(","));
        Self { reporters, name }
    }
}

#[async_trait]
impl Reporter for CompositeReporter {
    fn report(&self, span: FinishedSpan) {
        if let Some((last, rest)) = self.reporters.split_last() {
            for reporter in rest {
                reporter.report(span.clone());
            }
            last.report(span);
        }
    }

    async fn close(&self) {
        for reporter in &self.reporters {
            reporter.close().await;
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Buffers spans and writes them to JSONL files in batches.
///
/// `report` only appends to the buffer. A background task writes batches
/// off the async workers when the buffer fills and on a periodic tick; `close`
/// writes whatever is left. Without a Tokio runtime at construction time the
/// buffer is written only on `close`.
pub struct FileReporter {
    writer: Arc<SpanWriter>,
    buffer: Mutex<Vec<FinishedSpan>>,
    max_buffer: usize,
    wake: Arc<Notify>,
    closing: AtomicBool,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl FileReporter {
    /// Create the reporter and start its flush task.
    pub fn new(
        config: WriterConfig,
        max_buffer: usize,
        flush_interval: Duration,
    ) -> Result<Arc<Self>, WriteError> {
        let reporter = Arc::new(Self {
            writer: Arc::new(SpanWriter::new(config)?),
            buffer: Mutex::new(Vec::new()),
            max_buffer: max_buffer.max(1),
            wake: Arc::new(Notify::new()),
            closing: AtomicBool::new(false),
            flush_task: Mutex::new(None),
        });

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let task = handle.spawn(flush_loop(
                Arc::downgrade(&reporter),
                Arc::clone(&reporter.wake),
                flush_interval,
            ));
            *lock(&reporter.flush_task) = Some(task);
        } else {
            tracing::debug!("No Tokio runtime; spans are written only on close");
        }

        Ok(reporter)
    }

    /// Number of spans waiting to be written.
    pub fn buffered(&self) -> usize {
        lock(&self.buffer).len()
    }

    /// Write out everything buffered on the blocking thread pool.
    pub async fn flush(&self) {
        let batch = mem::take(&mut *lock(&self.buffer));
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        let writer = Arc::clone(&self.writer);
        match tokio::task::spawn_blocking(move || writer.write_batch(&batch)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                spans = count,
                path = %self.writer.config().trace_path.display(),
                error = %e,
                "Failed to write spans"
            ),
            Err(e) => tracing::warn!(spans = count, error = %e, "Span write task failed"),
        }
    }
}

async fn flush_loop(reporter: Weak<FileReporter>, wake: Arc<Notify>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wake.notified() => {}
        }
        let Some(reporter) = reporter.upgrade() else {
            break;
        };
        reporter.flush().await;
        if reporter.closing.load(Ordering::Acquire) {
            break;
        }
    }
}

#[async_trait]
impl Reporter for FileReporter {
    fn report(&self, span: FinishedSpan) {
        let full = {
            let mut buffer = lock(&self.buffer);
            buffer.push(span);
            buffer.len() >= self.max_buffer
        };
        if full {
            self.wake.notify_one();
        }
    }

    async fn close(&self) {
        self.closing.store(true, Ordering::Release);
        let task = lock(&self.flush_task).take();
        if let Some(task) = task {
            self.wake.notify_one();
            if let Err(e) = task.await {
                tracing::debug!(error = %e, "Span flush task ended abnormally");
            }
        }
        self.flush().await;
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::StartSpanOptions;
    use crate::{Tracer, TracerConfig, TracerOptions};
    use tempfile::tempdir;

    fn tracer_with(reporter: SharedReporter) -> Tracer {
        Tracer::initialize_with(
            TracerConfig::new("reporter-tests"),
            TracerOptions::default().with_reporter(reporter),
        )
        .unwrap()
    }

    #[test]
    fn test_default_config_builds_noop() {
        let reporter = ReporterConfig::default().build();
        assert_eq!(reporter.name(), "noop");
    }

    #[test]
    fn test_log_spans_builds_logging() {
        let config = ReporterConfig {
            log_spans: true,
            ..Default::default()
        };
        assert_eq!(config.build().name(), "logging");
    }

    #[tokio::test]
    async fn test_combined_policy_builds_composite() {
        let dir = tempdir().unwrap();
        let config = ReporterConfig {
            log_spans: true,
            trace_path: Some(dir.path().join("spans")),
            ..Default::default()
        };
        let reporter = config.build();
        assert_eq!(reporter.name(), "composite(logging,file)");
        reporter.close().await;
    }

    #[tokio::test]
    async fn test_composite_delivers_to_all() {
        let a = Arc::new(InMemoryReporter::new());
        let b = Arc::new(InMemoryReporter::new());
        let composite = Arc::new(CompositeReporter::new(vec![
            a.clone() as SharedReporter,
            b.clone() as SharedReporter,
        ]));
        let tracer = tracer_with(composite);

        tracer.start_span("op", StartSpanOptions::default()).finish();
        tracer.close().await;

        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert!(a.is_closed() && b.is_closed());
    }

    #[tokio::test]
    async fn test_file_reporter_flushes_on_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spans.jsonl");
        let reporter = FileReporter::new(
            WriterConfig::session(&path),
            100,
            Duration::from_secs(3600),
        )
        .unwrap();
        let tracer = tracer_with(reporter.clone());

        tracer.start_span("one", StartSpanOptions::default()).finish();
        tracer.start_span("two", StartSpanOptions::default()).finish();
        assert_eq!(reporter.buffered(), 2);
        assert!(!path.exists());

        tracer.close().await;
        assert_eq!(reporter.buffered(), 0);
        assert_eq!(SpanWriter::read_spans(&path).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_report_never_writes_inline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spans.jsonl");
        let reporter =
            FileReporter::new(WriterConfig::session(&path), 1, Duration::from_secs(3600)).unwrap();
        let tracer = tracer_with(reporter.clone());

        for name in ["a", "b", "c"] {
            tracer.start_span(name, StartSpanOptions::default()).finish();
        }

        // The current-thread runtime has not yielded, so the flush task has not run
        assert!(!path.exists());
        assert_eq!(reporter.buffered(), 3);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(reporter.buffered(), 0);
        assert_eq!(SpanWriter::read_spans(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_file_reporter_without_runtime_buffers_until_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spans.jsonl");
        let reporter =
            FileReporter::new(WriterConfig::session(&path), 1, Duration::from_secs(1)).unwrap();
        let tracer = tracer_with(reporter.clone());

        tracer.start_span("a", StartSpanOptions::default()).finish();
        tracer.start_span("b", StartSpanOptions::default()).finish();
        assert_eq!(reporter.buffered(), 2);
        assert!(!path.exists());

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(tracer.close());
        assert_eq!(SpanWriter::read_spans(&path).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_reporter_periodic_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spans.jsonl");
        let reporter = FileReporter::new(
            WriterConfig::session(&path),
            100,
            Duration::from_millis(20),
        )
        .unwrap();
        let tracer = tracer_with(reporter.clone());

        tracer.start_span("tick", StartSpanOptions::default()).finish();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(reporter.buffered(), 0);
        assert_eq!(SpanWriter::read_spans(&path).unwrap().len(), 1);
    }
}
