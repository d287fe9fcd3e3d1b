//! Span writer for JSONL file persistence.
//!
//! Supports two modes:
//! - **Session mode**: Writes to a single file (e.g., `session_dir/spans.jsonl`)
//! - **Daily rotation**: Writes to dated files (e.g., `spans/2026-01-11.jsonl`)

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;

use crate::lock;
use crate::types::FinishedSpan;

/// Error type for span writing operations.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration for the span writer.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterConfig {
    /// Session mode: full path to the span file.
    /// Daily rotation: directory for dated files.
    pub trace_path: PathBuf,

    /// Session mode writes to a single file; daily rotation writes to dated files.
    pub session_mode: bool,
}

impl WriterConfig {
    /// Write every span to one file.
    pub fn session(span_file: impl Into<PathBuf>) -> Self {
        Self {
            trace_path: span_file.into(),
            session_mode: true,
        }
    }

    /// Write spans to one file per day inside `span_dir`.
    pub fn daily_rotation(span_dir: impl Into<PathBuf>) -> Self {
        Self {
            trace_path: span_dir.into(),
            session_mode: false,
        }
    }

    /// The file spans are written to right now.
    pub fn current_file_path(&self) -> PathBuf {
        if self.session_mode {
            self.trace_path.clone()
        } else {
            self.trace_path.join(format!("{}.jsonl", today()))
        }
    }
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Writes finished spans to JSONL files, one span per line.
///
/// Thread-safe via internal mutex.
pub struct SpanWriter {
    config: WriterConfig,
    current_file: Mutex<Option<CurrentFile>>,
}

struct CurrentFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl SpanWriter {
    /// Create a writer, creating the target directory if needed.
    pub fn new(config: WriterConfig) -> Result<Self, WriteError> {
        let dir = if config.session_mode {
            config.trace_path.parent().map(Path::to_path_buf)
        } else {
            Some(config.trace_path.clone())
        };
        if let Some(dir) = dir.filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        Ok(Self {
            config,
            current_file: Mutex::new(None),
        })
    }

    /// The writer's configuration.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Append a batch of spans and flush.
    pub fn write_batch(&self, spans: &[FinishedSpan]) -> Result<(), WriteError> {
        if spans.is_empty() {
            return Ok(());
        }

        let mut guard = lock(&self.current_file);
        let path = self.config.current_file_path();

        // Rotate when the day changed since the last write
        if guard.as_ref().is_none_or(|cf| cf.path != path) {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            *guard = Some(CurrentFile {
                path,
                writer: BufWriter::new(file),
            });
        }

        if let Some(cf) = guard.as_mut() {
            for span in spans {
                let line = serde_json::to_string(span)?;
                writeln!(cf.writer, "{}", line)?;
            }
            cf.writer.flush()?;
        }

        Ok(())
    }

    /// List span files, oldest first.
    pub fn list_span_files(&self) -> Result<Vec<PathBuf>, WriteError> {
        if self.config.session_mode {
            if self.config.trace_path.exists() {
                return Ok(vec![self.config.trace_path.clone()]);
            }
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&self.config.trace_path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();

        files.sort();
        Ok(files)
    }

    /// Read every span from a JSONL file.
    pub fn read_spans(path: &Path) -> Result<Vec<FinishedSpan>, WriteError> {
        let content = fs::read_to_string(path)?;
        let spans: Result<Vec<FinishedSpan>, _> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str)
            .collect();
        Ok(spans?)
    }
}
