//! Session management for server runs.
//!
//! Each server run gets a unique session ID and directory holding its
//! metadata and, by default, its spans.

use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a server session.
///
/// Format: `YYYY-MM-DDTHH-MM-SS_XXXX` where XXXX is a short UUID suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new session ID with current timestamp and random suffix.
    pub fn generate() -> Self {
        let now = Utc::now();
        let short_uuid = &uuid::Uuid::new_v4().simple().to_string()[..4];
        Self(format!(
            "{}_{}",
            now.format("%Y-%m-%dT%H-%M-%S"),
            short_uuid
        ))
    }

    /// Create a session ID from a string (for testing or restoration).
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Get the session directory path for a given session ID.
pub fn session_dir(hookspan_dir: &Path, session_id: &SessionId) -> PathBuf {
    hookspan_dir.join("sessions").join(&session_id.0)
}

/// Metadata about a server session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,

    /// When the session started.
    pub started_at: DateTime<Utc>,

    /// Service name spans are reported under.
    pub service_name: String,

    /// Address the server was asked to bind.
    pub bind_addr: SocketAddr,

    /// Where spans are written, if anywhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_path: Option<PathBuf>,
}

impl SessionMetadata {
    pub fn new(session_id: &SessionId, service_name: impl Into<String>, bind_addr: SocketAddr) -> Self {
        Self {
            session_id: session_id.to_string(),
            started_at: Utc::now(),
            service_name: service_name.into(),
            bind_addr,
            trace_path: None,
        }
    }

    pub fn with_trace_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace_path = Some(path.into());
        self
    }
}

/// Write session metadata to the session directory.
pub fn write_metadata(session_dir: &Path, metadata: &SessionMetadata) -> anyhow::Result<()> {
    let path = session_dir.join("session.json");
    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(&path, json)
        .with_context(|| format!("Failed to write session metadata: {}", path.display()))?;
    Ok(())
}

/// Read session metadata from a session directory.
pub fn read_metadata(session_dir: &Path) -> anyhow::Result<SessionMetadata> {
    let path = session_dir.join("session.json");
    let json = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read session metadata: {}", path.display()))?;
    let metadata: SessionMetadata = serde_json::from_str(&json)?;
    Ok(metadata)
}
