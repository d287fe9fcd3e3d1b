//! Configuration file support for the ping server.
//!
//! All server data is stored in a `.hookspan/` directory:
//! - `.hookspan/config.toml` - Configuration file
//! - `.hookspan/sessions/` - Per-run metadata and spans
//!
//! Config discovery searches for `.hookspan/config.toml` starting from the
//! current directory and walking up to parent directories.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hookspan::PluginConfig;
use serde::{Deserialize, Serialize};

/// The hookspan data directory name.
pub const HOOKSPAN_DIR: &str = ".hookspan";
/// The config file name within the hookspan directory.
pub const CONFIG_FILE: &str = "config.toml";
/// Span file written into the session directory when no trace path is set.
pub const SESSION_SPAN_FILE: &str = "spans.jsonl";

/// Config file written by `hookspan init`.
pub const DEFAULT_CONFIG: &str = r#"# hookspan configuration
# Relative paths are resolved against this .hookspan/ directory

[server]
host = "127.0.0.1"
port = 3100
enable_http_trace = true

[tracing]
service_name = "ping-server"

[tracing.sampler]
type = "const"  # Options: "const", "probabilistic"
param = 1

[tracing.reporter]
log_spans = true
# trace_path = "spans"  # Default: spans.jsonl in the session directory
# session_mode = false  # true: one file, false: one file per day
max_buffer = 100
flush_interval_ms = 1000

# Static propagation entries; inbound request headers take precedence
[tracing.state]
# "uberctx-tenant" = "acme"

[tracing.options.tags]
"service-version" = "2.0.0"
"#;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerSection,
    /// Tracing plugin settings.
    pub tracing: PluginConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            tracing: PluginConfig::new("ping-server"),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to (0 = auto-select).
    pub port: u16,
    /// Whether to log every HTTP request through tower-http.
    pub enable_http_trace: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3100,
            enable_http_trace: true,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find and load configuration from current or parent directories.
    pub fn find_and_load() -> Result<Option<(Self, PathBuf)>> {
        let current = std::env::current_dir()?;
        Self::find_and_load_from(&current)
    }

    /// Find and load configuration starting from a specific directory.
    ///
    /// Returns the config and the `.hookspan` directory it was found in.
    pub fn find_and_load_from(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start.to_path_buf();

        loop {
            let hookspan_dir = dir.join(HOOKSPAN_DIR);
            let config_path = hookspan_dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::from_file(&config_path)?;
                return Ok(Some((config, hookspan_dir)));
            }

            if !dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Plugin configuration for one server run.
    ///
    /// A relative trace path is resolved against `hookspan_dir`. Without a
    /// trace path, spans go to a single file in `session_dir`.
    pub fn plugin_config(&self, hookspan_dir: &Path, session_dir: &Path) -> PluginConfig {
        let mut plugin = self.tracing.clone();
        let reporter = &mut plugin.tracer.reporter;
        match &reporter.trace_path {
            Some(path) if path.is_relative() => {
                reporter.trace_path = Some(hookspan_dir.join(path));
            }
            Some(_) => {}
            None => {
                reporter.trace_path = Some(session_dir.join(SESSION_SPAN_FILE));
                reporter.session_mode = true;
            }
        }
        plugin
    }

    /// Get the config file path for a given .hookspan directory.
    pub fn config_path(hookspan_dir: &Path) -> PathBuf {
        hookspan_dir.join(CONFIG_FILE)
    }
}

/// Configuration validation error.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigValidationError {}

impl Config {
    /// Validate the configuration.
    ///
    /// Returns a list of validation errors if any are found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push(ConfigValidationError {
                field: "server.host".to_string(),
                message: "Host cannot be empty.".to_string(),
            });
        }

        let service_name = self.tracing.tracer.service_name.as_deref().unwrap_or("");
        if service_name.trim().is_empty() {
            errors.push(ConfigValidationError {
                field: "tracing.service_name".to_string(),
                message: "Service name is required.".to_string(),
            });
        }

        if let Err(message) = self.tracing.tracer.sampler.validate() {
            errors.push(ConfigValidationError {
                field: "tracing.sampler.param".to_string(),
                message,
            });
        }

        let reporter = &self.tracing.tracer.reporter;
        if reporter.max_buffer == 0 {
            errors.push(ConfigValidationError {
                field: "tracing.reporter.max_buffer".to_string(),
                message: "Buffer size must be at least 1.".to_string(),
            });
        }
        if reporter.flush_interval_ms == 0 {
            errors.push(ConfigValidationError {
                field: "tracing.reporter.flush_interval_ms".to_string(),
                message: "Flush interval must be at least 1ms.".to_string(),
            });
        }

        errors
    }
}
