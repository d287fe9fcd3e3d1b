//! Instrumentation configuration.
//!
//! The configuration surface mirrors what a host passes when it registers
//! the plugin:
//!
//! ```toml
//! service_name = "ping-server"
//!
//! [sampler]
//! type = "const"
//! param = 1
//!
//! [reporter]
//! log_spans = true
//!
//! [state]
//! "uberctx-tenant" = "acme"
//!
//! [options.tags]
//! "service-version" = "2.0.0"
//! ```

use std::collections::BTreeMap;

use hookspan_tracer::{Carrier, Tags, TracerConfig};
use serde::{Deserialize, Serialize};

/// Everything the tracing plugin needs at registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Service name, sampler and reporter.
    #[serde(flatten)]
    pub tracer: TracerConfig,

    /// Static propagation entries that fill gaps in inbound headers.
    pub state: BTreeMap<String, serde_json::Value>,

    /// Extra tracer options.
    pub options: PluginOptions,
}

/// Extra tracer options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOptions {
    /// Static tags attached to every span's process.
    pub tags: Tags,
}

impl PluginConfig {
    /// Config with a service name and defaults for everything else.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            tracer: TracerConfig::new(service_name),
            ..Default::default()
        }
    }

    /// Add a static state entry.
    pub fn with_state(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    /// Add a static process tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.tags.insert(key.into(), value.into());
        self
    }

    /// The static state as a header carrier.
    ///
    /// Keys are lowercased, `null` entries are dropped, and non-string values
    /// are rendered as JSON text.
    pub fn static_carrier(&self) -> Carrier {
        self.state
            .iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    serde_json::Value::Null => return None,
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((key.to_ascii_lowercase(), value))
            })
            .collect()
    }
}
