//! Root span sampling policies.
//!
//! The decision itself is made by the OpenTelemetry SDK sampler the policy
//! maps to; children follow their parent's decision.

use opentelemetry_sdk::trace::Sampler;
use serde::{Deserialize, Serialize};

/// Sampler policy as it appears in configuration:
///
/// ```toml
/// [sampler]
/// type = "probabilistic"
/// param = 0.25
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SamplerConfig {
    /// Sample everything (`param != 0`) or nothing (`param == 0`).
    Const { param: f64 },
    /// Sample a fraction of traces, decided from the trace ID.
    Probabilistic { param: f64 },
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::Const { param: 1.0 }
    }
}

impl SamplerConfig {
    /// Policy name used in the `sampler.type` tag.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Const { .. } => "const",
            Self::Probabilistic { .. } => "probabilistic",
        }
    }

    /// Policy parameter used in the `sampler.param` tag.
    pub fn param(&self) -> f64 {
        match self {
            Self::Const { param } | Self::Probabilistic { param } => *param,
        }
    }

    /// Check the parameter is usable for the policy.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::Const { param } if !param.is_finite() => {
                Err(format!("const sampler param must be a number, got {}", param))
            }
            Self::Probabilistic { param } if !(0.0..=1.0).contains(param) => Err(format!(
                "probabilistic sampler param must be within [0, 1], got {}",
                param
            )),
            _ => Ok(()),
        }
    }

    /// The SDK sampler for this policy, parent-based so only roots consult it.
    pub fn to_sampler(&self) -> Sampler {
        let root = match *self {
            Self::Const { param } if param != 0.0 => Sampler::AlwaysOn,
            Self::Const { .. } => Sampler::AlwaysOff,
            Self::Probabilistic { param } => Sampler::TraceIdRatioBased(param),
        };
        Sampler::ParentBased(Box::new(root))
    }
}
