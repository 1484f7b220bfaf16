//! Typed configuration for the orchestration core (spec.md §6, §9).
//!
//! Mirrors how the teacher repo's `ApiConfig`/`LLMRouterConfig` establish
//! defaults, but adds file + environment layering via the `config` crate so
//! every knob in spec.md §6 is recognized from either source. Unknown keys
//! are rejected at load time by deserializing into `RawConfig`
//! (`#[serde(deny_unknown_fields)]`) before converting to `CoreConfig`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::balancer::Strategy;
use crate::error::{CoreError, CoreResult};
use crate::fanout::FanOutMode;

/// Ranker weight overrides (spec.md §4.3). `None` fields fall back to the
/// preference-adjusted defaults computed by the ranker itself.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RankerWeights {
    pub capability: Option<f64>,
    pub cost: Option<f64>,
    pub latency: Option<f64>,
    pub health: Option<f64>,
    pub quality: Option<f64>,
}

/// Circuit breaker thresholds (spec.md §4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_ms: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_ms: 60_000,
        }
    }
}

/// Health-tracker window size (spec.md §4.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthConfig {
    pub window_size: usize,
    /// Consecutive non-success outcomes within the window before `healthy` flips.
    pub unhealthy_run_length: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            unhealthy_run_length: 3,
        }
    }
}

/// Load-balancer configuration (spec.md §4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub default_strategy: Strategy,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            default_strategy: Strategy::RoundRobin,
        }
    }
}

/// Fan-out configuration (spec.md §4.8).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FanOutConfig {
    pub default_mode: FanOutMode,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            default_mode: FanOutMode::All,
        }
    }
}

/// The full, typed configuration record enumerating every option in
/// spec.md §6. This is the record the rest of the crate is built against;
/// loading is a separate concern (`CoreConfig::load`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub max_retries: u32,
    pub default_call_timeout_ms: u64,
    pub circuit: CircuitConfig,
    pub health: HealthConfig,
    pub load_balancer: LoadBalancerConfig,
    pub ranker_weights: RankerWeights,
    pub fanout: FanOutConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            default_call_timeout_ms: 60_000,
            circuit: CircuitConfig::default(),
            health: HealthConfig::default(),
            load_balancer: LoadBalancerConfig::default(),
            ranker_weights: RankerWeights::default(),
            fanout: FanOutConfig::default(),
        }
    }
}

/// Deserialization target used only to reject unknown keys before the
/// config is accepted; structurally identical to `CoreConfig`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default = "default_max_retries")]
    max_retries: u32,
    #[serde(default = "default_call_timeout_ms")]
    default_call_timeout_ms: u64,
    #[serde(default)]
    circuit: RawCircuitConfig,
    #[serde(default)]
    health: RawHealthConfig,
    #[serde(default)]
    load_balancer: RawLoadBalancerConfig,
    #[serde(default)]
    ranker_weights: RankerWeights,
    #[serde(default)]
    fanout: RawFanOutConfig,
}

fn default_max_retries() -> u32 {
    1
}
fn default_call_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct RawCircuitConfig {
    failure_threshold: u32,
    success_threshold: u32,
    timeout_ms: u64,
}
impl Default for RawCircuitConfig {
    fn default() -> Self {
        let d = CircuitConfig::default();
        Self {
            failure_threshold: d.failure_threshold,
            success_threshold: d.success_threshold,
            timeout_ms: d.timeout_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct RawHealthConfig {
    window_size: usize,
    unhealthy_run_length: u32,
}
impl Default for RawHealthConfig {
    fn default() -> Self {
        let d = HealthConfig::default();
        Self {
            window_size: d.window_size,
            unhealthy_run_length: d.unhealthy_run_length,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct RawLoadBalancerConfig {
    default_strategy: Strategy,
}
impl Default for RawLoadBalancerConfig {
    fn default() -> Self {
        Self {
            default_strategy: Strategy::RoundRobin,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct RawFanOutConfig {
    default_mode: FanOutMode,
}
impl Default for RawFanOutConfig {
    fn default() -> Self {
        Self {
            default_mode: FanOutMode::All,
        }
    }
}

impl From<RawConfig> for CoreConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            max_retries: raw.max_retries,
            default_call_timeout_ms: raw.default_call_timeout_ms,
            circuit: CircuitConfig {
                failure_threshold: raw.circuit.failure_threshold,
                success_threshold: raw.circuit.success_threshold,
                timeout_ms: raw.circuit.timeout_ms,
            },
            health: HealthConfig {
                window_size: raw.health.window_size,
                unhealthy_run_length: raw.health.unhealthy_run_length,
            },
            load_balancer: LoadBalancerConfig {
                default_strategy: raw.load_balancer.default_strategy,
            },
            ranker_weights: raw.ranker_weights,
            fanout: FanOutConfig {
                default_mode: raw.fanout.default_mode,
            },
        }
    }
}

impl CoreConfig {
    /// Loads configuration layering an optional file over environment
    /// variables prefixed `LLM_MESH_` (e.g. `LLM_MESH_MAX_RETRIES=2`) over
    /// the built-in defaults, matching how the teacher's binaries load
    /// settings via the `config` crate + `dotenv`.
    pub fn load(config_file: Option<&str>) -> CoreResult<Self> {
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("LLM_MESH")
                .separator("__")
                .try_parsing(true),
        );

        let settled = builder.build()?;
        let raw: RawConfig = settled.try_deserialize()?;
        Ok(raw.into())
    }

    /// A map of every recognized key and its current value, for `/health`
    /// or debugging — never includes anything not already public on this
    /// struct.
    pub fn as_map(&self) -> HashMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.max_retries, 1);
        assert_eq!(cfg.default_call_timeout_ms, 60_000);
        assert_eq!(cfg.circuit.failure_threshold, 5);
        assert_eq!(cfg.circuit.success_threshold, 2);
        assert_eq!(cfg.circuit.timeout_ms, 60_000);
        assert_eq!(cfg.health.window_size, 100);
    }

    #[test]
    fn load_with_no_file_falls_back_to_defaults() {
        let cfg = CoreConfig::load(None).expect("defaults should always load");
        assert_eq!(cfg.max_retries, CoreConfig::default().max_retries);
    }

    #[test]
    fn env_override_applies() {
        std::env::set_var("LLM_MESH_MAX_RETRIES", "7");
        let cfg = CoreConfig::load(None).expect("should load with env override");
        std::env::remove_var("LLM_MESH_MAX_RETRIES");
        assert_eq!(cfg.max_retries, 7);
    }
}
