//! Agent configuration
//!
//! All tunables arrive as `GUARDIAN_`-prefixed environment variables and
//! deserialize into one typed struct. Bounds are validated once here at
//! startup; the component configs built from this struct can be trusted
//! everywhere else.

use anyhow::{Context, Result};
use guardian_lib::brownout::BrownoutConfig;
use guardian_lib::config::{validate_fraction, validate_range, ConfigError};
use guardian_lib::correlation::LoggerConfig;
use guardian_lib::gate::GateConfig;
use guardian_lib::guardian::{
    CooldownConfig, GuardianLoopConfig, HysteresisConfig, MetricThresholds,
};
use guardian_lib::sampler::HostSamplerConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Guardian identifier; defaults to the host name
    #[serde(default = "default_guardian_id")]
    pub guardian_id: String,

    /// API server port for status/metrics/control surface
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Sampling and evaluation period in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_s: u64,

    /// Samples per measurement window
    #[serde(default = "default_measurement_window")]
    pub measurement_window: usize,

    /// RAM thresholds
    #[serde(default = "default_ram_soft")]
    pub ram_soft_pct: f64,
    #[serde(default = "default_ram_hard")]
    pub ram_hard_pct: f64,
    #[serde(default = "default_ram_recovery")]
    pub ram_recovery_pct: f64,

    /// CPU thresholds
    #[serde(default = "default_cpu_soft")]
    pub cpu_soft_pct: f64,
    #[serde(default = "default_cpu_hard")]
    pub cpu_hard_pct: f64,
    #[serde(default = "default_cpu_recovery")]
    pub cpu_recovery_pct: f64,

    /// Wall-clock seconds below recovery before returning to normal
    #[serde(default = "default_recovery_window")]
    pub recovery_window_s: u64,

    /// Cooldown and lockdown tuning
    #[serde(default = "default_cooldown_short")]
    pub kill_cooldown_short_s: u64,
    #[serde(default = "default_cooldown_long")]
    pub kill_cooldown_long_s: u64,
    #[serde(default = "default_max_kills")]
    pub max_kills_per_window: usize,
    #[serde(default = "default_lockdown_duration")]
    pub lockdown_duration_s: u64,

    /// Gate tuning
    #[serde(default = "default_cache_ttl_ms")]
    pub gate_cache_ttl_ms: u64,
    #[serde(default = "default_gate_timeout_ms")]
    pub gate_timeout_ms: u64,
    #[serde(default = "default_unknown_threshold")]
    pub unknown_threshold: u32,

    /// Base URL of the inference runtime supervisor; empty uses a noop stub
    #[serde(default)]
    pub runtime_endpoint: String,

    /// Substring matched against process names for inference presence
    #[serde(default = "default_inference_process")]
    pub inference_process_name: String,

    /// Directory for the correlation log
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_guardian_id() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "guardian".to_string())
}

fn default_api_port() -> u16 {
    8090
}

fn default_poll_interval() -> u64 {
    5
}

fn default_measurement_window() -> usize {
    5
}

fn default_ram_soft() -> f64 {
    0.85
}

fn default_ram_hard() -> f64 {
    0.92
}

fn default_ram_recovery() -> f64 {
    0.70
}

fn default_cpu_soft() -> f64 {
    0.90
}

fn default_cpu_hard() -> f64 {
    0.97
}

fn default_cpu_recovery() -> f64 {
    0.75
}

fn default_recovery_window() -> u64 {
    120
}

fn default_cooldown_short() -> u64 {
    300
}

fn default_cooldown_long() -> u64 {
    3600
}

fn default_max_kills() -> usize {
    3
}

fn default_lockdown_duration() -> u64 {
    1800
}

fn default_cache_ttl_ms() -> u64 {
    250
}

fn default_gate_timeout_ms() -> u64 {
    250
}

fn default_unknown_threshold() -> u32 {
    3
}

fn default_inference_process() -> String {
    "inference".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            guardian_id: default_guardian_id(),
            api_port: default_api_port(),
            poll_interval_s: default_poll_interval(),
            measurement_window: default_measurement_window(),
            ram_soft_pct: default_ram_soft(),
            ram_hard_pct: default_ram_hard(),
            ram_recovery_pct: default_ram_recovery(),
            cpu_soft_pct: default_cpu_soft(),
            cpu_hard_pct: default_cpu_hard(),
            cpu_recovery_pct: default_cpu_recovery(),
            recovery_window_s: default_recovery_window(),
            kill_cooldown_short_s: default_cooldown_short(),
            kill_cooldown_long_s: default_cooldown_long(),
            max_kills_per_window: default_max_kills(),
            lockdown_duration_s: default_lockdown_duration(),
            gate_cache_ttl_ms: default_cache_ttl_ms(),
            gate_timeout_ms: default_gate_timeout_ms(),
            unknown_threshold: default_unknown_threshold(),
            runtime_endpoint: String::new(),
            inference_process_name: default_inference_process(),
            log_dir: default_log_dir(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("GUARDIAN"))
            .build()
            .context("Failed to read environment configuration")?;

        let config: AgentConfig = config
            .try_deserialize()
            .unwrap_or_else(|_| AgentConfig::default());
        config.validate()?;
        Ok(config)
    }

    /// Validate all bounds once at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, soft, hard) in [
            ("ram", self.ram_soft_pct, self.ram_hard_pct),
            ("cpu", self.cpu_soft_pct, self.cpu_hard_pct),
        ] {
            validate_fraction("soft_pct", soft)?;
            validate_fraction("hard_pct", hard)?;
            if soft >= hard {
                return Err(ConfigError::ThresholdOrder { field, soft, hard });
            }
        }
        validate_fraction("ram_recovery_pct", self.ram_recovery_pct)?;
        validate_fraction("cpu_recovery_pct", self.cpu_recovery_pct)?;
        validate_range("measurement_window", self.measurement_window as i64, 1, 120)?;
        validate_range("max_kills_per_window", self.max_kills_per_window as i64, 1, 100)?;
        validate_range("unknown_threshold", self.unknown_threshold as i64, 1, 100)?;
        self.brownout_config().validate()?;
        Ok(())
    }

    pub fn hysteresis_config(&self) -> HysteresisConfig {
        HysteresisConfig {
            measurement_window: self.measurement_window,
            ram: MetricThresholds::new(self.ram_soft_pct, self.ram_hard_pct, self.ram_recovery_pct),
            cpu: MetricThresholds::new(self.cpu_soft_pct, self.cpu_hard_pct, self.cpu_recovery_pct),
            recovery_window: Duration::from_secs(self.recovery_window_s),
        }
    }

    pub fn cooldown_config(&self) -> CooldownConfig {
        CooldownConfig {
            kill_cooldown_short: Duration::from_secs(self.kill_cooldown_short_s),
            kill_cooldown_long: Duration::from_secs(self.kill_cooldown_long_s),
            max_kills_per_window: self.max_kills_per_window,
            lockdown_duration: Duration::from_secs(self.lockdown_duration_s),
            ..Default::default()
        }
    }

    pub fn loop_config(&self) -> GuardianLoopConfig {
        GuardianLoopConfig {
            poll_interval: Duration::from_secs(self.poll_interval_s),
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            cache_ttl: Duration::from_millis(self.gate_cache_ttl_ms),
            fetch_timeout: Duration::from_millis(self.gate_timeout_ms),
            unknown_threshold: self.unknown_threshold,
            ..Default::default()
        }
    }

    pub fn sampler_config(&self) -> HostSamplerConfig {
        HostSamplerConfig {
            inference_process_name: self.inference_process_name.clone(),
            ..Default::default()
        }
    }

    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            path: self.log_dir.join("guardian.ndjson"),
            ..Default::default()
        }
    }

    pub fn brownout_config(&self) -> BrownoutConfig {
        BrownoutConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_order_enforced() {
        let config = AgentConfig {
            ram_soft_pct: 0.95,
            ram_hard_pct: 0.92,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        let config = AgentConfig {
            cpu_recovery_pct: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_component_configs_built_from_values() {
        let config = AgentConfig {
            poll_interval_s: 7,
            gate_cache_ttl_ms: 100,
            unknown_threshold: 5,
            ..Default::default()
        };
        assert_eq!(config.loop_config().poll_interval, Duration::from_secs(7));
        assert_eq!(config.gate_config().cache_ttl, Duration::from_millis(100));
        assert_eq!(config.gate_config().unknown_threshold, 5);
        assert_eq!(config.hysteresis_config().ram.soft_pct, 0.85);
    }
}
