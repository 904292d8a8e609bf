//! Core data models for the inference guardian

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Host resource sample produced by the metric sampler
///
/// Immutable once created. Percentages are normalized to the 0..1 range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub ram_pct: f64,
    pub cpu_pct: f64,
    pub disk_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_c: Option<f64>,
    pub inference_pids: Vec<u32>,
}

impl MetricSample {
    /// Whether the inference runtime was observed at sampling time
    pub fn inference_up(&self) -> bool {
        !self.inference_pids.is_empty()
    }
}

/// Guardian control state
///
/// Owned exclusively by the hysteresis evaluator; every other component
/// only sees snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardianState {
    Normal,
    Degraded,
    Emergency,
    Lockdown,
}

impl GuardianState {
    /// Map the internal state to the coarse status published on /health
    pub fn health_status(&self) -> HealthStatus {
        match self {
            GuardianState::Normal => HealthStatus::Ok,
            GuardianState::Degraded => HealthStatus::Degraded,
            GuardianState::Emergency | GuardianState::Lockdown => HealthStatus::Emergency,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GuardianState::Normal => "normal",
            GuardianState::Degraded => "degraded",
            GuardianState::Emergency => "emergency",
            GuardianState::Lockdown => "lockdown",
        }
    }
}

impl std::fmt::Display for GuardianState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse status exposed to external consumers of the status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Emergency,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one artifact crossing the boundary to the admission gate
///
/// Replaced atomically on every evaluation tick; never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianStatusSnapshot {
    pub status: HealthStatus,
    pub detail_status: GuardianState,
    pub timestamp: DateTime<Utc>,
}

impl GuardianStatusSnapshot {
    pub fn new(state: GuardianState, timestamp: DateTime<Utc>) -> Self {
        Self {
            status: state.health_status(),
            detail_status: state,
            timestamp,
        }
    }
}

/// Record of a destructive kill decision
///
/// Appended to a rolling in-memory history on every executed kill; entries
/// are never mutated, only pruned by age.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillEvent {
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_snapshot: Option<MetricSample>,
}

/// Snapshot of the cooldown tracker for status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_kill_at: Option<DateTime<Utc>>,
    pub kills_in_window: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockdown_until: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_health_mapping() {
        assert_eq!(GuardianState::Normal.health_status(), HealthStatus::Ok);
        assert_eq!(
            GuardianState::Degraded.health_status(),
            HealthStatus::Degraded
        );
        assert_eq!(
            GuardianState::Emergency.health_status(),
            HealthStatus::Emergency
        );
        // Lockdown is reported as emergency to external consumers
        assert_eq!(
            GuardianState::Lockdown.health_status(),
            HealthStatus::Emergency
        );
    }

    #[test]
    fn test_status_serialization() {
        let snapshot = GuardianStatusSnapshot::new(GuardianState::Degraded, Utc::now());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["detail_status"], "degraded");

        let snapshot = GuardianStatusSnapshot::new(GuardianState::Lockdown, Utc::now());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "emergency");
        assert_eq!(json["detail_status"], "lockdown");
    }

    #[test]
    fn test_inference_up() {
        let mut sample = MetricSample {
            timestamp: Utc::now(),
            ram_pct: 0.5,
            cpu_pct: 0.5,
            disk_pct: 0.4,
            temp_c: None,
            inference_pids: vec![1234],
        };
        assert!(sample.inference_up());
        sample.inference_pids.clear();
        assert!(!sample.inference_up());
    }
}
