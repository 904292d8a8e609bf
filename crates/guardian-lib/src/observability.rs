//! Observability infrastructure for the guardian
//!
//! Provides:
//! - Prometheus metrics (state, transitions, kills, gate counters, decision latency)
//! - Structured JSON logging with tracing

use crate::models::GuardianState;
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for gate decision latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<GuardianMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct GuardianMetricsInner {
    guardian_state: IntGauge,
    state_transitions: IntCounterVec,
    kills_executed: IntCounter,
    kills_suppressed: IntCounter,
    lockdowns_engaged: IntCounter,
    brownout_level: IntGauge,
    sample_ram_pct: Gauge,
    sample_cpu_pct: Gauge,
    gate_requests: IntCounter,
    gate_blocked: IntCounter,
    gate_degraded: IntCounter,
    gate_decision_latency_seconds: Histogram,
}

impl GuardianMetricsInner {
    fn new() -> Self {
        Self {
            guardian_state: register_int_gauge!(
                "guardian_state",
                "Current guardian state (0=normal, 1=degraded, 2=emergency, 3=lockdown)"
            )
            .expect("Failed to register guardian_state"),

            state_transitions: register_int_counter_vec!(
                "guardian_state_transitions_total",
                "State transitions by target state",
                &["to"]
            )
            .expect("Failed to register state_transitions"),

            kills_executed: register_int_counter!(
                "guardian_kills_executed_total",
                "Inference process kills executed"
            )
            .expect("Failed to register kills_executed"),

            kills_suppressed: register_int_counter!(
                "guardian_kills_suppressed_total",
                "Kill requests suppressed by cooldown or lockdown"
            )
            .expect("Failed to register kills_suppressed"),

            lockdowns_engaged: register_int_counter!(
                "guardian_lockdowns_engaged_total",
                "Lockdowns engaged after repeated kills"
            )
            .expect("Failed to register lockdowns_engaged"),

            brownout_level: register_int_gauge!(
                "guardian_brownout_level",
                "Active brownout level (0=none, 1=light, 2=moderate, 3=heavy)"
            )
            .expect("Failed to register brownout_level"),

            sample_ram_pct: register_gauge!(
                "guardian_sample_ram_pct",
                "Most recent sampled RAM usage fraction"
            )
            .expect("Failed to register sample_ram_pct"),

            sample_cpu_pct: register_gauge!(
                "guardian_sample_cpu_pct",
                "Most recent sampled CPU usage fraction"
            )
            .expect("Failed to register sample_cpu_pct"),

            gate_requests: register_int_counter!(
                "gate_requests_total",
                "Requests seen by the admission gate"
            )
            .expect("Failed to register gate_requests"),

            gate_blocked: register_int_counter!(
                "gate_requests_blocked_total",
                "Requests blocked with 503 by the admission gate"
            )
            .expect("Failed to register gate_blocked"),

            gate_degraded: register_int_counter!(
                "gate_requests_degraded_total",
                "Inference requests throttled with 429 by the admission gate"
            )
            .expect("Failed to register gate_degraded"),

            gate_decision_latency_seconds: register_histogram!(
                "gate_decision_latency_seconds",
                "Time spent deciding admission per request",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register gate_decision_latency_seconds"),
        }
    }
}

/// Guardian metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct GuardianMetrics {
    _private: (),
}

impl Default for GuardianMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardianMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GuardianMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GuardianMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record the current guardian state
    pub fn set_state(&self, state: GuardianState) {
        let code = match state {
            GuardianState::Normal => 0,
            GuardianState::Degraded => 1,
            GuardianState::Emergency => 2,
            GuardianState::Lockdown => 3,
        };
        self.inner().guardian_state.set(code);
    }

    /// Count a transition into a target state
    pub fn inc_transition(&self, to: GuardianState) {
        self.inner()
            .state_transitions
            .with_label_values(&[to.as_str()])
            .inc();
    }

    pub fn inc_kills_executed(&self) {
        self.inner().kills_executed.inc();
    }

    pub fn inc_kills_suppressed(&self) {
        self.inner().kills_suppressed.inc();
    }

    pub fn inc_lockdowns_engaged(&self) {
        self.inner().lockdowns_engaged.inc();
    }

    /// Record the active brownout level (None clears to 0)
    pub fn set_brownout_level(&self, level: Option<crate::brownout::BrownoutLevel>) {
        use crate::brownout::BrownoutLevel;
        let code = match level {
            None => 0,
            Some(BrownoutLevel::Light) => 1,
            Some(BrownoutLevel::Moderate) => 2,
            Some(BrownoutLevel::Heavy) => 3,
        };
        self.inner().brownout_level.set(code);
    }

    /// Record the latest sample values
    pub fn observe_sample(&self, ram_pct: f64, cpu_pct: f64) {
        self.inner().sample_ram_pct.set(ram_pct);
        self.inner().sample_cpu_pct.set(cpu_pct);
    }

    pub fn inc_gate_requests(&self) {
        self.inner().gate_requests.inc();
    }

    pub fn inc_gate_blocked(&self) {
        self.inner().gate_blocked.inc();
    }

    pub fn inc_gate_degraded(&self) {
        self.inner().gate_degraded.inc();
    }

    pub fn observe_gate_decision_latency(&self, duration_secs: f64) {
        self.inner()
            .gate_decision_latency_seconds
            .observe(duration_secs);
    }
}

/// Structured logger for guardian events
///
/// Provides consistent JSON-formatted logging for transitions, kills,
/// brownout changes, and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    guardian_id: String,
}

impl StructuredLogger {
    pub fn new(guardian_id: impl Into<String>) -> Self {
        Self {
            guardian_id: guardian_id.into(),
        }
    }

    /// Log a state transition
    pub fn log_transition(&self, from: GuardianState, to: GuardianState, trigger: &str) {
        info!(
            event = "state_transition",
            guardian_id = %self.guardian_id,
            from = %from,
            to = %to,
            trigger = %trigger,
            "Guardian state changed"
        );
    }

    /// Log an executed kill
    pub fn log_kill(&self, reason: &str, lockdown_engaged: bool) {
        warn!(
            event = "kill_executed",
            guardian_id = %self.guardian_id,
            reason = %reason,
            lockdown_engaged = lockdown_engaged,
            "Inference process kill executed"
        );
    }

    /// Log a suppressed kill request
    pub fn log_suppressed_kill(&self, reason: &str) {
        warn!(
            event = "suppressed_kill",
            guardian_id = %self.guardian_id,
            reason = %reason,
            "Kill request suppressed by cooldown"
        );
    }

    /// Log a lockdown engagement at critical severity
    pub fn log_lockdown_engaged(&self, until: chrono::DateTime<chrono::Utc>) {
        error!(
            event = "lockdown_engaged",
            guardian_id = %self.guardian_id,
            lockdown_until = %until.to_rfc3339(),
            "Kill limit reached, lockdown engaged"
        );
    }

    /// Log a brownout activation
    pub fn log_brownout_activated(&self, level: &str, model: &str) {
        info!(
            event = "brownout_activated",
            guardian_id = %self.guardian_id,
            level = %level,
            model = %model,
            "Brownout profile activated"
        );
    }

    /// Log a brownout deactivation
    pub fn log_brownout_deactivated(&self, model: &str) {
        info!(
            event = "brownout_deactivated",
            guardian_id = %self.guardian_id,
            model = %model,
            "Primary profile restored"
        );
    }

    /// Log an emergency reset
    pub fn log_emergency_reset(&self) {
        warn!(
            event = "emergency_reset",
            guardian_id = %self.guardian_id,
            "Emergency reset forced minimal-capability profile"
        );
    }

    /// Log a skipped sampling tick
    pub fn log_sample_failure(&self, error: &str) {
        warn!(
            event = "sample_failed",
            guardian_id = %self.guardian_id,
            error = %error,
            "Metric sampling failed, retaining last known state"
        );
    }

    /// Log guardian startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "guardian_started",
            guardian_id = %self.guardian_id,
            version = %version,
            "Guardian started"
        );
    }

    /// Log guardian shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "guardian_shutdown",
            guardian_id = %self.guardian_id,
            reason = %reason,
            "Guardian shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guardian_metrics_creation() {
        // Metrics are registered against the global registry exactly once;
        // multiple handles share the same instance.
        let metrics = GuardianMetrics::new();

        metrics.set_state(GuardianState::Degraded);
        metrics.inc_transition(GuardianState::Degraded);
        metrics.inc_kills_executed();
        metrics.inc_kills_suppressed();
        metrics.observe_sample(0.8, 0.4);
        metrics.inc_gate_requests();
        metrics.observe_gate_decision_latency(0.001);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("guardian-test");
        assert_eq!(logger.guardian_id, "guardian-test");
    }
}
