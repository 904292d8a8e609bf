//! Hysteresis state machine
//!
//! Maintains one measurement window per metric and decides guardian state
//! transitions from an ordered rule list. A threshold only acts once every
//! sample in a full window breaches it, and recovery additionally requires
//! the windows to stay below the recovery threshold for a wall-clock
//! interval, so sparse sampling under load cannot fake a recovery.

use super::cooldown::{CooldownConfig, CooldownTracker, KillOutcome};
use super::window::MeasurementWindow;
use crate::models::{CooldownState, GuardianState, GuardianStatusSnapshot, MetricSample};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default number of consecutive samples required to act
pub const DEFAULT_MEASUREMENT_WINDOW: usize = 5;

/// Default wall-clock interval the windows must stay below recovery
pub const DEFAULT_RECOVERY_WINDOW: Duration = Duration::from_secs(120);

/// Soft/hard/recovery thresholds for a single metric
#[derive(Debug, Clone, Copy)]
pub struct MetricThresholds {
    /// Sustained breach degrades service
    pub soft_pct: f64,
    /// Sustained breach kills the inference process
    pub hard_pct: f64,
    /// Windows must stay below this to recover
    pub recovery_pct: f64,
}

impl MetricThresholds {
    pub fn new(soft_pct: f64, hard_pct: f64, recovery_pct: f64) -> Self {
        Self {
            soft_pct,
            hard_pct,
            recovery_pct,
        }
    }
}

/// Configuration for the hysteresis evaluator
#[derive(Debug, Clone)]
pub struct HysteresisConfig {
    /// Samples per measurement window
    pub measurement_window: usize,
    /// RAM thresholds
    pub ram: MetricThresholds,
    /// CPU thresholds
    pub cpu: MetricThresholds,
    /// Wall-clock time below recovery before returning to normal
    pub recovery_window: Duration,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            measurement_window: DEFAULT_MEASUREMENT_WINDOW,
            ram: MetricThresholds::new(0.85, 0.92, 0.70),
            cpu: MetricThresholds::new(0.90, 0.97, 0.75),
            recovery_window: DEFAULT_RECOVERY_WINDOW,
        }
    }
}

/// Which metric's window satisfied a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMetric {
    Ram,
    Cpu,
}

impl TriggerMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerMetric::Ram => "ram",
            TriggerMetric::Cpu => "cpu",
        }
    }
}

/// Why the state entered degraded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeReason {
    Metric(TriggerMetric),
    LockdownExpired,
}

impl DegradeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradeReason::Metric(TriggerMetric::Ram) => "ram",
            DegradeReason::Metric(TriggerMetric::Cpu) => "cpu",
            DegradeReason::LockdownExpired => "lockdown_expired",
        }
    }
}

/// Side effect decided by an evaluation, carried out by the control loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardianAction {
    /// A kill executed; fire the kill command toward the runtime
    KillExecuted {
        reason: String,
        lockdown_engaged: bool,
    },
    /// A hard trigger fired inside the cooldown; log an alert, change nothing
    KillSuppressed { reason: String },
    /// The state entered degraded; activate the brownout profile
    EnterDegraded { reason: DegradeReason },
    /// The state returned to normal; revert to the primary profile
    Recovered,
}

/// Result of evaluating one sample
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub previous: GuardianState,
    pub state: GuardianState,
    pub transitioned: bool,
    pub action: Option<GuardianAction>,
}

/// The guardian state machine
///
/// Sole owner of the guardian state, the measurement windows, and the
/// cooldown tracker. Runs on the control loop only; everything else reads
/// snapshots.
pub struct HysteresisEvaluator {
    config: HysteresisConfig,
    state: GuardianState,
    ram_window: MeasurementWindow,
    cpu_window: MeasurementWindow,
    cooldown: CooldownTracker,
    state_change_time: Option<DateTime<Utc>>,
    below_recovery_since: Option<DateTime<Utc>>,
}

impl HysteresisEvaluator {
    pub fn new(config: HysteresisConfig, cooldown: CooldownConfig) -> Self {
        let window = config.measurement_window;
        Self {
            config,
            state: GuardianState::Normal,
            ram_window: MeasurementWindow::new(window),
            cpu_window: MeasurementWindow::new(window),
            cooldown: CooldownTracker::new(cooldown),
            state_change_time: None,
            below_recovery_since: None,
        }
    }

    /// Evaluate one sample against the ordered rule list
    ///
    /// Rules, first match wins:
    /// 1. active lockdown holds the state;
    /// 2. a hard-threshold window requests a kill (executed -> emergency,
    ///    suppressed -> unchanged);
    /// 3. a soft-threshold window degrades (idempotent);
    /// 4. sustained sub-recovery windows restore normal;
    /// 5. otherwise nothing changes.
    pub fn evaluate(&mut self, sample: &MetricSample) -> Evaluation {
        let now = sample.timestamp;
        let previous = self.state;

        self.ram_window.push(sample.ram_pct);
        self.cpu_window.push(sample.cpu_pct);

        // Rule 1: an active lockdown pins the state
        if self.state == GuardianState::Lockdown {
            if self.cooldown.in_lockdown(now) {
                return self.no_transition(previous);
            }
            // Expired: fall back to degraded and let recovery take over.
            // The brownout stays active until the recovery rule clears it.
            self.transition_to(GuardianState::Degraded, now);
            return Evaluation {
                previous,
                state: self.state,
                transitioned: true,
                action: Some(GuardianAction::EnterDegraded {
                    reason: DegradeReason::LockdownExpired,
                }),
            };
        }

        // Rule 2: sustained hard breach requests a kill
        if let Some(metric) = self.hard_trigger() {
            let reason = self.breach_reason(metric, sample);
            let outcome = self.cooldown.request_kill(&reason, Some(sample), now);
            return match outcome {
                KillOutcome::Executed { lockdown_engaged } => {
                    let target = if lockdown_engaged {
                        GuardianState::Lockdown
                    } else {
                        GuardianState::Emergency
                    };
                    let transitioned = self.transition_to(target, now);
                    Evaluation {
                        previous,
                        state: self.state,
                        transitioned,
                        action: Some(GuardianAction::KillExecuted {
                            reason,
                            lockdown_engaged,
                        }),
                    }
                }
                KillOutcome::SuppressedLockdown { .. } => {
                    let transitioned = self.transition_to(GuardianState::Lockdown, now);
                    Evaluation {
                        previous,
                        state: self.state,
                        transitioned,
                        action: Some(GuardianAction::KillSuppressed { reason }),
                    }
                }
                KillOutcome::SuppressedCooldown { .. } => Evaluation {
                    previous,
                    state: self.state,
                    transitioned: false,
                    action: Some(GuardianAction::KillSuppressed { reason }),
                },
            };
        }

        // Rule 3: sustained soft breach degrades
        if let Some(metric) = self.soft_trigger() {
            if self.state == GuardianState::Degraded {
                // Re-entering degraded is a no-op on the profile but
                // refreshes the state change time
                self.state_change_time = Some(now);
                return self.no_transition(previous);
            }
            self.transition_to(GuardianState::Degraded, now);
            return Evaluation {
                previous,
                state: self.state,
                transitioned: true,
                action: Some(GuardianAction::EnterDegraded {
                    reason: DegradeReason::Metric(metric),
                }),
            };
        }

        // Rule 4: sustained sub-recovery windows restore normal
        if matches!(
            self.state,
            GuardianState::Degraded | GuardianState::Emergency
        ) {
            if self.below_recovery() {
                let since = *self.below_recovery_since.get_or_insert(now);
                let held = (now - since).to_std().unwrap_or_default();
                if held >= self.config.recovery_window {
                    self.transition_to(GuardianState::Normal, now);
                    return Evaluation {
                        previous,
                        state: self.state,
                        transitioned: true,
                        action: Some(GuardianAction::Recovered),
                    };
                }
            } else {
                self.below_recovery_since = None;
            }
        }

        // Rule 5: nothing to do
        self.no_transition(previous)
    }

    /// Force the conservative post-reset state
    ///
    /// Clears lockdown/cooldown state and drops to degraded; the caller is
    /// responsible for applying the minimal-capability profile.
    pub fn emergency_reset(&mut self, now: DateTime<Utc>) -> Evaluation {
        let previous = self.state;
        self.cooldown.emergency_reset();
        self.ram_window.clear();
        self.cpu_window.clear();
        let transitioned = self.transition_to(GuardianState::Degraded, now);
        Evaluation {
            previous,
            state: self.state,
            transitioned,
            action: None,
        }
    }

    pub fn state(&self) -> GuardianState {
        self.state
    }

    pub fn state_change_time(&self) -> Option<DateTime<Utc>> {
        self.state_change_time
    }

    pub fn cooldown_state(&self, now: DateTime<Utc>) -> CooldownState {
        self.cooldown.state(now)
    }

    /// Immutable status snapshot for publication
    pub fn snapshot(&self, now: DateTime<Utc>) -> GuardianStatusSnapshot {
        GuardianStatusSnapshot::new(self.state, now)
    }

    fn no_transition(&self, previous: GuardianState) -> Evaluation {
        Evaluation {
            previous,
            state: self.state,
            transitioned: false,
            action: None,
        }
    }

    /// Record a state change; returns whether the state actually changed
    fn transition_to(&mut self, target: GuardianState, now: DateTime<Utc>) -> bool {
        self.state_change_time = Some(now);
        if target != GuardianState::Normal {
            self.below_recovery_since = None;
        }
        if self.state == target {
            return false;
        }
        self.state = target;
        true
    }

    fn hard_trigger(&self) -> Option<TriggerMetric> {
        if self.ram_window.all_above(self.config.ram.hard_pct) {
            Some(TriggerMetric::Ram)
        } else if self.cpu_window.all_above(self.config.cpu.hard_pct) {
            Some(TriggerMetric::Cpu)
        } else {
            None
        }
    }

    fn soft_trigger(&self) -> Option<TriggerMetric> {
        if self.ram_window.all_above(self.config.ram.soft_pct) {
            Some(TriggerMetric::Ram)
        } else if self.cpu_window.all_above(self.config.cpu.soft_pct) {
            Some(TriggerMetric::Cpu)
        } else {
            None
        }
    }

    fn below_recovery(&self) -> bool {
        self.ram_window.all_below(self.config.ram.recovery_pct)
            && self.cpu_window.all_below(self.config.cpu.recovery_pct)
    }

    fn breach_reason(&self, metric: TriggerMetric, sample: &MetricSample) -> String {
        let (value, threshold) = match metric {
            TriggerMetric::Ram => (sample.ram_pct, self.config.ram.hard_pct),
            TriggerMetric::Cpu => (sample.cpu_pct, self.config.cpu.hard_pct),
        };
        format!(
            "{} above hard threshold for full window ({:.3} >= {:.3})",
            metric.as_str(),
            value,
            threshold
        )
    }
}
