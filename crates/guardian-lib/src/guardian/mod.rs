//! Guardian state machine and control loop
//!
//! This module is the decision core: measurement windows with hysteresis,
//! the cooldown/lockdown tracker for destructive actions, and the control
//! loop that owns all of it as the system's single writer.

mod cooldown;
mod hysteresis;
mod r#loop;
mod window;

pub use cooldown::{CooldownConfig, CooldownTracker, KillOutcome};
pub use hysteresis::{
    DegradeReason, Evaluation, GuardianAction, HysteresisConfig, HysteresisEvaluator,
    MetricThresholds, TriggerMetric, DEFAULT_MEASUREMENT_WINDOW, DEFAULT_RECOVERY_WINDOW,
};
pub use r#loop::{GuardianCommand, GuardianHandles, GuardianLoop, GuardianLoopConfig};
pub use window::MeasurementWindow;
