//! Guardian control loop
//!
//! A single task owns the evaluator and with it the guardian state, the
//! measurement windows, the cooldown tracker, and the brownout decisions.
//! Nothing else mutates them, so the hot evaluation path needs no locking.
//! Each tick samples the host, runs the state machine, performs the decided
//! side effects, and atomically replaces the published status snapshot.

use super::hysteresis::{Evaluation, GuardianAction, HysteresisEvaluator};
use crate::brownout::{BrownoutLevel, BrownoutManager};
use crate::correlation::{CorrelationLogger, LogLevel};
use crate::health::{components, HealthRegistry};
use crate::models::{GuardianState, GuardianStatusSnapshot, MetricSample};
use crate::observability::{GuardianMetrics, StructuredLogger};
use crate::runtime::InferenceRuntime;
use crate::sampler::MetricSampler;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::time::interval;
use tracing::{info, warn};

/// Default evaluation period
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Operator commands handled between ticks
#[derive(Debug, Clone)]
pub enum GuardianCommand {
    /// Clear lockdown/cooldown state and force the conservative profile
    EmergencyReset,
}

/// Configuration for the control loop
#[derive(Debug, Clone)]
pub struct GuardianLoopConfig {
    /// Sampling and evaluation period
    pub poll_interval: Duration,
}

impl Default for GuardianLoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// The guardian control loop
pub struct GuardianLoop {
    config: GuardianLoopConfig,
    sampler: Arc<dyn MetricSampler>,
    evaluator: HysteresisEvaluator,
    brownout: Arc<RwLock<BrownoutManager>>,
    runtime: Arc<dyn InferenceRuntime>,
    correlation: Arc<CorrelationLogger>,
    logger: StructuredLogger,
    metrics: GuardianMetrics,
    health: HealthRegistry,
    status_tx: watch::Sender<GuardianStatusSnapshot>,
    command_rx: mpsc::Receiver<GuardianCommand>,
    // Keeps the command channel open even if every external sender drops,
    // so the recv arm pends instead of resolving to None in a tight loop
    _command_tx: mpsc::Sender<GuardianCommand>,
}

/// Handles the loop hands back to its creator
pub struct GuardianHandles {
    /// Read side of the published status snapshot
    pub status_rx: watch::Receiver<GuardianStatusSnapshot>,
    /// Sender for operator commands such as emergency reset
    pub command_tx: mpsc::Sender<GuardianCommand>,
}

impl GuardianLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: GuardianLoopConfig,
        sampler: Arc<dyn MetricSampler>,
        evaluator: HysteresisEvaluator,
        brownout: Arc<RwLock<BrownoutManager>>,
        runtime: Arc<dyn InferenceRuntime>,
        correlation: Arc<CorrelationLogger>,
        logger: StructuredLogger,
        metrics: GuardianMetrics,
        health: HealthRegistry,
    ) -> (Self, GuardianHandles) {
        let initial = GuardianStatusSnapshot::new(GuardianState::Normal, Utc::now());
        let (status_tx, status_rx) = watch::channel(initial);
        let (command_tx, command_rx) = mpsc::channel(8);

        let guardian_loop = Self {
            config,
            sampler,
            evaluator,
            brownout,
            runtime,
            correlation,
            logger,
            metrics,
            health,
            status_tx,
            command_rx,
            _command_tx: command_tx.clone(),
        };
        (
            guardian_loop,
            GuardianHandles {
                status_rx,
                command_tx,
            },
        )
    }

    /// Run until shutdown; flushes the correlation log on exit
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            "Starting guardian control loop"
        );
        self.health.set_healthy(components::CONTROL_LOOP).await;

        let mut ticker = interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                command = self.command_rx.recv() => {
                    if let Some(command) = command {
                        self.handle_command(command).await;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down guardian control loop");
                    if let Err(e) = self.correlation.flush() {
                        warn!(error = %e, "Final correlation flush failed");
                    }
                    break;
                }
            }
        }
    }

    /// One evaluation tick
    async fn tick(&mut self) {
        let sample = match self.sampler.sample().await {
            Ok(sample) => {
                self.health.set_healthy(components::SAMPLER).await;
                sample
            }
            Err(e) => {
                // Recoverable: skip the tick, keep the last known state
                self.logger.log_sample_failure(&e.to_string());
                self.health
                    .set_degraded(components::SAMPLER, e.to_string())
                    .await;
                return;
            }
        };

        self.metrics.observe_sample(sample.ram_pct, sample.cpu_pct);
        self.correlation.log_metrics(&sample);

        let evaluation = self.evaluator.evaluate(&sample);
        self.apply_evaluation(&evaluation, &sample).await;

        // Snapshot replacement is the last step of the tick, so log order
        // always matches decision order
        let snapshot = self.evaluator.snapshot(sample.timestamp);
        self.metrics.set_state(snapshot.detail_status);
        self.status_tx.send_replace(snapshot);
    }

    async fn apply_evaluation(&mut self, evaluation: &Evaluation, sample: &MetricSample) {
        match &evaluation.action {
            Some(GuardianAction::KillExecuted {
                reason,
                lockdown_engaged,
            }) => {
                self.metrics.inc_kills_executed();
                self.logger.log_kill(reason, *lockdown_engaged);
                self.correlation.log_action(
                    "kill_executed",
                    serde_json::json!({
                        "reason": reason,
                        "ram_pct": sample.ram_pct,
                        "cpu_pct": sample.cpu_pct,
                    }),
                );

                // Fire-and-forget toward the external supervisor; the next
                // tick must not wait on it
                let runtime = self.runtime.clone();
                let reason = reason.clone();
                tokio::spawn(async move {
                    if let Err(e) = runtime.kill(&reason).await {
                        warn!(error = %e, "Kill command delivery failed");
                    }
                });

                if *lockdown_engaged {
                    let until = self
                        .evaluator
                        .cooldown_state(sample.timestamp)
                        .lockdown_until;
                    self.metrics.inc_lockdowns_engaged();
                    if let Some(until) = until {
                        self.logger.log_lockdown_engaged(until);
                    }
                    self.correlation.log_alert(
                        LogLevel::Critical,
                        "lockdown_engaged",
                        serde_json::json!({ "lockdown_until": until }),
                    );
                }
            }
            Some(GuardianAction::KillSuppressed { reason }) => {
                self.metrics.inc_kills_suppressed();
                self.logger.log_suppressed_kill(reason);
                self.correlation.log_alert(
                    LogLevel::Warning,
                    "suppressed_kill",
                    serde_json::json!({ "reason": reason }),
                );
            }
            Some(GuardianAction::EnterDegraded { reason }) => {
                let profile = {
                    let mut brownout = self.brownout.write().await;
                    brownout.activate(BrownoutLevel::Moderate)
                };
                self.metrics
                    .set_brownout_level(Some(BrownoutLevel::Moderate));
                self.logger
                    .log_brownout_activated(BrownoutLevel::Moderate.as_str(), &profile.model);
                self.correlation.log_action(
                    "enter_degraded",
                    serde_json::json!({
                        "trigger": reason.as_str(),
                        "model": profile.model,
                    }),
                );
            }
            Some(GuardianAction::Recovered) => {
                let profile = {
                    let mut brownout = self.brownout.write().await;
                    brownout.deactivate()
                };
                self.metrics.set_brownout_level(None);
                self.logger.log_brownout_deactivated(&profile.model);
                self.correlation.log_action(
                    "recovered",
                    serde_json::json!({ "model": profile.model }),
                );
            }
            None => {}
        }

        if evaluation.transitioned {
            self.metrics.inc_transition(evaluation.state);
            self.logger.log_transition(
                evaluation.previous,
                evaluation.state,
                evaluation
                    .action
                    .as_ref()
                    .map(action_name)
                    .unwrap_or("rule_evaluation"),
            );
            self.correlation.log_action(
                "state_transition",
                serde_json::json!({
                    "from": evaluation.previous,
                    "to": evaluation.state,
                }),
            );
        }
    }

    async fn handle_command(&mut self, command: GuardianCommand) {
        match command {
            GuardianCommand::EmergencyReset => {
                let now = Utc::now();
                let evaluation = self.evaluator.emergency_reset(now);
                let profile = {
                    let mut brownout = self.brownout.write().await;
                    brownout.emergency_reset()
                };

                self.metrics.set_brownout_level(Some(BrownoutLevel::Heavy));
                self.logger.log_emergency_reset();
                self.correlation.log_alert(
                    LogLevel::Error,
                    "emergency_reset",
                    serde_json::json!({
                        "state": evaluation.state,
                        "model": profile.model,
                    }),
                );

                let snapshot = self.evaluator.snapshot(now);
                self.metrics.set_state(snapshot.detail_status);
                self.status_tx.send_replace(snapshot);
            }
        }
    }
}

fn action_name(action: &GuardianAction) -> &'static str {
    match action {
        GuardianAction::KillExecuted { .. } => "kill_executed",
        GuardianAction::KillSuppressed { .. } => "kill_suppressed",
        GuardianAction::EnterDegraded { .. } => "enter_degraded",
        GuardianAction::Recovered => "recovered",
    }
}
