//! Kill cooldown and lockdown tracking
//!
//! Rate-limits the one genuinely destructive action in the system. A kill
//! inside the short cooldown horizon is suppressed; repeated executed kills
//! inside the long horizon escalate to a timed lockdown during which every
//! further request is suppressed unconditionally.
//!
//! Policy note: only executed kills count toward the lockdown threshold.
//! Suppressed requests are logged but never advance the rolling count.

use crate::models::{CooldownState, KillEvent, MetricSample};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;

/// Default minimum interval between executed kills (5 minutes)
const DEFAULT_COOLDOWN_SHORT: Duration = Duration::from_secs(300);

/// Default horizon for the rolling kill count (1 hour)
const DEFAULT_COOLDOWN_LONG: Duration = Duration::from_secs(3600);

/// Default executed-kill count that engages lockdown
const DEFAULT_MAX_KILLS: usize = 3;

/// Default lockdown duration (30 minutes)
const DEFAULT_LOCKDOWN: Duration = Duration::from_secs(1800);

/// Default retention for the kill history (24 hours)
const DEFAULT_HISTORY_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for the cooldown/lockdown tracker
#[derive(Debug, Clone)]
pub struct CooldownConfig {
    /// Minimum interval between executed kills
    pub kill_cooldown_short: Duration,
    /// Horizon for the rolling executed-kill count
    pub kill_cooldown_long: Duration,
    /// Executed kills within the long horizon that engage lockdown
    pub max_kills_per_window: usize,
    /// How long a lockdown lasts once engaged
    pub lockdown_duration: Duration,
    /// How long kill events are retained for inspection
    pub history_retention: Duration,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            kill_cooldown_short: DEFAULT_COOLDOWN_SHORT,
            kill_cooldown_long: DEFAULT_COOLDOWN_LONG,
            max_kills_per_window: DEFAULT_MAX_KILLS,
            lockdown_duration: DEFAULT_LOCKDOWN,
            history_retention: DEFAULT_HISTORY_RETENTION,
        }
    }
}

/// Outcome of a kill request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillOutcome {
    /// The kill was executed; `lockdown_engaged` is set when this kill
    /// pushed the rolling count to the lockdown threshold
    Executed { lockdown_engaged: bool },
    /// Suppressed because the previous kill was too recent
    SuppressedCooldown { since_last: Duration },
    /// Suppressed because a lockdown is active
    SuppressedLockdown { until: DateTime<Utc> },
}

impl KillOutcome {
    pub fn executed(&self) -> bool {
        matches!(self, KillOutcome::Executed { .. })
    }
}

/// Tracks kill history, short-horizon suppression, and lockdown state
///
/// All decisions are made against a caller-supplied wall-clock timestamp, so
/// lockdown expiry survives a process restart and tests can drive synthetic
/// clocks.
#[derive(Debug)]
pub struct CooldownTracker {
    config: CooldownConfig,
    last_kill_at: Option<DateTime<Utc>>,
    lockdown_until: Option<DateTime<Utc>>,
    history: VecDeque<KillEvent>,
}

impl CooldownTracker {
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            last_kill_at: None,
            lockdown_until: None,
            history: VecDeque::new(),
        }
    }

    /// Decide whether a kill may execute now
    ///
    /// Executed kills are appended to the history and counted against the
    /// long horizon; reaching `max_kills_per_window` engages lockdown.
    pub fn request_kill(
        &mut self,
        reason: &str,
        metrics: Option<&MetricSample>,
        now: DateTime<Utc>,
    ) -> KillOutcome {
        if let Some(until) = self.lockdown_until {
            if now < until {
                return KillOutcome::SuppressedLockdown { until };
            }
            // Lockdown has expired; clear it before deciding
            self.lockdown_until = None;
        }

        if let Some(last) = self.last_kill_at {
            let since_last = (now - last).to_std().unwrap_or_default();
            if since_last < self.config.kill_cooldown_short {
                return KillOutcome::SuppressedCooldown { since_last };
            }
        }

        self.history.push_back(KillEvent {
            timestamp: now,
            reason: reason.to_string(),
            metrics_snapshot: metrics.cloned(),
        });
        self.last_kill_at = Some(now);
        self.prune_history(now);

        let kills = self.kills_in_window(now);
        if kills >= self.config.max_kills_per_window {
            let delta = chrono::Duration::from_std(self.config.lockdown_duration)
                .unwrap_or(chrono::Duration::MAX);
            let until = now
                .checked_add_signed(delta)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            self.lockdown_until = Some(until);
            KillOutcome::Executed {
                lockdown_engaged: true,
            }
        } else {
            KillOutcome::Executed {
                lockdown_engaged: false,
            }
        }
    }

    /// Whether a lockdown is active at `now`
    pub fn in_lockdown(&self, now: DateTime<Utc>) -> bool {
        self.lockdown_until.map(|until| now < until).unwrap_or(false)
    }

    pub fn lockdown_until(&self) -> Option<DateTime<Utc>> {
        self.lockdown_until
    }

    /// Executed kills within the long horizon ending at `now`
    pub fn kills_in_window(&self, now: DateTime<Utc>) -> usize {
        self.history
            .iter()
            .filter(|event| {
                (now - event.timestamp).to_std().unwrap_or_default()
                    <= self.config.kill_cooldown_long
            })
            .count()
    }

    /// Clear lockdown and cooldown state ahead of schedule
    ///
    /// The rolling count is reset along with the lockdown; otherwise the
    /// very next executed kill would re-engage it immediately.
    pub fn emergency_reset(&mut self) {
        self.lockdown_until = None;
        self.last_kill_at = None;
        self.history.clear();
    }

    /// Snapshot of the tracker for status reporting
    pub fn state(&self, now: DateTime<Utc>) -> CooldownState {
        CooldownState {
            last_kill_at: self.last_kill_at,
            kills_in_window: self.kills_in_window(now),
            lockdown_until: self.lockdown_until.filter(|until| now < *until),
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &KillEvent> {
        self.history.iter()
    }

    fn prune_history(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.history.front() {
            let age = (now - front.timestamp).to_std().unwrap_or_default();
            if age > self.config.history_retention {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(CooldownConfig::default())
    }
}
