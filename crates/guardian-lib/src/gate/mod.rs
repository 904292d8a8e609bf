//! Request-path admission control
//!
//! Consulted at the very front of the request pipeline, before any
//! expensive work. The gate holds a short-TTL cache of the guardian's
//! published status and decides per request whether to admit, throttle, or
//! reject. The guardian being unreachable is survivable: a short streak of
//! unknown polls passes traffic through, a sustained streak fails closed.

mod fetcher;
mod middleware;

pub use fetcher::{mode_from_status, FetchedStatus, HttpStatusFetcher, StatusFetcher};
pub use middleware::{
    admission_middleware, attach_decision_headers, blocked_response, GateState,
};

use crate::observability::GuardianMetrics;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default cache TTL for the status snapshot
const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(250);

/// Default bound on one status fetch
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(250);

/// Default consecutive unknown polls tolerated before failing closed
const DEFAULT_UNKNOWN_THRESHOLD: u32 = 3;

/// Default retry hint attached to blocked responses (seconds)
const DEFAULT_RETRY_AFTER_SECS: u32 = 30;

/// Traffic mode derived from the guardian status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// Guardian healthy, admit everything
    Ok,
    /// Guardian degraded, throttle inference paths
    Degrade,
    /// Guardian in emergency or lockdown, block all but operational paths
    Stop,
    /// Guardian unreachable
    Unknown,
}

impl GateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateMode::Ok => "ok",
            GateMode::Degrade => "degrade",
            GateMode::Stop => "stop",
            GateMode::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for GateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for one gate instance
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// How long a polled status stays valid
    pub cache_ttl: Duration,
    /// Bound on a single status fetch
    pub fetch_timeout: Duration,
    /// Consecutive unknown polls tolerated before blocking inference
    pub unknown_threshold: u32,
    /// Retry hint for blocked responses
    pub retry_after_secs: u32,
    /// Operational paths that stay reachable under stop
    pub allow_prefixes: Vec<String>,
    /// Inference-bound paths throttled under degrade
    pub inference_prefixes: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            unknown_threshold: DEFAULT_UNKNOWN_THRESHOLD,
            retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
            allow_prefixes: vec![
                "/health".to_string(),
                "/healthz".to_string(),
                "/readyz".to_string(),
                "/metrics".to_string(),
            ],
            inference_prefixes: vec![
                "/chat".to_string(),
                "/v1/chat".to_string(),
                "/v1/completions".to_string(),
                "/ws".to_string(),
            ],
        }
    }
}

/// Cached result of the last poll
#[derive(Debug, Clone)]
struct CachedStatus {
    mode: GateMode,
    detail: String,
    fetched_at: Instant,
}

/// Typed outcome of one admission decision
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub allow: bool,
    pub status_code: u16,
    pub reason: String,
    pub mode: GateMode,
    pub detail_status: String,
    pub request_id: String,
    pub retry_after: Option<u32>,
}

impl GateDecision {
    fn allowed(mode: GateMode, detail: String, reason: impl Into<String>) -> Self {
        Self {
            allow: true,
            status_code: 200,
            reason: reason.into(),
            mode,
            detail_status: detail,
            request_id: Uuid::new_v4().to_string(),
            retry_after: None,
        }
    }

    fn blocked(
        mode: GateMode,
        detail: String,
        status_code: u16,
        reason: impl Into<String>,
        retry_after: Option<u32>,
    ) -> Self {
        Self {
            allow: false,
            status_code,
            reason: reason.into(),
            mode,
            detail_status: detail,
            request_id: Uuid::new_v4().to_string(),
            retry_after,
        }
    }
}

/// Admission gate with a per-instance status cache
///
/// Concurrent requests may race to refresh an expired cache entry;
/// last-write-wins is fine for a read-mostly value this short-lived, so the
/// entry is only ever replaced atomically, never locked across a fetch.
pub struct AdmissionGate {
    config: GateConfig,
    fetcher: Arc<dyn StatusFetcher>,
    cache: RwLock<Option<CachedStatus>>,
    unknown_streak: AtomicU32,
    metrics: GuardianMetrics,
}

impl AdmissionGate {
    pub fn new(config: GateConfig, fetcher: Arc<dyn StatusFetcher>) -> Self {
        Self {
            config,
            fetcher,
            cache: RwLock::new(None),
            unknown_streak: AtomicU32::new(0),
            metrics: GuardianMetrics::new(),
        }
    }

    /// Decide admission for one request path
    pub async fn decide(&self, path: &str) -> GateDecision {
        let started = Instant::now();
        let (mode, detail) = self.current_mode().await;
        self.metrics.inc_gate_requests();

        let decision = match mode {
            GateMode::Ok => {
                self.unknown_streak.store(0, Ordering::Relaxed);
                GateDecision::allowed(mode, detail, "guardian ok")
            }
            GateMode::Stop => {
                if self.is_operational_path(path) {
                    GateDecision::allowed(mode, detail, "operational path during stop")
                } else {
                    self.metrics.inc_gate_blocked();
                    GateDecision::blocked(
                        mode,
                        detail,
                        503,
                        "guardian stop: resource emergency",
                        Some(self.config.retry_after_secs),
                    )
                }
            }
            GateMode::Degrade => {
                if self.is_inference_path(path) {
                    self.metrics.inc_gate_degraded();
                    GateDecision::blocked(
                        mode,
                        detail,
                        429,
                        "guardian degrade: inference throttled",
                        Some(self.config.retry_after_secs),
                    )
                } else {
                    GateDecision::allowed(mode, detail, "non-inference path during degrade")
                }
            }
            GateMode::Unknown => {
                let streak = self.unknown_streak.load(Ordering::Relaxed);
                if self.is_inference_path(path) && streak >= self.config.unknown_threshold {
                    self.metrics.inc_gate_blocked();
                    GateDecision::blocked(
                        mode,
                        detail,
                        503,
                        format!(
                            "guardian unreachable for {} consecutive polls (threshold {})",
                            streak, self.config.unknown_threshold
                        ),
                        Some(self.config.retry_after_secs),
                    )
                } else {
                    // A single missed poll must not interrupt service
                    GateDecision::allowed(mode, detail, "graceful pass while guardian unknown")
                }
            }
        };

        self.metrics
            .observe_gate_decision_latency(started.elapsed().as_secs_f64());
        debug!(
            path = %path,
            mode = %decision.mode,
            allow = decision.allow,
            request_id = %decision.request_id,
            "Admission decision"
        );
        decision
    }

    /// Current unknown streak, for tests and status reporting
    pub fn unknown_streak(&self) -> u32 {
        self.unknown_streak.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Resolve the guardian mode from cache, polling on expiry
    async fn current_mode(&self) -> (GateMode, String) {
        if let Some(cached) = self.cached_status() {
            if cached.fetched_at.elapsed() < self.config.cache_ttl {
                return (cached.mode, cached.detail);
            }
        }

        match self.fetcher.fetch().await {
            Ok(status) => {
                self.unknown_streak.store(0, Ordering::Relaxed);
                self.store_status(status.mode, status.detail.clone());
                (status.mode, status.detail)
            }
            Err(e) => {
                let streak = self.unknown_streak.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(error = %e, streak = streak, "Guardian status poll failed");
                self.store_status(GateMode::Unknown, "unreachable".to_string());
                (GateMode::Unknown, "unreachable".to_string())
            }
        }
    }

    fn cached_status(&self) -> Option<CachedStatus> {
        match self.cache.read() {
            Ok(cache) => cache.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_status(&self, mode: GateMode, detail: String) {
        let entry = CachedStatus {
            mode,
            detail,
            fetched_at: Instant::now(),
        };
        match self.cache.write() {
            Ok(mut cache) => *cache = Some(entry),
            Err(poisoned) => *poisoned.into_inner() = Some(entry),
        }
    }

    fn is_operational_path(&self, path: &str) -> bool {
        self.config
            .allow_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }

    fn is_inference_path(&self, path: &str) -> bool {
        self.config
            .inference_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Fetcher scripted with a fixed sequence of outcomes
    struct ScriptedFetcher {
        script: Vec<Option<GateMode>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<Option<GateMode>>) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusFetcher for ScriptedFetcher {
        async fn fetch(&self) -> Result<FetchedStatus> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self
                .script
                .get(call)
                .cloned()
                .unwrap_or(self.script.last().cloned().flatten());
            match step {
                Some(mode) => Ok(FetchedStatus {
                    mode,
                    detail: mode.as_str().to_string(),
                }),
                None => anyhow::bail!("poll timed out"),
            }
        }
    }

    fn config_no_cache() -> GateConfig {
        GateConfig {
            cache_ttl: Duration::from_millis(0),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ok_mode_allows_everything() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Some(GateMode::Ok)]));
        let gate = AdmissionGate::new(config_no_cache(), fetcher);

        for path in ["/chat", "/v1/chat/completions", "/health", "/anything"] {
            let decision = gate.decide(path).await;
            assert!(decision.allow, "path {} should pass", path);
        }
    }

    #[tokio::test]
    async fn test_stop_blocks_all_but_operational() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Some(GateMode::Stop)]));
        let gate = AdmissionGate::new(config_no_cache(), fetcher);

        let decision = gate.decide("/chat").await;
        assert!(!decision.allow);
        assert_eq!(decision.status_code, 503);
        assert!(decision.retry_after.is_some());

        let decision = gate.decide("/some/other/api").await;
        assert!(!decision.allow);

        let decision = gate.decide("/health").await;
        assert!(decision.allow);
        let decision = gate.decide("/metrics").await;
        assert!(decision.allow);
    }

    #[tokio::test]
    async fn test_degrade_throttles_inference_only() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Some(GateMode::Degrade)]));
        let gate = AdmissionGate::new(config_no_cache(), fetcher);

        let decision = gate.decide("/chat").await;
        assert!(!decision.allow);
        assert_eq!(decision.status_code, 429);
        assert!(decision.retry_after.is_some());

        // Non-inference paths pass through unchanged
        let decision = gate.decide("/health").await;
        assert!(decision.allow);
        let decision = gate.decide("/api/tools").await;
        assert!(decision.allow);
    }

    #[tokio::test]
    async fn test_unknown_streak_hysteresis() {
        // Three failed polls, then a recovery
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            None,
            None,
            None,
            Some(GateMode::Ok),
        ]));
        let gate = AdmissionGate::new(config_no_cache(), fetcher);

        // Polls 1 and 2: graceful pass
        let decision = gate.decide("/chat").await;
        assert!(decision.allow, "first unknown poll must pass");
        let decision = gate.decide("/chat").await;
        assert!(decision.allow, "second unknown poll must pass");

        // Poll 3 reaches the threshold
        let decision = gate.decide("/chat").await;
        assert!(!decision.allow);
        assert_eq!(decision.status_code, 503);
        assert!(decision.reason.contains('3'));

        // Successful poll resets the streak; next request passes
        let decision = gate.decide("/chat").await;
        assert!(decision.allow);
        assert_eq!(gate.unknown_streak(), 0);
    }

    #[tokio::test]
    async fn test_unknown_never_blocks_non_inference() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![None]));
        let gate = AdmissionGate::new(config_no_cache(), fetcher);

        for _ in 0..5 {
            let decision = gate.decide("/health").await;
            assert!(decision.allow);
        }
    }

    #[tokio::test]
    async fn test_cache_bounds_poll_rate() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Some(GateMode::Ok)]));
        let gate = AdmissionGate::new(
            GateConfig {
                cache_ttl: Duration::from_secs(60),
                ..Default::default()
            },
            fetcher.clone(),
        );

        for _ in 0..10 {
            gate.decide("/chat").await;
        }
        // All ten decisions served from one poll
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_decisions_carry_request_ids() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![Some(GateMode::Ok)]));
        let gate = AdmissionGate::new(config_no_cache(), fetcher);

        let first = gate.decide("/chat").await;
        let second = gate.decide("/chat").await;
        assert!(!first.request_id.is_empty());
        assert_ne!(first.request_id, second.request_id);
    }
}
