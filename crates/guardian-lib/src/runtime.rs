//! Commands toward the external inference runtime
//!
//! Process supervision lives outside this crate; the guardian only issues
//! two commands over an abstract interface: kill the inference process and
//! switch the served model. Model switches travel over an outbound channel
//! consumed by a notifier task with its own retry/backoff policy, decoupled
//! from the control loop's tick rate.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Default initial retry backoff for model-switch notifications
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Default backoff ceiling
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Default attempts before a notification is dropped
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Outbound model-switch message
#[derive(Debug, Clone)]
pub struct ModelSwitch {
    pub model: String,
    pub reason: String,
}

/// Interface to the external inference runtime supervisor
#[async_trait]
pub trait InferenceRuntime: Send + Sync {
    /// Kill the inference process; destructive and non-idempotent
    async fn kill(&self, reason: &str) -> Result<()>;

    /// Ask the runtime to serve a different model
    async fn switch_model(&self, model: &str) -> Result<()>;
}

/// HTTP client for a runtime supervisor's control endpoints
pub struct HttpRuntimeClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRuntimeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create runtime HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl InferenceRuntime for HttpRuntimeClient {
    async fn kill(&self, reason: &str) -> Result<()> {
        let url = format!("{}/control/kill", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "reason": reason }))
            .send()
            .await
            .context("Failed to send kill command")?;

        if !response.status().is_success() {
            anyhow::bail!("Kill command rejected: {}", response.status());
        }
        Ok(())
    }

    async fn switch_model(&self, model: &str) -> Result<()> {
        let url = format!("{}/control/model", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "model": model }))
            .send()
            .await
            .context("Failed to send model switch")?;

        if !response.status().is_success() {
            anyhow::bail!("Model switch rejected: {}", response.status());
        }
        Ok(())
    }
}

/// Runtime stub that only logs, for local development and tests
pub struct NoopRuntime;

#[async_trait]
impl InferenceRuntime for NoopRuntime {
    async fn kill(&self, reason: &str) -> Result<()> {
        info!(reason = %reason, "Kill command (noop runtime)");
        Ok(())
    }

    async fn switch_model(&self, model: &str) -> Result<()> {
        info!(model = %model, "Model switch (noop runtime)");
        Ok(())
    }
}

/// Retry policy for the model-switch notifier
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Consume model-switch messages and deliver them with retry/backoff
///
/// Delivery is best-effort: after `max_attempts` failures the message is
/// dropped with a warning. Failures never propagate back to the profile
/// transition that queued the switch.
pub async fn run_notifier(
    runtime: Arc<dyn InferenceRuntime>,
    mut rx: mpsc::Receiver<ModelSwitch>,
    config: NotifierConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("Starting model-switch notifier");

    loop {
        tokio::select! {
            switch = rx.recv() => {
                match switch {
                    Some(switch) => deliver(&runtime, &switch, &config).await,
                    None => {
                        debug!("Model-switch channel closed");
                        break;
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("Shutting down model-switch notifier");
                break;
            }
        }
    }
}

async fn deliver(runtime: &Arc<dyn InferenceRuntime>, switch: &ModelSwitch, config: &NotifierConfig) {
    let mut backoff = config.initial_backoff;

    for attempt in 1..=config.max_attempts {
        match runtime.switch_model(&switch.model).await {
            Ok(()) => {
                info!(
                    model = %switch.model,
                    reason = %switch.reason,
                    attempt = attempt,
                    "Model switch delivered"
                );
                return;
            }
            Err(e) if attempt < config.max_attempts => {
                debug!(
                    model = %switch.model,
                    attempt = attempt,
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "Model switch failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.max_backoff);
            }
            Err(e) => {
                warn!(
                    model = %switch.model,
                    reason = %switch.reason,
                    error = %e,
                    "Model switch dropped after retries"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyRuntime {
        fail_first: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceRuntime for FlakyRuntime {
        async fn kill(&self, _reason: &str) -> Result<()> {
            Ok(())
        }

        async fn switch_model(&self, _model: &str) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                anyhow::bail!("runtime unavailable");
            }
            Ok(())
        }
    }

    fn config() -> NotifierConfig {
        NotifierConfig {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn test_notifier_retries_until_success() {
        let runtime = Arc::new(FlakyRuntime {
            fail_first: 2,
            calls: AtomicUsize::new(0),
        });

        let switch = ModelSwitch {
            model: "fallback-small".to_string(),
            reason: "test".to_string(),
        };
        deliver(
            &(runtime.clone() as Arc<dyn InferenceRuntime>),
            &switch,
            &config(),
        )
        .await;

        assert_eq!(runtime.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_notifier_drops_after_max_attempts() {
        let runtime = Arc::new(FlakyRuntime {
            fail_first: 10,
            calls: AtomicUsize::new(0),
        });

        let switch = ModelSwitch {
            model: "fallback-small".to_string(),
            reason: "test".to_string(),
        };
        deliver(
            &(runtime.clone() as Arc<dyn InferenceRuntime>),
            &switch,
            &config(),
        )
        .await;

        // Gave up after three attempts without propagating an error
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_notifier_task_shutdown() {
        let (tx, rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(run_notifier(
            Arc::new(NoopRuntime),
            rx,
            NotifierConfig::default(),
            shutdown_rx,
        ));

        tx.send(ModelSwitch {
            model: "primary".to_string(),
            reason: "test".to_string(),
        })
        .await
        .unwrap();

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
