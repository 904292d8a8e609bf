//! Guardian agent - resource admission control for an inference host
//!
//! Watches host memory and CPU pressure, degrades or kills the inference
//! runtime under sustained load, and publishes the status snapshot that
//! admission gates consult on the request path.

use anyhow::Result;
use guardian_lib::brownout::BrownoutManager;
use guardian_lib::correlation::CorrelationLogger;
use guardian_lib::guardian::{GuardianLoop, HysteresisEvaluator};
use guardian_lib::health::{components, HealthRegistry};
use guardian_lib::observability::{GuardianMetrics, StructuredLogger};
use guardian_lib::runtime::{self, HttpRuntimeClient, InferenceRuntime, NoopRuntime, NotifierConfig};
use guardian_lib::sampler::HostSampler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting guardian-agent");

    // Load and validate configuration once
    let config = config::AgentConfig::load()?;
    info!(guardian_id = %config.guardian_id, "Guardian configured");

    // Observability
    let metrics = GuardianMetrics::new();
    let logger = StructuredLogger::new(&config.guardian_id);
    logger.log_startup(AGENT_VERSION);

    // Component health registry
    let health = HealthRegistry::new();
    health.register(components::SAMPLER).await;
    health.register(components::CONTROL_LOOP).await;
    health.register(components::CORRELATION_LOGGER).await;
    health.register(components::RUNTIME_NOTIFIER).await;

    // Correlation logger with its periodic flush task
    let correlation = Arc::new(CorrelationLogger::new(
        config.logger_config(),
        &config.guardian_id,
    )?);

    // Runtime client; an empty endpoint gets a logging stub
    let runtime_client: Arc<dyn InferenceRuntime> = if config.runtime_endpoint.is_empty() {
        Arc::new(NoopRuntime)
    } else {
        Arc::new(HttpRuntimeClient::new(
            config.runtime_endpoint.clone(),
            Duration::from_secs(5),
        )?)
    };

    // Outbound model-switch channel consumed by the notifier task
    let (notify_tx, notify_rx) = mpsc::channel(32);
    let brownout = Arc::new(RwLock::new(
        BrownoutManager::new(config.brownout_config()).with_notifier(notify_tx),
    ));

    // Control loop: sole writer of guardian state
    let evaluator =
        HysteresisEvaluator::new(config.hysteresis_config(), config.cooldown_config());
    let sampler = Arc::new(HostSampler::new(config.sampler_config()));
    let (guardian_loop, handles) = GuardianLoop::new(
        config.loop_config(),
        sampler,
        evaluator,
        brownout.clone(),
        runtime_client.clone(),
        correlation.clone(),
        logger.clone(),
        metrics.clone(),
        health.clone(),
    );

    let (shutdown_tx, _) = broadcast::channel(1);

    tokio::spawn(correlation.clone().run_flush_task(shutdown_tx.subscribe()));
    tokio::spawn(runtime::run_notifier(
        runtime_client,
        notify_rx,
        NotifierConfig::default(),
        shutdown_tx.subscribe(),
    ));
    tokio::spawn(guardian_loop.run(shutdown_tx.subscribe()));

    // API server: status endpoint, readiness, metrics, control surface
    let app_state = Arc::new(api::AppState {
        status_rx: handles.status_rx,
        health: health.clone(),
        brownout,
        command_tx: handles.command_tx,
    });
    tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    // Give the loop and logger a moment to flush
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("Shutting down");

    Ok(())
}
