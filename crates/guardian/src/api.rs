//! HTTP API for the guardian agent
//!
//! Serves the status endpoint consumed by admission gates, the readiness
//! probe, Prometheus exposition, and the manual brownout control surface.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use guardian_lib::brownout::{BrownoutLevel, BrownoutManager};
use guardian_lib::guardian::GuardianCommand;
use guardian_lib::health::HealthRegistry;
use guardian_lib::models::GuardianStatusSnapshot;
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub status_rx: watch::Receiver<GuardianStatusSnapshot>,
    pub health: HealthRegistry,
    pub brownout: Arc<RwLock<BrownoutManager>>,
    pub command_tx: mpsc::Sender<GuardianCommand>,
}

/// Guardian status endpoint consumed by admission gates
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.status_rx.borrow().clone();
    Json(snapshot)
}

/// Readiness probe over component health
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.health.all_operational().await;
    let components = state.health.components().await;

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status_code,
        Json(serde_json::json!({
            "ready": ready,
            "components": components,
        })),
    )
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

#[derive(Debug, Deserialize)]
struct ActivateBody {
    level: BrownoutLevel,
}

/// Activate a brownout level manually
async fn activate_brownout(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ActivateBody>,
) -> impl IntoResponse {
    let profile = state.brownout.write().await.activate(body.level);
    info!(level = %body.level, "Brownout activated via control surface");
    Json(profile)
}

/// Deactivate brownout, restoring the primary profile
async fn deactivate_brownout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let profile = state.brownout.write().await.deactivate();
    info!("Brownout deactivated via control surface");
    Json(profile)
}

/// Current active profile
async fn current_profile(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let profile = state.brownout.read().await.current_profile();
    Json(profile)
}

#[derive(Debug, Deserialize)]
struct ModelBody {
    model: String,
}

async fn set_model(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ModelBody>,
) -> impl IntoResponse {
    let result = state.brownout.write().await.set_model(body.model);
    override_response(state, result).await
}

#[derive(Debug, Deserialize)]
struct ValueBody {
    value: u32,
}

async fn set_context_window(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ValueBody>,
) -> impl IntoResponse {
    let result = state.brownout.write().await.set_context_window(body.value);
    override_response(state, result).await
}

async fn set_rag_top_k(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ValueBody>,
) -> impl IntoResponse {
    let result = state.brownout.write().await.set_rag_top_k(body.value);
    override_response(state, result).await
}

#[derive(Debug, Deserialize)]
struct ToggleBody {
    enabled: bool,
}

async fn set_tools_heavy(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ToggleBody>,
) -> impl IntoResponse {
    state.brownout.write().await.set_tools_heavy(body.enabled);
    let profile = state.brownout.read().await.current_profile();
    (StatusCode::OK, Json(serde_json::to_value(profile).unwrap_or_default()))
}

/// Emergency reset: clears lockdown and forces the minimal profile
async fn emergency_reset(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.command_tx.send(GuardianCommand::EmergencyReset).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "accepted": true })),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "accepted": false,
                "error": "control loop unavailable",
            })),
        ),
    }
}

async fn override_response(
    state: Arc<AppState>,
    result: Result<(), guardian_lib::ConfigError>,
) -> (StatusCode, Json<serde_json::Value>) {
    match result {
        Ok(()) => {
            let profile = state.brownout.read().await.current_profile();
            (
                StatusCode::OK,
                Json(serde_json::to_value(profile).unwrap_or_default()),
            )
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route(
            "/admin/brownout",
            post(activate_brownout).delete(deactivate_brownout),
        )
        .route("/admin/profile", get(current_profile))
        .route("/admin/model", post(set_model))
        .route("/admin/context-window", post(set_context_window))
        .route("/admin/rag-top-k", post(set_rag_top_k))
        .route("/admin/tools-heavy", post(set_tools_heavy))
        .route("/admin/emergency-reset", post(emergency_reset))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting guardian API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
