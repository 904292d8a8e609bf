//! Axum middleware wrapping the admission gate
//!
//! Layered at the very front of a service router. Allowed requests proceed
//! downstream and come back with guardian headers attached; blocked
//! requests are answered directly with the structured JSON body. Response
//! timings for admitted inference requests feed the correlation log.

use super::{AdmissionGate, GateDecision};
use crate::correlation::CorrelationLogger;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

const HEADER_MODE: &str = "x-guardian-mode";
const HEADER_STATUS: &str = "x-guardian-status";
const HEADER_REQUEST_ID: &str = "x-request-id";
const HEADER_RETRY_AFTER: &str = "retry-after";

/// Shared state for the admission middleware
#[derive(Clone)]
pub struct GateState {
    pub gate: Arc<AdmissionGate>,
    pub correlation: Option<Arc<CorrelationLogger>>,
}

/// Admission middleware entry point
///
/// Never fails the request pipeline itself: the gate absorbs every poll
/// error, and header values that cannot be encoded are simply omitted.
pub async fn admission_middleware(
    State(state): State<GateState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let decision = state.gate.decide(&path).await;

    if !decision.allow {
        return blocked_response(&decision);
    }

    let inference = state
        .gate
        .config()
        .inference_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix));

    let started = Instant::now();
    let mut response = next.run(req).await;

    if inference {
        if let Some(correlation) = &state.correlation {
            correlation.log_response_time(&path, started.elapsed().as_secs_f64() * 1000.0);
        }
    }

    attach_decision_headers(&mut response, &decision);
    response
}

/// Attach traceability headers to any response
pub fn attach_decision_headers(response: &mut Response, decision: &GateDecision) {
    let headers = response.headers_mut();
    insert_header(headers, HEADER_MODE, decision.mode.as_str());
    insert_header(headers, HEADER_STATUS, &decision.detail_status);
    insert_header(headers, HEADER_REQUEST_ID, &decision.request_id);
    if let Some(retry_after) = decision.retry_after {
        insert_header(headers, HEADER_RETRY_AFTER, &retry_after.to_string());
    }
}

/// Build the structured blocked response
pub fn blocked_response(decision: &GateDecision) -> Response {
    let status =
        StatusCode::from_u16(decision.status_code).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    let body = serde_json::json!({
        "error": decision.reason,
        "guardian_mode": decision.mode.as_str(),
        "guardian_status": decision.detail_status,
        "request_id": decision.request_id,
        "timestamp": Utc::now(),
        "retry_after": decision.retry_after,
    });

    let mut response = (status, Json(body)).into_response();
    attach_decision_headers(&mut response, decision);
    response
}

fn insert_header(headers: &mut axum::http::HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{FetchedStatus, GateConfig, GateMode, StatusFetcher};
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    struct FixedFetcher {
        mode: GateMode,
    }

    #[async_trait]
    impl StatusFetcher for FixedFetcher {
        async fn fetch(&self) -> Result<FetchedStatus> {
            Ok(FetchedStatus {
                mode: self.mode,
                detail: self.mode.as_str().to_string(),
            })
        }
    }

    fn app(mode: GateMode) -> Router {
        let gate = Arc::new(AdmissionGate::new(
            GateConfig::default(),
            Arc::new(FixedFetcher { mode }),
        ));
        let state = GateState {
            gate,
            correlation: None,
        };
        Router::new()
            .route("/chat", get(|| async { "inference" }))
            .route("/health", get(|| async { "healthy" }))
            .layer(axum::middleware::from_fn_with_state(
                state,
                admission_middleware,
            ))
    }

    async fn send(app: Router, path: &str) -> Response {
        app.oneshot(
            Request::builder()
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_allowed_response_carries_headers() {
        let response = send(app(GateMode::Ok), "/chat").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(HEADER_MODE).unwrap(), "ok");
        assert!(response.headers().get(HEADER_REQUEST_ID).is_some());
    }

    #[tokio::test]
    async fn test_degrade_blocks_inference_with_429() {
        let response = send(app(GateMode::Degrade), "/chat").await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().get(HEADER_RETRY_AFTER).is_some());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["guardian_mode"], "degrade");
        assert!(body["request_id"].as_str().is_some());
        assert!(body["retry_after"].as_u64().is_some());
    }

    #[tokio::test]
    async fn test_degrade_passes_health_unmodified_body() {
        let response = send(app(GateMode::Degrade), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"healthy");
    }

    #[tokio::test]
    async fn test_stop_blocks_inference_with_503() {
        let response = send(app(GateMode::Stop), "/chat").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["guardian_mode"], "stop");

        // Operational paths stay reachable
        let response = send(app(GateMode::Stop), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
