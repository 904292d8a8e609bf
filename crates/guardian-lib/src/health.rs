//! Component health tracking
//!
//! Backs the readiness probe. Guardian mode is published separately through
//! the status snapshot; this registry only answers "are the guardian's own
//! components running", so a degraded host does not read as a broken agent.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Component names tracked by the guardian
pub mod components {
    pub const SAMPLER: &str = "sampler";
    pub const CONTROL_LOOP: &str = "control_loop";
    pub const CORRELATION_LOGGER: &str = "correlation_logger";
    pub const RUNTIME_NOTIFIER: &str = "runtime_notifier";
}

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health record for one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            last_check_timestamp: Utc::now().timestamp(),
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Degraded,
            message: Some(message.into()),
            last_check_timestamp: Utc::now().timestamp(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Unhealthy,
            message: Some(message.into()),
            last_check_timestamp: Utc::now().timestamp(),
        }
    }
}

/// Shared registry of component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    pub async fn set_healthy(&self, name: &str) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::degraded(message));
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::unhealthy(message));
    }

    /// Snapshot of all component records
    pub async fn components(&self) -> HashMap<String, ComponentHealth> {
        self.components.read().await.clone()
    }

    /// True when no component is unhealthy
    pub async fn all_operational(&self) -> bool {
        self.components
            .read()
            .await
            .values()
            .all(|health| health.status != ComponentStatus::Unhealthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_starts_operational() {
        let registry = HealthRegistry::new();
        assert!(registry.all_operational().await);
        assert!(registry.components().await.is_empty());
    }

    #[tokio::test]
    async fn test_degraded_component_stays_operational() {
        let registry = HealthRegistry::new();
        registry.register(components::SAMPLER).await;
        registry
            .set_degraded(components::SAMPLER, "slow refresh")
            .await;

        assert!(registry.all_operational().await);
        let snapshot = registry.components().await;
        assert_eq!(
            snapshot[components::SAMPLER].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_unhealthy_component_breaks_readiness() {
        let registry = HealthRegistry::new();
        registry.register(components::SAMPLER).await;
        registry.register(components::CONTROL_LOOP).await;
        registry
            .set_unhealthy(components::SAMPLER, "cannot read host metrics")
            .await;

        assert!(!registry.all_operational().await);

        registry.set_healthy(components::SAMPLER).await;
        assert!(registry.all_operational().await);
    }
}
