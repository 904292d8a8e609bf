//! Guardian library for inference admission control
//!
//! This crate provides the core functionality for:
//! - Host pressure sampling and hysteresis state transitions
//! - Rate-limited kill decisions with lockdown escalation
//! - Reversible brownout profiles for graceful degradation
//! - Request-path admission control with a cached status snapshot
//! - Correlation event logging and offline threshold analysis

pub mod brownout;
pub mod config;
pub mod correlation;
pub mod gate;
pub mod guardian;
pub mod health;
pub mod models;
pub mod observability;
pub mod runtime;
pub mod sampler;

pub use config::ConfigError;
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry};
pub use models::*;
pub use observability::{GuardianMetrics, StructuredLogger};
