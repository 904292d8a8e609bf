//! Host metric sampling
//!
//! Produces the `MetricSample` stream consumed by the control loop. The
//! sampler is an external observation point: failures are recoverable (the
//! loop skips the tick and keeps its last known state), so implementations
//! report errors instead of panicking.

mod host;

pub use host::{HostSampler, HostSamplerConfig};

use crate::models::MetricSample;
use anyhow::Result;

pub use async_trait::async_trait;

/// Trait for metric sampling implementations
#[async_trait]
pub trait MetricSampler: Send + Sync {
    /// Produce one sample of current host pressure
    async fn sample(&self) -> Result<MetricSample>;
}
