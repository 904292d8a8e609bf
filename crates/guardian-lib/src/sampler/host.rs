//! Host sampler backed by sysinfo
//!
//! Reads memory, CPU, disk, temperature, and inference-process presence
//! from the host. CPU usage is computed between consecutive refreshes, so
//! the first sample after startup reports zero CPU; the measurement window
//! absorbs this.

use super::MetricSampler;
use crate::models::MetricSample;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Mutex;
use sysinfo::{
    Components, CpuRefreshKind, Disks, MemoryRefreshKind, ProcessRefreshKind, RefreshKind, System,
};

/// Configuration for the host sampler
#[derive(Debug, Clone)]
pub struct HostSamplerConfig {
    /// Substring matched against process names to find the inference runtime
    pub inference_process_name: String,
    /// Mount point used for the disk usage fraction
    pub disk_mount: PathBuf,
}

impl Default for HostSamplerConfig {
    fn default() -> Self {
        Self {
            inference_process_name: "inference".to_string(),
            disk_mount: PathBuf::from("/"),
        }
    }
}

/// Samples host pressure via the sysinfo crate
pub struct HostSampler {
    config: HostSamplerConfig,
    system: Mutex<System>,
}

impl HostSampler {
    pub fn new(config: HostSamplerConfig) -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_memory(MemoryRefreshKind::everything())
                .with_cpu(CpuRefreshKind::everything()),
        );
        Self {
            config,
            system: Mutex::new(system),
        }
    }

    fn disk_pct(&self) -> f64 {
        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .iter()
            .find(|disk| disk.mount_point() == self.config.disk_mount)
            .or_else(|| disks.iter().next());

        match disk {
            Some(disk) if disk.total_space() > 0 => {
                let used = disk.total_space().saturating_sub(disk.available_space());
                clamp_pct(used as f64 / disk.total_space() as f64)
            }
            _ => 0.0,
        }
    }

    fn max_temperature() -> Option<f64> {
        Components::new_with_refreshed_list()
            .iter()
            .map(|component| component.temperature() as f64)
            .filter(|t| t.is_finite())
            .fold(None, |max, t| Some(max.map_or(t, |m: f64| m.max(t))))
    }
}

#[async_trait]
impl MetricSampler for HostSampler {
    async fn sample(&self) -> Result<MetricSample> {
        let (ram_pct, cpu_pct, inference_pids) = {
            let mut system = self
                .system
                .lock()
                .map_err(|_| anyhow::anyhow!("Sampler state poisoned"))?;

            system.refresh_memory();
            system.refresh_cpu_usage();
            system.refresh_processes_specifics(ProcessRefreshKind::new());

            let total = system.total_memory();
            let ram_pct = if total > 0 {
                clamp_pct(system.used_memory() as f64 / total as f64)
            } else {
                0.0
            };
            let cpu_pct = clamp_pct(system.global_cpu_info().cpu_usage() as f64 / 100.0);

            let needle = self.config.inference_process_name.as_str();
            let mut pids: Vec<u32> = system
                .processes()
                .iter()
                .filter(|(_, process)| process.name().contains(needle))
                .map(|(pid, _)| pid.as_u32())
                .collect();
            pids.sort_unstable();

            (ram_pct, cpu_pct, pids)
        };

        Ok(MetricSample {
            timestamp: Utc::now(),
            ram_pct,
            cpu_pct,
            disk_pct: self.disk_pct(),
            temp_c: Self::max_temperature(),
            inference_pids,
        })
    }
}

/// Normalize a fraction into the 0..1 range
fn clamp_pct(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_pct() {
        assert_eq!(clamp_pct(0.5), 0.5);
        assert_eq!(clamp_pct(-0.1), 0.0);
        assert_eq!(clamp_pct(1.5), 1.0);
        assert_eq!(clamp_pct(f64::NAN), 0.0);
    }

    #[tokio::test]
    async fn test_host_sampler_produces_normalized_sample() {
        let sampler = HostSampler::new(HostSamplerConfig::default());
        let sample = sampler.sample().await.unwrap();

        assert!((0.0..=1.0).contains(&sample.ram_pct));
        assert!((0.0..=1.0).contains(&sample.cpu_pct));
        assert!((0.0..=1.0).contains(&sample.disk_pct));
    }
}
