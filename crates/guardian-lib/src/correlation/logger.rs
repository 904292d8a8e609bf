//! Append-only NDJSON event log
//!
//! Entries are buffered in memory and flushed on a timer, or immediately
//! for error and critical levels. The backing file rotates once it exceeds
//! a size threshold, keeping a bounded set of historical files. Records are
//! never updated or deleted outside rotation.

use crate::models::MetricSample;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Default flush interval
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Default rotation threshold (5 MiB)
const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

/// Default number of rotated files kept
const DEFAULT_MAX_ROTATED: usize = 5;

/// Event classification for correlation records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Metrics,
    Action,
    Correlation,
    Alert,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Metrics => "metrics",
            EventKind::Action => "action",
            EventKind::Correlation => "correlation",
            EventKind::Alert => "alert",
        }
    }
}

/// Severity of a correlation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Levels that bypass the buffer and flush immediately
    pub fn is_urgent(&self) -> bool {
        matches!(self, LogLevel::Error | LogLevel::Critical)
    }
}

/// One NDJSON record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationLogEntry {
    pub ts: DateTime<Utc>,
    pub lvl: LogLevel,
    pub evt: EventKind,
    pub guardian_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub data: serde_json::Value,
}

/// Configuration for the correlation logger
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Path of the active log file
    pub path: PathBuf,
    /// Buffered entries are flushed at this interval
    pub flush_interval: Duration,
    /// Rotation threshold in bytes
    pub max_file_bytes: u64,
    /// Rotated files kept before deletion
    pub max_rotated_files: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs/guardian.ndjson"),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_rotated_files: DEFAULT_MAX_ROTATED,
        }
    }
}

/// Buffered append-only event logger
pub struct CorrelationLogger {
    config: LoggerConfig,
    guardian_id: String,
    buffer: Mutex<Vec<CorrelationLogEntry>>,
}

impl CorrelationLogger {
    pub fn new(config: LoggerConfig, guardian_id: impl Into<String>) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {:?}", parent))?;
        }
        Ok(Self {
            config,
            guardian_id: guardian_id.into(),
            buffer: Mutex::new(Vec::new()),
        })
    }

    /// Append an entry; urgent levels flush the whole buffer immediately
    pub fn log(&self, lvl: LogLevel, evt: EventKind, data: serde_json::Value) {
        self.log_with_session(lvl, evt, None, data);
    }

    /// Append an entry tagged with a session id
    pub fn log_with_session(
        &self,
        lvl: LogLevel,
        evt: EventKind,
        session_id: Option<String>,
        data: serde_json::Value,
    ) {
        let entry = CorrelationLogEntry {
            ts: Utc::now(),
            lvl,
            evt,
            guardian_id: self.guardian_id.clone(),
            session_id,
            data,
        };

        let urgent = lvl.is_urgent();
        {
            let mut buffer = match self.buffer.lock() {
                Ok(buffer) => buffer,
                Err(poisoned) => poisoned.into_inner(),
            };
            buffer.push(entry);
        }

        if urgent {
            if let Err(e) = self.flush() {
                warn!(error = %e, "Urgent correlation flush failed");
            }
        }
    }

    /// Record a metric sample
    pub fn log_metrics(&self, sample: &MetricSample) {
        self.log(
            LogLevel::Info,
            EventKind::Metrics,
            serde_json::json!({
                "ram_pct": sample.ram_pct,
                "cpu_pct": sample.cpu_pct,
                "disk_pct": sample.disk_pct,
                "temp_c": sample.temp_c,
                "inference_up": sample.inference_up(),
            }),
        );
    }

    /// Record a guardian action such as a transition or kill
    pub fn log_action(&self, action: &str, data: serde_json::Value) {
        let mut payload = serde_json::json!({ "action": action });
        if let (Some(obj), Some(extra)) = (payload.as_object_mut(), data.as_object()) {
            for (key, value) in extra {
                obj.insert(key.clone(), value.clone());
            }
        }
        self.log(LogLevel::Info, EventKind::Action, payload);
    }

    /// Record an alert at the given severity
    pub fn log_alert(&self, lvl: LogLevel, alert: &str, data: serde_json::Value) {
        let mut payload = serde_json::json!({ "alert": alert });
        if let (Some(obj), Some(extra)) = (payload.as_object_mut(), data.as_object()) {
            for (key, value) in extra {
                obj.insert(key.clone(), value.clone());
            }
        }
        self.log(lvl, EventKind::Alert, payload);
    }

    /// Record request timing observed at the admission gate
    pub fn log_response_time(&self, path: &str, response_time_ms: f64) {
        self.log(
            LogLevel::Info,
            EventKind::Metrics,
            serde_json::json!({
                "path": path,
                "response_time_ms": response_time_ms,
            }),
        );
    }

    /// Write all buffered entries to the active file and rotate if needed
    pub fn flush(&self) -> Result<()> {
        let entries: Vec<CorrelationLogEntry> = {
            let mut buffer = match self.buffer.lock() {
                Ok(buffer) => buffer,
                Err(poisoned) => poisoned.into_inner(),
            };
            buffer.drain(..).collect()
        };

        if entries.is_empty() {
            return Ok(());
        }

        let mut lines = String::new();
        for entry in &entries {
            let line = serde_json::to_string(entry).context("Failed to serialize log entry")?;
            lines.push_str(&line);
            lines.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)
            .with_context(|| format!("Failed to open log file {:?}", self.config.path))?;
        file.write_all(lines.as_bytes())
            .context("Failed to append log entries")?;

        debug!(entries = entries.len(), "Correlation log flushed");
        self.maybe_rotate()
    }

    /// Entries waiting in memory
    pub fn pending(&self) -> usize {
        match self.buffer.lock() {
            Ok(buffer) => buffer.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Periodic flush until shutdown; performs a final flush on exit
    pub async fn run_flush_task(
        self: std::sync::Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(self.config.flush_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.flush() {
                        warn!(error = %e, "Correlation flush failed");
                    }
                }
                _ = shutdown.recv() => {
                    if let Err(e) = self.flush() {
                        warn!(error = %e, "Final correlation flush failed");
                    }
                    info!("Correlation logger stopped");
                    break;
                }
            }
        }
    }

    fn maybe_rotate(&self) -> Result<()> {
        let size = std::fs::metadata(&self.config.path)
            .map(|meta| meta.len())
            .unwrap_or(0);
        if size <= self.config.max_file_bytes {
            return Ok(());
        }

        // Shift guardian.ndjson.N -> N+1, dropping the oldest
        for index in (1..=self.config.max_rotated_files).rev() {
            let from = rotated_path(&self.config.path, index);
            if !from.exists() {
                continue;
            }
            if index == self.config.max_rotated_files {
                std::fs::remove_file(&from)
                    .with_context(|| format!("Failed to remove {:?}", from))?;
            } else {
                let to = rotated_path(&self.config.path, index + 1);
                std::fs::rename(&from, &to)
                    .with_context(|| format!("Failed to rotate {:?}", from))?;
            }
        }

        let first = rotated_path(&self.config.path, 1);
        std::fs::rename(&self.config.path, &first)
            .with_context(|| format!("Failed to rotate {:?}", self.config.path))?;
        info!(file = %self.config.path.display(), "Correlation log rotated");
        Ok(())
    }
}

fn rotated_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn logger(dir: &TempDir, max_bytes: u64) -> CorrelationLogger {
        CorrelationLogger::new(
            LoggerConfig {
                path: dir.path().join("guardian.ndjson"),
                flush_interval: Duration::from_secs(5),
                max_file_bytes: max_bytes,
                max_rotated_files: 2,
            },
            "guardian-test",
        )
        .unwrap()
    }

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_entries_buffer_until_flush() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir, 1024 * 1024);

        logger.log(
            LogLevel::Info,
            EventKind::Action,
            serde_json::json!({"action": "state_transition"}),
        );
        assert_eq!(logger.pending(), 1);
        assert!(read_lines(&dir.path().join("guardian.ndjson")).is_empty());

        logger.flush().unwrap();
        assert_eq!(logger.pending(), 0);

        let lines = read_lines(&dir.path().join("guardian.ndjson"));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["evt"], "action");
        assert_eq!(lines[0]["guardian_id"], "guardian-test");
    }

    #[test]
    fn test_urgent_levels_flush_immediately() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir, 1024 * 1024);

        logger.log(
            LogLevel::Critical,
            EventKind::Alert,
            serde_json::json!({"alert": "lockdown_engaged"}),
        );

        // No explicit flush needed
        let lines = read_lines(&dir.path().join("guardian.ndjson"));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["lvl"], "critical");
    }

    #[test]
    fn test_rotation_keeps_bounded_files() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir, 64);

        // Each flush exceeds 64 bytes and triggers a rotation
        for i in 0..4 {
            logger.log(
                LogLevel::Info,
                EventKind::Metrics,
                serde_json::json!({"ram_pct": 0.5, "round": i}),
            );
            logger.flush().unwrap();
        }

        let base = dir.path().join("guardian.ndjson");
        assert!(rotated_path(&base, 1).exists());
        assert!(rotated_path(&base, 2).exists());
        // Older rotations were dropped
        assert!(!rotated_path(&base, 3).exists());
    }

    #[test]
    fn test_log_metrics_shape() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir, 1024 * 1024);

        let sample = MetricSample {
            timestamp: Utc::now(),
            ram_pct: 0.42,
            cpu_pct: 0.13,
            disk_pct: 0.5,
            temp_c: Some(61.0),
            inference_pids: vec![77],
        };
        logger.log_metrics(&sample);
        logger.flush().unwrap();

        let lines = read_lines(&dir.path().join("guardian.ndjson"));
        assert_eq!(lines[0]["evt"], "metrics");
        assert_eq!(lines[0]["data"]["ram_pct"], 0.42);
        assert_eq!(lines[0]["data"]["inference_up"], true);
    }
}
