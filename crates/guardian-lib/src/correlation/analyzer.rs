//! Offline correlation analysis
//!
//! Loads recent correlation records, computes RAM/CPU distributions,
//! correlates memory pressure with recorded response times, and emits
//! advisory threshold recommendations. Purely read-only: recommendations
//! are printed for operators, never applied to a running guardian.

use super::logger::{CorrelationLogEntry, EventKind};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default cap on entries loaded per analysis
const DEFAULT_MAX_ENTRIES: usize = 50_000;

/// Minimum metric samples for a meaningful report
const MIN_SAMPLES: usize = 20;

/// Degradation frequency above which the soft threshold looks late
const DEGRADE_FREQUENCY_THRESHOLD: f64 = 0.10;

/// Correlation coefficient treated as a strong relationship
const STRONG_CORRELATION: f64 = 0.6;

/// Maximum gap when pairing a response time with a host sample
const PAIRING_WINDOW_SECS: i64 = 60;

/// Configuration for the analyzer
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Cap on loaded entries (newest win)
    pub max_entries: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Distribution summary for one metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDistribution {
    pub mean: f64,
    pub p95: f64,
    pub max: f64,
    pub count: usize,
}

impl MetricDistribution {
    fn from_values(mut values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self {
                mean: 0.0,
                p95: 0.0,
                max: 0.0,
                count: 0,
            };
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let p95_index = ((count as f64 * 0.95).ceil() as usize).saturating_sub(1);
        Self {
            mean,
            p95: values[p95_index.min(count - 1)],
            max: values[count - 1],
            count,
        }
    }
}

/// Suggested direction for a tuning parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Lower,
    Raise,
    Keep,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Lower => write!(f, "lower"),
            Direction::Raise => write!(f, "raise"),
            Direction::Keep => write!(f, "keep"),
        }
    }
}

/// One advisory tuning recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub parameter: String,
    pub direction: Direction,
    pub reason: String,
}

/// Result of an offline analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub samples: usize,
    pub ram: MetricDistribution,
    pub cpu: MetricDistribution,
    pub degraded_events: usize,
    pub kill_events: usize,
    pub suppressed_kills: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_correlation: Option<f64>,
    pub recommendations: Vec<Recommendation>,
}

/// Offline analyzer over correlation logs
pub struct CorrelationAnalyzer {
    config: AnalyzerConfig,
}

impl CorrelationAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Analyze the active log plus any rotated files in a directory
    pub fn analyze_dir(&self, dir: &Path) -> Result<AnalysisReport> {
        let mut entries = Vec::new();
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read log directory {:?}", dir))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().contains("ndjson"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        for path in paths {
            entries.extend(self.load_file(&path)?);
        }
        Ok(self.analyze_entries(entries))
    }

    /// Load one NDJSON file, skipping unparseable lines
    pub fn load_file(&self, path: &Path) -> Result<Vec<CorrelationLogEntry>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read log file {:?}", path))?;
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// Compute the report from loaded entries
    pub fn analyze_entries(&self, mut entries: Vec<CorrelationLogEntry>) -> AnalysisReport {
        entries.sort_by_key(|entry| entry.ts);
        if entries.len() > self.config.max_entries {
            let skip = entries.len() - self.config.max_entries;
            entries.drain(..skip);
        }

        let mut ram_values = Vec::new();
        let mut cpu_values = Vec::new();
        let mut host_samples: Vec<(DateTime<Utc>, f64)> = Vec::new();
        let mut response_times: Vec<(DateTime<Utc>, f64)> = Vec::new();
        let mut degraded_events = 0usize;
        let mut kill_events = 0usize;
        let mut suppressed_kills = 0usize;

        for entry in &entries {
            match entry.evt {
                EventKind::Metrics => {
                    if let Some(ram) = entry.data.get("ram_pct").and_then(|v| v.as_f64()) {
                        ram_values.push(ram);
                        host_samples.push((entry.ts, ram));
                    }
                    if let Some(cpu) = entry.data.get("cpu_pct").and_then(|v| v.as_f64()) {
                        cpu_values.push(cpu);
                    }
                    if let Some(rt) = entry.data.get("response_time_ms").and_then(|v| v.as_f64()) {
                        response_times.push((entry.ts, rt));
                    }
                }
                EventKind::Action => {
                    match entry.data.get("action").and_then(|v| v.as_str()) {
                        Some("enter_degraded") => degraded_events += 1,
                        Some("kill_executed") => kill_events += 1,
                        _ => {}
                    }
                }
                EventKind::Alert => {
                    if entry.data.get("alert").and_then(|v| v.as_str())
                        == Some("suppressed_kill")
                    {
                        suppressed_kills += 1;
                    }
                }
                EventKind::Correlation => {}
            }
        }

        let correlation = pearson_against_samples(&host_samples, &response_times);
        let ram = MetricDistribution::from_values(ram_values);
        let cpu = MetricDistribution::from_values(cpu_values);
        let recommendations = self.recommend(
            &ram,
            degraded_events,
            kill_events,
            suppressed_kills,
            correlation,
        );

        AnalysisReport {
            samples: ram.count,
            ram,
            cpu,
            degraded_events,
            kill_events,
            suppressed_kills,
            response_time_correlation: correlation,
            recommendations,
        }
    }

    fn recommend(
        &self,
        ram: &MetricDistribution,
        degraded_events: usize,
        kill_events: usize,
        suppressed_kills: usize,
        correlation: Option<f64>,
    ) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();
        if ram.count < MIN_SAMPLES {
            recommendations.push(Recommendation {
                parameter: "sample_volume".to_string(),
                direction: Direction::Keep,
                reason: format!(
                    "Only {} samples recorded; collect more before tuning",
                    ram.count
                ),
            });
            return recommendations;
        }

        let degrade_frequency = degraded_events as f64 / ram.count as f64;
        if degrade_frequency > DEGRADE_FREQUENCY_THRESHOLD {
            recommendations.push(Recommendation {
                parameter: "soft_pct".to_string(),
                direction: Direction::Lower,
                reason: format!(
                    "Degradation engaged in {:.0}% of samples; degrade earlier to shed load before pressure builds",
                    degrade_frequency * 100.0
                ),
            });
        }

        if suppressed_kills > kill_events && kill_events > 0 {
            recommendations.push(Recommendation {
                parameter: "hard_pct".to_string(),
                direction: Direction::Lower,
                reason: format!(
                    "{} hard triggers recurred inside the kill cooldown against {} executed kills; pressure persists after kills",
                    suppressed_kills, kill_events
                ),
            });
        }

        if degraded_events == 0 && kill_events == 0 && ram.p95 < 0.6 {
            recommendations.push(Recommendation {
                parameter: "soft_pct".to_string(),
                direction: Direction::Raise,
                reason: format!(
                    "RAM p95 is {:.0}% and no degradation occurred; thresholds are conservative for this host",
                    ram.p95 * 100.0
                ),
            });
        }

        if let Some(r) = correlation {
            if r > STRONG_CORRELATION {
                recommendations.push(Recommendation {
                    parameter: "thresholds".to_string(),
                    direction: Direction::Keep,
                    reason: format!(
                        "Response time correlates with memory pressure (r = {:.2}); memory remains the right admission signal",
                        r
                    ),
                });
            }
        }

        recommendations
    }
}

impl Default for CorrelationAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

/// Pair response times with the nearest host sample and compute Pearson r
fn pearson_against_samples(
    host_samples: &[(DateTime<Utc>, f64)],
    response_times: &[(DateTime<Utc>, f64)],
) -> Option<f64> {
    if host_samples.is_empty() || response_times.is_empty() {
        return None;
    }

    let mut pairs = Vec::new();
    for (ts, rt) in response_times {
        let nearest = host_samples
            .iter()
            .min_by_key(|(sample_ts, _)| (*sample_ts - *ts).num_seconds().abs());
        if let Some((sample_ts, ram)) = nearest {
            if (*sample_ts - *ts).num_seconds().abs() <= PAIRING_WINDOW_SECS {
                pairs.push((*ram, *rt));
            }
        }
    }

    pearson(&pairs)
}

/// Pearson correlation coefficient over (x, y) pairs
fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    let n = pairs.len();
    if n < 3 {
        return None;
    }

    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n as f64;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x < f64::EPSILON || var_y < f64::EPSILON {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::logger::LogLevel;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn metrics_entry(secs: i64, ram: f64, cpu: f64) -> CorrelationLogEntry {
        CorrelationLogEntry {
            ts: t(secs),
            lvl: LogLevel::Info,
            evt: EventKind::Metrics,
            guardian_id: "g".to_string(),
            session_id: None,
            data: serde_json::json!({"ram_pct": ram, "cpu_pct": cpu}),
        }
    }

    fn action_entry(secs: i64, action: &str) -> CorrelationLogEntry {
        CorrelationLogEntry {
            ts: t(secs),
            lvl: LogLevel::Info,
            evt: EventKind::Action,
            guardian_id: "g".to_string(),
            session_id: None,
            data: serde_json::json!({"action": action}),
        }
    }

    fn response_entry(secs: i64, ms: f64) -> CorrelationLogEntry {
        CorrelationLogEntry {
            ts: t(secs),
            lvl: LogLevel::Info,
            evt: EventKind::Metrics,
            guardian_id: "g".to_string(),
            session_id: None,
            data: serde_json::json!({"path": "/chat", "response_time_ms": ms}),
        }
    }

    #[test]
    fn test_distribution_summary() {
        let values: Vec<f64> = (1..=100).map(|i| i as f64 / 100.0).collect();
        let dist = MetricDistribution::from_values(values);
        assert!((dist.mean - 0.505).abs() < 0.001);
        assert!((dist.p95 - 0.95).abs() < 0.001);
        assert!((dist.max - 1.0).abs() < 0.001);
        assert_eq!(dist.count, 100);
    }

    #[test]
    fn test_insufficient_samples_yields_no_tuning() {
        let analyzer = CorrelationAnalyzer::default();
        let entries = (0..5).map(|i| metrics_entry(i * 5, 0.5, 0.3)).collect();
        let report = analyzer.analyze_entries(entries);

        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(report.recommendations[0].parameter, "sample_volume");
    }

    #[test]
    fn test_frequent_degradation_recommends_lower_soft() {
        let analyzer = CorrelationAnalyzer::default();
        let mut entries: Vec<CorrelationLogEntry> =
            (0..30).map(|i| metrics_entry(i * 5, 0.8, 0.4)).collect();
        for i in 0..5 {
            entries.push(action_entry(i * 20 + 1, "enter_degraded"));
        }

        let report = analyzer.analyze_entries(entries);
        assert_eq!(report.degraded_events, 5);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.parameter == "soft_pct" && r.direction == Direction::Lower));
    }

    #[test]
    fn test_quiet_host_recommends_raising_soft() {
        let analyzer = CorrelationAnalyzer::default();
        let entries = (0..50).map(|i| metrics_entry(i * 5, 0.3, 0.2)).collect();
        let report = analyzer.analyze_entries(entries);

        assert!(report
            .recommendations
            .iter()
            .any(|r| r.parameter == "soft_pct" && r.direction == Direction::Raise));
    }

    #[test]
    fn test_response_time_correlation_detected() {
        let analyzer = CorrelationAnalyzer::default();
        let mut entries = Vec::new();
        // Response time rises with RAM
        for i in 0..40 {
            let ram = 0.3 + i as f64 * 0.01;
            entries.push(metrics_entry(i * 10, ram, 0.3));
            entries.push(response_entry(i * 10 + 1, 100.0 + i as f64 * 20.0));
        }

        let report = analyzer.analyze_entries(entries);
        let r = report.response_time_correlation.unwrap();
        assert!(r > 0.9, "expected strong correlation, got {}", r);
        assert!(report
            .recommendations
            .iter()
            .any(|rec| rec.parameter == "thresholds" && rec.direction == Direction::Keep));
    }

    #[test]
    fn test_kill_and_suppression_counting() {
        let analyzer = CorrelationAnalyzer::default();
        let mut entries: Vec<CorrelationLogEntry> =
            (0..30).map(|i| metrics_entry(i * 5, 0.9, 0.5)).collect();
        entries.push(action_entry(200, "kill_executed"));
        for i in 0..3 {
            entries.push(CorrelationLogEntry {
                ts: t(210 + i * 5),
                lvl: LogLevel::Warning,
                evt: EventKind::Alert,
                guardian_id: "g".to_string(),
                session_id: None,
                data: serde_json::json!({"alert": "suppressed_kill"}),
            });
        }

        let report = analyzer.analyze_entries(entries);
        assert_eq!(report.kill_events, 1);
        assert_eq!(report.suppressed_kills, 3);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.parameter == "hard_pct" && r.direction == Direction::Lower));
    }

    #[test]
    fn test_pearson_degenerate_cases() {
        assert!(pearson(&[(1.0, 2.0), (2.0, 3.0)]).is_none());
        // Zero variance in x
        assert!(pearson(&[(1.0, 2.0), (1.0, 3.0), (1.0, 4.0)]).is_none());

        let perfect: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, i as f64 * 2.0)).collect();
        let r = pearson(&perfect).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
    }
}
