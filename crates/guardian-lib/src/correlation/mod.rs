//! Correlation event log and offline analysis
//!
//! Every component emits structured events (metric samples, guardian
//! actions, alerts) to an append-only NDJSON log. The offline analyzer
//! consumes the log and recommends threshold adjustments; it never touches
//! live configuration.

mod analyzer;
mod logger;

pub use analyzer::{
    AnalysisReport, AnalyzerConfig, CorrelationAnalyzer, Direction, MetricDistribution,
    Recommendation,
};
pub use logger::{CorrelationLogEntry, CorrelationLogger, EventKind, LogLevel, LoggerConfig};
