//! Offline correlation analysis command

use crate::output::{self, OutputFormat};
use anyhow::Result;
use guardian_lib::correlation::{AnalyzerConfig, CorrelationAnalyzer};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

#[derive(Debug, Serialize, Tabled)]
struct DistributionRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "p95")]
    p95: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Samples")]
    count: usize,
}

#[derive(Debug, Serialize, Tabled)]
struct RecommendationRow {
    #[tabled(rename = "Parameter")]
    parameter: String,
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Run the analyzer over a log directory and print the report
pub fn run(log_dir: &Path, format: OutputFormat) -> Result<()> {
    let analyzer = CorrelationAnalyzer::new(AnalyzerConfig::default());
    let report = analyzer.analyze_dir(log_dir)?;

    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let distributions = vec![
        DistributionRow {
            metric: "RAM".to_string(),
            mean: output::format_pct(report.ram.mean),
            p95: output::format_pct(report.ram.p95),
            max: output::format_pct(report.ram.max),
            count: report.ram.count,
        },
        DistributionRow {
            metric: "CPU".to_string(),
            mean: output::format_pct(report.cpu.mean),
            p95: output::format_pct(report.cpu.p95),
            max: output::format_pct(report.cpu.max),
            count: report.cpu.count,
        },
    ];
    output::print_table(&distributions, format);

    output::print_info(&format!(
        "degraded events: {}, kills: {}, suppressed kills: {}",
        report.degraded_events, report.kill_events, report.suppressed_kills
    ));
    if let Some(r) = report.response_time_correlation {
        output::print_info(&format!("RAM vs response time correlation: r = {:.2}", r));
    }

    if report.recommendations.is_empty() {
        output::print_success("No tuning recommendations");
    } else {
        let rows: Vec<RecommendationRow> = report
            .recommendations
            .iter()
            .map(|rec| RecommendationRow {
                parameter: rec.parameter.clone(),
                direction: output::color_direction(&rec.direction.to_string()),
                reason: rec.reason.clone(),
            })
            .collect();
        output::print_table(&rows, format);
        output::print_warning("Recommendations are advisory; thresholds are never changed automatically");
    }

    Ok(())
}
