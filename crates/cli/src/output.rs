//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
#[allow(dead_code)]
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a 0..1 fraction as a percentage
pub fn format_pct(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Color a guardian status string
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "ok" | "normal" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "emergency" | "lockdown" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a tuning direction
pub fn color_direction(direction: &str) -> String {
    match direction {
        "lower" => direction.yellow().to_string(),
        "raise" => direction.blue().to_string(),
        "keep" => direction.green().to_string(),
        _ => direction.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pct() {
        assert_eq!(format_pct(0.856), "85.6%");
        assert_eq!(format_pct(0.0), "0.0%");
        assert_eq!(format_pct(1.0), "100.0%");
    }

    #[test]
    fn test_color_status_passthrough_for_unknown() {
        // Unknown statuses come back uncolored
        assert_eq!(color_status("mystery"), "mystery");
    }
}
