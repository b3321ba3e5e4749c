//! Output formatting utilities

use crate::client::ResultRecord;
use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::{builder::Builder, settings::Style};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Score columns shown in table output; saturation stays JSON-only
const SCORE_COLUMNS: [&str; 4] = [
    "compute utilization",
    "memory utilization",
    "disk utilization",
    "network utilization",
];

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Name of the per-project device id column, if any row carries one
pub fn device_id_column(records: &[ResultRecord]) -> Option<&str> {
    records
        .iter()
        .flat_map(|r| r.keys())
        .find(|k| k.ends_with("_device_id"))
        .map(String::as_str)
}

/// Render ranked records as a table, ineligible rows marked
pub fn render_records(records: &[ResultRecord]) -> String {
    let id_column = device_id_column(records).unwrap_or("device_id").to_string();

    let mut builder = Builder::default();
    let mut header = vec![
        "#".to_string(),
        id_column.clone(),
        "type".to_string(),
        "ipaddress".to_string(),
    ];
    header.extend(SCORE_COLUMNS.iter().map(|c| c.to_string()));
    builder.push_record(header);

    let mut rank = 0;
    for record in records {
        let eligible = SCORE_COLUMNS
            .iter()
            .any(|c| record.get(*c).is_some_and(|v| !v.is_null()));

        let position = if eligible {
            rank += 1;
            rank.to_string()
        } else {
            "-".to_string()
        };

        let mut row = vec![
            position,
            text(record.get(&id_column)),
            text(record.get("type")),
            text(record.get("ipaddress")),
        ];
        row.extend(SCORE_COLUMNS.iter().map(|c| format_score(record.get(*c))));
        builder.push_record(row);
    }

    builder.build().with(Style::rounded()).to_string()
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Format a score cell; null scores mark an ineligible device
pub fn format_score(value: Option<&Value>) -> String {
    match value.and_then(Value::as_f64) {
        Some(score) => format!("{:.1}", score),
        None => "ineligible".dimmed().to_string(),
    }
}

/// Format an RFC 3339 timestamp for display, falling back to the raw text
pub fn format_timestamp(ts: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.to_string()
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}
