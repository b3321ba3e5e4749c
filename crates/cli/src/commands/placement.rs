//! Placement CLI commands

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::{Map, Value};
use std::path::Path;

use crate::client::ApiClient;
use crate::output::{
    device_id_column, format_timestamp, print_info, print_json, print_success, print_warning,
    render_records, OutputFormat,
};

/// Workload fields settable from the command line
#[derive(Debug, Clone, Default)]
pub struct WorkloadFlags {
    pub name: Option<String>,
    pub service_id: Option<String>,
    pub project: Option<String>,
    /// Used only when neither the flags nor the file name a project
    pub default_project: Option<String>,
    pub sort_order: Vec<String>,
    pub req_resource: Vec<String>,
    pub agent_type: Option<String>,
    pub target_arch: Option<String>,
    pub sensor_match: Option<String>,
}

/// Build the workload body from an optional JSON file and flags
///
/// Flags override fields read from the file.
pub fn build_workload(file: Option<&Path>, flags: &WorkloadFlags) -> Result<Value> {
    let mut workload = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read workload file {}", path.display()))?;
            let value: Value =
                serde_json::from_str(&content).context("Failed to parse workload file")?;
            match value {
                Value::Object(map) => map,
                _ => anyhow::bail!("Workload file must contain a JSON object"),
            }
        }
        None => Map::new(),
    };

    let mut set = |key: &str, value: Option<&String>| {
        if let Some(v) = value {
            workload.insert(key.to_string(), Value::String(v.clone()));
        }
    };
    set("name", flags.name.as_ref());
    set("service_id", flags.service_id.as_ref());
    set("project", flags.project.as_ref());
    set("agent_type", flags.agent_type.as_ref());
    set("target_arch", flags.target_arch.as_ref());
    set("sensor_match", flags.sensor_match.as_ref());

    if let Some(project) = &flags.default_project {
        workload
            .entry("project")
            .or_insert_with(|| Value::String(project.clone()));
    }

    if !flags.sort_order.is_empty() {
        workload.insert("sort_order".to_string(), string_list(&flags.sort_order));
    }
    if !flags.req_resource.is_empty() {
        workload.insert("req_resource".to_string(), string_list(&flags.req_resource));
    }

    let named = ["name", "service_id"]
        .iter()
        .any(|k| workload.get(*k).and_then(Value::as_str).is_some_and(|v| !v.is_empty()));
    if !named {
        anyhow::bail!("A workload needs --name or --service-id (or a file providing one)");
    }

    Ok(Value::Object(workload))
}

fn string_list(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

/// Submit a workload and show the ranked devices
pub async fn run_optimal(client: &ApiClient, workload: &Value, format: OutputFormat) -> Result<()> {
    let records = client.optimal(workload).await?;

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Table => {
            if records.is_empty() {
                print_warning("No devices returned; is the service registered?");
                return Ok(());
            }

            println!("{}", render_records(&records));

            let ineligible = records
                .iter()
                .filter(|r| r.get("compute utilization").map_or(true, Value::is_null))
                .count();
            print_success(&format!(
                "{} eligible, {} ineligible",
                records.len() - ineligible,
                ineligible
            ));
            if let Some(column) = device_id_column(&records) {
                print_info(&format!("Device ids reported in column '{}'", column));
            }
        }
    }

    Ok(())
}

/// Show the tables appended for a workload
pub async fn show_history(client: &ApiClient, workload: &str, format: OutputFormat) -> Result<()> {
    let entries = client.history(workload).await?;

    match format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Table => {
            println!("{}", "Placement History".bold());
            println!("{}", "=".repeat(60));
            println!("Workload: {}", workload.cyan());
            println!();

            if entries.is_empty() {
                print_warning("No placement runs recorded for this workload");
                return Ok(());
            }

            for entry in &entries {
                println!(
                    "{} {} ({} devices)",
                    format_timestamp(&entry.recorded_at).bold(),
                    entry.filter.dimmed(),
                    entry.table.len()
                );
                if !entry.table.is_empty() {
                    println!("{}", render_records(&entry.table));
                }
                println!();
            }
            println!("Total: {} runs", entries.len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_workload_from_flags() {
        let flags = WorkloadFlags {
            name: Some("svc".to_string()),
            project: Some("fog".to_string()),
            sort_order: vec!["memory".to_string(), "cpu".to_string()],
            req_resource: vec!["Location".to_string()],
            ..Default::default()
        };

        let workload = build_workload(None, &flags).unwrap();
        assert_eq!(
            workload,
            json!({
                "name": "svc",
                "project": "fog",
                "sort_order": ["memory", "cpu"],
                "req_resource": ["Location"]
            })
        );
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workload.json");
        std::fs::write(
            &path,
            r#"{"name": "svc", "agent_type": "micro", "exec": "nginx"}"#,
        )
        .unwrap();

        let flags = WorkloadFlags {
            agent_type: Some("normal".to_string()),
            ..Default::default()
        };
        let workload = build_workload(Some(&path), &flags).unwrap();

        assert_eq!(workload["agent_type"], "normal");
        assert_eq!(workload["exec"], "nginx");
    }

    #[test]
    fn test_default_project_only_fills_gaps() {
        let flags = WorkloadFlags {
            name: Some("svc".to_string()),
            default_project: Some("fog".to_string()),
            ..Default::default()
        };
        assert_eq!(build_workload(None, &flags).unwrap()["project"], "fog");

        let flags = WorkloadFlags {
            project: Some("edge".to_string()),
            ..flags
        };
        assert_eq!(build_workload(None, &flags).unwrap()["project"], "edge");
    }

    #[test]
    fn test_unnamed_workload_is_rejected() {
        let flags = WorkloadFlags {
            project: Some("fog".to_string()),
            ..Default::default()
        };
        assert!(build_workload(None, &flags).is_err());
    }

    #[test]
    fn test_non_object_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workload.json");
        std::fs::write(&path, "[1, 2]").unwrap();

        assert!(build_workload(Some(&path), &WorkloadFlags::default()).is_err());
    }
}
