//! Fleet placement CLI
//!
//! A command-line test client that submits workloads to the placement
//! service and shows the ranked devices, workload history and service health.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{placement, status};
use std::path::PathBuf;

/// Fleet placement CLI
#[derive(Parser)]
#[command(name = "placer")]
#[command(author, version, about = "CLI for the Fleet Placement service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via PLACER_API_URL env var)
    #[arg(long, env = "PLACER_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rank the fleet's devices for a workload
    Optimal(OptimalArgs),

    /// Show the ranked tables recorded for a workload
    History {
        /// Workload name (or service id for unnamed workloads)
        name: String,
    },

    /// Show placement service health
    Health,
}

#[derive(Args)]
pub struct OptimalArgs {
    /// JSON file describing the workload
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Workload name
    #[arg(long, short)]
    pub name: Option<String>,

    /// Registered service id
    #[arg(long)]
    pub service_id: Option<String>,

    /// Project; selects the `<project>_device_id` column
    #[arg(long, short)]
    pub project: Option<String>,

    /// Sort keys, most significant first (cpu, memory, disk, network)
    #[arg(long, value_delimiter = ',')]
    pub sort_order: Vec<String>,

    /// Required sensor types
    #[arg(long, value_delimiter = ',')]
    pub req_resource: Vec<String>,

    /// Required agent type
    #[arg(long)]
    pub agent_type: Option<String>,

    /// Required architecture (defaults to the server's)
    #[arg(long)]
    pub target_arch: Option<String>,

    /// Sensor matching policy (superset, strict_equality)
    #[arg(long)]
    pub sensor_match: Option<String>,
}

impl OptimalArgs {
    fn flags(&self, default_project: Option<&String>) -> placement::WorkloadFlags {
        placement::WorkloadFlags {
            name: self.name.clone(),
            service_id: self.service_id.clone(),
            project: self.project.clone(),
            default_project: default_project.cloned(),
            sort_order: self.sort_order.clone(),
            req_resource: self.req_resource.clone(),
            agent_type: self.agent_type.clone(),
            target_arch: self.target_arch.clone(),
            sensor_match: self.sensor_match.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load()?;

    let client = client::ApiClient::new(&config.api_url(cli.api_url.as_deref()))?;

    match cli.command {
        Commands::Optimal(args) => {
            let flags = args.flags(config.default_project.as_ref());
            let workload = placement::build_workload(args.file.as_deref(), &flags)?;
            placement::run_optimal(&client, &workload, cli.format).await?;
        }
        Commands::History { name } => {
            placement::show_history(&client, &name, cli.format).await?;
        }
        Commands::Health => {
            status::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}
