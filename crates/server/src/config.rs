//! Placement service configuration

use anyhow::{Context, Result};
use placement_lib::fetch::FetchConfig;
use placement_lib::workload::DEFAULT_HISTORY_CAPACITY;
use placement_lib::{FilterOptions, RegistryConfig, SensorMatchPolicy, DEFAULT_ARCHITECTURE};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "PLACEMENT_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name reported in lifecycle logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Base URL of the device registry
    #[serde(default = "default_registry_endpoint")]
    pub registry_endpoint: String,

    #[serde(default = "default_registry_timeout")]
    pub registry_timeout_secs: u64,

    /// Architecture required when the workload names none
    #[serde(default = "default_architecture")]
    pub default_architecture: String,

    #[serde(default)]
    pub default_sensor_match: SensorMatchPolicy,

    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,

    #[serde(default = "default_fan_out_deadline")]
    pub fan_out_deadline_ms: u64,

    /// Tables kept per workload in the history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "placement".to_string())
}

fn default_api_port() -> u16 {
    46020
}

fn default_registry_endpoint() -> String {
    RegistryConfig::default().endpoint
}

fn default_registry_timeout() -> u64 {
    RegistryConfig::default().request_timeout.as_secs()
}

fn default_architecture() -> String {
    DEFAULT_ARCHITECTURE.to_string()
}

fn default_fetch_concurrency() -> usize {
    FetchConfig::default().concurrency
}

fn default_fetch_timeout() -> u64 {
    FetchConfig::default().fetch_timeout.as_millis() as u64
}

fn default_fan_out_deadline() -> u64 {
    FetchConfig::default().deadline.as_millis() as u64
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl ServerConfig {
    /// Load configuration from the optional file and the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    /// Load with an explicit file; `PLACEMENT_*` variables override it
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("PLACEMENT").try_parsing(true))
            .build()
            .context("Failed to read placement configuration")?;

        config
            .try_deserialize()
            .context("Invalid placement configuration")
    }

    pub fn registry(&self) -> RegistryConfig {
        RegistryConfig {
            endpoint: self.registry_endpoint.clone(),
            request_timeout: Duration::from_secs(self.registry_timeout_secs),
        }
    }

    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            default_architecture: self.default_architecture.clone(),
            default_sensor_match: self.default_sensor_match,
            fetch: FetchConfig {
                concurrency: self.fetch_concurrency,
                fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
                deadline: Duration::from_millis(self.fan_out_deadline_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = ServerConfig::load_from(None).unwrap();

        assert_eq!(config.default_sensor_match, SensorMatchPolicy::Superset);
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);

        let options = config.filter_options();
        assert_eq!(options.fetch.concurrency, config.fetch_concurrency);
    }

    #[test]
    fn test_file_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
registry_endpoint = "http://registry.local/api"
default_architecture = "armv7l"
default_sensor_match = "strict_equality"
fetch_timeout_ms = 750
"#
        )
        .unwrap();

        let config = ServerConfig::load_from(Some(file.path())).unwrap();

        assert_eq!(config.registry().endpoint, "http://registry.local/api");
        assert_eq!(config.default_architecture, "armv7l");
        assert_eq!(
            config.filter_options().default_sensor_match,
            SensorMatchPolicy::StrictEquality
        );
        assert_eq!(
            config.filter_options().fetch.fetch_timeout,
            Duration::from_millis(750)
        );
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "fetch_concurrency = \"many\"").unwrap();

        assert!(ServerConfig::load_from(Some(file.path())).is_err());
    }
}
