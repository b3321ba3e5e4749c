//! HTTP client for the CIMI device registry
//!
//! Collections are fetched with plain GETs:
//! - `device` for the fleet list
//! - `device-dynamic?$filter=device/href="device/<id>"` for live telemetry
//! - `service?$filter=name="<name>"` and `service/<id>` for service lookups

use super::{async_trait, short_id, DeviceSource};
use crate::error::{PlacementError, Result};
use crate::models::{DeviceDescriptor, DeviceDynamics, ServiceDefinition};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Configuration for the registry client
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL of the collections API (e.g. "https://cimi/api/")
    pub endpoint: String,
    /// Timeout applied to each HTTP request
    pub request_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://cimi/api/".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Registry client backed by `reqwest`
#[derive(Debug, Clone)]
pub struct CimiClient {
    client: Client,
    base_url: Url,
}

impl CimiClient {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        // Url::join replaces the last path segment unless the base ends in '/'
        let mut endpoint = config.endpoint.clone();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let base_url = Url::parse(&endpoint)?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn collection_url(&self, collection: &str, filter: Option<String>) -> Result<Url> {
        let mut url = self.base_url.join(collection)?;
        if let Some(filter) = filter {
            url.query_pairs_mut().append_pair("$filter", &filter);
        }
        Ok(url)
    }

    /// GET `url` and decode the body; `None` on 404
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        debug!(url = %url, "Querying device registry");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlacementError::Source(format!(
                "{} returned {}: {}",
                url, status, body
            )));
        }

        let bytes = response.bytes().await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[async_trait]
impl DeviceSource for CimiClient {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let url = self.collection_url("device", None)?;
        let collection: DeviceCollection = self.get_json(url).await?.ok_or_else(|| {
            PlacementError::Source("device collection not found".to_string())
        })?;

        Ok(collection.devices.into_iter().map(Into::into).collect())
    }

    async fn get_dynamics(&self, device_id: &str) -> Result<Option<DeviceDynamics>> {
        let filter = format!("device/href={}", quoted(&format!("device/{}", device_id)));
        let url = self.collection_url("device-dynamic", Some(filter))?;

        let collection: Option<DynamicsCollection> = self.get_json(url).await?;
        let first = collection.and_then(|c| c.device_dynamics.into_iter().next());

        first.map(WireDynamics::into_dynamics).transpose()
    }

    async fn list_services_by_name(&self, name: &str) -> Result<Vec<ServiceDefinition>> {
        let filter = format!("name={}", quoted(name));
        let url = self.collection_url("service", Some(filter))?;

        let collection: Option<ServiceCollection> = self.get_json(url).await?;
        Ok(collection.map(|c| c.services).unwrap_or_default())
    }

    async fn get_service(&self, service_id: &str) -> Result<Option<ServiceDefinition>> {
        let path = format!("service/{}", short_id(service_id));
        let url = self.collection_url(&path, None)?;
        self.get_json(url).await
    }
}

/// Double-quoted filter literal with `\` and `"` escaped
fn quoted(value: &str) -> String {
    let mut literal = String::with_capacity(value.len() + 2);
    literal.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            literal.push('\\');
        }
        literal.push(c);
    }
    literal.push('"');
    literal
}

#[derive(Debug, Deserialize)]
struct DeviceCollection {
    #[serde(default)]
    devices: Vec<WireDevice>,
}

#[derive(Debug, Deserialize)]
struct WireDevice {
    id: String,
    #[serde(default)]
    arch: String,
    #[serde(default, alias = "agentType")]
    agent_type: String,
    #[serde(default, rename = "ethernetAddress")]
    ethernet_address: String,
}

impl From<WireDevice> for DeviceDescriptor {
    fn from(wire: WireDevice) -> Self {
        DeviceDescriptor {
            id: short_id(&wire.id).to_string(),
            arch: wire.arch,
            agent_type: wire.agent_type,
            address: wire.ethernet_address,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DynamicsCollection {
    #[serde(default, rename = "deviceDynamics")]
    device_dynamics: Vec<WireDynamics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDynamics {
    #[serde(default)]
    cpu_free_percent: Option<Percent>,
    #[serde(default)]
    storage_free_percent: Option<Percent>,
    #[serde(default)]
    sensors: Vec<WireSensor>,
    #[serde(default)]
    wifi_address: String,
}

impl WireDynamics {
    fn into_dynamics(self) -> Result<DeviceDynamics> {
        let free_compute_percent = self.cpu_free_percent.map_or(Ok(0.0), Percent::value)?;
        let free_storage_percent = self.storage_free_percent.map_or(Ok(0.0), Percent::value)?;
        let sensor_types = self
            .sensors
            .into_iter()
            .flat_map(|s| s.sensor_type.map(SensorType::into_types).unwrap_or_default())
            .collect();

        Ok(DeviceDynamics {
            free_compute_percent,
            free_storage_percent,
            sensor_types,
            address: self.wifi_address,
        })
    }
}

/// Percentages arrive either as numbers or as numeric strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Percent {
    Number(f64),
    Text(String),
}

impl Percent {
    fn value(self) -> Result<f64> {
        match self {
            Percent::Number(n) => Ok(n),
            Percent::Text(s) => s.trim().parse().map_err(|_| {
                PlacementError::Source(format!("non-numeric percentage {:?}", s))
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSensor {
    #[serde(default)]
    sensor_type: Option<SensorType>,
}

/// A sensor entry's type: a name, a list of names, or a JSON-encoded list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SensorType {
    Many(Vec<String>),
    One(String),
}

impl SensorType {
    fn into_types(self) -> Vec<String> {
        match self {
            SensorType::Many(types) => types,
            SensorType::One(text) if text.trim_start().starts_with('[') => {
                serde_json::from_str(&text).unwrap_or_else(|_| vec![text])
            }
            SensorType::One(text) => vec![text],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServiceCollection {
    #[serde(default)]
    services: Vec<ServiceDefinition>,
}
