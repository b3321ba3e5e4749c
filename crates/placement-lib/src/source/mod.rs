//! Device snapshot sources
//!
//! The placement engine reads fleet state through [`DeviceSource`]. The
//! registry client talks to a CIMI-style collections API over HTTP; the
//! in-memory source serves fixtures for tests and local demos.

mod cimi;
mod memory;

pub use cimi::{CimiClient, RegistryConfig};
pub use memory::InMemorySource;

use crate::error::Result;
use crate::models::{DeviceDescriptor, DeviceDynamics, ServiceDefinition};

pub use async_trait::async_trait;

/// Read-only view of the device registry
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// List every device in the fleet, in registry order
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Live telemetry for one device; `None` when the device reports nothing
    async fn get_dynamics(&self, device_id: &str) -> Result<Option<DeviceDynamics>>;

    /// Services registered under `name`
    async fn list_services_by_name(&self, name: &str) -> Result<Vec<ServiceDefinition>>;

    /// Look up a single service by id
    async fn get_service(&self, service_id: &str) -> Result<Option<ServiceDefinition>>;
}

/// Strip a registry resource prefix such as `device/` from an id
pub fn short_id(resource_id: &str) -> &str {
    resource_id
        .split_once('/')
        .map_or(resource_id, |(_, id)| id)
}
