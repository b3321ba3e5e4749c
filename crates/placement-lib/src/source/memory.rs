//! Fixture-backed device source

use super::{async_trait, DeviceSource};
use crate::error::{PlacementError, Result};
use crate::models::{DeviceDescriptor, DeviceDynamics, ServiceDefinition};
use std::collections::HashMap;
use std::time::Duration;

/// In-memory fleet, served in insertion order
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    devices: Vec<DeviceDescriptor>,
    dynamics: HashMap<String, DeviceDynamics>,
    services: Vec<ServiceDefinition>,
    delays: HashMap<String, Duration>,
    failing_devices: Vec<String>,
    unavailable: bool,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: DeviceDescriptor, dynamics: Option<DeviceDynamics>) -> Self {
        if let Some(dynamics) = dynamics {
            self.dynamics.insert(device.id.clone(), dynamics);
        }
        self.devices.push(device);
        self
    }

    pub fn with_service(mut self, service: ServiceDefinition) -> Self {
        self.services.push(service);
        self
    }

    /// Delay the dynamics answer for one device
    pub fn with_delay(mut self, device_id: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(device_id.into(), delay);
        self
    }

    /// Make the dynamics fetch for one device fail
    pub fn with_failing_dynamics(mut self, device_id: impl Into<String>) -> Self {
        self.failing_devices.push(device_id.into());
        self
    }

    /// Make every registry call fail
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(PlacementError::Source("registry unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceSource for InMemorySource {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        self.check_available()?;
        Ok(self.devices.clone())
    }

    async fn get_dynamics(&self, device_id: &str) -> Result<Option<DeviceDynamics>> {
        self.check_available()?;
        if let Some(delay) = self.delays.get(device_id) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_devices.iter().any(|id| id == device_id) {
            return Err(PlacementError::Source(format!(
                "dynamics lookup failed for {}",
                device_id
            )));
        }
        Ok(self.dynamics.get(device_id).cloned())
    }

    async fn list_services_by_name(&self, name: &str) -> Result<Vec<ServiceDefinition>> {
        self.check_available()?;
        Ok(self
            .services
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect())
    }

    async fn get_service(&self, service_id: &str) -> Result<Option<ServiceDefinition>> {
        self.check_available()?;
        Ok(self.services.iter().find(|s| s.id == service_id).cloned())
    }
}
