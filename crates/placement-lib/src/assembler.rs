//! Builds the final ranked table handed to the workload history

use crate::models::{
    DeviceDescriptor, DeviceDynamics, RankedResultRow, RankedResultTable, ResourceScore,
};

/// Row for a device, scored or not
pub fn build_row(
    descriptor: &DeviceDescriptor,
    dynamics: Option<&DeviceDynamics>,
    utilization: Option<ResourceScore>,
    saturation: Option<ResourceScore>,
) -> RankedResultRow {
    let ip_address = dynamics
        .map(|d| d.address.clone())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| descriptor.address.clone());

    RankedResultRow {
        node_name: descriptor.id.clone(),
        node_type: descriptor.arch.clone(),
        ip_address,
        utilization,
        saturation,
        device_id: descriptor.id.clone(),
    }
}

/// Merges ranked candidates with the devices that failed filtering
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    device_id_column: String,
}

impl ResultAssembler {
    pub fn new(device_id_column: impl Into<String>) -> Self {
        Self {
            device_id_column: device_id_column.into(),
        }
    }

    pub fn device_id_column(&self) -> &str {
        &self.device_id_column
    }

    /// Ranked rows first, in the order given, then every rejected row with
    /// its scores cleared
    pub fn assemble(
        &self,
        ranked: Vec<RankedResultRow>,
        rejected: Vec<RankedResultRow>,
    ) -> RankedResultTable {
        let mut rows = ranked;
        rows.reserve(rejected.len());
        rows.extend(rejected.into_iter().map(|mut row| {
            row.utilization = None;
            row.saturation = None;
            row
        }));

        RankedResultTable::new(self.device_id_column.clone(), rows)
    }
}
