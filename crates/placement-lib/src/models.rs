//! Core data models for the placement engine

use crate::error::{PlacementError, Result};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};

/// Default device-id column when the workload carries no project
pub const DEFAULT_DEVICE_ID_COLUMN: &str = "mf2c_device_id";

/// Architecture targeted when neither the workload nor the server says otherwise
pub const DEFAULT_ARCHITECTURE: &str = "x86_64";

/// Sensor type a device reports when nothing is attached
pub const NO_SENSOR: &str = "None";

/// Fixed column names of the ranked result table
pub mod columns {
    pub const NODE_NAME: &str = "node_name";
    pub const TYPE: &str = "type";
    pub const IP_ADDRESS: &str = "ipaddress";
    pub const COMPUTE_UTILIZATION: &str = "compute utilization";
    pub const COMPUTE_SATURATION: &str = "compute saturation";
    pub const MEMORY_UTILIZATION: &str = "memory utilization";
    pub const MEMORY_SATURATION: &str = "memory saturation";
    pub const NETWORK_UTILIZATION: &str = "network utilization";
    pub const NETWORK_SATURATION: &str = "network saturation";
    pub const DISK_UTILIZATION: &str = "disk utilization";
    pub const DISK_SATURATION: &str = "disk saturation";
}

/// Static description of a fleet member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub arch: String,
    pub agent_type: String,
    pub address: String,
}

/// Live telemetry for a single device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDynamics {
    pub free_compute_percent: f64,
    pub free_storage_percent: f64,
    pub sensor_types: Vec<String>,
    pub address: String,
}

impl DeviceDynamics {
    /// True when the device reports no usable sensor
    pub fn reports_no_sensors(&self) -> bool {
        self.sensor_types.is_empty() || self.sensor_types.iter().any(|s| s == NO_SENSOR)
    }
}

/// Service definition registered alongside the fleet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub req_resource: Option<Vec<String>>,
    #[serde(default)]
    pub agent_type: Option<String>,
}

/// Per-dimension figures for one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceScore {
    pub compute: f64,
    pub memory: f64,
    pub disk: f64,
    pub network: f64,
}

/// How a device's sensors are matched against the required set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorMatchPolicy {
    /// Sorted sensor lists must be identical
    StrictEquality,
    /// Every required sensor must be attached; extras are fine
    #[default]
    Superset,
}

/// Resource dimension a ranking may be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Cpu,
    Memory,
    Network,
    Disk,
}

impl SortKey {
    /// Parse a workload sort tag, `None` for anything unrecognised
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "cpu" => Some(SortKey::Cpu),
            "memory" => Some(SortKey::Memory),
            "network" => Some(SortKey::Network),
            "disk" => Some(SortKey::Disk),
            _ => None,
        }
    }

    /// Utilization column this key orders by
    pub fn column(&self) -> &'static str {
        match self {
            SortKey::Cpu => columns::COMPUTE_UTILIZATION,
            SortKey::Memory => columns::MEMORY_UTILIZATION,
            SortKey::Network => columns::NETWORK_UTILIZATION,
            SortKey::Disk => columns::DISK_UTILIZATION,
        }
    }

    pub fn value(&self, score: &ResourceScore) -> f64 {
        match self {
            SortKey::Cpu => score.compute,
            SortKey::Memory => score.memory,
            SortKey::Network => score.network,
            SortKey::Disk => score.disk,
        }
    }
}

/// Workload placement requirements, validated once at ingestion
///
/// Fields outside this struct (exec image, ports, memory minimums, ...)
/// are accepted on the wire and ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadRequirement {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_resource: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opt_resource: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_match: Option<SensorMatchPolicy>,
}

impl WorkloadRequirement {
    /// Parse and validate a JSON workload description
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let workload: WorkloadRequirement = serde_json::from_slice(body)
            .map_err(|e| PlacementError::InvalidWorkload(e.to_string()))?;
        workload.validated()
    }

    /// Check the invariants every run relies on
    pub fn validated(self) -> Result<Self> {
        let has_name = !self.name.trim().is_empty();
        let has_service_id = self
            .service_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());

        if !has_name && !has_service_id {
            return Err(PlacementError::InvalidWorkload(
                "either name or service_id is required".to_string(),
            ));
        }

        Ok(self)
    }

    /// Project name, ignoring blanks
    pub fn project(&self) -> Option<&str> {
        self.project.as_deref().filter(|p| !p.is_empty())
    }

    /// Name of the column that carries each row's device id
    pub fn device_id_column(&self) -> String {
        match self.project() {
            Some(project) => format!("{}_device_id", project),
            None => DEFAULT_DEVICE_ID_COLUMN.to_string(),
        }
    }
}

/// A device together with whatever telemetry could be fetched for it
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub descriptor: DeviceDescriptor,
    pub dynamics: Option<DeviceDynamics>,
}

/// Fleet state for one run, in upstream device order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetSnapshot {
    pub devices: Vec<DeviceSnapshot>,
    /// Dynamics fetches abandoned because of a timeout or the overall deadline
    pub timed_out: usize,
}

impl FleetSnapshot {
    pub fn descriptors(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.devices.iter().map(|d| &d.descriptor)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// One candidate node in the ranked result table
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResultRow {
    pub node_name: String,
    pub node_type: String,
    pub ip_address: String,
    /// `None` on rows that failed filtering
    pub utilization: Option<ResourceScore>,
    /// `None` on rows that failed filtering
    pub saturation: Option<ResourceScore>,
    pub device_id: String,
}

impl RankedResultRow {
    pub fn is_scored(&self) -> bool {
        self.utilization.is_some()
    }
}

/// Ranked candidates followed by the devices that failed filtering
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResultTable {
    device_id_column: String,
    rows: Vec<RankedResultRow>,
}

impl RankedResultTable {
    pub fn new(device_id_column: impl Into<String>, rows: Vec<RankedResultRow>) -> Self {
        Self {
            device_id_column: device_id_column.into(),
            rows,
        }
    }

    /// Table with no rows, used when the workload cannot be resolved
    pub fn empty(device_id_column: impl Into<String>) -> Self {
        Self::new(device_id_column, Vec::new())
    }

    pub fn device_id_column(&self) -> &str {
        &self.device_id_column
    }

    pub fn rows(&self) -> &[RankedResultRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<RankedResultRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that passed filtering, in ranked order
    pub fn eligible(&self) -> impl Iterator<Item = &RankedResultRow> {
        self.rows.iter().filter(|r| r.is_scored())
    }

    /// Full column list, with the device-id column last
    pub fn column_names(&self) -> Vec<&str> {
        vec![
            columns::NODE_NAME,
            columns::TYPE,
            columns::IP_ADDRESS,
            columns::COMPUTE_UTILIZATION,
            columns::COMPUTE_SATURATION,
            columns::MEMORY_UTILIZATION,
            columns::MEMORY_SATURATION,
            columns::NETWORK_UTILIZATION,
            columns::NETWORK_SATURATION,
            columns::DISK_UTILIZATION,
            columns::DISK_SATURATION,
            self.device_id_column.as_str(),
        ]
    }
}

/// JSON record view of a row; the device-id key comes from the table
struct RowRecord<'a> {
    device_id_column: &'a str,
    row: &'a RankedResultRow,
}

impl Serialize for RowRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let row = self.row;
        let util = row.utilization.as_ref();
        let sat = row.saturation.as_ref();

        let mut map = serializer.serialize_map(Some(12))?;
        map.serialize_entry(columns::NODE_NAME, &row.node_name)?;
        map.serialize_entry(columns::TYPE, &row.node_type)?;
        map.serialize_entry(columns::IP_ADDRESS, &row.ip_address)?;
        map.serialize_entry(columns::COMPUTE_UTILIZATION, &util.map(|s| s.compute))?;
        map.serialize_entry(columns::COMPUTE_SATURATION, &sat.map(|s| s.compute))?;
        map.serialize_entry(columns::MEMORY_UTILIZATION, &util.map(|s| s.memory))?;
        map.serialize_entry(columns::MEMORY_SATURATION, &sat.map(|s| s.memory))?;
        map.serialize_entry(columns::NETWORK_UTILIZATION, &util.map(|s| s.network))?;
        map.serialize_entry(columns::NETWORK_SATURATION, &sat.map(|s| s.network))?;
        map.serialize_entry(columns::DISK_UTILIZATION, &util.map(|s| s.disk))?;
        map.serialize_entry(columns::DISK_SATURATION, &sat.map(|s| s.disk))?;
        map.serialize_entry(self.device_id_column, &row.device_id)?;
        map.end()
    }
}

impl Serialize for RankedResultTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RowRecord {
                device_id_column: &self.device_id_column,
                row,
            })?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scored_row(id: &str) -> RankedResultRow {
        RankedResultRow {
            node_name: id.to_string(),
            node_type: "x86_64".to_string(),
            ip_address: "10.0.0.7".to_string(),
            utilization: Some(ResourceScore {
                compute: 42.5,
                memory: 42.5,
                disk: 90.1,
                network: 0.0,
            }),
            saturation: Some(ResourceScore::default()),
            device_id: id.to_string(),
        }
    }

    #[test]
    fn test_workload_accepts_full_client_payload() {
        let body = json!({
            "name": "clearwater_ims",
            "sort_order": ["memory", "cpu"],
            "description": "clearwater_ims",
            "project": "mf2c",
            "exec": "mf2c/compss-test:it2",
            "exec_ports": [8080],
            "agent_type": "normal",
            "cpu_arch": "x86-64",
            "memory_min": 1000,
            "req_resource": ["Location"],
            "opt_resource": ["SenseHat"]
        });

        let workload = WorkloadRequirement::from_json(body.to_string().as_bytes()).unwrap();
        assert_eq!(workload.name, "clearwater_ims");
        assert_eq!(workload.agent_type.as_deref(), Some("normal"));
        assert_eq!(workload.req_resource, Some(vec!["Location".to_string()]));
        assert_eq!(workload.target_arch, None);
        assert_eq!(workload.sensor_match, None);
    }

    #[test]
    fn test_workload_requires_name_or_service_id() {
        let err = WorkloadRequirement::from_json(br#"{"project": "fog"}"#).unwrap_err();
        assert!(matches!(err, PlacementError::InvalidWorkload(_)));

        let by_id = WorkloadRequirement::from_json(br#"{"service_id": "service/1"}"#);
        assert!(by_id.is_ok());
    }

    #[test]
    fn test_workload_accepts_blank_sort_tags() {
        let workload =
            WorkloadRequirement::from_json(br#"{"name": "svc", "sort_order": ["cpu", ""]}"#)
                .unwrap();
        assert_eq!(
            workload.sort_order,
            Some(vec!["cpu".to_string(), String::new()])
        );
    }

    #[test]
    fn test_sensor_match_policy_wire_names() {
        let workload =
            WorkloadRequirement::from_json(br#"{"name": "svc", "sensor_match": "strict_equality"}"#)
                .unwrap();
        assert_eq!(workload.sensor_match, Some(SensorMatchPolicy::StrictEquality));
        assert_eq!(SensorMatchPolicy::default(), SensorMatchPolicy::Superset);
    }

    #[test]
    fn test_device_id_column_name() {
        let mut workload = WorkloadRequirement {
            name: "svc".to_string(),
            ..Default::default()
        };
        assert_eq!(workload.device_id_column(), "mf2c_device_id");

        workload.project = Some(String::new());
        assert_eq!(workload.device_id_column(), "mf2c_device_id");

        workload.project = Some("fog".to_string());
        assert_eq!(workload.device_id_column(), "fog_device_id");
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(SortKey::parse("cpu"), Some(SortKey::Cpu));
        assert_eq!(SortKey::parse("disk"), Some(SortKey::Disk));
        assert_eq!(SortKey::parse("gpu"), None);
        assert_eq!(SortKey::Cpu.column(), "compute utilization");
    }

    #[test]
    fn test_no_sensor_detection() {
        let mut dynamics = DeviceDynamics {
            free_compute_percent: 10.0,
            free_storage_percent: 10.0,
            sensor_types: vec!["None".to_string()],
            address: String::new(),
        };
        assert!(dynamics.reports_no_sensors());

        dynamics.sensor_types.clear();
        assert!(dynamics.reports_no_sensors());

        dynamics.sensor_types.push("Location".to_string());
        assert!(!dynamics.reports_no_sensors());
    }

    #[test]
    fn test_table_serializes_as_records() {
        let mut failed = scored_row("b");
        failed.utilization = None;
        failed.saturation = None;

        let table = RankedResultTable::new("fog_device_id", vec![scored_row("a"), failed]);
        let value = serde_json::to_value(&table).unwrap();

        assert_eq!(value[0]["node_name"], "a");
        assert_eq!(value[0]["type"], "x86_64");
        assert_eq!(value[0]["ipaddress"], "10.0.0.7");
        assert_eq!(value[0]["compute utilization"], 42.5);
        assert_eq!(value[0]["disk utilization"], 90.1);
        assert_eq!(value[0]["memory saturation"], 0.0);
        assert_eq!(value[0]["fog_device_id"], "a");

        assert!(value[1]["compute utilization"].is_null());
        assert!(value[1]["disk saturation"].is_null());
        assert_eq!(value[1]["fog_device_id"], "b");
        assert_eq!(value[1].as_object().unwrap().len(), 12);
    }

    #[test]
    fn test_column_names_end_with_device_id() {
        let table = RankedResultTable::empty("edge_device_id");
        let names = table.column_names();
        assert_eq!(names.len(), 12);
        assert_eq!(names[0], "node_name");
        assert_eq!(names[11], "edge_device_id");
    }
}
