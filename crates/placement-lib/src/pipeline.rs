//! Optimal placement run
//!
//! Resolves the workload's registered service, fetches the fleet snapshot,
//! then scores, filters, ranks and assembles the result table before
//! appending it to the workload history.

use crate::assembler::{build_row, ResultAssembler};
use crate::error::Result;
use crate::fetch::{fetch_snapshot, FetchConfig};
use crate::filter::{ConstraintFilter, Constraints};
use crate::models::{
    FleetSnapshot, RankedResultTable, SensorMatchPolicy, ServiceDefinition, WorkloadRequirement,
    DEFAULT_ARCHITECTURE,
};
use crate::observability::{PlacementMetrics, RunLogger};
use crate::ranker::Ranker;
use crate::score::{saturation_scores, utilization_scores};
use crate::source::DeviceSource;
use crate::workload::Workload;
use std::sync::Arc;
use std::time::Instant;

/// Name under which results are appended to the workload history
pub const FILTER_NAME: &str = "optimal_filter_cimi";

/// Defaults applied when the workload leaves a choice open
#[derive(Debug, Clone)]
pub struct FilterOptions {
    pub default_architecture: String,
    pub default_sensor_match: SensorMatchPolicy,
    pub fetch: FetchConfig,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            default_architecture: DEFAULT_ARCHITECTURE.to_string(),
            default_sensor_match: SensorMatchPolicy::default(),
            fetch: FetchConfig::default(),
        }
    }
}

/// Ranks the fleet for a workload
#[derive(Clone)]
pub struct OptimalFilter {
    source: Arc<dyn DeviceSource>,
    options: FilterOptions,
    metrics: PlacementMetrics,
}

impl OptimalFilter {
    pub fn new(source: Arc<dyn DeviceSource>, options: FilterOptions) -> Self {
        Self {
            source,
            options,
            metrics: PlacementMetrics::new(),
        }
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Produce the ranked table for `workload` and append it to its history
    ///
    /// A workload with no registered service yields an empty table. Any
    /// registry failure other than a per-device timeout aborts the run.
    pub async fn run<W: Workload + ?Sized>(&self, workload: &mut W) -> Result<RankedResultTable> {
        let requirement = workload.configuration().clone();
        let logger = RunLogger::new(display_name(&requirement));
        let start = Instant::now();

        self.metrics.inc_runs();
        logger.log_run_started(FILTER_NAME);

        match self.execute(&requirement, workload, &logger).await {
            Ok(table) => {
                let eligible = table.eligible().count();
                let elapsed = start.elapsed();
                self.metrics.observe_run_latency(elapsed.as_secs_f64());
                logger.log_run_complete(eligible, table.len() - eligible, elapsed.as_millis());

                workload.append_metadata(FILTER_NAME, table.clone());
                Ok(table)
            }
            Err(e) => {
                self.metrics.inc_run_errors();
                logger.log_run_failed(&e);
                Err(e)
            }
        }
    }

    async fn execute<W: Workload + ?Sized>(
        &self,
        requirement: &WorkloadRequirement,
        workload: &mut W,
        logger: &RunLogger,
    ) -> Result<RankedResultTable> {
        let Some(service) = self.resolve_service(requirement, workload, logger).await? else {
            self.metrics.inc_unresolved_workloads();
            return Ok(RankedResultTable::empty(requirement.device_id_column()));
        };

        let constraints = self.constraints(requirement, &service);

        let fetch_start = Instant::now();
        let snapshot = fetch_snapshot(Arc::clone(&self.source), &self.options.fetch, logger).await?;
        self.metrics
            .observe_snapshot_latency(fetch_start.elapsed().as_secs_f64());
        self.metrics.add_dynamics_timeouts(snapshot.timed_out);

        let with_dynamics = snapshot
            .devices
            .iter()
            .filter(|d| d.dynamics.is_some())
            .count();
        logger.log_snapshot(snapshot.len(), with_dynamics, snapshot.timed_out);

        let table = rank_fleet(&snapshot, requirement, &constraints, logger);
        self.metrics
            .set_fleet_counts(with_dynamics, table.eligible().count());
        Ok(table)
    }

    /// Find the registered service backing the workload
    ///
    /// `Ok(None)` when nothing is registered. With several services under
    /// one name the first is used and the workload's service id is left
    /// untouched.
    async fn resolve_service<W: Workload + ?Sized>(
        &self,
        requirement: &WorkloadRequirement,
        workload: &mut W,
        logger: &RunLogger,
    ) -> Result<Option<ServiceDefinition>> {
        if requirement.name.trim().is_empty() {
            let service_id = requirement.service_id.clone().unwrap_or_default();
            let service = self.source.get_service(&service_id).await?;
            if service.is_none() {
                logger.log_service_missing();
            }
            return Ok(service);
        }

        let mut services = self.source.list_services_by_name(&requirement.name).await?;
        match services.len() {
            0 => {
                logger.log_service_missing();
                Ok(None)
            }
            1 => {
                let service = services.remove(0);
                if requirement.service_id.is_none() {
                    workload.set_service_id(service.id.clone());
                }
                logger.log_service_resolved(&service.id);
                Ok(Some(service))
            }
            n => {
                logger.log_service_ambiguous(n);
                Ok(Some(services.remove(0)))
            }
        }
    }

    /// Effective constraints: registered service first, then the workload,
    /// then server defaults
    pub fn constraints(
        &self,
        requirement: &WorkloadRequirement,
        service: &ServiceDefinition,
    ) -> Constraints {
        let architecture = requirement
            .target_arch
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| self.options.default_architecture.clone());

        let agent_type = service
            .agent_type
            .clone()
            .filter(|a| !a.is_empty())
            .or_else(|| requirement.agent_type.clone().filter(|a| !a.is_empty()));

        let required_sensors = service
            .req_resource
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| requirement.req_resource.clone())
            .unwrap_or_default();

        Constraints {
            architecture,
            agent_type,
            required_sensors,
            sensor_match: requirement
                .sensor_match
                .unwrap_or(self.options.default_sensor_match),
        }
    }
}

fn display_name(requirement: &WorkloadRequirement) -> String {
    if requirement.name.trim().is_empty() {
        requirement.service_id.clone().unwrap_or_default()
    } else {
        requirement.name.clone()
    }
}

/// Score, filter, rank and assemble a fetched snapshot
///
/// Pure with respect to its inputs: the same snapshot always yields the
/// same table. Devices without dynamics are left out of the table.
pub fn rank_fleet(
    snapshot: &FleetSnapshot,
    requirement: &WorkloadRequirement,
    constraints: &Constraints,
    logger: &RunLogger,
) -> RankedResultTable {
    let utilization = utilization_scores(snapshot);
    let saturation = saturation_scores(snapshot.descriptors());
    let filter = ConstraintFilter::new(constraints.clone());

    let mut eligible = Vec::new();
    let mut rejected = Vec::new();

    for device in &snapshot.devices {
        let id = &device.descriptor.id;
        let Some(dynamics) = device.dynamics.as_ref() else {
            logger.log_device_unscoreable(id);
            continue;
        };

        let verdict = filter.evaluate(&device.descriptor, Some(dynamics));
        let row = build_row(
            &device.descriptor,
            Some(dynamics),
            utilization.get(id).copied(),
            saturation.get(id).copied(),
        );

        if verdict.eligible {
            eligible.push(row);
        } else {
            logger.log_device_rejected(id, &verdict.reasons);
            rejected.push(row);
        }
    }

    let ranker = Ranker::new();
    let keys = ranker.resolve_keys(requirement.sort_order.as_deref(), logger);
    ranker.rank(&mut eligible, &keys);

    ResultAssembler::new(requirement.device_id_column()).assemble(eligible, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceDescriptor, DeviceDynamics};
    use crate::source::InMemorySource;
    use crate::workload::InMemoryWorkload;

    fn device(id: &str, arch: &str, agent: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            id: id.to_string(),
            arch: arch.to_string(),
            agent_type: agent.to_string(),
            address: String::new(),
        }
    }

    fn dynamics(cpu: f64, sensors: &[&str]) -> DeviceDynamics {
        DeviceDynamics {
            free_compute_percent: cpu,
            free_storage_percent: 40.0,
            sensor_types: sensors.iter().map(|s| s.to_string()).collect(),
            address: format!("10.0.0.{}", cpu as u8),
        }
    }

    fn service(name: &str) -> ServiceDefinition {
        ServiceDefinition {
            id: format!("service/{}", name),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn fog_workload() -> InMemoryWorkload {
        InMemoryWorkload::new(WorkloadRequirement {
            name: "svc".to_string(),
            project: Some("fog".to_string()),
            sort_order: Some(vec!["memory".to_string()]),
            req_resource: Some(vec!["Location".to_string()]),
            agent_type: Some("normal".to_string()),
            ..Default::default()
        })
    }

    fn filter(source: InMemorySource) -> OptimalFilter {
        OptimalFilter::new(Arc::new(source), FilterOptions::default())
    }

    #[tokio::test]
    async fn test_agent_mismatch_goes_after_match() {
        let source = InMemorySource::new()
            .with_service(service("svc"))
            .with_device(device("B", "x86_64", "other"), Some(dynamics(10.0, &["Location"])))
            .with_device(
                device("A", "x86_64", "normal"),
                Some(dynamics(80.0, &["Location", "SenseHat"])),
            );

        let mut workload = fog_workload();
        let table = filter(source).run(&mut workload).await.unwrap();

        assert_eq!(table.device_id_column(), "fog_device_id");
        assert_eq!(table.len(), 2);

        let a = &table.rows()[0];
        assert_eq!(a.device_id, "A");
        assert_eq!(a.utilization.unwrap().memory, 80.0);

        let b = &table.rows()[1];
        assert_eq!(b.device_id, "B");
        assert!(b.utilization.is_none());
        assert!(b.saturation.is_none());

        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json[0]["fog_device_id"], "A");
        assert_eq!(json[0]["memory utilization"], 80.0);
        assert!(json[1]["memory utilization"].is_null());
    }

    #[tokio::test]
    async fn test_table_is_appended_to_workload() {
        let source = InMemorySource::new()
            .with_service(service("svc"))
            .with_device(device("A", "x86_64", "normal"), Some(dynamics(5.0, &["Location"])));

        let mut workload = fog_workload();
        let table = filter(source).run(&mut workload).await.unwrap();

        assert_eq!(workload.metadata().len(), 1);
        assert_eq!(workload.metadata()[0].filter, FILTER_NAME);
        assert_eq!(workload.metadata()[0].table, table);
        assert_eq!(workload.service_id(), Some("service/svc"));
    }

    #[tokio::test]
    async fn test_no_sensor_requirement_ranks_everyone() {
        let source = InMemorySource::new()
            .with_service(service("plain"))
            .with_device(device("a", "x86_64", "normal"), Some(dynamics(60.0, &["None"])))
            .with_device(device("b", "x86_64", "normal"), Some(dynamics(20.0, &[])))
            .with_device(device("c", "x86_64", "normal"), Some(dynamics(40.0, &["Camera"])));

        let mut workload = InMemoryWorkload::new(WorkloadRequirement {
            name: "plain".to_string(),
            agent_type: Some("normal".to_string()),
            ..Default::default()
        });
        let table = filter(source).run(&mut workload).await.unwrap();

        let ids: Vec<&str> = table.rows().iter().map(|r| r.device_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(table.eligible().count(), 3);
        assert_eq!(table.device_id_column(), "mf2c_device_id");
    }

    #[tokio::test]
    async fn test_missing_service_yields_empty_table() {
        let source = InMemorySource::new()
            .with_device(device("a", "x86_64", "normal"), Some(dynamics(60.0, &[])));

        let mut workload = fog_workload();
        let table = filter(source).run(&mut workload).await.unwrap();

        assert!(table.is_empty());
        assert_eq!(workload.metadata().len(), 1);
        assert!(workload.metadata()[0].table.is_empty());
        assert_eq!(workload.service_id(), None);
    }

    #[tokio::test]
    async fn test_ambiguous_service_skips_id_resolution() {
        let source = InMemorySource::new()
            .with_service(service("svc"))
            .with_service(ServiceDefinition {
                id: "service/other".to_string(),
                ..service("svc")
            })
            .with_device(device("A", "x86_64", "normal"), Some(dynamics(5.0, &["Location"])));

        let mut workload = fog_workload();
        let table = filter(source).run(&mut workload).await.unwrap();

        assert_eq!(table.eligible().count(), 1);
        assert_eq!(workload.service_id(), None);
    }

    #[tokio::test]
    async fn test_service_requirements_take_precedence() {
        let source = InMemorySource::new()
            .with_service(ServiceDefinition {
                req_resource: Some(vec!["Camera".to_string()]),
                agent_type: Some("micro".to_string()),
                ..service("svc")
            })
            .with_device(device("A", "x86_64", "normal"), Some(dynamics(5.0, &["Location"])))
            .with_device(device("M", "x86_64", "micro"), Some(dynamics(9.0, &["Camera"])));

        let mut workload = fog_workload();
        let table = filter(source).run(&mut workload).await.unwrap();

        assert_eq!(table.rows()[0].device_id, "M");
        assert!(table.rows()[0].is_scored());
        assert!(!table.rows()[1].is_scored());
    }

    #[tokio::test]
    async fn test_lookup_by_service_id() {
        let source = InMemorySource::new()
            .with_service(service("svc"))
            .with_device(device("A", "x86_64", "normal"), Some(dynamics(5.0, &[])));

        let mut workload = InMemoryWorkload::new(WorkloadRequirement {
            service_id: Some("service/svc".to_string()),
            ..Default::default()
        });
        let table = filter(source).run(&mut workload).await.unwrap();
        assert_eq!(table.eligible().count(), 1);
    }

    #[tokio::test]
    async fn test_devices_without_dynamics_are_excluded() {
        let source = InMemorySource::new()
            .with_service(service("svc"))
            .with_device(device("A", "x86_64", "normal"), Some(dynamics(5.0, &["Location"])))
            .with_device(device("offline", "x86_64", "normal"), None);

        let mut workload = fog_workload();
        let table = filter(source).run(&mut workload).await.unwrap();

        assert_eq!(table.len(), 1);
        assert!(table.rows().iter().all(|r| r.device_id != "offline"));
    }

    #[tokio::test]
    async fn test_registry_failure_surfaces_without_appending() {
        let source = InMemorySource::new().with_service(service("svc")).unavailable();

        let mut workload = fog_workload();
        let result = filter(source).run(&mut workload).await;

        assert!(result.unwrap_err().is_upstream());
        assert!(workload.metadata().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let source = InMemorySource::new()
            .with_service(service("svc"))
            .with_device(device("A", "x86_64", "normal"), Some(dynamics(30.0, &["Location"])))
            .with_device(device("B", "x86_64", "normal"), Some(dynamics(30.0, &["Location"])))
            .with_device(device("C", "armv7l", "normal"), Some(dynamics(1.0, &["Location"])))
            .with_device(device("D", "x86_64", "normal"), Some(dynamics(10.0, &["Location"])));
        let filter = filter(source);

        let first = filter.run(&mut fog_workload()).await.unwrap();
        let second = filter.run(&mut fog_workload()).await.unwrap();

        assert_eq!(first, second);
        let ids: Vec<&str> = first.rows().iter().map(|r| r.device_id.as_str()).collect();
        assert_eq!(ids, vec!["D", "A", "B", "C"]);
    }

    fn disk_and_cpu_fleet() -> InMemorySource {
        let dyn_with = |cpu: f64, disk: f64| DeviceDynamics {
            free_compute_percent: cpu,
            free_storage_percent: disk,
            sensor_types: vec!["Location".to_string()],
            address: String::new(),
        };
        InMemorySource::new()
            .with_service(service("svc"))
            .with_device(device("low-cpu", "x86_64", "normal"), Some(dyn_with(10.0, 90.0)))
            .with_device(device("low-disk", "x86_64", "normal"), Some(dyn_with(70.0, 5.0)))
    }

    fn sorted_by(tags: &[&str]) -> InMemoryWorkload {
        InMemoryWorkload::new(WorkloadRequirement {
            name: "svc".to_string(),
            sort_order: Some(tags.iter().map(|t| t.to_string()).collect()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_blank_sort_tag_does_not_abort_run() {
        let filter = filter(disk_and_cpu_fleet());

        let table = filter.run(&mut sorted_by(&["disk", ""])).await.unwrap();
        let ids: Vec<&str> = table.rows().iter().map(|r| r.device_id.as_str()).collect();
        assert_eq!(ids, vec!["low-disk", "low-cpu"]);

        let table = filter.run(&mut sorted_by(&[""])).await.unwrap();
        let ids: Vec<&str> = table.rows().iter().map(|r| r.device_id.as_str()).collect();
        assert_eq!(ids, vec!["low-cpu", "low-disk"]);
    }

    #[test]
    fn test_constraints_defaults() {
        let filter = filter(InMemorySource::new());
        let requirement = WorkloadRequirement {
            name: "svc".to_string(),
            ..Default::default()
        };
        let constraints = filter.constraints(&requirement, &service("svc"));

        assert_eq!(constraints.architecture, "x86_64");
        assert_eq!(constraints.agent_type, None);
        assert!(constraints.required_sensors.is_empty());
        assert_eq!(constraints.sensor_match, SensorMatchPolicy::Superset);
    }

    #[test]
    fn test_constraints_honour_workload_overrides() {
        let filter = filter(InMemorySource::new());
        let requirement = WorkloadRequirement {
            name: "svc".to_string(),
            target_arch: Some("armv7l".to_string()),
            sensor_match: Some(SensorMatchPolicy::StrictEquality),
            ..Default::default()
        };
        let constraints = filter.constraints(&requirement, &service("svc"));

        assert_eq!(constraints.architecture, "armv7l");
        assert_eq!(constraints.sensor_match, SensorMatchPolicy::StrictEquality);
    }
}
