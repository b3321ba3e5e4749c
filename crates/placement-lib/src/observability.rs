//! Observability infrastructure for the placement engine
//!
//! Provides:
//! - Prometheus metrics (run latency, snapshot fetch latency, fleet counts)
//! - A per-run structured logger passed into each pipeline stage

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for run and fetch latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PlacementMetricsInner> = OnceLock::new();

/// Source of run ids handed to [`RunLogger`]
static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(1);

struct PlacementMetricsInner {
    run_latency_seconds: Histogram,
    snapshot_latency_seconds: Histogram,
    devices_evaluated: IntGauge,
    devices_eligible: IntGauge,
    runs: IntCounter,
    run_errors: IntCounter,
    dynamics_timeouts: IntCounter,
    unresolved_workloads: IntCounter,
}

impl PlacementMetricsInner {
    fn new() -> Self {
        Self {
            run_latency_seconds: register_histogram!(
                "placement_run_latency_seconds",
                "Time spent producing one ranked placement table",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register run_latency_seconds"),

            snapshot_latency_seconds: register_histogram!(
                "placement_snapshot_latency_seconds",
                "Time spent fetching the device list and per-device dynamics",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register snapshot_latency_seconds"),

            devices_evaluated: register_int_gauge!(
                "placement_devices_evaluated",
                "Devices evaluated by the most recent run"
            )
            .expect("Failed to register devices_evaluated"),

            devices_eligible: register_int_gauge!(
                "placement_devices_eligible",
                "Devices that passed filtering in the most recent run"
            )
            .expect("Failed to register devices_eligible"),

            runs: register_int_counter!(
                "placement_runs_total",
                "Total number of placement runs started"
            )
            .expect("Failed to register runs"),

            run_errors: register_int_counter!(
                "placement_run_errors_total",
                "Total number of placement runs aborted by an upstream failure"
            )
            .expect("Failed to register run_errors"),

            dynamics_timeouts: register_int_counter!(
                "placement_dynamics_timeouts_total",
                "Total number of device dynamics fetches abandoned on timeout"
            )
            .expect("Failed to register dynamics_timeouts"),

            unresolved_workloads: register_int_counter!(
                "placement_unresolved_workloads_total",
                "Total number of runs whose workload had no registered service"
            )
            .expect("Failed to register unresolved_workloads"),
        }
    }
}

/// Placement metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct PlacementMetrics {
    _private: (),
}

impl Default for PlacementMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PlacementMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PlacementMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_runs(&self) {
        self.inner().runs.inc();
    }

    pub fn inc_run_errors(&self) {
        self.inner().run_errors.inc();
    }

    pub fn inc_unresolved_workloads(&self) {
        self.inner().unresolved_workloads.inc();
    }

    pub fn add_dynamics_timeouts(&self, count: usize) {
        self.inner().dynamics_timeouts.inc_by(count as u64);
    }

    pub fn observe_run_latency(&self, duration_secs: f64) {
        self.inner().run_latency_seconds.observe(duration_secs);
    }

    pub fn observe_snapshot_latency(&self, duration_secs: f64) {
        self.inner().snapshot_latency_seconds.observe(duration_secs);
    }

    /// Record fleet counts of the latest run
    pub fn set_fleet_counts(&self, evaluated: usize, eligible: usize) {
        self.inner().devices_evaluated.set(evaluated as i64);
        self.inner().devices_eligible.set(eligible as i64);
    }
}

/// Structured logger scoped to a single placement run
///
/// Every event carries the workload name and a run id so that the lines of
/// concurrent runs can be told apart.
#[derive(Debug, Clone)]
pub struct RunLogger {
    workload: String,
    run_id: u64,
}

impl RunLogger {
    pub fn new(workload: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
            run_id: RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn workload(&self) -> &str {
        &self.workload
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn log_run_started(&self, filter: &str) {
        info!(
            event = "placement_started",
            workload = %self.workload,
            run_id = self.run_id,
            filter = %filter,
            "Placement run started"
        );
    }

    pub fn log_service_missing(&self) {
        info!(
            event = "service_missing",
            workload = %self.workload,
            run_id = self.run_id,
            "No registered service found with the provided name, returning an empty table"
        );
    }

    pub fn log_service_ambiguous(&self, matches: usize) {
        info!(
            event = "service_ambiguous",
            workload = %self.workload,
            run_id = self.run_id,
            matches = matches,
            "More than one registered service found with the provided name, skipping id resolution"
        );
    }

    pub fn log_service_resolved(&self, service_id: &str) {
        debug!(
            event = "service_resolved",
            workload = %self.workload,
            run_id = self.run_id,
            service_id = %service_id,
            "Resolved registered service"
        );
    }

    pub fn log_snapshot(&self, devices: usize, with_dynamics: usize, timed_out: usize) {
        info!(
            event = "snapshot_fetched",
            workload = %self.workload,
            run_id = self.run_id,
            devices = devices,
            with_dynamics = with_dynamics,
            timed_out = timed_out,
            "Fetched fleet snapshot"
        );
    }

    pub fn log_dynamics_timeout(&self, device_id: &str) {
        warn!(
            event = "dynamics_timeout",
            workload = %self.workload,
            run_id = self.run_id,
            device_id = %device_id,
            "Device dynamics fetch timed out, treating device as offline"
        );
    }

    pub fn log_device_unscoreable(&self, device_id: &str) {
        debug!(
            event = "device_unscoreable",
            workload = %self.workload,
            run_id = self.run_id,
            device_id = %device_id,
            "Device reported no dynamics, excluded from results"
        );
    }

    pub fn log_device_rejected(&self, device_id: &str, reasons: &[String]) {
        info!(
            event = "device_rejected",
            workload = %self.workload,
            run_id = self.run_id,
            device_id = %device_id,
            reasons = ?reasons,
            "Device failed placement constraints"
        );
    }

    pub fn log_unknown_sort_tag(&self, tag: &str) {
        warn!(
            event = "unknown_sort_tag",
            workload = %self.workload,
            run_id = self.run_id,
            tag = %tag,
            "Ignoring unknown sort_order entry"
        );
    }

    pub fn log_sort_fallback(&self, tags: &[String], column: &str) {
        warn!(
            event = "sort_fallback",
            workload = %self.workload,
            run_id = self.run_id,
            tags = ?tags,
            fallback = %column,
            "No usable sort key, falling back to default"
        );
    }

    pub fn log_run_complete(&self, eligible: usize, rejected: usize, elapsed_ms: u128) {
        info!(
            event = "placement_complete",
            workload = %self.workload,
            run_id = self.run_id,
            eligible = eligible,
            rejected = rejected,
            elapsed_ms = elapsed_ms,
            "Placement run complete"
        );
    }

    pub fn log_run_failed(&self, error: &dyn std::error::Error) {
        warn!(
            event = "placement_failed",
            workload = %self.workload,
            run_id = self.run_id,
            error = %error,
            "Placement run aborted"
        );
    }
}

/// Lifecycle events for the placement service process
#[derive(Debug, Clone)]
pub struct ServiceLogger {
    instance: String,
}

impl ServiceLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, registry: &str) {
        info!(
            event = "service_startup",
            instance = %self.instance,
            version = %version,
            registry = %registry,
            "Placement service starting"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Placement service shutting down"
        );
    }
}
