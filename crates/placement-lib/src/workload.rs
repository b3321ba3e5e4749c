//! Workload configuration source and metadata sink
//!
//! A run reads its requirements from a [`Workload`] and appends the finished
//! table back to it. [`WorkloadHistory`] keeps a bounded, per-workload
//! record of those appends for audit.

use crate::models::{RankedResultTable, WorkloadRequirement};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Default number of history entries kept per workload
pub const DEFAULT_HISTORY_CAPACITY: usize = 32;

/// Workload being placed
pub trait Workload: Send {
    /// Requirements the run must satisfy
    fn configuration(&self) -> &WorkloadRequirement;

    /// Record the registry id of the service this workload resolved to
    fn set_service_id(&mut self, service_id: String);

    /// Append a filter's result table to the workload history
    fn append_metadata(&mut self, filter_name: &str, table: RankedResultTable);
}

/// One table appended to a workload
#[derive(Debug, Clone, Serialize)]
pub struct MetadataEntry {
    pub filter: String,
    pub recorded_at: DateTime<Utc>,
    pub table: RankedResultTable,
}

/// Workload held entirely in memory for the duration of one request
#[derive(Debug, Clone)]
pub struct InMemoryWorkload {
    requirement: WorkloadRequirement,
    service_id: Option<String>,
    metadata: Vec<MetadataEntry>,
}

impl InMemoryWorkload {
    pub fn new(requirement: WorkloadRequirement) -> Self {
        let service_id = requirement.service_id.clone();
        Self {
            requirement,
            service_id,
            metadata: Vec::new(),
        }
    }

    pub fn service_id(&self) -> Option<&str> {
        self.service_id.as_deref()
    }

    pub fn metadata(&self) -> &[MetadataEntry] {
        &self.metadata
    }

    pub fn into_metadata(self) -> Vec<MetadataEntry> {
        self.metadata
    }

    /// Key under which this workload's history is stored
    pub fn history_key(&self) -> String {
        if self.requirement.name.trim().is_empty() {
            self.service_id.clone().unwrap_or_default()
        } else {
            self.requirement.name.clone()
        }
    }
}

impl Workload for InMemoryWorkload {
    fn configuration(&self) -> &WorkloadRequirement {
        &self.requirement
    }

    fn set_service_id(&mut self, service_id: String) {
        self.service_id = Some(service_id);
    }

    fn append_metadata(&mut self, filter_name: &str, table: RankedResultTable) {
        self.metadata.push(MetadataEntry {
            filter: filter_name.to_string(),
            recorded_at: Utc::now(),
            table,
        });
    }
}

/// Bounded in-memory history of result tables, keyed by workload
#[derive(Debug, Clone)]
pub struct WorkloadHistory {
    entries: Arc<RwLock<HashMap<String, VecDeque<MetadataEntry>>>>,
    capacity: usize,
}

impl Default for WorkloadHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl WorkloadHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Store a finished workload's metadata, evicting the oldest entries
    pub async fn record(&self, workload: InMemoryWorkload) {
        let key = workload.history_key();
        let mut entries = self.entries.write().await;
        let queue = entries.entry(key).or_default();

        for entry in workload.into_metadata() {
            if queue.len() == self.capacity {
                queue.pop_front();
            }
            queue.push_back(entry);
        }
    }

    /// Entries for `workload`, oldest first
    pub async fn get(&self, workload: &str) -> Vec<MetadataEntry> {
        let entries = self.entries.read().await;
        entries
            .get(workload)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload(name: &str) -> InMemoryWorkload {
        InMemoryWorkload::new(WorkloadRequirement {
            name: name.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_append_metadata_keeps_order() {
        let mut w = workload("svc");
        w.append_metadata("first", RankedResultTable::empty("mf2c_device_id"));
        w.append_metadata("second", RankedResultTable::empty("mf2c_device_id"));

        let filters: Vec<&str> = w.metadata().iter().map(|m| m.filter.as_str()).collect();
        assert_eq!(filters, vec!["first", "second"]);
    }

    #[test]
    fn test_history_key_falls_back_to_service_id() {
        let w = InMemoryWorkload::new(WorkloadRequirement {
            service_id: Some("service/9".to_string()),
            ..Default::default()
        });
        assert_eq!(w.history_key(), "service/9");
        assert_eq!(workload("svc").history_key(), "svc");
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let history = WorkloadHistory::new(2);

        for filter in ["a", "b", "c"] {
            let mut w = workload("svc");
            w.append_metadata(filter, RankedResultTable::empty("mf2c_device_id"));
            history.record(w).await;
        }

        let filters: Vec<String> = history
            .get("svc")
            .await
            .into_iter()
            .map(|m| m.filter)
            .collect();
        assert_eq!(filters, vec!["b", "c"]);
        assert!(history.get("unknown").await.is_empty());
    }
}
