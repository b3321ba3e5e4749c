//! Fleet placement engine
//!
//! This crate provides the core functionality for:
//! - Fetching device descriptors and dynamics from the registry
//! - Scoring, constraint filtering and ranking of candidate devices
//! - Assembling the ranked result table for a workload
//! - Health checks and observability

pub mod assembler;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod ranker;
pub mod score;
pub mod source;
pub mod workload;

pub use error::{PlacementError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PlacementMetrics, RunLogger, ServiceLogger};
pub use pipeline::{FilterOptions, OptimalFilter, FILTER_NAME};
pub use source::{CimiClient, DeviceSource, InMemorySource, RegistryConfig};
pub use workload::{InMemoryWorkload, MetadataEntry, Workload, WorkloadHistory};
