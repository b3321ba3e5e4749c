//! Fleet snapshot fan-out
//!
//! One bulk device-list fetch, then one dynamics fetch per device issued
//! concurrently under a semaphore. Each fetch has its own timeout and the
//! whole fan-out shares a deadline; a fetch that misses either is treated as
//! absent dynamics. Results are slotted back by upstream index so the
//! snapshot order never depends on completion order.

use crate::error::{PlacementError, Result};
use crate::models::{DeviceDynamics, DeviceSnapshot, FleetSnapshot};
use crate::observability::RunLogger;
use crate::source::DeviceSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default number of dynamics fetches in flight
pub const DEFAULT_FETCH_CONCURRENCY: usize = 16;

/// Default timeout for a single dynamics fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for the whole dynamics fan-out
pub const DEFAULT_FAN_OUT_DEADLINE: Duration = Duration::from_secs(20);

/// Configuration for the snapshot fan-out
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Maximum concurrent dynamics fetches
    pub concurrency: usize,
    /// Timeout for each dynamics fetch
    pub fetch_timeout: Duration,
    /// Deadline for the complete fan-out
    pub deadline: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_FETCH_CONCURRENCY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            deadline: DEFAULT_FAN_OUT_DEADLINE,
        }
    }
}

type FetchOutcome = (usize, std::result::Result<Result<Option<DeviceDynamics>>, tokio::time::error::Elapsed>);

/// Fetch the device list and every device's dynamics
///
/// Registry failures other than timeouts abort the fetch.
pub async fn fetch_snapshot(
    source: Arc<dyn DeviceSource>,
    config: &FetchConfig,
    logger: &RunLogger,
) -> Result<FleetSnapshot> {
    let descriptors = source.list_devices().await?;
    let count = descriptors.len();

    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut tasks: JoinSet<FetchOutcome> = JoinSet::new();

    for (index, descriptor) in descriptors.iter().enumerate() {
        let source = Arc::clone(&source);
        let semaphore = Arc::clone(&semaphore);
        let device_id = descriptor.id.clone();
        let fetch_timeout = config.fetch_timeout;

        tasks.spawn(async move {
            // Permit is held until the fetch settles; the semaphore is never closed
            let _permit = semaphore.acquire_owned().await.ok();
            let outcome = tokio::time::timeout(fetch_timeout, source.get_dynamics(&device_id)).await;
            (index, outcome)
        });
    }

    let mut dynamics: Vec<Option<DeviceDynamics>> = vec![None; count];
    let mut settled = vec![false; count];
    let mut timed_out = 0usize;

    let deadline = tokio::time::sleep(config.deadline);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            joined = tasks.join_next() => {
                let Some(joined) = joined else { break };
                let (index, outcome) = joined.map_err(|e| {
                    PlacementError::Source(format!("dynamics fetch task failed: {}", e))
                })?;

                settled[index] = true;
                match outcome {
                    Ok(Ok(found)) => dynamics[index] = found,
                    Ok(Err(e)) => {
                        tasks.abort_all();
                        return Err(e);
                    }
                    Err(_) => {
                        timed_out += 1;
                        logger.log_dynamics_timeout(&descriptors[index].id);
                    }
                }
            }
            _ = &mut deadline => {
                tasks.abort_all();
                break;
            }
        }
    }

    for (index, done) in settled.iter().enumerate() {
        if !done {
            timed_out += 1;
            logger.log_dynamics_timeout(&descriptors[index].id);
        }
    }

    let devices = descriptors
        .into_iter()
        .zip(dynamics)
        .map(|(descriptor, dynamics)| DeviceSnapshot {
            descriptor,
            dynamics,
        })
        .collect();

    Ok(FleetSnapshot { devices, timed_out })
}
