//! Per-device resource scoring
//!
//! Utilization figures are the device's *free* compute and storage
//! percentages, rounded to one decimal place. Compute and memory share the
//! CPU signal because the registry publishes no memory figure; saturation
//! is a zero placeholder until the registry exposes a contention signal.

use crate::error::{PlacementError, Result};
use crate::models::{DeviceDescriptor, FleetSnapshot, ResourceScore};
use std::collections::HashMap;

/// Round to one decimal place, half away from zero
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Utilization scores keyed by device id
///
/// Devices without dynamics are left out; a missing entry means the device
/// cannot be scored.
pub fn utilization_scores(snapshot: &FleetSnapshot) -> HashMap<String, ResourceScore> {
    snapshot
        .devices
        .iter()
        .filter_map(|device| {
            let dynamics = device.dynamics.as_ref()?;
            let compute = round1(dynamics.free_compute_percent);
            Some((
                device.descriptor.id.clone(),
                ResourceScore {
                    compute,
                    memory: compute,
                    disk: round1(dynamics.free_storage_percent),
                    network: 0.0,
                },
            ))
        })
        .collect()
}

/// Saturation scores keyed by device id, zero for every device
pub fn saturation_scores<'a>(
    devices: impl IntoIterator<Item = &'a DeviceDescriptor>,
) -> HashMap<String, ResourceScore> {
    devices
        .into_iter()
        .map(|d| (d.id.clone(), ResourceScore::default()))
        .collect()
}

fn check_fraction(parameter: &'static str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(PlacementError::ScoreOutOfRange { parameter, value })
    }
}

/// General-purpose node score: `(1 - saturation) * capacity / (1 + utilization)`
///
/// Every input is a fraction in `[0, 1]`; anything else, NaN included, is
/// rejected with [`PlacementError::ScoreOutOfRange`]. Not used by the
/// ranking path.
pub fn calc_score(utilization: f64, saturation: f64, capacity: f64) -> Result<f64> {
    let utilization = check_fraction("utilization", utilization)?;
    let saturation = check_fraction("saturation", saturation)?;
    let capacity = check_fraction("capacity", capacity)?;

    Ok((1.0 - saturation) * capacity / (1.0 + utilization))
}
