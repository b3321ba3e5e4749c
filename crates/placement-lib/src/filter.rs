//! Hard-constraint filtering of candidate devices
//!
//! A device is eligible only if its architecture, agent type and attached
//! sensors all satisfy the workload. The rationale collected along the way
//! is meant for logs, never for control flow.

use crate::models::{DeviceDescriptor, DeviceDynamics, SensorMatchPolicy};

/// Effective constraints for one run, after service resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Constraints {
    pub architecture: String,
    pub agent_type: Option<String>,
    pub required_sensors: Vec<String>,
    pub sensor_match: SensorMatchPolicy,
}

/// Outcome of evaluating one device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Eligibility {
    pub eligible: bool,
    pub reasons: Vec<String>,
}

impl Eligibility {
    fn reject(&mut self, reason: String) {
        self.eligible = false;
        self.reasons.push(reason);
    }
}

/// Stateless evaluator for [`Constraints`]
#[derive(Debug, Clone)]
pub struct ConstraintFilter {
    constraints: Constraints,
}

impl ConstraintFilter {
    pub fn new(constraints: Constraints) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Decide whether `device` may host the workload
    ///
    /// Every rule is checked so the rationale lists all failures, not just
    /// the first.
    pub fn evaluate(
        &self,
        device: &DeviceDescriptor,
        dynamics: Option<&DeviceDynamics>,
    ) -> Eligibility {
        let mut outcome = Eligibility {
            eligible: true,
            reasons: Vec::new(),
        };

        if device.arch != self.constraints.architecture {
            outcome.reject(format!(
                "architecture {} does not match {}",
                device.arch, self.constraints.architecture
            ));
        }

        if let Some(required) = &self.constraints.agent_type {
            if &device.agent_type != required {
                outcome.reject(format!(
                    "agent type {} does not match {}",
                    device.agent_type, required
                ));
            }
        }

        let Some(dynamics) = dynamics else {
            outcome.reject("no dynamics reported".to_string());
            return outcome;
        };

        if !self.constraints.required_sensors.is_empty() {
            if let Some(reason) = self.check_sensors(dynamics) {
                outcome.reject(reason);
            }
        }

        outcome
    }

    fn check_sensors(&self, dynamics: &DeviceDynamics) -> Option<String> {
        let required = &self.constraints.required_sensors;

        if dynamics.reports_no_sensors() {
            return Some(format!("no sensors attached, {:?} required", required));
        }

        match self.constraints.sensor_match {
            SensorMatchPolicy::Superset => {
                let missing: Vec<&String> = required
                    .iter()
                    .filter(|s| !dynamics.sensor_types.contains(*s))
                    .collect();
                if missing.is_empty() {
                    None
                } else {
                    Some(format!("missing sensors {:?}", missing))
                }
            }
            SensorMatchPolicy::StrictEquality => {
                let mut attached = dynamics.sensor_types.clone();
                let mut wanted = required.clone();
                attached.sort();
                wanted.sort();
                if attached == wanted {
                    None
                } else {
                    Some(format!(
                        "sensors {:?} are not exactly {:?}",
                        dynamics.sensor_types, required
                    ))
                }
            }
        }
    }
}
