//! Hysteresis evaluation of per-device overheat streaks.
//!
//! Each device carries a consecutive-overbound counter. A reading strictly
//! above the limit advances it, a reading at or below the limit resets it,
//! and a failed read leaves it alone. A cycle is an emergency when any
//! device's counter has reached the threshold after the update, so a single
//! noisy spike never triggers the shutdown path.

use std::collections::BTreeMap;

use crate::reading::ReadingOutcome;
use crate::types::Device;

/// Owns the overheat counters for the configured device set.
#[derive(Debug, Clone)]
pub struct HysteresisEvaluator {
    max_temp: f64,
    threshold: u32,
    counters: BTreeMap<Device, u32>,
}

/// How one device fared in a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceAssessment {
    pub device: Device,
    /// `None` when the device's read failed this cycle.
    pub celsius: Option<f64>,
    /// Counter value after this cycle's transition.
    pub counter: u32,
    /// The reading exceeded the limit this cycle.
    pub over_limit: bool,
}

/// Verdict for one completed cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleVerdict {
    pub emergency: bool,
    /// One entry per device that reported this cycle, in device order.
    pub assessments: Vec<DeviceAssessment>,
    /// Devices whose counter is at or above the threshold.
    pub tripped: Vec<Device>,
}

impl HysteresisEvaluator {
    /// Create counters, all zero, for `devices`.
    pub fn new<'a>(
        devices: impl IntoIterator<Item = &'a Device>,
        max_temp: f64,
        threshold: u32,
    ) -> Self {
        Self {
            max_temp,
            threshold,
            counters: devices.into_iter().map(|d| (d.clone(), 0)).collect(),
        }
    }

    pub fn max_temp(&self) -> f64 {
        self.max_temp
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Current counter for `device`, or `None` if it is not monitored.
    pub fn counter(&self, device: &Device) -> Option<u32> {
        self.counters.get(device).copied()
    }

    /// Apply one cycle's batch of outcomes and derive the verdict.
    ///
    /// Outcomes for devices outside the configured set start a fresh
    /// counter rather than being dropped.
    pub fn evaluate(&mut self, outcomes: &[ReadingOutcome]) -> CycleVerdict {
        let mut assessments: Vec<DeviceAssessment> = outcomes
            .iter()
            .map(|outcome| self.apply(outcome))
            .collect();
        assessments.sort_by(|a, b| a.device.cmp(&b.device));

        let tripped: Vec<Device> = self
            .counters
            .iter()
            .filter(|(_, count)| **count >= self.threshold)
            .map(|(device, _)| device.clone())
            .collect();

        CycleVerdict {
            emergency: !tripped.is_empty(),
            assessments,
            tripped,
        }
    }

    fn apply(&mut self, outcome: &ReadingOutcome) -> DeviceAssessment {
        let max_temp = self.max_temp;
        let counter = self.counters.entry(outcome.device().clone()).or_insert(0);

        let celsius = outcome.celsius();
        let over_limit = match celsius {
            Some(value) if value > max_temp => {
                *counter = counter.saturating_add(1);
                true
            }
            Some(_) => {
                *counter = 0;
                false
            }
            None => false,
        };

        DeviceAssessment {
            device: outcome.device().clone(),
            celsius,
            counter: *counter,
            over_limit,
        }
    }
}
