//! Per-device, per-cycle reading outcomes.

use std::fmt;

use chrono::{Local, TimeZone};

use crate::types::{Device, Timestamp};

/// Timestamp format of the results record.
const RECORD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Why a device produced no temperature this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadFailureCause {
    /// Open, timeout, decode or I/O failure on every attempt.
    Transport(String),
    /// The device answered, but never with a number.
    Parse(String),
    /// The device handle does not exist. Not retried.
    DeviceMissing(String),
    /// The per-device worker panicked or could not be joined.
    WorkerFault(String),
}

impl fmt::Display for ReadFailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(detail) => write!(f, "transport error: {detail}"),
            Self::Parse(detail) => write!(f, "parse error: {detail}"),
            Self::DeviceMissing(detail) => write!(f, "device missing: {detail}"),
            Self::WorkerFault(detail) => write!(f, "worker fault: {detail}"),
        }
    }
}

/// The result of one device's temperature acquisition in one cycle.
///
/// Exactly one outcome is produced per configured device per cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingOutcome {
    Temperature {
        device: Device,
        celsius: f64,
        at: Timestamp,
    },
    ReadFailure {
        device: Device,
        at: Timestamp,
        cause: ReadFailureCause,
    },
}

impl ReadingOutcome {
    pub fn temperature(device: Device, celsius: f64, at: Timestamp) -> Self {
        Self::Temperature { device, celsius, at }
    }

    pub fn failure(device: Device, at: Timestamp, cause: ReadFailureCause) -> Self {
        Self::ReadFailure { device, at, cause }
    }

    pub fn device(&self) -> &Device {
        match self {
            Self::Temperature { device, .. } | Self::ReadFailure { device, .. } => device,
        }
    }

    pub fn at(&self) -> Timestamp {
        match self {
            Self::Temperature { at, .. } | Self::ReadFailure { at, .. } => *at,
        }
    }

    /// The reading in degrees Celsius, or `None` for a failure.
    pub fn celsius(&self) -> Option<f64> {
        match self {
            Self::Temperature { celsius, .. } => Some(*celsius),
            Self::ReadFailure { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ReadFailure { .. })
    }

    /// Results-file line in host local time, without the trailing newline.
    pub fn record_line(&self) -> String {
        self.record_line_in(&Local)
    }

    /// Results-file line with the timestamp rendered in `tz`.
    ///
    /// `2025-01-31 14:05:00 - [txpaa1] 73.5°C` or
    /// `2025-01-31 14:05:00 - [txpaa1] READ_ERROR`.
    pub fn record_line_in<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let stamp = self.at().with_timezone(tz).format(RECORD_TIME_FORMAT);
        match self {
            Self::Temperature {
                device, celsius, ..
            } => format!("{stamp} - [{device}] {celsius:?}°C"),
            Self::ReadFailure { device, .. } => format!("{stamp} - [{device}] READ_ERROR"),
        }
    }
}
