//! Pure domain logic for the thermwatch overheat monitor.
//!
//! Nothing in this crate performs I/O beyond reading the configuration
//! file: device identity, reading outcomes, the numeric extraction
//! contract, the hysteresis evaluator and the shutdown cooldown gate all
//! live here so they can be tested in isolation. The `thermwatch-agent`
//! crate wires them to serial ports and subprocesses.

pub mod config;
pub mod cooldown;
pub mod error;
pub mod hysteresis;
pub mod parse;
pub mod reading;
pub mod types;

pub use config::{MonitorConfig, SerialSettings};
pub use cooldown::{CooldownGate, TooSoon};
pub use error::{ConfigError, ParseError};
pub use hysteresis::{CycleVerdict, DeviceAssessment, HysteresisEvaluator};
pub use reading::{ReadFailureCause, ReadingOutcome};
pub use types::{Device, Timestamp};
