//! Monitor configuration.
//!
//! Loaded from a JSON file in which every field is optional; omitted
//! fields take the defaults below. Unknown keys are rejected so a typo in
//! a safety limit cannot silently fall back to the default.
//!
//! | Field                    | Default                                       |
//! |--------------------------|-----------------------------------------------|
//! | `devices`                | `["txpaa1", "txpaa2", "txpaa3"]`              |
//! | `device_dir`             | `/dev`                                        |
//! | `max_temp`               | `180.0`                                       |
//! | `check_interval_secs`    | `300`                                         |
//! | `hysteresis_threshold`   | `2`                                           |
//! | `retry_count`            | `3`                                           |
//! | `retry_delay_secs`       | `0.5`                                         |
//! | `results_file`           | `/var/log/temperature_results.txt`            |
//! | `power_off_command`      | `["/usr/sbin/powercycle", "chroma", "--power-off"]` |
//! | `power_off_timeout_secs` | `30`                                          |
//! | `shutdown_cooldown_secs` | `300`                                         |
//! | `max_parallel_reads`     | `null` (one worker per device)                |
//! | `serial.baud_rate`       | `115200`                                      |
//! | `serial.timeout_secs`    | `1.0`                                         |
//! | `serial.wakeup_delay_secs` | `0.5`                                       |
//! | `serial.query`           | `"R\n"`                                       |

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::Device;

/// Substitute power-off command used in test mode.
const TEST_MODE_PROGRAM: &str = "echo";
const TEST_MODE_BANNER: &str = "TEST MODE: Would execute:";

/// Longest accepted delay or read timeout, in seconds (one day).
const MAX_DELAY_SECS: f64 = 86_400.0;

/// Serial link parameters shared by every device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialSettings {
    pub baud_rate: u32,
    /// Per-attempt read timeout.
    pub timeout_secs: f64,
    /// Pause after opening the port before the firmware will answer.
    pub wakeup_delay_secs: f64,
    /// Query written to the device after the wake-up delay.
    pub query: String,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            timeout_secs: 1.0,
            wakeup_delay_secs: 0.5,
            query: "R\n".to_string(),
        }
    }
}

impl SerialSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }

    pub fn wakeup_delay(&self) -> Duration {
        Duration::from_secs_f64(self.wakeup_delay_secs)
    }
}

/// Complete monitor configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub devices: Vec<Device>,
    pub device_dir: PathBuf,
    /// Readings strictly above this (°C) count toward the overheat streak.
    pub max_temp: f64,
    pub check_interval_secs: u64,
    pub hysteresis_threshold: u32,
    pub retry_count: u32,
    pub retry_delay_secs: f64,
    /// Append-only results record. `null` disables it.
    pub results_file: Option<PathBuf>,
    /// Program followed by its fixed arguments.
    pub power_off_command: Vec<String>,
    pub power_off_timeout_secs: u64,
    pub shutdown_cooldown_secs: u64,
    /// Cap on simultaneous device reads; `None` means one per device.
    pub max_parallel_reads: Option<usize>,
    pub serial: SerialSettings,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            devices: ["txpaa1", "txpaa2", "txpaa3"]
                .into_iter()
                .map(Device::new)
                .collect(),
            device_dir: PathBuf::from("/dev"),
            max_temp: 180.0,
            check_interval_secs: 300,
            hysteresis_threshold: 2,
            retry_count: 3,
            retry_delay_secs: 0.5,
            results_file: Some(PathBuf::from("/var/log/temperature_results.txt")),
            power_off_command: ["/usr/sbin/powercycle", "chroma", "--power-off"]
                .into_iter()
                .map(String::from)
                .collect(),
            power_off_timeout_secs: 30,
            shutdown_cooldown_secs: 300,
            max_parallel_reads: None,
            serial: SerialSettings::default(),
        }
    }
}

impl MonitorConfig {
    /// Read and validate the config file at `path`.
    ///
    /// Returns `Ok(None)` if the file does not exist; the caller decides
    /// whether defaults are acceptable. A file that exists but cannot be
    /// read, parsed or validated is an error.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(Some(config))
    }

    /// Check every field for values the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(invalid("devices must list at least one device"));
        }
        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.name().trim().is_empty() {
                return Err(invalid("device names must not be empty"));
            }
            if !seen.insert(device.name()) {
                return Err(invalid(format!("device {device} is listed twice")));
            }
        }

        if !self.max_temp.is_finite() {
            return Err(invalid(format!(
                "max_temp must be a finite number, got {}",
                self.max_temp
            )));
        }
        validate_positive(self.check_interval_secs, "check_interval_secs")?;
        validate_positive(u64::from(self.hysteresis_threshold), "hysteresis_threshold")?;
        validate_positive(u64::from(self.retry_count), "retry_count")?;
        validate_delay_secs(self.retry_delay_secs, "retry_delay_secs")?;

        if self.power_off_command.is_empty() || self.power_off_command[0].trim().is_empty() {
            return Err(invalid("power_off_command must name a program"));
        }
        validate_positive(self.power_off_timeout_secs, "power_off_timeout_secs")?;

        if self.max_parallel_reads == Some(0) {
            return Err(invalid("max_parallel_reads must be at least 1"));
        }

        if self.serial.baud_rate == 0 {
            return Err(invalid("serial.baud_rate must be positive"));
        }
        if validate_delay_secs(self.serial.timeout_secs, "serial.timeout_secs")?.is_zero() {
            return Err(invalid("serial.timeout_secs must be positive"));
        }
        validate_delay_secs(self.serial.wakeup_delay_secs, "serial.wakeup_delay_secs")?;
        if self.serial.query.is_empty() {
            return Err(invalid("serial.query must not be empty"));
        }

        Ok(())
    }

    /// Replace the power-off command with a harmless `echo` of it.
    pub fn into_test_mode(mut self) -> Self {
        let mut command = vec![TEST_MODE_PROGRAM.to_string(), TEST_MODE_BANNER.to_string()];
        command.append(&mut self.power_off_command);
        self.power_off_command = command;
        self
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs)
    }

    pub fn power_off_timeout(&self) -> Duration {
        Duration::from_secs(self.power_off_timeout_secs)
    }

    pub fn shutdown_cooldown(&self) -> Duration {
        Duration::from_secs(self.shutdown_cooldown_secs)
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

fn validate_positive(value: u64, name: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(format!("{name} must be at least 1")));
    }
    Ok(())
}

/// A fractional-seconds field must convert to a `Duration` and stay
/// within [`MAX_DELAY_SECS`].
fn validate_delay_secs(value: f64, name: &str) -> Result<Duration, ConfigError> {
    let duration = Duration::try_from_secs_f64(value).map_err(|e| {
        invalid(format!(
            "{name} must be a non-negative number of seconds, got {value} ({e})"
        ))
    })?;
    if value > MAX_DELAY_SECS {
        return Err(invalid(format!(
            "{name} must be at most {MAX_DELAY_SECS} seconds, got {value}"
        )));
    }
    Ok(duration)
}
