//! The monitor loop: poll, evaluate, maybe shut down, record, sleep.
//!
//! A [`Monitor`] owns all long-lived state (the hysteresis counters and
//! the shutdown cooldown) and runs cycles strictly one after another.
//! Nothing a device or the power-off command does can stop the loop; only
//! the [`CancellationToken`] passed to [`Monitor::run`] does.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thermwatch_core::{
    ConfigError, CycleVerdict, Device, HysteresisEvaluator, MonitorConfig, ReadingOutcome,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::fetch::RetryPolicy;
use crate::poll::poll_devices;
use crate::results::ResultsLog;
use crate::shutdown::{ShutdownAction, ShutdownDecision, ShutdownGuard};
use crate::transport::{DeviceTransport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to resolve device {device}: {source}")]
    Resolve {
        device: Device,
        source: TransportError,
    },

    #[error("Failed to append results to {}: {source}", path.display())]
    Results {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Everything that happened in one completed cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub outcomes: Vec<ReadingOutcome>,
    pub verdict: CycleVerdict,
    pub shutdown: ShutdownDecision,
    pub elapsed: Duration,
}

pub struct Monitor<T, A> {
    transport: Arc<T>,
    devices: Vec<Device>,
    policy: RetryPolicy,
    max_parallel_reads: Option<usize>,
    check_interval: Duration,
    evaluator: HysteresisEvaluator,
    guard: ShutdownGuard<A>,
    results: Option<ResultsLog>,
}

impl<T: DeviceTransport, A: ShutdownAction> Monitor<T, A> {
    pub fn new(config: &MonitorConfig, transport: T, action: A) -> Self {
        Self {
            transport: Arc::new(transport),
            devices: config.devices.clone(),
            policy: RetryPolicy::from_config(config),
            max_parallel_reads: config.max_parallel_reads,
            check_interval: config.check_interval(),
            evaluator: HysteresisEvaluator::new(
                &config.devices,
                config.max_temp,
                config.hysteresis_threshold,
            ),
            guard: ShutdownGuard::new(action, config.shutdown_cooldown()),
            results: config.results_file.as_ref().map(ResultsLog::new),
        }
    }

    pub fn evaluator(&self) -> &HysteresisEvaluator {
        &self.evaluator
    }

    /// Check that every configured device resolves to a handle.
    pub fn verify_devices(&self) -> Result<(), MonitorError> {
        for device in &self.devices {
            match self.transport.resolve(device) {
                Ok(path) => {
                    tracing::debug!(device = %device, path = %path.display(), "Device resolved");
                }
                Err(TransportError::DeviceNotFound { path }) => {
                    return Err(ConfigError::MissingDevice {
                        device: device.to_string(),
                        path,
                    }
                    .into());
                }
                Err(source) => {
                    return Err(MonitorError::Resolve {
                        device: device.clone(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Run one cycle. Returns `Ok(None)` if `cancel` fired while polling.
    pub async fn run_cycle(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<CycleReport>, MonitorError> {
        let started = Instant::now();

        let Some(outcomes) = poll_devices(
            &self.transport,
            &self.devices,
            &self.policy,
            self.max_parallel_reads,
            cancel,
        )
        .await
        else {
            return Ok(None);
        };

        for outcome in &outcomes {
            match outcome {
                ReadingOutcome::Temperature { device, celsius, .. } => {
                    tracing::info!(device = %device, celsius, "Temperature reading");
                }
                ReadingOutcome::ReadFailure { device, cause, .. } => {
                    tracing::warn!(device = %device, cause = %cause, "READ_ERROR");
                }
            }
        }

        let verdict = self.evaluator.evaluate(&outcomes);
        let threshold = self.evaluator.threshold();
        for assessment in verdict.assessments.iter().filter(|a| a.over_limit) {
            if let Some(celsius) = assessment.celsius {
                tracing::warn!(
                    device = %assessment.device,
                    celsius,
                    count = assessment.counter,
                    threshold,
                    "OVERHEAT: {celsius}°C (Count: {}/{threshold})",
                    assessment.counter,
                );
            }
        }
        if verdict.emergency {
            tracing::error!(tripped = ?verdict.tripped, "Sustained overheat detected");
        }

        // Record before the power-off runs; a failed write must not stop it.
        let recorded = match &self.results {
            Some(results) => {
                results
                    .append(&outcomes)
                    .await
                    .map_err(|source| MonitorError::Results {
                        path: results.path().to_path_buf(),
                        source,
                    })
            }
            None => Ok(()),
        };

        let shutdown = self.guard.maybe_shutdown(verdict.emergency).await;
        recorded?;

        Ok(Some(CycleReport {
            outcomes,
            verdict,
            shutdown,
            elapsed: started.elapsed(),
        }))
    }

    /// Run cycles every `check_interval` until `cancel` fires.
    ///
    /// The interval is measured start to start: a cycle that took `d`
    /// is followed by a sleep of `check_interval - d` (or none).
    pub async fn run(&mut self, cancel: &CancellationToken) {
        tracing::info!(
            devices = ?self.devices,
            max_temp = self.evaluator.max_temp(),
            threshold = self.evaluator.threshold(),
            interval_secs = self.check_interval.as_secs(),
            "Starting temperature monitoring",
        );

        loop {
            let started = Instant::now();

            match AssertUnwindSafe(self.run_cycle(cancel)).catch_unwind().await {
                Ok(Ok(Some(report))) => {
                    tracing::debug!(
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        emergency = report.verdict.emergency,
                        "Cycle complete"
                    );
                }
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Monitor cycle failed");
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(panic = message, "Monitor cycle panicked");
                }
            }

            let remaining = self.check_interval.saturating_sub(started.elapsed());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        tracing::info!("Temperature monitoring stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_handles_both_payload_types() {
        let literal: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(literal.as_ref()), "static message");

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(owned.as_ref()), "owned message");

        let other: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
