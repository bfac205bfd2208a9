//! Bounded-retry temperature acquisition for a single device.
//!
//! [`fetch_temperature`] never fails: whatever happens on the wire, the
//! caller gets exactly one [`ReadingOutcome`] back, so one bad device can
//! never abort a cycle.

use std::time::Duration;

use chrono::Utc;
use thermwatch_core::parse::extract_temperature;
use thermwatch_core::{Device, MonitorConfig, ParseError, ReadFailureCause, ReadingOutcome};

use crate::transport::{DeviceTransport, TransportError};

/// How hard to try before giving up on a device for this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub attempts: u32,
    /// Sleep between attempts (not after the last one).
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            attempts: config.retry_count,
            delay: config.retry_delay(),
        }
    }
}

/// Why a single attempt produced no temperature.
#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl AttemptError {
    fn into_cause(self) -> ReadFailureCause {
        match self {
            Self::Transport(e) if e.is_configuration() => {
                ReadFailureCause::DeviceMissing(e.to_string())
            }
            Self::Transport(e) => ReadFailureCause::Transport(e.to_string()),
            Self::Parse(e) => ReadFailureCause::Parse(e.to_string()),
        }
    }
}

async fn attempt<T: DeviceTransport>(transport: &T, device: &Device) -> Result<f64, AttemptError> {
    let raw = transport.query(device).await?;
    tracing::debug!(device = %device, raw = %raw, "Raw device response");
    Ok(extract_temperature(&raw)?)
}

/// Read one device's temperature, retrying transport and parse failures.
///
/// A missing device handle is a configuration problem and ends the fetch
/// after the first attempt.
pub async fn fetch_temperature<T: DeviceTransport>(
    transport: &T,
    device: &Device,
    policy: &RetryPolicy,
) -> ReadingOutcome {
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for n in 1..=attempts {
        match attempt(transport, device).await {
            Ok(celsius) => {
                return ReadingOutcome::temperature(device.clone(), celsius, Utc::now());
            }
            Err(AttemptError::Transport(e)) if e.is_configuration() => {
                tracing::error!(
                    device = %device,
                    error = %e,
                    "Device handle missing, not retrying"
                );
                return ReadingOutcome::failure(
                    device.clone(),
                    Utc::now(),
                    AttemptError::Transport(e).into_cause(),
                );
            }
            Err(AttemptError::Parse(e)) => {
                tracing::warn!(
                    device = %device,
                    attempt = n,
                    response = %e.response,
                    "Invalid response"
                );
                last_error = Some(AttemptError::Parse(e));
            }
            Err(e) => {
                tracing::warn!(device = %device, attempt = n, error = %e, "Read attempt failed");
                last_error = Some(e);
            }
        }

        if n < attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    tracing::error!(device = %device, attempts, "All read attempts failed");
    let cause = last_error
        .map(AttemptError::into_cause)
        .unwrap_or_else(|| ReadFailureCause::Transport("no attempt made".to_string()));
    ReadingOutcome::failure(device.clone(), Utc::now(), cause)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;

    /// Transport that replays a fixed script of responses.
    struct Scripted {
        responses: Mutex<VecDeque<Result<String, TransportError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<String, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl DeviceTransport for Scripted {
        fn resolve(&self, device: &Device) -> Result<PathBuf, TransportError> {
            Ok(PathBuf::from(device.name()))
        }

        async fn query(&self, _device: &Device) -> Result<String, TransportError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Timeout(Duration::from_secs(1))))
        }
    }

    fn timeout() -> TransportError {
        TransportError::Timeout(Duration::from_secs(1))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }

    fn amp() -> Device {
        Device::new("amp0")
    }

    #[tokio::test(start_paused = true)]
    async fn well_formed_reading_takes_one_attempt() {
        let transport = Scripted::new(vec![Ok("Temp: 73.5C".into())]);
        let outcome = fetch_temperature(&transport, &amp(), &policy()).await;
        assert_eq!(outcome.celsius(), Some(73.5));
        assert_eq!(outcome.device(), &amp());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transport_failures() {
        let transport = Scripted::new(vec![Err(timeout()), Err(timeout()), Ok("181.0".into())]);
        let started = tokio::time::Instant::now();
        let outcome = fetch_temperature(&transport, &amp(), &policy()).await;
        assert_eq!(outcome.celsius(), Some(181.0));
        assert_eq!(transport.calls(), 3);
        // Two inter-attempt delays.
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn garbled_response_is_retried() {
        let transport = Scripted::new(vec![Ok("ERR".into()), Ok("T=42.0".into())]);
        let outcome = fetch_temperature(&transport, &amp(), &policy()).await;
        assert_eq!(outcome.celsius(), Some(42.0));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_yield_read_failure() {
        let transport = Scripted::new(vec![Err(timeout()), Err(timeout()), Err(timeout())]);
        let started = tokio::time::Instant::now();
        let outcome = fetch_temperature(&transport, &amp(), &policy()).await;
        assert_matches!(
            outcome,
            ReadingOutcome::ReadFailure { cause: ReadFailureCause::Transport(_), .. }
        );
        assert_eq!(transport.calls(), 3);
        // No sleep after the final attempt.
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn last_error_decides_cause() {
        let transport = Scripted::new(vec![Err(timeout()), Ok("no digits".into())]);
        let policy = RetryPolicy {
            attempts: 2,
            delay: Duration::ZERO,
        };
        let outcome = fetch_temperature(&transport, &amp(), &policy).await;
        assert_matches!(
            outcome,
            ReadingOutcome::ReadFailure { cause: ReadFailureCause::Parse(msg), .. }
                if msg.contains("no digits")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_device_is_not_retried() {
        let transport = Scripted::new(vec![Err(TransportError::DeviceNotFound {
            path: PathBuf::from("/dev/amp0"),
        })]);
        let outcome = fetch_temperature(&transport, &amp(), &policy()).await;
        assert_matches!(
            outcome,
            ReadingOutcome::ReadFailure { cause: ReadFailureCause::DeviceMissing(_), .. }
        );
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_reads_once() {
        let transport = Scripted::new(vec![Ok("50".into())]);
        let policy = RetryPolicy {
            attempts: 0,
            delay: Duration::ZERO,
        };
        let outcome = fetch_temperature(&transport, &amp(), &policy).await;
        assert_eq!(outcome.celsius(), Some(50.0));
    }

    #[test]
    fn policy_from_config() {
        let config = MonitorConfig {
            retry_count: 5,
            retry_delay_secs: 0.25,
            ..Default::default()
        };
        assert_eq!(
            RetryPolicy::from_config(&config),
            RetryPolicy {
                attempts: 5,
                delay: Duration::from_millis(250),
            }
        );
    }
}
