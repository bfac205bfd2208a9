//! Emergency power-off: the action itself and the cooldown guard around it.
//!
//! [`ShutdownGuard`] is the only caller of a [`ShutdownAction`]. It records
//! the attempt in its [`CooldownGate`] before the action starts, so a hung
//! or crashing power-off command can never be re-invoked inside the
//! cooldown window.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use thermwatch_core::{CooldownGate, MonitorConfig, TooSoon};
use tokio::process::Command;
use tokio::time::Instant;

/// Failure of a power-off attempt. Never retried within the cycle.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownActionError {
    #[error("Failed to launch power-off command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Power-off command timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Power-off command failed (exit {exit_code}): {stderr}")]
    Failed { exit_code: i32, stderr: String },

    #[error("Power-off command is empty")]
    EmptyCommand,
}

/// Captured output of a successful power-off command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Something that cuts power to the monitored hardware.
pub trait ShutdownAction: Send + Sync {
    /// Human-readable form of the action, for logs.
    fn describe(&self) -> String;

    fn execute(&self) -> impl Future<Output = Result<ActionReport, ShutdownActionError>> + Send;
}

/// Runs an external executable with a fixed argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerOffCommand {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl PowerOffCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from an argv vector. The first element is the program.
    pub fn from_argv(argv: &[String], timeout: Duration) -> Result<Self, ShutdownActionError> {
        let (program, args) = argv.split_first().ok_or(ShutdownActionError::EmptyCommand)?;
        Ok(Self::new(program.clone(), args.to_vec(), timeout))
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, ShutdownActionError> {
        Self::from_argv(&config.power_off_command, config.power_off_timeout())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl ShutdownAction for PowerOffCommand {
    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn execute(&self) -> Result<ActionReport, ShutdownActionError> {
        let start = std::time::Instant::now();

        // `kill_on_drop(true)` kills the child when the timeout drops the future.
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(result) => result?,
            Err(_elapsed) => {
                return Err(ShutdownActionError::Timeout {
                    timeout: self.timeout,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            return Err(ShutdownActionError::Failed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(ActionReport {
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// What [`ShutdownGuard::maybe_shutdown`] did this cycle.
#[derive(Debug)]
pub enum ShutdownDecision {
    /// The cycle was not an emergency.
    NotRequested,
    /// Refused by the cooldown window; the action did not run.
    TooSoon(TooSoon),
    Completed(ActionReport),
    Failed(ShutdownActionError),
}

impl ShutdownDecision {
    /// `true` if the action was started this cycle, whatever its result.
    pub fn attempted(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

/// Rate-limited gate in front of a [`ShutdownAction`].
#[derive(Debug)]
pub struct ShutdownGuard<A> {
    gate: CooldownGate,
    action: A,
}

impl<A: ShutdownAction> ShutdownGuard<A> {
    pub fn new(action: A, cooldown: Duration) -> Self {
        Self {
            gate: CooldownGate::new(cooldown),
            action,
        }
    }

    /// Run the action if `emergency` and the cooldown window allows it.
    pub async fn maybe_shutdown(&mut self, emergency: bool) -> ShutdownDecision {
        self.maybe_shutdown_at(emergency, Instant::now()).await
    }

    /// [`maybe_shutdown`](Self::maybe_shutdown) with an explicit "now".
    pub async fn maybe_shutdown_at(&mut self, emergency: bool, now: Instant) -> ShutdownDecision {
        if !emergency {
            return ShutdownDecision::NotRequested;
        }

        if let Err(refused) = self.gate.try_begin(now.into_std()) {
            tracing::error!(
                elapsed_secs = refused.elapsed.as_secs(),
                remaining_secs = refused.remaining.as_secs(),
                "Shutdown aborted: too soon after last attempt"
            );
            return ShutdownDecision::TooSoon(refused);
        }

        tracing::error!(command = %self.action.describe(), "Initiating emergency shutdown!");

        match self.action.execute().await {
            Ok(report) => {
                tracing::error!(
                    duration_ms = report.duration_ms,
                    stdout = %report.stdout,
                    stderr = %report.stderr,
                    "Emergency shutdown command completed"
                );
                ShutdownDecision::Completed(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Emergency shutdown failed");
                ShutdownDecision::Failed(e)
            }
        }
    }
}
