//! Concurrent fan-out of one fetch per device.
//!
//! Every device gets its own task on a [`JoinSet`], so a slow or retrying
//! device only delays the cycle by its own latency. Task results are
//! correlated back to devices by task id; a task that panics or is
//! otherwise lost still yields a [`ReadFailureCause::WorkerFault`] outcome
//! for its device.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thermwatch_core::{Device, ReadFailureCause, ReadingOutcome};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::fetch::{fetch_temperature, RetryPolicy};
use crate::transport::DeviceTransport;

/// Read all `devices` concurrently and return one outcome per device, in
/// the order given.
///
/// `max_parallel` caps how many devices are read at the same time; `None`
/// runs every device at once. Returns `None` if `cancel` fires before all
/// reads finish, in which case the in-flight tasks are aborted.
pub async fn poll_devices<T: DeviceTransport>(
    transport: &Arc<T>,
    devices: &[Device],
    policy: &RetryPolicy,
    max_parallel: Option<usize>,
    cancel: &CancellationToken,
) -> Option<Vec<ReadingOutcome>> {
    let limiter = max_parallel.map(|n| Arc::new(Semaphore::new(n.max(1))));
    let mut tasks = JoinSet::new();
    let mut pending: HashMap<Id, Device> = HashMap::with_capacity(devices.len());

    for device in devices {
        let transport = Arc::clone(transport);
        let policy = policy.clone();
        let limiter = limiter.clone();
        let task_device = device.clone();

        let handle = tasks.spawn(async move {
            let _permit = match limiter {
                Some(semaphore) => Some(semaphore.acquire_owned().await),
                None => None,
            };
            fetch_temperature(transport.as_ref(), &task_device, &policy).await
        });
        pending.insert(handle.id(), device.clone());
    }

    let mut outcomes = Vec::with_capacity(devices.len());

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(in_flight = pending.len(), "Poll cancelled, aborting device reads");
                tasks.abort_all();
                return None;
            }
            joined = tasks.join_next_with_id() => match joined {
                None => break,
                Some(Ok((id, outcome))) => {
                    pending.remove(&id);
                    outcomes.push(outcome);
                }
                Some(Err(e)) => {
                    let Some(device) = pending.remove(&e.id()) else {
                        tracing::error!(error = %e, "Join error for unknown device task");
                        continue;
                    };
                    tracing::error!(device = %device, error = %e, "Device worker failed");
                    outcomes.push(ReadingOutcome::failure(
                        device,
                        Utc::now(),
                        ReadFailureCause::WorkerFault(e.to_string()),
                    ));
                }
            }
        }
    }

    // Anything still pending never reported back.
    for (_, device) in pending.drain() {
        tracing::error!(device = %device, "Device worker result lost");
        outcomes.push(ReadingOutcome::failure(
            device,
            Utc::now(),
            ReadFailureCause::WorkerFault("worker result lost".to_string()),
        ));
    }

    outcomes.sort_by_key(|outcome| devices.iter().position(|d| d == outcome.device()));
    Some(outcomes)
}
