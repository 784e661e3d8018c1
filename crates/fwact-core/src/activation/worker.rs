//! Activation worker and its handle.

use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use super::command::ActivationCommand;
use super::executor::ActivationExecutor;
use super::resolver::ImageLocationId;
use super::{ActivationError, ActivationOutcome};
use crate::events::EventNotifier;

pub const WORKER_THREAD_NAME: &str = "fwact-activate";

/// Claim on the single activation slot; released on drop.
#[derive(Debug)]
pub(crate) struct InFlightSlot {
    flag: Arc<AtomicBool>,
}

impl InFlightSlot {
    /// Claim the slot, or `None` if an activation is already in flight.
    pub(crate) fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Everything one activation needs, moved into the worker by value.
pub(crate) struct ActivationTask {
    pub location: ImageLocationId,
    pub command: ActivationCommand,
    pub executor: Arc<dyn ActivationExecutor>,
    pub notifier: Arc<EventNotifier>,
    pub settle_delay: Duration,
    pub slot: InFlightSlot,
}

impl ActivationTask {
    /// Run the command, settle, then publish exactly one terminal event.
    fn run(self) -> ActivationOutcome {
        let ActivationTask {
            location,
            command,
            executor,
            notifier,
            settle_delay,
            slot,
        } = self;

        let result = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&command)));
        let outcome = match result {
            Ok(Ok(report)) if report.success() => {
                info!(location = %location, "Activation completed");
                ActivationOutcome::Done
            }
            Ok(Ok(report)) => {
                error!(location = %location, code = ?report.code, "Activation script failed");
                ActivationOutcome::Failed
            }
            Ok(Err(e)) => {
                error!(location = %location, error = %e, "Activation could not be run");
                ActivationOutcome::Failed
            }
            Err(_) => {
                error!(location = %location, "Activation executor panicked");
                ActivationOutcome::Failed
            }
        };

        // Give the script's filesystem writes time to become visible.
        let _ = io::stdout().flush();
        if !settle_delay.is_zero() {
            debug!(delay_ms = settle_delay.as_millis() as u64, "Settling");
            thread::sleep(settle_delay);
        }

        drop(slot);
        notifier.publish(outcome.event());
        outcome
    }
}

/// Handle to a running activation.
///
/// Dropping the handle does not cancel the worker.
#[derive(Debug)]
pub struct ActivationHandle {
    location: ImageLocationId,
    thread: JoinHandle<ActivationOutcome>,
}

impl ActivationHandle {
    pub fn location(&self) -> ImageLocationId {
        self.location
    }

    /// Block until the worker has published its event.
    ///
    /// A worker that panicked is reported as failed.
    pub fn wait(self) -> ActivationOutcome {
        self.thread.join().unwrap_or(ActivationOutcome::Failed)
    }
}

/// Holds a freshly spawned worker before it runs its task.
///
/// The worker starts once the gate is opened or dropped.
#[derive(Debug)]
pub(crate) struct StartGate {
    _tx: mpsc::SyncSender<()>,
}

impl StartGate {
    pub(crate) fn open(self) {
        drop(self._tx);
    }
}

/// Start `task` on a dedicated worker thread, parked behind a [`StartGate`].
///
/// On failure the task, and with it the slot claim, is dropped.
pub(crate) fn spawn(
    task: ActivationTask,
    stack_size: usize,
) -> Result<(ActivationHandle, StartGate), ActivationError> {
    let location = task.location;
    let (tx, rx) = mpsc::sync_channel::<()>(0);
    let thread = thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .stack_size(stack_size)
        .spawn(move || {
            // Err means the gate was dropped, which also starts the task.
            let _ = rx.recv();
            task.run()
        })
        .map_err(|e| {
            error!(location = %location, error = %e, "Thread creation failed");
            ActivationError::Spawn(e)
        })?;

    debug!(location = %location, "Activation thread created");
    Ok((ActivationHandle { location, thread }, StartGate { _tx: tx }))
}
