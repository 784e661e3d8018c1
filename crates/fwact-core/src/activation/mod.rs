//! Image activation.
//!
//! `activate_image` resolves the image path and builds the command on the
//! caller's thread, then hands the command to a worker that runs it and
//! publishes `ActivationDone` or `ActivationFailed`.

pub mod command;
pub mod executor;
pub mod mock;
pub mod resolver;
pub mod worker;

use std::fmt;
use std::io;

use thiserror::Error;

use crate::events::UpdateEvent;

pub use command::ActivationCommand;
pub use executor::{ActivationExecutor, ExecutorError, ExitReport, ScriptExecutor};
pub use mock::MockExecutor;
pub use resolver::{ImageLocationId, PathResolver, ResolveError, StoragePathResolver};
pub use worker::ActivationHandle;

/// Failures reported synchronously by `activate_image`.
///
/// None of these publish an event.
#[derive(Error, Debug)]
pub enum ActivationError {
    #[error("Path resolution failed: {0}")]
    PathResolution(#[from] ResolveError),

    #[error("Activation command too long: {length} bytes, capacity {capacity}")]
    CommandTooLong { length: usize, capacity: usize },

    #[error("An activation is already in flight")]
    Busy,

    #[error("Thread creation failed: {0}")]
    Spawn(#[source] io::Error),
}

/// Terminal result of an activation worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    Done,
    Failed,
}

impl ActivationOutcome {
    pub fn event(self) -> UpdateEvent {
        match self {
            ActivationOutcome::Done => UpdateEvent::ActivationDone,
            ActivationOutcome::Failed => UpdateEvent::ActivationFailed,
        }
    }
}

impl fmt::Display for ActivationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationOutcome::Done => write!(f, "done"),
            ActivationOutcome::Failed => write!(f, "failed"),
        }
    }
}
