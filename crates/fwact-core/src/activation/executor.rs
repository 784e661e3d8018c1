//! Activation executor abstraction.
//!
//! Defines the `ActivationExecutor` trait used by the activation worker,
//! allowing the subprocess implementation to be swapped for a mock.

use std::io;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, error, info};

use super::command::ActivationCommand;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to launch {script}: {source}")]
    Launch {
        script: String,
        #[source]
        source: io::Error,
    },
}

/// How the activation command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, or `None` if the process was terminated without one
    /// (e.g. by a signal).
    pub code: Option<i32>,
}

impl ExitReport {
    pub fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn no_code() -> Self {
        Self { code: None }
    }

    /// Only an explicit exit code of zero counts as success.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs an activation command to completion.
pub trait ActivationExecutor: Send + Sync {
    fn execute(&self, command: &ActivationCommand) -> Result<ExitReport, ExecutorError>;
}

/// Runs the activation script as a subprocess.
///
/// The image path is passed as the single argument; no shell is involved.
/// Standard streams are inherited from the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptExecutor;

impl ActivationExecutor for ScriptExecutor {
    fn execute(&self, command: &ActivationCommand) -> Result<ExitReport, ExecutorError> {
        debug!(command = %command, "Activate by executing");

        let status = Command::new(command.script())
            .arg(command.image_path())
            .stdin(Stdio::null())
            .status()
            .map_err(|e| {
                error!(script = %command.script().display(), error = %e, "Failed to run activation script");
                ExecutorError::Launch {
                    script: command.script().display().to_string(),
                    source: e,
                }
            })?;

        let report = ExitReport {
            code: status.code(),
        };
        match report.code {
            Some(code) => info!(code, "Activation script completed"),
            None => error!("Activation script terminated without exit code"),
        }
        Ok(report)
    }
}
