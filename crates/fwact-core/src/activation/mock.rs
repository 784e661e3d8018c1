//! Mock activation executor for testing.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex};

use super::command::ActivationCommand;
use super::executor::{ActivationExecutor, ExecutorError, ExitReport};

enum MockResult {
    Exit(ExitReport),
    LaunchFailure,
}

/// Mock executor for unit testing activation logic.
pub struct MockExecutor {
    /// Queued results, consumed one per execution.
    results: Arc<Mutex<VecDeque<MockResult>>>,
    /// Captured commands.
    executed: Arc<Mutex<Vec<ActivationCommand>>>,
    /// While set, executions block until `release` is called.
    gate: Arc<(Mutex<bool>, Condvar)>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            results: Arc::new(Mutex::new(VecDeque::new())),
            executed: Arc::new(Mutex::new(Vec::new())),
            gate: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// Queue an exit code for the next execution.
    pub fn queue_exit(&self, code: i32) {
        self.push(MockResult::Exit(ExitReport::code(code)));
    }

    /// Queue a termination without exit code.
    pub fn queue_no_code(&self) {
        self.push(MockResult::Exit(ExitReport::no_code()));
    }

    /// Queue a launch failure.
    pub fn queue_launch_failure(&self) {
        self.push(MockResult::LaunchFailure);
    }

    /// Block executions until [`release`](Self::release).
    pub fn hold(&self) {
        *self.gate.0.lock().unwrap() = true;
    }

    pub fn release(&self) {
        let (held, cvar) = &*self.gate;
        *held.lock().unwrap() = false;
        cvar.notify_all();
    }

    /// Get all executed commands.
    pub fn executed(&self) -> Vec<ActivationCommand> {
        self.executed.lock().unwrap().clone()
    }

    fn push(&self, result: MockResult) {
        self.results.lock().unwrap().push_back(result);
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivationExecutor for MockExecutor {
    fn execute(&self, command: &ActivationCommand) -> Result<ExitReport, ExecutorError> {
        self.executed.lock().unwrap().push(command.clone());

        let (held, cvar) = &*self.gate;
        let mut guard = held.lock().unwrap();
        while *guard {
            guard = cvar.wait(guard).unwrap();
        }
        drop(guard);

        // Unqueued executions succeed.
        match self.results.lock().unwrap().pop_front() {
            Some(MockResult::Exit(report)) => Ok(report),
            Some(MockResult::LaunchFailure) => Err(ExecutorError::Launch {
                script: command.script().display().to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "mock launch failure"),
            }),
            None => Ok(ExitReport::code(0)),
        }
    }
}
