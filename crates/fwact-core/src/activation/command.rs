//! Activation command construction.

use std::fmt;
use std::path::{Path, PathBuf};

use super::ActivationError;

/// Invocation of the activation script for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationCommand {
    script: PathBuf,
    image_path: PathBuf,
}

impl ActivationCommand {
    /// Bytes available for the rendered command: script, separator and an
    /// image path of `max_path_len` bytes including its terminator.
    pub fn capacity(script: &Path, max_path_len: usize) -> usize {
        script.as_os_str().len() + 1 + max_path_len
    }

    /// Build the command, failing if it does not fit [`Self::capacity`].
    pub fn build(
        script: impl Into<PathBuf>,
        image_path: impl Into<PathBuf>,
        max_path_len: usize,
    ) -> Result<Self, ActivationError> {
        let command = Self {
            script: script.into(),
            image_path: image_path.into(),
        };
        let capacity = Self::capacity(&command.script, max_path_len);
        let length = command.rendered_len();
        if length >= capacity {
            return Err(ActivationError::CommandTooLong { length, capacity });
        }
        Ok(command)
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    fn rendered_len(&self) -> usize {
        self.script.as_os_str().len() + 1 + self.image_path.as_os_str().len()
    }
}

impl fmt::Display for ActivationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.script.display(), self.image_path.display())
    }
}
