//! Extension configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::header::DeviceKey;

/// Default location of the active firmware header.
pub const DEFAULT_HEADER_PATH: &str = "header.bin";
/// Default activation script, invoked as `<script> <image-path>`.
pub const DEFAULT_ACTIVATION_SCRIPT: &str = "./activate_script";
pub const DEFAULT_FIRMWARE_DIR: &str = "firmware";
pub const DEFAULT_MAX_PATH_LEN: usize = 128;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;
pub const DEFAULT_WORKER_STACK_SIZE: usize = 256 * 1024;

/// Configuration for an [`UpdateExtension`](crate::UpdateExtension).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    /// Path of the active firmware header. The activation script is expected
    /// to copy the new header here once the update is applied.
    pub header_path: PathBuf,
    /// Script run to activate a staged image.
    pub activation_script: PathBuf,
    /// Directory holding staged firmware images.
    pub firmware_dir: PathBuf,
    /// Longest image path accepted, in bytes.
    pub max_path_len: usize,
    /// Pause after the script exits before reporting, in milliseconds.
    pub settle_delay_ms: u64,
    /// Stack size of the activation worker thread.
    pub worker_stack_size: usize,
    /// Hex encoded key used to authenticate external headers.
    pub device_key: Option<String>,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            header_path: PathBuf::from(DEFAULT_HEADER_PATH),
            activation_script: PathBuf::from(DEFAULT_ACTIVATION_SCRIPT),
            firmware_dir: PathBuf::from(DEFAULT_FIRMWARE_DIR),
            max_path_len: DEFAULT_MAX_PATH_LEN,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            worker_stack_size: DEFAULT_WORKER_STACK_SIZE,
            device_key: None,
        }
    }
}

impl ExtensionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ExtensionConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.device_key()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Parsed device key, if one is configured.
    pub fn device_key(&self) -> Result<Option<DeviceKey>> {
        self.device_key
            .as_deref()
            .map(|s| DeviceKey::from_hex(s).context("invalid device_key"))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ExtensionConfig::default();
        assert_eq!(config.header_path, PathBuf::from("header.bin"));
        assert_eq!(config.activation_script, PathBuf::from("./activate_script"));
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
        assert!(config.device_key().unwrap().is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ExtensionConfig = toml::from_str(
            r#"
            header_path = "/var/lib/fw/header.bin"
            settle_delay_ms = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.header_path, PathBuf::from("/var/lib/fw/header.bin"));
        assert_eq!(config.settle_delay(), Duration::ZERO);
        assert_eq!(config.max_path_len, DEFAULT_MAX_PATH_LEN);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fwact.toml");
        let config = ExtensionConfig {
            firmware_dir: PathBuf::from("/data/fw"),
            device_key: Some("11".repeat(32)),
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = ExtensionConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(loaded.device_key().unwrap().is_some());
    }

    #[test]
    fn test_load_rejects_bad_device_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fwact.toml");
        std::fs::write(&path, "device_key = \"zz\"\n").unwrap();
        assert!(ExtensionConfig::load_from_file(&path).is_err());
    }
}
