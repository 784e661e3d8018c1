//! fwact-core: firmware activation orchestrator for the update client.
//!
//! This crate reports the details of the active firmware from its metadata
//! header and activates staged images by running an external script.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Header**: v2 header constants, codec and active-header loader
//! - **Activation**: path resolution, command building, executor and worker
//! - **Events**: single-sink completion reporting
//! - **Installer**: installer details (always zero for now)
//! - **Extension**: the orchestrator exposing the public operations
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fwact_core::{ExtensionConfig, FirmwareDetails, ImageLocationId, TracingSink, UpdateExtension};
//!
//! let config = ExtensionConfig::default();
//! let ext = UpdateExtension::new(&config).expect("bad config");
//! ext.init_api(Arc::new(TracingSink));
//!
//! let mut details = FirmwareDetails::default();
//! let _ = ext.get_active_firmware_details(Some(&mut details));
//!
//! let handle = ext.activate_image(ImageLocationId(0)).expect("activation not started");
//! println!("activation {}", handle.wait());
//! ```

pub mod activation;
pub mod config;
pub mod events;
pub mod extension;
pub mod header;
pub mod installer;

// Re-exports for convenience
pub use activation::{
    ActivationCommand, ActivationError, ActivationExecutor, ActivationHandle, ActivationOutcome,
    ExitReport, ImageLocationId, MockExecutor, PathResolver, ScriptExecutor, StoragePathResolver,
};
pub use config::ExtensionConfig;
pub use events::{
    ChannelSink, EventNotifier, EventSink, NullSink, RecordingSink, TracingSink, UpdateEvent,
};
pub use extension::{UpdateError, UpdateExtension};
pub use header::{DeviceKey, FirmwareDetails, HeaderDescriptor, HeaderError, HeaderFormat};
pub use installer::InstallerDetails;
