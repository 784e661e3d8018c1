//! Update extension - the orchestrator behind the public operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::activation::worker::{self, ActivationTask, InFlightSlot};
use crate::activation::{
    ActivationCommand, ActivationError, ActivationExecutor, ActivationHandle, ImageLocationId,
    PathResolver, ScriptExecutor, StoragePathResolver,
};
use crate::config::ExtensionConfig;
use crate::events::{EventNotifier, EventSink, UpdateEvent};
use crate::header::{FirmwareDetails, HeaderError, HeaderLoader};
use crate::installer::InstallerDetails;

/// Status of a public operation.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// An output argument was absent.
    #[error("Invalid parameter")]
    InvalidParameter,

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error(transparent)]
    Activation(#[from] ActivationError),
}

/// Orchestrates header queries and image activation.
///
/// Owns the registered event sink, so several independent extensions can
/// coexist in one process.
pub struct UpdateExtension {
    loader: HeaderLoader,
    resolver: Arc<dyn PathResolver>,
    executor: Arc<dyn ActivationExecutor>,
    notifier: Arc<EventNotifier>,
    activation_script: std::path::PathBuf,
    max_path_len: usize,
    settle_delay: Duration,
    worker_stack_size: usize,
    in_flight: Arc<AtomicBool>,
}

impl UpdateExtension {
    /// Create an extension running the configured script as a subprocess.
    pub fn new(config: &ExtensionConfig) -> anyhow::Result<Self> {
        let resolver = StoragePathResolver::new(&config.firmware_dir, config.max_path_len);
        Self::with_parts(config, Arc::new(resolver), Arc::new(ScriptExecutor))
    }

    /// Create an extension with custom path resolution and execution.
    pub fn with_parts(
        config: &ExtensionConfig,
        resolver: Arc<dyn PathResolver>,
        executor: Arc<dyn ActivationExecutor>,
    ) -> anyhow::Result<Self> {
        let loader = HeaderLoader::new(&config.header_path).with_device_key(config.device_key()?);
        Ok(Self {
            loader,
            resolver,
            executor,
            notifier: Arc::new(EventNotifier::new()),
            activation_script: config.activation_script.clone(),
            max_path_len: config.max_path_len,
            settle_delay: config.settle_delay(),
            worker_stack_size: config.worker_stack_size,
            in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Register the event sink, replacing any previous one.
    pub fn init_api(&self, sink: Arc<dyn EventSink>) {
        self.notifier.register(sink);
    }

    /// Fill `out` with the details of the active firmware.
    ///
    /// On any failure `out` is zeroed. `ActiveDetailsReady` is published once
    /// `out` is final, whatever the result.
    #[instrument(skip_all)]
    pub fn get_active_firmware_details(
        &self,
        out: Option<&mut FirmwareDetails>,
    ) -> Result<(), UpdateError> {
        let out = out.ok_or(UpdateError::InvalidParameter)?;

        let result = match self.loader.load() {
            Ok(details) => {
                debug!(version = details.version, size = details.size, "Active firmware details");
                *out = details;
                Ok(())
            }
            Err(e) => {
                out.clear();
                Err(UpdateError::Header(e))
            }
        };

        self.notifier.publish(UpdateEvent::ActiveDetailsReady);
        result
    }

    /// Fill `out` with installer details. Always zero.
    #[instrument(skip_all)]
    pub fn get_installer_details(
        &self,
        out: Option<&mut InstallerDetails>,
    ) -> Result<(), UpdateError> {
        let out = out.ok_or(UpdateError::InvalidParameter)?;
        InstallerDetails::query(out);
        self.notifier.publish(UpdateEvent::InstallerDetailsReady);
        Ok(())
    }

    /// Start activating the image at `location`.
    ///
    /// Returns once the worker has been started; the result is published
    /// later as `ActivationDone` or `ActivationFailed`. Errors returned here
    /// are never followed by an event.
    #[instrument(skip(self))]
    pub fn activate_image(
        &self,
        location: ImageLocationId,
    ) -> Result<ActivationHandle, UpdateError> {
        let image_path = self.resolver.resolve(location).map_err(|e| {
            error!(error = %e, "Failed to resolve image path");
            ActivationError::PathResolution(e)
        })?;

        let command =
            ActivationCommand::build(&self.activation_script, image_path, self.max_path_len)
                .inspect_err(|e| error!(error = %e, "Failed to build activation command"))?;

        let slot = InFlightSlot::claim(&self.in_flight).ok_or_else(|| {
            error!("Activation already in flight");
            ActivationError::Busy
        })?;

        let task = ActivationTask {
            location,
            command,
            executor: self.executor.clone(),
            notifier: self.notifier.clone(),
            settle_delay: self.settle_delay,
            slot,
        };
        let (handle, gate) = worker::spawn(task, self.worker_stack_size)?;
        gate.open();
        Ok(handle)
    }

    pub fn is_activation_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::{ActivationOutcome, MockExecutor, ResolveError};
    use crate::events::{ChannelSink, RecordingSink};
    use crate::header::codec::fixtures::*;
    use crate::header::constants::{EXTERNAL_PAYLOAD_HASH_OFFSET, HASH_SIZE};
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Instant;
    use tempfile::TempDir;

    struct FailingResolver;

    impl PathResolver for FailingResolver {
        fn resolve(&self, location: ImageLocationId) -> Result<PathBuf, ResolveError> {
            Err(ResolveError::UnknownLocation(location))
        }
    }

    struct Fixture {
        dir: TempDir,
        executor: Arc<MockExecutor>,
        sink: Arc<RecordingSink>,
        ext: UpdateExtension,
    }

    fn config(dir: &TempDir) -> ExtensionConfig {
        ExtensionConfig {
            header_path: dir.path().join("header.bin"),
            firmware_dir: dir.path().join("firmware"),
            settle_delay_ms: 0,
            device_key: Some(hex::encode(TEST_KEY)),
            ..Default::default()
        }
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let executor = Arc::new(MockExecutor::new());
        let resolver = StoragePathResolver::new(&config.firmware_dir, config.max_path_len);
        let ext = UpdateExtension::with_parts(&config, Arc::new(resolver), executor.clone()).unwrap();
        let sink = Arc::new(RecordingSink::new());
        ext.init_api(sink.clone());
        Fixture {
            dir,
            executor,
            sink,
            ext,
        }
    }

    fn garbage_details() -> FirmwareDetails {
        FirmwareDetails {
            version: u64::MAX,
            size: 1,
            hash: [0xAB; HASH_SIZE],
            campaign: [0xCD; 16],
            signature_size: 9,
        }
    }

    #[test]
    fn test_missing_header_zeroes_and_notifies() {
        let f = fixture();
        let mut details = garbage_details();

        let result = f.ext.get_active_firmware_details(Some(&mut details));
        assert!(matches!(
            result,
            Err(UpdateError::Header(HeaderError::NotFound { .. }))
        ));
        assert!(details.is_zeroed());
        assert_eq!(f.sink.events(), vec![UpdateEvent::ActiveDetailsReady]);
    }

    #[test]
    fn test_internal_header_details() {
        let f = fixture();
        std::fs::write(f.dir.path().join("header.bin"), internal_header(&sample_details())).unwrap();
        let mut details = FirmwareDetails::default();

        f.ext.get_active_firmware_details(Some(&mut details)).unwrap();
        assert_eq!(details, sample_details());
        assert_eq!(f.sink.count(UpdateEvent::ActiveDetailsReady), 1);
    }

    #[test]
    fn test_external_header_details() {
        let f = fixture();
        let data = external_header(&sample_details(), &test_key());
        std::fs::write(f.dir.path().join("header.bin"), data).unwrap();
        let mut details = FirmwareDetails::default();

        f.ext.get_active_firmware_details(Some(&mut details)).unwrap();
        assert_eq!(details, sample_details());
    }

    #[test]
    fn test_external_header_details_without_device_key() {
        let dir = TempDir::new().unwrap();
        let config = ExtensionConfig {
            header_path: dir.path().join("header.bin"),
            ..Default::default()
        };
        let ext = UpdateExtension::new(&config).unwrap();
        let sink = Arc::new(RecordingSink::new());
        ext.init_api(sink.clone());
        std::fs::write(&config.header_path, external_header(&sample_details(), &test_key())).unwrap();
        let mut details = garbage_details();

        ext.get_active_firmware_details(Some(&mut details)).unwrap();
        assert_eq!(details, sample_details());
        assert_eq!(sink.events(), vec![UpdateEvent::ActiveDetailsReady]);
    }

    #[test]
    fn test_unrecognized_header_zeroes_output() {
        let f = fixture();
        let mut data = internal_header(&sample_details());
        data[4..8].copy_from_slice(&7u32.to_be_bytes());
        std::fs::write(f.dir.path().join("header.bin"), data).unwrap();
        let mut details = garbage_details();

        let result = f.ext.get_active_firmware_details(Some(&mut details));
        assert!(matches!(
            result,
            Err(UpdateError::Header(HeaderError::Unrecognized { version: 7, .. }))
        ));
        assert!(details.is_zeroed());
        assert_eq!(f.sink.events(), vec![UpdateEvent::ActiveDetailsReady]);
    }

    #[test]
    fn test_corrupt_header_never_partially_populated() {
        let f = fixture();
        let key = test_key();
        let mut data = external_header(&sample_details(), &key);
        data[EXTERNAL_PAYLOAD_HASH_OFFSET] ^= 0x01;
        std::fs::write(f.dir.path().join("header.bin"), data).unwrap();
        let mut details = garbage_details();

        assert!(f.ext.get_active_firmware_details(Some(&mut details)).is_err());
        assert!(details.is_zeroed());
    }

    #[test]
    fn test_one_event_per_details_call() {
        let f = fixture();
        std::fs::write(f.dir.path().join("header.bin"), internal_header(&sample_details())).unwrap();
        let mut details = FirmwareDetails::default();

        for _ in 0..3 {
            f.ext.get_active_firmware_details(Some(&mut details)).unwrap();
        }
        std::fs::remove_file(f.dir.path().join("header.bin")).unwrap();
        let _ = f.ext.get_active_firmware_details(Some(&mut details));

        assert_eq!(f.sink.count(UpdateEvent::ActiveDetailsReady), 4);
        assert_eq!(f.sink.events().len(), 4);
    }

    #[test]
    fn test_absent_output_is_invalid_parameter() {
        let f = fixture();
        assert!(matches!(
            f.ext.get_active_firmware_details(None),
            Err(UpdateError::InvalidParameter)
        ));
        assert!(matches!(
            f.ext.get_installer_details(None),
            Err(UpdateError::InvalidParameter)
        ));
        assert!(f.sink.events().is_empty());
    }

    #[test]
    fn test_installer_details_zeroed_and_notified() {
        let f = fixture();
        let mut details = InstallerDetails {
            layout: 5,
            ..Default::default()
        };
        f.ext.get_installer_details(Some(&mut details)).unwrap();
        assert_eq!(details, InstallerDetails::default());
        assert_eq!(f.sink.events(), vec![UpdateEvent::InstallerDetailsReady]);
    }

    #[test]
    fn test_activation_exit_zero_publishes_done() {
        let f = fixture();
        f.executor.queue_exit(0);

        let handle = f.ext.activate_image(ImageLocationId(2)).unwrap();
        assert_eq!(handle.location(), ImageLocationId(2));
        assert_eq!(handle.wait(), ActivationOutcome::Done);
        assert_eq!(f.sink.events(), vec![UpdateEvent::ActivationDone]);

        let executed = f.executor.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(
            executed[0].image_path(),
            f.dir.path().join("firmware").join("image_2.bin")
        );
        assert_eq!(executed[0].script(), std::path::Path::new("./activate_script"));
    }

    #[test]
    fn test_activation_exit_one_publishes_failed() {
        let f = fixture();
        f.executor.queue_exit(1);

        let handle = f.ext.activate_image(ImageLocationId(0)).unwrap();
        assert_eq!(handle.wait(), ActivationOutcome::Failed);
        assert_eq!(f.sink.events(), vec![UpdateEvent::ActivationFailed]);
    }

    #[test]
    fn test_activation_returns_before_event() {
        let f = fixture();
        let returned = Arc::new(AtomicBool::new(false));
        let early = Arc::new(AtomicUsize::new(0));
        {
            let returned = returned.clone();
            let early = early.clone();
            f.ext.init_api(Arc::new(move |event: UpdateEvent| {
                if event.is_activation_terminal() && !returned.load(Ordering::SeqCst) {
                    early.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        for i in 0..200 {
            returned.store(false, Ordering::SeqCst);
            let handle = f.ext.activate_image(ImageLocationId(i % 4)).unwrap();
            returned.store(true, Ordering::SeqCst);
            handle.wait();
        }
        assert_eq!(early.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_activation_event_after_settle_delay() {
        let dir = TempDir::new().unwrap();
        let config = ExtensionConfig {
            settle_delay_ms: 50,
            ..config(&dir)
        };
        let executor = Arc::new(MockExecutor::new());
        let resolver = StoragePathResolver::new(&config.firmware_dir, config.max_path_len);
        let ext = UpdateExtension::with_parts(&config, Arc::new(resolver), executor).unwrap();
        let (tx, rx) = mpsc::channel();
        ext.init_api(Arc::new(ChannelSink::new(tx)));

        let start = Instant::now();
        let _handle = ext.activate_image(ImageLocationId(1)).unwrap();
        assert_eq!(rx.recv().unwrap(), UpdateEvent::ActivationDone);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_resolution_failure_is_synchronous() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(MockExecutor::new());
        let ext =
            UpdateExtension::with_parts(&config(&dir), Arc::new(FailingResolver), executor.clone())
                .unwrap();
        let sink = Arc::new(RecordingSink::new());
        ext.init_api(sink.clone());

        let result = ext.activate_image(ImageLocationId(9));
        assert!(matches!(
            result,
            Err(UpdateError::Activation(ActivationError::PathResolution(_)))
        ));
        assert!(!ext.is_activation_in_flight());
        assert!(executor.executed().is_empty());
        std::thread::sleep(Duration::from_millis(20));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_command_too_long_is_synchronous() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let executor = Arc::new(MockExecutor::new());
        // Resolver accepts a longer path than the command buffer allows.
        let resolver = StoragePathResolver::new(&config.firmware_dir, 1024);
        let config = ExtensionConfig {
            max_path_len: 8,
            ..config
        };
        let ext = UpdateExtension::with_parts(&config, Arc::new(resolver), executor).unwrap();
        let sink = Arc::new(RecordingSink::new());
        ext.init_api(sink.clone());

        assert!(matches!(
            ext.activate_image(ImageLocationId(0)),
            Err(UpdateError::Activation(ActivationError::CommandTooLong { .. }))
        ));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_overlapping_activation_is_rejected() {
        let f = fixture();
        f.executor.hold();

        let first = f.ext.activate_image(ImageLocationId(0)).unwrap();
        assert!(f.ext.is_activation_in_flight());
        assert!(matches!(
            f.ext.activate_image(ImageLocationId(1)),
            Err(UpdateError::Activation(ActivationError::Busy))
        ));

        f.executor.release();
        assert_eq!(first.wait(), ActivationOutcome::Done);
        assert_eq!(f.sink.events(), vec![UpdateEvent::ActivationDone]);

        // The first worker kept its own location.
        let executed = f.executor.executed();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].image_path().ends_with("image_0.bin"));

        let second = f.ext.activate_image(ImageLocationId(1)).unwrap();
        assert_eq!(second.wait(), ActivationOutcome::Done);
        assert_eq!(f.sink.count(UpdateEvent::ActivationDone), 2);
    }

    #[test]
    fn test_activation_without_sink_still_completes() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(MockExecutor::new());
        let resolver = StoragePathResolver::new(dir.path(), 128);
        let ext = UpdateExtension::with_parts(&config(&dir), Arc::new(resolver), executor).unwrap();

        let handle = ext.activate_image(ImageLocationId(0)).unwrap();
        assert_eq!(handle.wait(), ActivationOutcome::Done);
        assert!(!ext.is_activation_in_flight());
    }

    #[test]
    fn test_sink_may_chain_activation() {
        let f = fixture();
        let ext = Arc::new(f.ext);
        let (tx, rx) = mpsc::channel();
        let chained = Arc::downgrade(&ext);
        let first = AtomicBool::new(true);
        ext.init_api(Arc::new(move |event: UpdateEvent| {
            if event == UpdateEvent::ActivationDone
                && first.swap(false, Ordering::SeqCst)
                && let Some(ext) = chained.upgrade()
            {
                let _ = tx.send(ext.activate_image(ImageLocationId(1)).map(|h| h.wait()).ok());
            }
        }));

        let handle = ext.activate_image(ImageLocationId(0)).unwrap();
        assert_eq!(handle.wait(), ActivationOutcome::Done);
        assert_eq!(rx.recv().unwrap(), Some(ActivationOutcome::Done));
    }
}
