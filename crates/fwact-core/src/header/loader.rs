//! Active header loading and format validation.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, error, warn};

use super::codec::{CodecError, DeviceKey, decode_external_v2, decode_internal_v2};
use super::constants::MAX_HEADER_SIZE;
use super::details::{FirmwareDetails, HeaderDescriptor, HeaderFormat};

#[derive(Error, Debug)]
pub enum HeaderError {
    /// No update has completed yet, so there is no header to report.
    #[error("No image header at {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read image header {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unrecognized firmware header: magic = 0x{magic:08X}, version = 0x{version:08X}, size = {size}")]
    Unrecognized { magic: u32, version: u32, size: usize },

    #[error("Header decode failed: {0}")]
    Codec(#[from] CodecError),
}

/// Reads the active firmware header file and decodes it.
#[derive(Debug, Clone)]
pub struct HeaderLoader {
    path: PathBuf,
    device_key: Option<DeviceKey>,
}

impl HeaderLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            device_key: None,
        }
    }

    pub fn with_device_key(mut self, key: Option<DeviceKey>) -> Self {
        self.device_key = key;
        self
    }

    /// Load and decode the active header.
    ///
    /// The returned details are either fully decoded or absent; no partially
    /// populated record ever escapes.
    pub fn load(&self) -> Result<FirmwareDetails, HeaderError> {
        let buf = self.read_header()?;
        decode_header(&buf, self.device_key.as_ref())
    }

    fn read_header(&self) -> Result<Vec<u8>, HeaderError> {
        let file = File::open(&self.path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), "No image header (no update processed yet)");
                HeaderError::NotFound {
                    path: self.path.clone(),
                }
            } else {
                error!(path = %self.path.display(), error = %e, "Failed to open image header");
                HeaderError::Io {
                    path: self.path.clone(),
                    source: e,
                }
            }
        })?;

        let mut buf = Vec::with_capacity(MAX_HEADER_SIZE);
        file.take(MAX_HEADER_SIZE as u64)
            .read_to_end(&mut buf)
            .map_err(|e| {
                error!(path = %self.path.display(), error = %e, "Failed to read image header");
                HeaderError::Io {
                    path: self.path.clone(),
                    source: e,
                }
            })?;

        debug!(path = %self.path.display(), bytes = buf.len(), "Read image header");
        Ok(buf)
    }
}

/// Classify `buf` by its (magic, version, size) triple and decode it.
pub fn decode_header(
    buf: &[u8],
    device_key: Option<&DeviceKey>,
) -> Result<FirmwareDetails, HeaderError> {
    let Some(descriptor) = HeaderDescriptor::read(buf) else {
        error!(size = buf.len(), "Image header too short to identify");
        return Err(HeaderError::Unrecognized {
            magic: 0,
            version: 0,
            size: buf.len(),
        });
    };

    let result = match descriptor.classify() {
        Some(HeaderFormat::Internal) => decode_internal_v2(buf),
        Some(HeaderFormat::External) => decode_external_v2(buf, device_key),
        None => {
            error!(
                magic = %format!("0x{:08X}", descriptor.magic),
                version = %format!("0x{:08X}", descriptor.version),
                size = descriptor.length,
                "Unrecognized firmware header"
            );
            return Err(HeaderError::Unrecognized {
                magic: descriptor.magic,
                version: descriptor.version,
                size: descriptor.length,
            });
        }
    };

    result.map_err(|e| {
        error!(error = %e, "Failed to decode image header");
        HeaderError::Codec(e)
    })
}
