//! Image location to filesystem path resolution.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Opaque identifier of a firmware storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageLocationId(pub u32);

impl fmt::Display for ImageLocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ImageLocationId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// For resolvers that serve a bounded set of locations.
    #[error("Unknown image location {0}")]
    UnknownLocation(ImageLocationId),
    #[error("Image path for location {location} exceeds {max} bytes ({actual})")]
    PathTooLong {
        location: ImageLocationId,
        max: usize,
        actual: usize,
    },
}

/// Maps a storage location to the path of its firmware image.
pub trait PathResolver: Send + Sync {
    fn resolve(&self, location: ImageLocationId) -> Result<PathBuf, ResolveError>;
}

/// Resolves `<firmware_dir>/image_<id>.bin`.
#[derive(Debug, Clone)]
pub struct StoragePathResolver {
    firmware_dir: PathBuf,
    max_path_len: usize,
}

impl StoragePathResolver {
    pub fn new(firmware_dir: impl Into<PathBuf>, max_path_len: usize) -> Self {
        Self {
            firmware_dir: firmware_dir.into(),
            max_path_len,
        }
    }
}

impl PathResolver for StoragePathResolver {
    fn resolve(&self, location: ImageLocationId) -> Result<PathBuf, ResolveError> {
        let path = self.firmware_dir.join(format!("image_{}.bin", location.0));
        let actual = path.as_os_str().len();
        if actual >= self.max_path_len {
            return Err(ResolveError::PathTooLong {
                location,
                max: self.max_path_len,
                actual,
            });
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_image_path() {
        let resolver = StoragePathResolver::new("/data/fw", 128);
        assert_eq!(
            resolver.resolve(ImageLocationId(1)).unwrap(),
            PathBuf::from("/data/fw/image_1.bin")
        );
    }

    #[test]
    fn test_resolve_length_boundary() {
        // "/fw/image_0.bin" is 15 bytes.
        assert!(StoragePathResolver::new("/fw", 16).resolve(ImageLocationId(0)).is_ok());
        assert_eq!(
            StoragePathResolver::new("/fw", 15).resolve(ImageLocationId(0)),
            Err(ResolveError::PathTooLong {
                location: ImageLocationId(0),
                max: 15,
                actual: 15
            })
        );
    }

    #[test]
    fn test_resolve_path_too_long() {
        let resolver = StoragePathResolver::new("/data/fw", 16);
        assert!(matches!(
            resolver.resolve(ImageLocationId(0)),
            Err(ResolveError::PathTooLong { max: 16, .. })
        ));
    }
}
