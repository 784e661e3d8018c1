//! Active firmware metadata header.

pub mod codec;
pub mod constants;
pub mod details;
pub mod loader;

pub use codec::{CodecError, DeviceKey, decode_external_v2, decode_internal_v2};
pub use details::{FirmwareDetails, HeaderDescriptor, HeaderFormat};
pub use loader::{HeaderError, HeaderLoader, decode_header};
