//! Decoders for the internal and external v2 header encodings.

use byteorder::{BigEndian, ByteOrder};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use super::constants::*;
use super::details::FirmwareDetails;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Header CRC mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    Checksum { expected: u32, actual: u32 },
    #[error("External header HMAC verification failed")]
    Authentication,
}

/// Device secret used to authenticate external headers.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceKey([u8; DEVICE_KEY_SIZE]);

impl DeviceKey {
    pub fn new(bytes: [u8; DEVICE_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a 64 character hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; DEVICE_KEY_SIZE];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; DEVICE_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeviceKey(..)")
    }
}

fn check_len(data: &[u8], expected: usize) -> Result<(), CodecError> {
    if data.len() < expected {
        return Err(CodecError::BufferTooSmall {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn copy_array<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    out
}

/// Decode an internal v2 header.
///
/// The trailing CRC-32 must match the preceding bytes.
pub fn decode_internal_v2(data: &[u8]) -> Result<FirmwareDetails, CodecError> {
    check_len(data, INTERNAL_HEADER_SIZE_V2)?;

    let expected = BigEndian::read_u32(&data[INTERNAL_CRC_OFFSET..]);
    let actual = crc32fast::hash(&data[..INTERNAL_CRC_OFFSET]);
    if expected != actual {
        return Err(CodecError::Checksum { expected, actual });
    }

    Ok(FirmwareDetails {
        version: BigEndian::read_u64(&data[INTERNAL_FIRMWARE_VERSION_OFFSET..]),
        size: BigEndian::read_u64(&data[INTERNAL_FIRMWARE_SIZE_OFFSET..]),
        hash: copy_array(data, INTERNAL_FIRMWARE_HASH_OFFSET),
        campaign: copy_array(data, INTERNAL_CAMPAIGN_OFFSET),
        signature_size: BigEndian::read_u32(&data[INTERNAL_SIGNATURE_SIZE_OFFSET..]),
    })
}

/// Decode an external v2 header.
///
/// The trailing HMAC is only checked when a `key` is given.
pub fn decode_external_v2(
    data: &[u8],
    key: Option<&DeviceKey>,
) -> Result<FirmwareDetails, CodecError> {
    check_len(data, EXTERNAL_HEADER_SIZE_V2)?;

    if let Some(key) = key {
        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
            .map_err(|_| CodecError::Authentication)?;
        mac.update(&data[..EXTERNAL_HMAC_OFFSET]);
        mac.verify_slice(&data[EXTERNAL_HMAC_OFFSET..EXTERNAL_HMAC_OFFSET + HMAC_SIZE])
            .map_err(|_| CodecError::Authentication)?;
    }

    Ok(FirmwareDetails {
        version: BigEndian::read_u64(&data[EXTERNAL_FIRMWARE_VERSION_OFFSET..]),
        size: BigEndian::read_u64(&data[EXTERNAL_FIRMWARE_SIZE_OFFSET..]),
        hash: copy_array(data, EXTERNAL_FIRMWARE_HASH_OFFSET),
        campaign: copy_array(data, EXTERNAL_CAMPAIGN_OFFSET),
        signature_size: BigEndian::read_u32(&data[EXTERNAL_SIGNATURE_SIZE_OFFSET..]),
    })
}
