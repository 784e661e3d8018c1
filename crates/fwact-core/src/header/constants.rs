//! Firmware metadata header v2 constants.
//!
//! All multi-byte fields are big-endian.

// ============================================================================
// Internal Header (written by the bootloader next to the active image)
// ============================================================================

pub const INTERNAL_HEADER_MAGIC_V2: u32 = 0x5A51_B3D4;
pub const INTERNAL_HEADER_VERSION_V2: u32 = 2;
pub const INTERNAL_HEADER_SIZE_V2: usize = 112;

pub const INTERNAL_FIRMWARE_VERSION_OFFSET: usize = 8;
pub const INTERNAL_FIRMWARE_SIZE_OFFSET: usize = 16;
pub const INTERNAL_FIRMWARE_HASH_OFFSET: usize = 24;
pub const INTERNAL_CAMPAIGN_OFFSET: usize = 88;
pub const INTERNAL_SIGNATURE_SIZE_OFFSET: usize = 104;
/// CRC-32 over bytes `0..INTERNAL_CRC_OFFSET`.
pub const INTERNAL_CRC_OFFSET: usize = 108;

// ============================================================================
// External Header (stored alongside downloaded images)
// ============================================================================

pub const EXTERNAL_HEADER_MAGIC_V2: u32 = 0x5A51_B3D4;
pub const EXTERNAL_HEADER_VERSION_V2: u32 = 2;
pub const EXTERNAL_HEADER_SIZE_V2: usize = 296;

pub const EXTERNAL_FIRMWARE_VERSION_OFFSET: usize = 8;
pub const EXTERNAL_FIRMWARE_SIZE_OFFSET: usize = 16;
pub const EXTERNAL_FIRMWARE_HASH_OFFSET: usize = 24;
pub const EXTERNAL_PAYLOAD_SIZE_OFFSET: usize = 88;
pub const EXTERNAL_PAYLOAD_HASH_OFFSET: usize = 96;
pub const EXTERNAL_CAMPAIGN_OFFSET: usize = 160;
pub const EXTERNAL_TRANSFORM_MODE_OFFSET: usize = 176;
pub const EXTERNAL_CIPHER_IV_OFFSET: usize = 180;
pub const EXTERNAL_CIPHER_KEY_OFFSET: usize = 196;
pub const EXTERNAL_SIGNATURE_SIZE_OFFSET: usize = 256;
/// HMAC-SHA256 over bytes `0..EXTERNAL_HMAC_OFFSET`.
pub const EXTERNAL_HMAC_OFFSET: usize = 264;

// ============================================================================
// Field Sizes
// ============================================================================

/// Hash fields are sized for SHA-512; SHA-256 digests are zero padded.
pub const HASH_SIZE: usize = 64;
pub const CAMPAIGN_ID_SIZE: usize = 16;
pub const CIPHER_IV_SIZE: usize = 16;
pub const CIPHER_KEY_SIZE: usize = 32;
pub const HMAC_SIZE: usize = 32;
pub const DEVICE_KEY_SIZE: usize = 32;

/// Magic + version.
pub const DESCRIPTOR_SIZE: usize = 8;

/// Read buffer for the active header: the larger of the two encodings.
pub const MAX_HEADER_SIZE: usize = if EXTERNAL_HEADER_SIZE_V2 > INTERNAL_HEADER_SIZE_V2 {
    EXTERNAL_HEADER_SIZE_V2
} else {
    INTERNAL_HEADER_SIZE_V2
};
