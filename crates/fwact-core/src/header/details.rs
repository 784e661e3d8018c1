//! Firmware details and the header descriptor used for format dispatch.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use super::constants::*;

/// Details of the active firmware, as recorded in its metadata header.
///
/// `Default` is the all-zero record reported on every failure path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareDetails {
    pub version: u64,
    pub size: u64,
    pub hash: [u8; HASH_SIZE],
    pub campaign: [u8; CAMPAIGN_ID_SIZE],
    pub signature_size: u32,
}

impl Default for FirmwareDetails {
    fn default() -> Self {
        Self {
            version: 0,
            size: 0,
            hash: [0; HASH_SIZE],
            campaign: [0; CAMPAIGN_ID_SIZE],
            signature_size: 0,
        }
    }
}

impl FirmwareDetails {
    pub fn is_zeroed(&self) -> bool {
        *self == Self::default()
    }

    /// Reset every field to zero.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for FirmwareDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Active firmware:")?;
        writeln!(f, "  version:        {}", self.version)?;
        writeln!(f, "  size:           {} bytes", self.size)?;
        writeln!(f, "  hash:           {}", hex::encode(self.hash))?;
        writeln!(f, "  campaign:       {}", hex::encode(self.campaign))?;
        write!(f, "  signature size: {}", self.signature_size)
    }
}

/// Leading identification of a header buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderDescriptor {
    pub magic: u32,
    pub version: u32,
    /// Number of bytes actually read from the header file.
    pub length: usize,
}

/// Header encodings this crate can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFormat {
    Internal,
    External,
}

impl fmt::Display for HeaderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderFormat::Internal => write!(f, "internal v2"),
            HeaderFormat::External => write!(f, "external v2"),
        }
    }
}

impl HeaderDescriptor {
    /// Read magic and version from the first bytes of `data`.
    pub fn read(data: &[u8]) -> Option<Self> {
        if data.len() < DESCRIPTOR_SIZE {
            return None;
        }
        Some(Self {
            magic: BigEndian::read_u32(&data[0..4]),
            version: BigEndian::read_u32(&data[4..8]),
            length: data.len(),
        })
    }

    /// Match the exact (magic, version, size) triple of a known encoding.
    pub fn classify(&self) -> Option<HeaderFormat> {
        match (self.magic, self.version, self.length) {
            (INTERNAL_HEADER_MAGIC_V2, INTERNAL_HEADER_VERSION_V2, INTERNAL_HEADER_SIZE_V2) => {
                Some(HeaderFormat::Internal)
            }
            (EXTERNAL_HEADER_MAGIC_V2, EXTERNAL_HEADER_VERSION_V2, EXTERNAL_HEADER_SIZE_V2) => {
                Some(HeaderFormat::External)
            }
            _ => None,
        }
    }
}
