//! Installer details.
//!
//! Real installer metadata is not tracked yet; the details are always
//! reported as zero.

use std::fmt;

pub const INSTALLER_HASH_SIZE: usize = 32;

/// Identification of the installer (bootloader) that applies updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallerDetails {
    pub arm_hash: [u8; INSTALLER_HASH_SIZE],
    pub oem_hash: [u8; INSTALLER_HASH_SIZE],
    pub layout: u32,
}

impl InstallerDetails {
    /// Populate `out` with the current installer details.
    pub fn query(out: &mut InstallerDetails) {
        *out = InstallerDetails::default();
    }
}

impl fmt::Display for InstallerDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Installer:")?;
        writeln!(f, "  arm hash: {}", hex::encode(self.arm_hash))?;
        writeln!(f, "  oem hash: {}", hex::encode(self.oem_hash))?;
        write!(f, "  layout:   {}", self.layout)
    }
}
