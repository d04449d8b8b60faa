use serde::{Deserialize, Serialize};

use crate::device::DEFAULT_LOG2_SECTOR_SIZE;
use crate::{DeviceError, Result};

/// Smallest sector size accepted at construction (512 bytes).
pub const MIN_LOG2_SECTOR_SIZE: u32 = 9;
/// Largest sector size accepted at construction (64 KiB).
pub const MAX_LOG2_SECTOR_SIZE: u32 = 16;

/// Construction-time parameters for a [`crate::FileBackedSectorDevice`].
///
/// The engine may change the sector size later through
/// [`crate::SectorDevice::set_log2_sector_size`]; that path is not re-validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub log2_sector_size: u32,
    pub read_only: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            log2_sector_size: DEFAULT_LOG2_SECTOR_SIZE,
            read_only: true,
        }
    }
}

impl DeviceConfig {
    pub fn new(log2_sector_size: u32, read_only: bool) -> Self {
        Self {
            log2_sector_size,
            read_only,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_LOG2_SECTOR_SIZE..=MAX_LOG2_SECTOR_SIZE).contains(&self.log2_sector_size) {
            return Err(DeviceError::InvalidConfig(
                "log2_sector_size must be between 9 and 16",
            ));
        }
        Ok(())
    }
}
