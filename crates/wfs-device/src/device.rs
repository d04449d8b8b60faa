use std::future::Future;

use crate::Result;

/// 512-byte sectors.
pub const DEFAULT_LOG2_SECTOR_SIZE: u32 = 9;

/// Storage interface the filesystem engine drives.
///
/// Sector size is `1 << log2_sector_size()` and may be changed by the engine while it probes the
/// image format, so implementations must derive byte offsets from the *current* value on every
/// call.
///
/// `read_sectors`/`write_sectors` return:
/// - `Ok(true)` when the transfer completed
/// - `Ok(false)` when the host rejected the I/O (the engine treats this as a recoverable failure)
/// - `Err(_)` for bounds and usage errors (`OutOfRange`, `ReadOnlyViolation`, `NotReady`, ...)
pub trait SectorDevice {
    fn read_sectors<'a>(
        &'a mut self,
        buf: &'a mut [u8],
        sector_address: u64,
        sectors_count: u64,
    ) -> impl Future<Output = Result<bool>> + 'a;

    fn write_sectors<'a>(
        &'a mut self,
        buf: &'a [u8],
        sector_address: u64,
        sectors_count: u64,
    ) -> impl Future<Output = Result<bool>> + 'a;

    fn sector_count(&self) -> u64;
    fn log2_sector_size(&self) -> u32;
    fn is_read_only(&self) -> bool;

    /// Engine-driven resize. Previously issued addresses are not re-validated.
    fn set_sector_count(&mut self, sector_count: u64);

    /// Engine-driven sector size change (format detection).
    fn set_log2_sector_size(&mut self, log2_sector_size: u32);

    /// Current sector size in bytes, or 0 if the engine set an exponent that does not fit.
    fn sector_size(&self) -> u64 {
        1u64.checked_shl(self.log2_sector_size()).unwrap_or(0)
    }
}
