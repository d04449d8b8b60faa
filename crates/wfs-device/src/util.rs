use crate::{DeviceError, Result};

pub fn align_up_u64(value: u64, alignment: u64) -> Result<u64> {
    if alignment == 0 {
        return Err(DeviceError::OffsetOverflow);
    }
    let rem = value % alignment;
    if rem == 0 {
        return Ok(value);
    }
    value
        .checked_add(alignment - rem)
        .ok_or(DeviceError::OffsetOverflow)
}

pub fn checked_range(offset: u64, len: u64, capacity: u64) -> Result<()> {
    let end = offset
        .checked_add(len)
        .ok_or(DeviceError::OffsetOverflow)?;
    if end > capacity {
        return Err(DeviceError::OutOfRange {
            offset,
            len,
            capacity,
        });
    }
    Ok(())
}

/// Byte range covered by a run of sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorSpan {
    pub offset: u64,
    pub len: u64,
}

impl SectorSpan {
    pub fn end(&self) -> u64 {
        // `sector_span` already rejected spans whose end overflows.
        self.offset + self.len
    }
}

/// Converts `(sector_address, sectors_count)` into a byte span for the given sector size.
pub fn sector_span(
    sector_address: u64,
    sectors_count: u64,
    log2_sector_size: u32,
) -> Result<SectorSpan> {
    let sector_size = 1u64
        .checked_shl(log2_sector_size)
        .ok_or(DeviceError::OffsetOverflow)?;
    let offset = sector_address
        .checked_mul(sector_size)
        .ok_or(DeviceError::OffsetOverflow)?;
    let len = sectors_count
        .checked_mul(sector_size)
        .ok_or(DeviceError::OffsetOverflow)?;
    offset.checked_add(len).ok_or(DeviceError::OffsetOverflow)?;
    Ok(SectorSpan { offset, len })
}
