use std::future::Future;

use tracing::{debug, info, warn};

use crate::host::{HostFile, ScopedWriter};
use crate::util::{align_up_u64, checked_range, sector_span, SectorSpan};
use crate::{DeviceConfig, DeviceError, HostIoError, HostIoErrorKind, Result, SectorDevice};

/// [`SectorDevice`] backed by a host file handle.
///
/// One device is created per opened image and lives as long as the engine session. The file
/// size is resolved once by [`FileBackedSectorDevice::initialize`]; until that succeeds every
/// read and write fails with [`DeviceError::NotReady`].
///
/// The addressable window is the file size rounded up to a whole sector (using the sector size
/// current at call time). Bytes between the end of the file and the end of the last sector read
/// back as zeros; writing them extends the file.
#[derive(Debug)]
pub struct FileBackedSectorDevice<H: HostFile> {
    handle: H,
    log2_sector_size: u32,
    read_only: bool,
    size_bytes: Option<u64>,
    sector_count: u64,
}

impl<H: HostFile> FileBackedSectorDevice<H> {
    /// Creates an uninitialized device. Fails on invalid configuration, or when a handle that
    /// cannot be written is opened read-write.
    pub fn new(handle: H, config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        if !config.read_only && !handle.supports_write() {
            return Err(DeviceError::WriteUnsupported);
        }
        Ok(Self {
            handle,
            log2_sector_size: config.log2_sector_size,
            read_only: config.read_only,
            size_bytes: None,
            sector_count: 0,
        })
    }

    /// Creates and initializes a device.
    ///
    /// Size resolution failures are logged and leave the device unusable rather than failing the
    /// call; check [`FileBackedSectorDevice::is_ready`] or use [`FileBackedSectorDevice::new`] +
    /// [`FileBackedSectorDevice::initialize`] to observe the error.
    pub async fn open(handle: H, config: DeviceConfig) -> Result<Self> {
        let mut device = Self::new(handle, config)?;
        if let Err(err) = device.initialize().await {
            warn!(error = %err, "failed to resolve image size; device is unusable");
        }
        Ok(device)
    }

    /// Resolves the file size and derives the sector count.
    pub async fn initialize(&mut self) -> Result<()> {
        self.size_bytes = None;
        self.sector_count = 0;

        let size_bytes = self.handle.size().await?;
        let sector_size = self.current_sector_size()?;
        let sector_count = size_bytes.div_ceil(sector_size);

        self.size_bytes = Some(size_bytes);
        self.sector_count = sector_count;
        info!(
            size_bytes,
            sector_count,
            log2_sector_size = self.log2_sector_size,
            read_only = self.read_only,
            "sector device initialized"
        );
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.size_bytes.is_some()
    }

    /// Size of the backing file, once resolved.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size_bytes
    }

    /// Bytes addressable through the device: the file size rounded up to a whole sector.
    pub fn capacity_bytes(&self) -> Result<u64> {
        let size_bytes = self.size_bytes.ok_or(DeviceError::NotReady)?;
        align_up_u64(size_bytes, self.current_sector_size()?)
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn into_inner(self) -> H {
        self.handle
    }

    fn current_sector_size(&self) -> Result<u64> {
        1u64.checked_shl(self.log2_sector_size)
            .ok_or(DeviceError::OffsetOverflow)
    }

    fn checked_span(&self, sector_address: u64, sectors_count: u64) -> Result<SectorSpan> {
        let capacity = self.capacity_bytes()?;
        let span = sector_span(sector_address, sectors_count, self.log2_sector_size)?;
        checked_range(span.offset, span.len, capacity)?;
        Ok(span)
    }

    fn required_len(buf_len: usize, span: SectorSpan) -> Result<usize> {
        let len = usize::try_from(span.len).map_err(|_| DeviceError::OffsetOverflow)?;
        if buf_len < len {
            return Err(DeviceError::BufferTooSmall {
                len: buf_len,
                required: span.len,
            });
        }
        Ok(len)
    }

    /// Reads `sectors_count` sectors into the front of `buf`, reporting host failures as
    /// [`DeviceError::HostIo`] instead of folding them into a status flag.
    pub async fn try_read_sectors(
        &mut self,
        buf: &mut [u8],
        sector_address: u64,
        sectors_count: u64,
    ) -> Result<()> {
        let span = self.checked_span(sector_address, sectors_count)?;
        let len = Self::required_len(buf.len(), span)?;
        let size_bytes = self.size_bytes.ok_or(DeviceError::NotReady)?;

        let dest = &mut buf[..len];
        let data_end = span.end().min(size_bytes);
        if span.offset >= data_end {
            dest.fill(0);
            return Ok(());
        }

        // One bulk slice for the whole run, not one per sector.
        let bytes = self.handle.read_range(span.offset, data_end).await?;
        let available = (data_end - span.offset) as usize;
        if bytes.len() != available {
            return Err(HostIoError::new(
                "slice read",
                HostIoErrorKind::Invalidated,
                format!("expected {available} bytes, got {}", bytes.len()),
            )
            .into());
        }
        dest[..available].copy_from_slice(&bytes);
        dest[available..].fill(0);
        Ok(())
    }

    /// Writes `sectors_count` sectors taken from the front of `buf`.
    pub async fn try_write_sectors(
        &mut self,
        buf: &[u8],
        sector_address: u64,
        sectors_count: u64,
    ) -> Result<()> {
        if self.read_only {
            return Err(DeviceError::ReadOnlyViolation);
        }
        let span = self.checked_span(sector_address, sectors_count)?;
        let len = Self::required_len(buf.len(), span)?;
        if len == 0 {
            return Ok(());
        }

        let mut writer = ScopedWriter::new(self.handle.create_writable().await?);
        writer.seek(span.offset).await?;
        writer.write(&buf[..len]).await?;
        writer.close().await?;

        if let Some(size_bytes) = self.size_bytes {
            if span.end() > size_bytes {
                debug!(
                    old_size = size_bytes,
                    new_size = span.end(),
                    "write extended the backing file"
                );
                self.size_bytes = Some(span.end());
            }
        }
        Ok(())
    }
}

impl<H: HostFile> SectorDevice for FileBackedSectorDevice<H> {
    fn read_sectors<'a>(
        &'a mut self,
        buf: &'a mut [u8],
        sector_address: u64,
        sectors_count: u64,
    ) -> impl Future<Output = Result<bool>> + 'a {
        async move {
            match self
                .try_read_sectors(buf, sector_address, sectors_count)
                .await
            {
                Ok(()) => Ok(true),
                Err(DeviceError::HostIo(err)) => {
                    warn!(sector_address, sectors_count, error = %err, "sector read failed");
                    Ok(false)
                }
                Err(err) => Err(err),
            }
        }
    }

    fn write_sectors<'a>(
        &'a mut self,
        buf: &'a [u8],
        sector_address: u64,
        sectors_count: u64,
    ) -> impl Future<Output = Result<bool>> + 'a {
        async move {
            match self
                .try_write_sectors(buf, sector_address, sectors_count)
                .await
            {
                Ok(()) => Ok(true),
                Err(DeviceError::HostIo(err)) => {
                    warn!(sector_address, sectors_count, error = %err, "sector write failed");
                    Ok(false)
                }
                Err(err) => Err(err),
            }
        }
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn log2_sector_size(&self) -> u32 {
        self.log2_sector_size
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn set_sector_count(&mut self, sector_count: u64) {
        debug!(
            from = self.sector_count,
            to = sector_count,
            "engine changed sector count"
        );
        self.sector_count = sector_count;
    }

    fn set_log2_sector_size(&mut self, log2_sector_size: u32) {
        debug!(
            from = self.log2_sector_size,
            to = log2_sector_size,
            "engine changed sector size"
        );
        self.log2_sector_size = log2_sector_size;
    }
}
