use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::host::{HostFile, HostWriter};
use crate::{HostIoError, HostIoErrorKind};

type HostResult<T> = std::result::Result<T, HostIoError>;

/// [`HostFile`] over a `std::fs::File`, for native tools and tests.
///
/// Unlike browser writables, writes go straight to the file; [`HostWriter::abort`] cannot roll
/// them back.
#[derive(Debug)]
pub struct StdHostFile {
    file: File,
    writable: bool,
}

impl StdHostFile {
    pub fn from_file(file: File, writable: bool) -> Self {
        Self { file, writable }
    }

    pub fn open_read_only(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::from_file(File::open(path)?, false))
    }

    pub fn open_read_write(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::from_file(file, true))
    }

    pub fn into_file(self) -> File {
        self.file
    }

    fn read_range_blocking(&mut self, start: u64, end: u64) -> io::Result<Vec<u8>> {
        let len = self.file.metadata()?.len();
        let start = start.min(len);
        let end = end.min(len).max(start);
        let mut out = Vec::with_capacity((end - start) as usize);
        self.file.seek(SeekFrom::Start(start))?;
        (&mut self.file).take(end - start).read_to_end(&mut out)?;
        Ok(out)
    }
}

impl HostFile for StdHostFile {
    type Writer = StdFileWriter;

    fn size(&mut self) -> impl Future<Output = HostResult<u64>> + '_ {
        async move {
            self.file
                .metadata()
                .map(|meta| meta.len())
                .map_err(|err| HostIoError::from_io("stat", &err))
        }
    }

    fn read_range(
        &mut self,
        start: u64,
        end: u64,
    ) -> impl Future<Output = HostResult<Vec<u8>>> + '_ {
        async move {
            self.read_range_blocking(start, end)
                .map_err(|err| HostIoError::from_io("slice read", &err))
        }
    }

    fn supports_write(&self) -> bool {
        self.writable
    }

    fn create_writable(&mut self) -> impl Future<Output = HostResult<StdFileWriter>> + '_ {
        async move {
            if !self.writable {
                return Err(HostIoError::new(
                    "create writable",
                    HostIoErrorKind::Unsupported,
                    "file was opened read-only",
                ));
            }
            let file = self
                .file
                .try_clone()
                .map_err(|err| HostIoError::from_io("create writable", &err))?;
            Ok(StdFileWriter { file, pos: 0 })
        }
    }
}

/// Writer for [`StdHostFile`].
#[derive(Debug)]
pub struct StdFileWriter {
    file: File,
    pos: u64,
}

impl HostWriter for StdFileWriter {
    fn seek(&mut self, offset: u64) -> impl Future<Output = HostResult<()>> + '_ {
        async move {
            self.pos = offset;
            Ok(())
        }
    }

    fn write<'a>(&'a mut self, data: &'a [u8]) -> impl Future<Output = HostResult<()>> + 'a {
        async move {
            self.file
                .seek(SeekFrom::Start(self.pos))
                .and_then(|_| self.file.write_all(data))
                .map_err(|err| HostIoError::from_io("write", &err))?;
            self.pos += data.len() as u64;
            Ok(())
        }
    }

    fn truncate(&mut self, size: u64) -> impl Future<Output = HostResult<()>> + '_ {
        async move {
            self.file
                .set_len(size)
                .map_err(|err| HostIoError::from_io("truncate", &err))?;
            self.pos = self.pos.min(size);
            Ok(())
        }
    }

    fn close(self) -> impl Future<Output = HostResult<()>> {
        async move {
            self.file
                .sync_data()
                .map_err(|err| HostIoError::from_io("close", &err))
        }
    }

    fn abort(self) {}
}
