//! Host runtime file primitives consumed by [`crate::FileBackedSectorDevice`].
//!
//! These mirror what browsers offer:
//! - a `File`/`Blob` snapshot that can be sliced and materialized asynchronously
//! - a live `FileSystemFileHandle` that can additionally open a writable stream
//!   (`seek` + `write`, committed on `close`, discarded on `abort`)

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use crate::{HostIoError, HostIoErrorKind};

type HostResult<T> = std::result::Result<T, HostIoError>;

/// Random-access file handle provided by the host runtime.
pub trait HostFile {
    type Writer: HostWriter;

    /// Current file size in bytes.
    fn size(&mut self) -> impl Future<Output = HostResult<u64>> + '_;

    /// Materializes bytes `start..end` in one bulk operation.
    ///
    /// Like `Blob.slice`, a range running past the end of the file is clamped, so the result may
    /// be shorter than requested.
    fn read_range(&mut self, start: u64, end: u64)
        -> impl Future<Output = HostResult<Vec<u8>>> + '_;

    fn supports_write(&self) -> bool;

    /// Opens a scoped writable resource that keeps the existing file contents.
    fn create_writable(&mut self) -> impl Future<Output = HostResult<Self::Writer>> + '_;
}

/// Writable resource obtained from [`HostFile::create_writable`].
pub trait HostWriter {
    fn seek(&mut self, offset: u64) -> impl Future<Output = HostResult<()>> + '_;

    fn write<'a>(&'a mut self, data: &'a [u8]) -> impl Future<Output = HostResult<()>> + 'a;

    /// Resizes the pending file contents to `size` bytes. The position is clamped to the new end.
    fn truncate(&mut self, size: u64) -> impl Future<Output = HostResult<()>> + '_;

    /// Commits everything written so far and releases the resource.
    fn close(self) -> impl Future<Output = HostResult<()>>;

    /// Discards uncommitted writes. Best effort; must not block.
    fn abort(self);
}

/// Writer type for handles that can never be written (immutable snapshots).
///
/// It cannot be constructed outside this crate; every method reports `Unsupported`.
#[derive(Debug)]
pub struct NoWriter {
    _private: (),
}

fn write_unsupported() -> HostIoError {
    HostIoError::new(
        "write",
        HostIoErrorKind::Unsupported,
        "snapshot handles cannot be written",
    )
}

impl HostWriter for NoWriter {
    fn seek(&mut self, _offset: u64) -> impl Future<Output = HostResult<()>> + '_ {
        async move { Err(write_unsupported()) }
    }

    fn write<'a>(&'a mut self, _data: &'a [u8]) -> impl Future<Output = HostResult<()>> + 'a {
        async move { Err(write_unsupported()) }
    }

    fn truncate(&mut self, _size: u64) -> impl Future<Output = HostResult<()>> + '_ {
        async move { Err(write_unsupported()) }
    }

    fn close(self) -> impl Future<Output = HostResult<()>> {
        async move { Err(write_unsupported()) }
    }

    fn abort(self) {}
}

/// Owns a [`HostWriter`] for the duration of one write.
///
/// [`ScopedWriter::close`] commits. Dropping an unclosed scope (error path, cancelled future)
/// aborts the writer, so an open writable is never leaked.
#[derive(Debug)]
pub struct ScopedWriter<W: HostWriter> {
    writer: Option<W>,
}

impl<W: HostWriter> ScopedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    fn writer_mut(&mut self) -> HostResult<&mut W> {
        self.writer.as_mut().ok_or_else(|| {
            HostIoError::new("write", HostIoErrorKind::Invalidated, "writer is closed")
        })
    }

    pub async fn seek(&mut self, offset: u64) -> HostResult<()> {
        self.writer_mut()?.seek(offset).await
    }

    pub async fn write(&mut self, data: &[u8]) -> HostResult<()> {
        self.writer_mut()?.write(data).await
    }

    pub async fn truncate(&mut self, size: u64) -> HostResult<()> {
        self.writer_mut()?.truncate(size).await
    }

    pub async fn close(mut self) -> HostResult<()> {
        match self.writer.take() {
            Some(writer) => writer.close().await,
            None => Ok(()),
        }
    }

    pub fn abort(mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

impl<W: HostWriter> Drop for ScopedWriter<W> {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

/// Reads an entire host file into memory.
pub async fn read_all<H: HostFile>(handle: &mut H) -> HostResult<Vec<u8>> {
    let size = handle.size().await?;
    let bytes = handle.read_range(0, size).await?;
    if bytes.len() as u64 != size {
        return Err(HostIoError::new(
            "read",
            HostIoErrorKind::Invalidated,
            format!("expected {size} bytes, got {}", bytes.len()),
        ));
    }
    Ok(bytes)
}

/// In-memory [`HostFile`].
///
/// Clones share the same bytes. Writers stage a private copy that only becomes visible on
/// [`HostWriter::close`], matching how browsers commit `FileSystemWritableFileStream` swap files.
#[derive(Debug, Clone)]
pub struct MemHostFile {
    data: Rc<RefCell<Vec<u8>>>,
    writable: bool,
}

impl MemHostFile {
    /// Immutable handle, like a `File` obtained from an `<input type=file>`.
    pub fn snapshot(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Rc::new(RefCell::new(bytes.into())),
            writable: false,
        }
    }

    /// Live handle, like a `FileSystemFileHandle` with write permission.
    pub fn writable(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Rc::new(RefCell::new(bytes.into())),
            writable: true,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }

    pub fn len(&self) -> u64 {
        self.data.borrow().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.borrow().is_empty()
    }
}

impl HostFile for MemHostFile {
    type Writer = MemWriter;

    fn size(&mut self) -> impl Future<Output = HostResult<u64>> + '_ {
        async move { Ok(self.len()) }
    }

    fn read_range(
        &mut self,
        start: u64,
        end: u64,
    ) -> impl Future<Output = HostResult<Vec<u8>>> + '_ {
        async move {
            let data = self.data.borrow();
            let len = data.len() as u64;
            let start = start.min(len) as usize;
            let end = end.min(len).max(start as u64) as usize;
            Ok(data[start..end].to_vec())
        }
    }

    fn supports_write(&self) -> bool {
        self.writable
    }

    fn create_writable(&mut self) -> impl Future<Output = HostResult<MemWriter>> + '_ {
        async move {
            if !self.writable {
                return Err(HostIoError {
                    operation: "create writable",
                    ..write_unsupported()
                });
            }
            Ok(MemWriter {
                target: Rc::clone(&self.data),
                staged: self.data.borrow().clone(),
                pos: 0,
            })
        }
    }
}

/// Writer for [`MemHostFile`].
#[derive(Debug)]
pub struct MemWriter {
    target: Rc<RefCell<Vec<u8>>>,
    staged: Vec<u8>,
    pos: u64,
}

impl HostWriter for MemWriter {
    fn seek(&mut self, offset: u64) -> impl Future<Output = HostResult<()>> + '_ {
        async move {
            self.pos = offset;
            Ok(())
        }
    }

    fn write<'a>(&'a mut self, data: &'a [u8]) -> impl Future<Output = HostResult<()>> + 'a {
        async move {
            let start = usize::try_from(self.pos)
                .map_err(|_| HostIoError::other("write", "offset does not fit in memory"))?;
            let end = start
                .checked_add(data.len())
                .ok_or_else(|| HostIoError::other("write", "offset overflow"))?;
            if end > self.staged.len() {
                self.staged.resize(end, 0);
            }
            self.staged[start..end].copy_from_slice(data);
            self.pos = end as u64;
            Ok(())
        }
    }

    fn truncate(&mut self, size: u64) -> impl Future<Output = HostResult<()>> + '_ {
        async move {
            let len = usize::try_from(size)
                .map_err(|_| HostIoError::other("truncate", "size does not fit in memory"))?;
            self.staged.resize(len, 0);
            self.pos = self.pos.min(size);
            Ok(())
        }
    }

    fn close(self) -> impl Future<Output = HostResult<()>> {
        async move {
            *self.target.borrow_mut() = self.staged;
            Ok(())
        }
    }

    fn abort(self) {}
}
