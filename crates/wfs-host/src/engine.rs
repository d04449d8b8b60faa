//! Capability traits the filesystem engine is consumed through.
//!
//! The engine itself (directory structures, encryption, block allocation) is external. It is
//! single-threaded and not reentrant: every call into it, including calls on the handles it
//! returns, must be made from the [`crate::AccessSerializer`]'s current job.
//!
//! All async methods may suspend while the engine performs sector I/O against the registered
//! [`SectorDevice`].

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wfs_device::SectorDevice;

use crate::{Error, Result};

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Error codes reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineErrorKind {
    EntryNotFound,
    NotDirectory,
    NotFile,
    BlockBadHash,
    AreaHeaderCorrupted,
    DirectoryCorrupted,
    FreeBlocksAllocatorCorrupted,
    FileDataCorrupted,
    FileMetadataCorrupted,
    TransactionsAreaCorrupted,
    InvalidVersion,
    NoSpace,
    Other,
}

impl EngineErrorKind {
    pub fn description(self) -> &'static str {
        match self {
            EngineErrorKind::EntryNotFound => "entry not found",
            EngineErrorKind::NotDirectory => "not a directory",
            EngineErrorKind::NotFile => "not a file",
            EngineErrorKind::BlockBadHash => "block hash mismatch",
            EngineErrorKind::AreaHeaderCorrupted => "area header corrupted",
            EngineErrorKind::DirectoryCorrupted => "directory corrupted",
            EngineErrorKind::FreeBlocksAllocatorCorrupted => "free blocks allocator corrupted",
            EngineErrorKind::FileDataCorrupted => "file data corrupted",
            EngineErrorKind::FileMetadataCorrupted => "file metadata corrupted",
            EngineErrorKind::TransactionsAreaCorrupted => "transactions area corrupted",
            EngineErrorKind::InvalidVersion => "invalid or unsupported filesystem version",
            EngineErrorKind::NoSpace => "no space left",
            EngineErrorKind::Other => "engine failure",
        }
    }
}

/// Structural or cryptographic failure reported by the engine. Opaque to this layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<EngineErrorKind> for EngineError {
    fn from(kind: EngineErrorKind) -> Self {
        Self::new(kind, kind.description())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Link,
}

/// Attributes common to every entry. Timestamps are seconds since the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub name: String,
    pub owner: u32,
    pub group: u32,
    pub mode: u32,
    pub creation_time: u32,
    pub modification_time: u32,
}

/// Block accounting for a quota directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub block_size: u32,
    pub blocks_count: u32,
    pub free_blocks: u32,
}

impl QuotaUsage {
    pub fn total_bytes(&self) -> u64 {
        u64::from(self.block_size) * u64::from(self.blocks_count)
    }

    pub fn free_bytes(&self) -> u64 {
        u64::from(self.block_size) * u64::from(self.free_blocks)
    }
}

/// An entry returned by the engine, tagged by kind.
///
/// Callers match on the variant (or use [`Entry::into_file`] / [`Entry::into_directory`])
/// instead of probing the handle's runtime type.
#[derive(Debug, Clone)]
pub enum Entry<F, D> {
    File(F),
    Directory(D),
    Link(EntryMetadata),
}

impl<F: EngineFile, D: EngineDirectory> Entry<F, D> {
    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::File(_) => EntryKind::File,
            Entry::Directory(_) => EntryKind::Directory,
            Entry::Link(_) => EntryKind::Link,
        }
    }

    pub fn metadata(&self) -> &EntryMetadata {
        match self {
            Entry::File(file) => file.metadata(),
            Entry::Directory(dir) => dir.metadata(),
            Entry::Link(meta) => meta,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    /// `path` is only used for the error message.
    pub fn into_file(self, path: &str) -> Result<F> {
        match self {
            Entry::File(file) => Ok(file),
            _ => Err(Error::NotAFile {
                path: path.to_owned(),
            }),
        }
    }

    /// `path` is only used for the error message.
    pub fn into_directory(self, path: &str) -> Result<D> {
        match self {
            Entry::Directory(dir) => Ok(dir),
            _ => Err(Error::NotADirectory {
                path: path.to_owned(),
            }),
        }
    }
}

/// Entry point of the engine: device registration and key derivation.
pub trait Engine {
    /// An opened filesystem. It owns the device it was opened on.
    type Session<D: SectorDevice + 'static>: EngineSession;

    /// Registers `device` and opens the filesystem on it. `key` is empty for plain images.
    fn open<D: SectorDevice + 'static>(
        &self,
        device: D,
        key: &[u8],
    ) -> impl Future<Output = EngineResult<Self::Session<D>>>;

    fn mlc_key_from_otp(&self, otp: &[u8]) -> EngineResult<Vec<u8>>;

    fn usb_key(&self, otp: &[u8], seeprom: &[u8]) -> EngineResult<Vec<u8>>;
}

/// An opened image.
pub trait EngineSession {
    type File: EngineFile;
    type Directory: EngineDirectory<File = Self::File>;

    fn root_directory(&mut self) -> impl Future<Output = EngineResult<Self::Directory>> + '_;

    /// Resolves an absolute path (`/` is the root directory).
    fn entry<'a>(
        &'a mut self,
        path: &'a str,
    ) -> impl Future<Output = EngineResult<Entry<Self::File, Self::Directory>>> + 'a;

    fn flush(&mut self) -> impl Future<Output = EngineResult<()>> + '_;
}

pub trait EngineDirectory: Sized {
    type File: EngineFile;

    fn metadata(&self) -> &EntryMetadata;

    fn entries(&mut self) -> impl Future<Output = EngineResult<Vec<Entry<Self::File, Self>>>> + '_;

    fn entry<'a>(
        &'a mut self,
        name: &'a str,
    ) -> impl Future<Output = EngineResult<Entry<Self::File, Self>>> + 'a;

    /// Block accounting if this directory is a quota root.
    fn quota(&mut self) -> impl Future<Output = EngineResult<Option<QuotaUsage>>> + '_;
}

pub trait EngineFile {
    type Stream: EngineFileStream;

    fn metadata(&self) -> &EntryMetadata;
    fn size(&self) -> u64;
    fn size_on_disk(&self) -> u64;
    fn is_encrypted(&self) -> bool;

    /// Opens a read cursor positioned at offset 0.
    fn open_stream(&self) -> EngineResult<Self::Stream>;
}

/// The engine's chunked read cursor.
pub trait EngineFileStream {
    fn seek(&mut self, position: u64) -> impl Future<Output = EngineResult<()>> + '_;

    /// Reads up to `len` bytes from the current position, handing them to `sink`. The engine may
    /// deliver fewer bytes than requested (truncated file) and may call `sink` more than once.
    fn read<'a>(
        &'a mut self,
        len: usize,
        sink: &'a mut dyn FnMut(&[u8]),
    ) -> impl Future<Output = EngineResult<()>> + 'a;

    /// Releases the engine-side handle.
    fn release(self);
}
