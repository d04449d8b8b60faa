//! Sector-addressable block device for a filesystem engine, backed by host file handles.
//!
//! The filesystem engine only understands sectors: it asks for `count` sectors starting at a
//! sector address and expects the bytes to land in a buffer it owns. Browser file APIs are
//! byte-addressed and asynchronous. This crate bridges the two:
//!
//! - [`SectorDevice`]: the contract the engine drives
//! - [`FileBackedSectorDevice`]: adapts a [`HostFile`] to that contract
//! - [`HostFile`] / [`HostWriter`]: the host runtime's random-access file primitives
//! - [`MemHostFile`]: in-memory handle with browser-like writable semantics
//!
//! Browser handles (`File`, `FileSystemFileHandle`) live in [`platform`] on `wasm32`; native
//! builds get a `std::fs::File` handle instead.

mod config;
mod device;
mod error;
mod file_device;
pub mod host;
pub mod platform;
mod util;

pub use config::{DeviceConfig, MAX_LOG2_SECTOR_SIZE, MIN_LOG2_SECTOR_SIZE};
pub use device::{SectorDevice, DEFAULT_LOG2_SECTOR_SIZE};
pub use error::{DeviceError, HostIoError, HostIoErrorKind, Result};
pub use file_device::FileBackedSectorDevice;
pub use host::{read_all, HostFile, HostWriter, MemHostFile, NoWriter, ScopedWriter};
pub use util::{align_up_u64, checked_range, sector_span, SectorSpan};

#[cfg(not(target_arch = "wasm32"))]
pub use platform::native::{StdFileWriter, StdHostFile};

#[cfg(test)]
mod proptests;
