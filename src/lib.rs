//! Host adapter layer for browsing WFS disk images in a browser.
//!
//! - [`device`]: sector-addressable block device over host file handles
//! - [`host`]: serialized engine access, streaming reads and image sessions
//!
//! The most commonly used types are re-exported at the crate root.

pub use wfs_device as device;
pub use wfs_host as host;

pub use wfs_device::{
    DeviceConfig, DeviceError, FileBackedSectorDevice, HostFile, HostIoError, HostWriter,
    MemHostFile, SectorDevice,
};
pub use wfs_host::{
    AccessSerializer, ChunkedStreamReader, DrainPolicy, EncryptionKind, Engine, Error,
    ImageSession, KeySource, ListedEntry, Pull, SerializerConfig, SessionConfig, SessionReader,
};
