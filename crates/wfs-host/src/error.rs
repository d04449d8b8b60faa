use thiserror::Error;
use wfs_device::{DeviceError, HostIoError};

use crate::engine::EngineError;
use crate::serializer::SerializerError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the UI layer.
///
/// Engine failures are passed through untouched so the UI can show the engine's own message.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Host(#[from] HostIoError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("operation cancelled by the user")]
    UserCancelled,

    #[error("missing key material: {0}")]
    MissingKeyMaterial(&'static str),

    #[error("`{path}` is not a directory")]
    NotADirectory { path: String },

    #[error("`{path}` is not a file")]
    NotAFile { path: String },

    #[error(transparent)]
    Serializer(#[from] SerializerError),

    #[error("read capacity must be greater than zero")]
    ZeroCapacity,

    #[error("unable to allocate {requested} bytes")]
    AllocationFailed { requested: u64 },

    #[error("not supported: {0}")]
    Unsupported(String),
}
