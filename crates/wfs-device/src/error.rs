use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors surfaced by [`crate::FileBackedSectorDevice`] and the sector math helpers.
///
/// Host file failures ([`DeviceError::HostIo`]) never reach the engine: the device converts them
/// into a `false` status at the [`crate::SectorDevice`] boundary. The remaining variants are
/// bounds and usage errors the engine is expected to understand.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device is not ready (file size has not been resolved)")]
    NotReady,

    #[error("out of range: offset={offset} len={len} capacity={capacity}")]
    OutOfRange { offset: u64, len: u64, capacity: u64 },

    #[error("integer overflow while computing byte offsets")]
    OffsetOverflow,

    #[error("write attempted on a read-only device")]
    ReadOnlyViolation,

    #[error("buffer too small: len={len} required={required}")]
    BufferTooSmall { len: usize, required: u64 },

    #[error("handle does not support writes")]
    WriteUnsupported,

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    HostIo(#[from] HostIoError),
}

/// Broad classification of a host file API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostIoErrorKind {
    AccessDenied,
    NotFound,
    /// The handle went stale (file modified or removed behind our back).
    Invalidated,
    Unsupported,
    Other,
}

/// A rejected host file operation.
///
/// Carries a human-readable message rather than the original exception value so browser
/// (`JsValue`) and native (`std::io::Error`) failures share one type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct HostIoError {
    pub operation: &'static str,
    pub kind: HostIoErrorKind,
    pub message: String,
}

impl HostIoError {
    pub fn new(operation: &'static str, kind: HostIoErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }

    pub fn other(operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(operation, HostIoErrorKind::Other, message)
    }

    /// Maps a DOM exception name (`NotAllowedError`, `NotFoundError`, ...) onto a kind.
    ///
    /// See <https://webidl.spec.whatwg.org/#idl-DOMException-error-names>.
    pub fn kind_from_dom_name(name: &str) -> HostIoErrorKind {
        match name {
            "NotAllowedError" | "SecurityError" => HostIoErrorKind::AccessDenied,
            "NotFoundError" => HostIoErrorKind::NotFound,
            "NotReadableError" | "InvalidStateError" | "InvalidModificationError" => {
                HostIoErrorKind::Invalidated
            }
            "NotSupportedError" | "TypeMismatchError" => HostIoErrorKind::Unsupported,
            _ => HostIoErrorKind::Other,
        }
    }

    pub(crate) fn from_io(operation: &'static str, err: &std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::PermissionDenied => HostIoErrorKind::AccessDenied,
            std::io::ErrorKind::NotFound => HostIoErrorKind::NotFound,
            std::io::ErrorKind::Unsupported => HostIoErrorKind::Unsupported,
            _ => HostIoErrorKind::Other,
        };
        Self::new(operation, kind, err.to_string())
    }
}
