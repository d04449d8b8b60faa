//! Host-side plumbing around a single-threaded, non-reentrant filesystem engine.
//!
//! The engine parses the image; this crate decides *when* it may run and how its results reach
//! the UI:
//!
//! - [`AccessSerializer`]: FIFO queue guaranteeing at most one engine operation in flight
//! - [`ChunkedStreamReader`]: bounded-memory, pull-based reads over the engine's chunked file
//!   read primitive
//! - [`ImageSession`]: one opened image (device + engine session + serializer)
//! - [`engine`]: the capability traits the engine is consumed through
//!
//! Everything here is single-threaded (`Rc`, `RefCell`); concurrency means independent async
//! operations interleaving on one event loop.

mod config;
pub mod engine;
mod error;
pub mod key;
pub mod listing;
pub mod picker;
mod reader;
mod serializer;
pub mod session;

#[cfg(target_arch = "wasm32")]
mod spawn;

pub use config::{ReaderConfig, SessionConfig, DEFAULT_CHUNK_SIZE};
pub use engine::{
    Engine, EngineDirectory, EngineError, EngineErrorKind, EngineFile, EngineFileStream,
    EngineSession, Entry, EntryKind, EntryMetadata, QuotaUsage,
};
pub use error::{Error, Result};
pub use key::{EncryptionKind, KeySource};
pub use listing::ListedEntry;
pub use reader::{ChunkedStreamReader, Pull};
pub use serializer::{AccessSerializer, DrainPolicy, SerializerConfig, SerializerError};
pub use session::{ImageSession, SessionReader};

#[cfg(target_arch = "wasm32")]
pub use spawn::WasmSpawner;
