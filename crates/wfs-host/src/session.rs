//! One opened image: engine session, its serializer, and the operations the UI performs on it.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use futures_util::future::{FutureExt, LocalBoxFuture};
use tracing::{debug, info};
use wfs_device::{FileBackedSectorDevice, HostFile, HostWriter, ScopedWriter};

use crate::config::SessionConfig;
use crate::engine::{
    Engine, EngineDirectory, EngineFile, EngineFileStream, EngineSession, Entry, QuotaUsage,
};
use crate::key::KeySource;
use crate::listing::{sort_entries, ListedEntry};
use crate::reader::{ChunkedStreamReader, Pull};
use crate::serializer::AccessSerializer;
use crate::{Error, Result};

fn is_root(path: &str) -> bool {
    path.is_empty() || path == "/"
}

async fn resolve_directory<S: EngineSession>(session: &mut S, path: &str) -> Result<S::Directory> {
    if is_root(path) {
        return Ok(session.root_directory().await?);
    }
    session.entry(path).await?.into_directory(path)
}

async fn resolve_file<S: EngineSession>(session: &mut S, path: &str) -> Result<S::File> {
    session.entry(path).await?.into_file(path)
}

/// An opened image.
///
/// All engine work is funnelled through the session's [`AccessSerializer`]; the methods here
/// only enqueue jobs and can be called freely from concurrent UI tasks.
pub struct ImageSession<S: EngineSession> {
    session: Rc<RefCell<S>>,
    serializer: AccessSerializer,
    config: SessionConfig,
}

impl<S: EngineSession + 'static> ImageSession<S> {
    /// Builds the sector device over `image`, derives the key and registers both with the engine,
    /// all inside one serialized job.
    pub async fn open<E, H>(
        serializer: AccessSerializer,
        engine: Rc<E>,
        image: H,
        key: KeySource,
        config: SessionConfig,
    ) -> Result<Self>
    where
        E: Engine<Session<FileBackedSectorDevice<H>> = S> + 'static,
        H: HostFile + 'static,
    {
        let encryption = key.kind();
        let session = serializer
            .submit(move || async move {
                let mut device = FileBackedSectorDevice::new(image, config.device)?;
                device.initialize().await?;
                let key = key.resolve(&*engine)?;
                let session = engine.open(device, &key).await?;
                Ok::<_, Error>(session)
            })
            .await?;
        info!(?encryption, read_only = config.device.read_only, "image opened");

        Ok(Self {
            session: Rc::new(RefCell::new(session)),
            serializer,
            config,
        })
    }

    pub fn serializer(&self) -> &AccessSerializer {
        &self.serializer
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Queues `op` with exclusive access to the engine session.
    // The RefCell is only ever borrowed from serializer jobs, which never overlap.
    #[allow(clippy::await_holding_refcell_ref)]
    pub fn run<T, F>(&self, op: F) -> impl Future<Output = Result<T>> + 'static
    where
        T: 'static,
        F: for<'a> FnOnce(&'a mut S) -> LocalBoxFuture<'a, Result<T>> + 'static,
    {
        let session = Rc::clone(&self.session);
        self.serializer.submit(move || async move {
            let mut session = session.borrow_mut();
            op(&mut *session).await
        })
    }

    /// Lists a directory, directories first then by name.
    pub fn list_directory(&self, path: &str) -> impl Future<Output = Result<Vec<ListedEntry>>> {
        let path = path.to_owned();
        self.run(move |session| {
            async move {
                let mut dir = resolve_directory(session, &path).await?;
                let entries = dir.entries().await?;
                let mut rows: Vec<_> = entries.iter().map(ListedEntry::from_entry).collect();
                sort_entries(&mut rows);
                debug!(path = %path, entries = rows.len(), "listed directory");
                Ok(rows)
            }
            .boxed_local()
        })
    }

    pub fn entry_info(&self, path: &str) -> impl Future<Output = Result<ListedEntry>> {
        let path = path.to_owned();
        self.run(move |session| {
            async move {
                let entry = if is_root(&path) {
                    Entry::Directory(session.root_directory().await?)
                } else {
                    session.entry(&path).await?
                };
                Ok(ListedEntry::from_entry(&entry))
            }
            .boxed_local()
        })
    }

    /// Block accounting for the directory at `path`, if it is a quota root.
    pub fn quota_usage(&self, path: &str) -> impl Future<Output = Result<Option<QuotaUsage>>> {
        let path = path.to_owned();
        self.run(move |session| {
            async move {
                let mut dir = resolve_directory(session, &path).await?;
                Ok(dir.quota().await?)
            }
            .boxed_local()
        })
    }

    pub fn flush(&self) -> impl Future<Output = Result<()>> {
        self.run(|session| async move { Ok(session.flush().await?) }.boxed_local())
    }

    /// Reads a whole file into memory in one job. Meant for small files; use
    /// [`ImageSession::open_reader`] or [`ImageSession::extract_to`] for anything large.
    pub fn read_file(&self, path: &str) -> impl Future<Output = Result<Vec<u8>>> {
        let path = path.to_owned();
        self.run(move |session| {
            async move {
                let file = resolve_file(session, &path).await?;
                ChunkedStreamReader::from_file(&file)?.collect_all().await
            }
            .boxed_local()
        })
    }

    /// Streams a file into `writer` chunk by chunk and commits it. Returns the bytes written.
    ///
    /// The target is truncated first. On any failure the writer is aborted; for browser
    /// writables and [`wfs_device::MemHostFile`] that means nothing is committed. Writers that
    /// apply writes immediately (`StdHostFile`) keep whatever was written before the failure.
    pub fn extract_to<W>(&self, path: &str, writer: W) -> impl Future<Output = Result<u64>>
    where
        W: HostWriter + 'static,
    {
        let path = path.to_owned();
        let chunk_size = self.config.reader.chunk_size;
        self.run(move |session| {
            async move {
                if chunk_size == 0 {
                    return Err(Error::ZeroCapacity);
                }
                let file = resolve_file(session, &path).await?;
                let mut reader = ChunkedStreamReader::from_file(&file)?;
                let mut out = ScopedWriter::new(writer);
                out.truncate(0).await?;

                let len = usize::try_from(reader.total_size())
                    .map_or(chunk_size, |total| total.min(chunk_size))
                    .max(1);
                let mut buf = vec![0u8; len];
                let mut written = 0u64;
                while let Pull::Chunk(n) = reader.pull_into(&mut buf).await? {
                    out.write(&buf[..n]).await?;
                    written += n as u64;
                }
                out.close().await?;
                info!(path = %path, bytes = written, "file extracted");
                Ok(written)
            }
            .boxed_local()
        })
    }

    /// Opens a pull-based reader over a file. Each pull is a separate serializer job, so other
    /// operations can interleave between chunks.
    pub fn open_reader(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<SessionReader<<S::File as EngineFile>::Stream>>>
    where
        <S::File as EngineFile>::Stream: 'static,
    {
        let path = path.to_owned();
        let serializer = self.serializer.clone();
        let chunk_size = self.config.reader.chunk_size;
        let opened = self.run(move |session| {
            async move {
                let file = resolve_file(session, &path).await?;
                ChunkedStreamReader::from_file(&file)
            }
            .boxed_local()
        });
        async move {
            let reader = opened.await?;
            Ok(SessionReader {
                total_size: reader.total_size(),
                position: Rc::new(Cell::new(0)),
                reader: Rc::new(RefCell::new(reader)),
                serializer,
                chunk_size,
            })
        }
    }

    /// Flushes and closes the engine session.
    pub async fn close(self) -> Result<()> {
        let flushed = self.flush().await;
        let session = self.session;
        // Drop the session from inside a job so its teardown is serialized too.
        self.serializer.submit_detached(move || async move { drop(session) });
        flushed
    }
}

/// A [`ChunkedStreamReader`] driven through the session's serializer.
///
/// Dropping it queues the release of the engine handle.
pub struct SessionReader<R: EngineFileStream + 'static> {
    reader: Rc<RefCell<ChunkedStreamReader<R>>>,
    serializer: AccessSerializer,
    total_size: u64,
    position: Rc<Cell<u64>>,
    chunk_size: usize,
}

impl<R: EngineFileStream + 'static> SessionReader<R> {
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Bytes delivered so far.
    pub fn position(&self) -> u64 {
        self.position.get()
    }

    /// Next chunk using the configured chunk size. `None` marks the end.
    pub fn next_chunk(&self) -> impl Future<Output = Result<Option<Vec<u8>>>> {
        self.next_chunk_with_capacity(self.chunk_size)
    }

    #[allow(clippy::await_holding_refcell_ref)]
    pub fn next_chunk_with_capacity(
        &self,
        capacity: usize,
    ) -> impl Future<Output = Result<Option<Vec<u8>>>> {
        let reader = Rc::clone(&self.reader);
        let position = Rc::clone(&self.position);
        self.serializer.submit(move || async move {
            let mut reader = reader.borrow_mut();
            let chunk = reader.next_chunk(capacity).await;
            position.set(reader.position());
            chunk
        })
    }

    #[allow(clippy::await_holding_refcell_ref)]
    pub fn collect_all(self) -> impl Future<Output = Result<Vec<u8>>> {
        let reader = Rc::clone(&self.reader);
        let position = Rc::clone(&self.position);
        self.serializer.submit(move || async move {
            let mut reader = reader.borrow_mut();
            let bytes = reader.read_to_end().await;
            position.set(reader.position());
            bytes
        })
    }

    /// Releases the engine handle. Later pulls report the end of the sequence.
    pub fn cancel(&self) -> impl Future<Output = Result<()>> {
        let reader = Rc::clone(&self.reader);
        self.serializer.submit(move || async move {
            reader.borrow_mut().cancel();
            Ok::<_, Error>(())
        })
    }
}

impl<R: EngineFileStream + 'static> Drop for SessionReader<R> {
    fn drop(&mut self) {
        let reader = Rc::clone(&self.reader);
        self.serializer
            .submit_detached(move || async move { reader.borrow_mut().cancel() });
    }
}

impl<R: EngineFileStream + 'static> std::fmt::Debug for SessionReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionReader")
            .field("total_size", &self.total_size)
            .field("position", &self.position.get())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}
