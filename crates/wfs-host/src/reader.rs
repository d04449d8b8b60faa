use futures_util::stream::{self, Stream};
use tracing::{debug, trace};

use crate::engine::{EngineFile, EngineFileStream};
use crate::{Error, Result};

/// Outcome of a single pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    /// This many bytes were written to the front of the caller's buffer.
    Chunk(usize),
    End,
}

/// Pull-based reader over an engine file stream.
///
/// Each pull seeks the engine cursor to the current position and reads at most the caller's
/// capacity, so memory use is bounded by the buffer the consumer supplies. The reader is
/// single-pass: once the end is reached (or the reader is cancelled) the engine handle is
/// released and cannot be re-read. The handle is released exactly once, on whichever of end of
/// data, error, cancellation, or drop happens first.
///
/// Every method that touches the engine must run inside an
/// [`AccessSerializer`](crate::AccessSerializer) job.
pub struct ChunkedStreamReader<S: EngineFileStream> {
    stream: Option<S>,
    total_size: u64,
    position: u64,
    exhausted: bool,
}

impl<S: EngineFileStream> ChunkedStreamReader<S> {
    pub fn new(stream: S, total_size: u64) -> Self {
        Self {
            stream: Some(stream),
            total_size,
            position: 0,
            exhausted: false,
        }
    }

    /// Opens a fresh engine cursor over `file`, positioned at offset 0.
    pub fn from_file<F>(file: &F) -> Result<Self>
    where
        F: EngineFile<Stream = S>,
    {
        let stream = file.open_stream()?;
        Ok(Self::new(stream, file.size()))
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn remaining(&self) -> u64 {
        if self.exhausted {
            0
        } else {
            self.total_size.saturating_sub(self.position)
        }
    }

    /// No further bytes will be delivered.
    pub fn is_finished(&self) -> bool {
        self.stream.is_none() || self.remaining() == 0
    }

    /// Fills the front of `buf` with the next chunk.
    pub async fn pull_into(&mut self, buf: &mut [u8]) -> Result<Pull> {
        if buf.is_empty() {
            return Err(Error::ZeroCapacity);
        }
        if self.remaining() == 0 {
            self.release();
            return Ok(Pull::End);
        }
        let to_read = usize::try_from(self.remaining()).map_or(buf.len(), |r| r.min(buf.len()));
        let target = &mut buf[..to_read];
        let position = self.position;

        let Some(stream) = self.stream.as_mut() else {
            self.exhausted = true;
            return Ok(Pull::End);
        };

        let mut filled = 0usize;
        let outcome = match stream.seek(position).await {
            Ok(()) => {
                let mut sink = |bytes: &[u8]| {
                    let n = bytes.len().min(target.len() - filled);
                    target[filled..filled + n].copy_from_slice(&bytes[..n]);
                    filled += n;
                };
                stream.read(to_read, &mut sink).await
            }
            Err(err) => Err(err),
        };

        if let Err(err) = outcome {
            debug!(position, error = %err, "engine read failed; releasing stream");
            self.exhausted = true;
            self.release();
            return Err(err.into());
        }

        self.position += filled as u64;
        trace!(position = self.position, filled, to_read, "pulled chunk");

        if filled < to_read {
            debug!(
                position = self.position,
                expected = self.total_size,
                "short engine read; treating stream as truncated"
            );
            self.exhausted = true;
        }
        if filled == 0 {
            self.release();
            return Ok(Pull::End);
        }
        Ok(Pull::Chunk(filled))
    }

    /// Reads the next chunk of at most `capacity` bytes into a new buffer. `None` marks the end.
    pub async fn next_chunk(&mut self, capacity: usize) -> Result<Option<Vec<u8>>> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        let size = usize::try_from(self.remaining()).map_or(capacity, |r| r.min(capacity));
        let mut buf = vec![0u8; size.max(1)];
        match self.pull_into(&mut buf).await? {
            Pull::Chunk(n) => {
                buf.truncate(n);
                Ok(Some(buf))
            }
            Pull::End => Ok(None),
        }
    }

    /// Abandons the sequence, releasing the engine handle if it is still held.
    pub fn cancel(&mut self) {
        self.exhausted = true;
        self.release();
    }

    /// Reads everything that is left into one buffer and releases the engine handle.
    pub async fn collect_all(mut self) -> Result<Vec<u8>> {
        self.read_to_end().await
    }

    /// Like [`ChunkedStreamReader::collect_all`], without consuming the reader.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let remaining = self.remaining();
        let len = usize::try_from(remaining).map_err(|_| Error::AllocationFailed {
            requested: remaining,
        })?;
        let mut out = Vec::new();
        out.try_reserve_exact(len)
            .map_err(|_| Error::AllocationFailed {
                requested: remaining,
            })?;
        out.resize(len, 0);

        let mut filled = 0;
        while filled < len {
            match self.pull_into(&mut out[filled..]).await? {
                Pull::Chunk(n) => filled += n,
                Pull::End => break,
            }
        }
        out.truncate(filled);
        self.release();
        Ok(out)
    }

    /// Adapts the reader into a `Stream` of chunks of at most `chunk_size` bytes. The stream ends
    /// after the first error.
    pub fn into_stream(self, chunk_size: usize) -> impl Stream<Item = Result<Vec<u8>>> {
        stream::unfold(Some(self), move |state| async move {
            let mut reader = state?;
            match reader.next_chunk(chunk_size).await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(reader))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            trace!(position = self.position, "releasing engine file stream");
            stream.release();
        }
    }
}

impl<S: EngineFileStream> Drop for ChunkedStreamReader<S> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<S: EngineFileStream> std::fmt::Debug for ChunkedStreamReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedStreamReader")
            .field("total_size", &self.total_size)
            .field("position", &self.position)
            .field("exhausted", &self.exhausted)
            .field("released", &self.stream.is_none())
            .finish()
    }
}
