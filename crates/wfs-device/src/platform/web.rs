//! Browser file handles.
//!
//! - [`WebFile`]: immutable `File`/`Blob` snapshot (drag-and-drop, `<input type=file>`)
//! - [`WebFileHandle`]: live `FileSystemFileHandle` from the File System Access API; writes go
//!   through `createWritable({ keepExistingData: true })`

use std::future::Future;

use js_sys::{Promise, Uint8Array};
use tracing::debug;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    Blob, DomException, File, FileSystemCreateWritableOptions, FileSystemFileHandle,
    FileSystemWritableFileStream,
};

use crate::host::{HostFile, HostWriter, NoWriter};
use crate::{HostIoError, HostIoErrorKind};

type HostResult<T> = std::result::Result<T, HostIoError>;

const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991; // 2^53 - 1

/// Converts a rejected promise / thrown value into a [`HostIoError`].
pub fn host_error_from_js(operation: &'static str, err: JsValue) -> HostIoError {
    if let Some(ex) = err.dyn_ref::<DomException>() {
        let kind = HostIoError::kind_from_dom_name(&ex.name());
        return HostIoError::new(operation, kind, format!("{}: {}", ex.name(), ex.message()));
    }
    let message = err
        .as_string()
        .unwrap_or_else(|| format!("{err:?}"));
    HostIoError::other(operation, message)
}

fn u64_to_f64_checked(operation: &'static str, value: u64) -> HostResult<f64> {
    if value > MAX_SAFE_INTEGER {
        return Err(HostIoError::new(
            operation,
            HostIoErrorKind::Unsupported,
            format!("offset {value} exceeds JS MAX_SAFE_INTEGER ({MAX_SAFE_INTEGER})"),
        ));
    }
    Ok(value as f64)
}

fn f64_to_u64_checked(operation: &'static str, value: f64) -> HostResult<u64> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(HostIoError::other(
            operation,
            format!("invalid numeric value {value}"),
        ));
    }
    Ok(value as u64)
}

async fn await_promise(operation: &'static str, promise: Promise) -> HostResult<JsValue> {
    JsFuture::from(promise)
        .await
        .map_err(|err| host_error_from_js(operation, err))
}

async fn read_blob_range(blob: &Blob, start: u64, end: u64) -> HostResult<Vec<u8>> {
    let slice = blob
        .slice_with_f64_and_f64(
            u64_to_f64_checked("slice read", start)?,
            u64_to_f64_checked("slice read", end)?,
        )
        .map_err(|err| host_error_from_js("slice read", err))?;
    let buffer = await_promise("slice read", slice.array_buffer()).await?;
    Ok(Uint8Array::new(&buffer).to_vec())
}

/// Immutable snapshot of a browser `File`.
#[derive(Debug, Clone)]
pub struct WebFile {
    file: File,
}

impl WebFile {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl HostFile for WebFile {
    type Writer = NoWriter;

    fn size(&mut self) -> impl Future<Output = HostResult<u64>> + '_ {
        async move { f64_to_u64_checked("stat", self.file.size()) }
    }

    fn read_range(
        &mut self,
        start: u64,
        end: u64,
    ) -> impl Future<Output = HostResult<Vec<u8>>> + '_ {
        async move { read_blob_range(&self.file, start, end).await }
    }

    fn supports_write(&self) -> bool {
        false
    }

    fn create_writable(&mut self) -> impl Future<Output = HostResult<NoWriter>> + '_ {
        async move {
            Err(HostIoError::new(
                "create writable",
                HostIoErrorKind::Unsupported,
                "File snapshots cannot be written; use a FileSystemFileHandle",
            ))
        }
    }
}

/// Live `FileSystemFileHandle`.
///
/// Every read re-materializes the handle's `File`, so writes made through
/// [`WebFileHandle::create_writable`] are visible to later reads.
#[derive(Debug, Clone)]
pub struct WebFileHandle {
    handle: FileSystemFileHandle,
    writable: bool,
}

impl WebFileHandle {
    pub fn new(handle: FileSystemFileHandle, writable: bool) -> Self {
        Self { handle, writable }
    }

    async fn current_file(&self) -> HostResult<File> {
        let file = await_promise("get file", self.handle.get_file()).await?;
        file.dyn_into::<File>()
            .map_err(|err| host_error_from_js("get file", err.into()))
    }
}

impl HostFile for WebFileHandle {
    type Writer = WebWritable;

    fn size(&mut self) -> impl Future<Output = HostResult<u64>> + '_ {
        async move {
            let file = self.current_file().await?;
            f64_to_u64_checked("stat", file.size())
        }
    }

    fn read_range(
        &mut self,
        start: u64,
        end: u64,
    ) -> impl Future<Output = HostResult<Vec<u8>>> + '_ {
        async move {
            let file = self.current_file().await?;
            read_blob_range(&file, start, end).await
        }
    }

    fn supports_write(&self) -> bool {
        self.writable
    }

    fn create_writable(&mut self) -> impl Future<Output = HostResult<WebWritable>> + '_ {
        async move {
            let options = FileSystemCreateWritableOptions::new();
            options.set_keep_existing_data(true);
            let stream = await_promise(
                "create writable",
                self.handle.create_writable_with_options(&options),
            )
            .await?;
            let stream = stream
                .dyn_into::<FileSystemWritableFileStream>()
                .map_err(|err| host_error_from_js("create writable", err.into()))?;
            Ok(WebWritable { stream })
        }
    }
}

/// `FileSystemWritableFileStream` wrapper. Writes land in a swap file that is committed on
/// close and discarded on abort.
#[derive(Debug)]
pub struct WebWritable {
    stream: FileSystemWritableFileStream,
}

impl HostWriter for WebWritable {
    fn seek(&mut self, offset: u64) -> impl Future<Output = HostResult<()>> + '_ {
        async move {
            let promise = self
                .stream
                .seek_with_f64(u64_to_f64_checked("seek", offset)?)
                .map_err(|err| host_error_from_js("seek", err))?;
            await_promise("seek", promise).await?;
            Ok(())
        }
    }

    fn write<'a>(&'a mut self, data: &'a [u8]) -> impl Future<Output = HostResult<()>> + 'a {
        async move {
            let chunk = Uint8Array::from(data);
            let promise = self
                .stream
                .write_with_buffer_source(&chunk)
                .map_err(|err| host_error_from_js("write", err))?;
            await_promise("write", promise).await?;
            Ok(())
        }
    }

    fn truncate(&mut self, size: u64) -> impl Future<Output = HostResult<()>> + '_ {
        async move {
            let promise = self
                .stream
                .truncate_with_f64(u64_to_f64_checked("truncate", size)?)
                .map_err(|err| host_error_from_js("truncate", err))?;
            await_promise("truncate", promise).await?;
            Ok(())
        }
    }

    fn close(self) -> impl Future<Output = HostResult<()>> {
        async move {
            await_promise("close", self.stream.close()).await?;
            Ok(())
        }
    }

    fn abort(self) {
        let promise = self.stream.abort();
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(err) = await_promise("abort", promise).await {
                debug!(error = %err, "discarding writable failed");
            }
        });
    }
}
