//! Browser file pickers (File System Access API).
//!
//! The pickers themselves only exist on `wasm32`; DOM error classification is shared so it can be
//! tested natively.

use wfs_device::HostIoError;

use crate::Error;

/// Maps a DOM exception raised by a picker or handle call onto [`Error`].
///
/// The user dismissing a picker surfaces as `AbortError` and becomes [`Error::UserCancelled`];
/// everything else is a host I/O failure.
pub fn classify_dom_error(operation: &'static str, name: &str, message: &str) -> Error {
    if name == "AbortError" {
        return Error::UserCancelled;
    }
    Error::Host(HostIoError::new(
        operation,
        HostIoError::kind_from_dom_name(name),
        format!("{name}: {message}"),
    ))
}

#[cfg(target_arch = "wasm32")]
pub use browser::{is_file_system_access_supported, pick_image_file, pick_save_target};

#[cfg(target_arch = "wasm32")]
mod browser {
    use js_sys::{Array, Function, Object, Promise, Reflect};
    use wasm_bindgen::{JsCast, JsValue};
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{DomException, FileSystemFileHandle};
    use wfs_device::platform::web::{host_error_from_js, WebFileHandle};

    use super::classify_dom_error;
    use crate::{Error, Result};

    fn js_error(operation: &'static str, err: JsValue) -> Error {
        if let Some(ex) = err.dyn_ref::<DomException>() {
            return classify_dom_error(operation, &ex.name(), &ex.message());
        }
        Error::Host(host_error_from_js(operation, err))
    }

    fn set(options: &Object, key: &str, value: &JsValue) -> Result<()> {
        Reflect::set(options, &JsValue::from_str(key), value)
            .map(|_| ())
            .map_err(|err| js_error("build picker options", err))
    }

    pub fn is_file_system_access_supported() -> bool {
        web_sys::window()
            .and_then(|window| Reflect::has(&window, &JsValue::from_str("showOpenFilePicker")).ok())
            .unwrap_or(false)
    }

    async fn call_picker(method: &'static str, options: &Object) -> Result<JsValue> {
        let window = web_sys::window().ok_or_else(|| Error::Unsupported("no window".into()))?;
        let func = Reflect::get(&window, &JsValue::from_str(method))
            .map_err(|err| js_error(method, err))?
            .dyn_into::<Function>()
            .map_err(|_| Error::Unsupported(format!("{method} is not available")))?;
        let promise = func
            .call1(&window, options)
            .map_err(|err| js_error(method, err))?
            .dyn_into::<Promise>()
            .map_err(|_| Error::Unsupported(format!("{method} did not return a promise")))?;
        JsFuture::from(promise)
            .await
            .map_err(|err| js_error(method, err))
    }

    /// Asks the user for an image file. `writable` requests `readwrite` permission.
    pub async fn pick_image_file(writable: bool) -> Result<WebFileHandle> {
        let options = Object::new();
        set(&options, "multiple", &JsValue::FALSE)?;
        if writable {
            set(&options, "mode", &JsValue::from_str("readwrite"))?;
        }
        let picked = call_picker("showOpenFilePicker", &options).await?;
        let handle = picked
            .dyn_into::<Array>()
            .ok()
            .map(|handles| handles.get(0))
            .and_then(|first| first.dyn_into::<FileSystemFileHandle>().ok())
            .ok_or(Error::UserCancelled)?;
        Ok(WebFileHandle::new(handle, writable))
    }

    /// Asks the user where to save an extracted file.
    pub async fn pick_save_target(suggested_name: &str) -> Result<WebFileHandle> {
        let options = Object::new();
        set(&options, "suggestedName", &JsValue::from_str(suggested_name))?;
        let handle = call_picker("showSaveFilePicker", &options)
            .await?
            .dyn_into::<FileSystemFileHandle>()
            .map_err(|_| Error::Unsupported("save picker returned no file handle".into()))?;
        Ok(WebFileHandle::new(handle, true))
    }
}
