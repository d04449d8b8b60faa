use futures_util::task::{LocalFutureObj, LocalSpawn, SpawnError};

use crate::serializer::{AccessSerializer, SerializerConfig};

/// Runs local tasks on the browser event loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct WasmSpawner;

impl LocalSpawn for WasmSpawner {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}

impl AccessSerializer {
    /// Serializer whose drain task runs on the browser event loop.
    pub fn on_event_loop(config: SerializerConfig) -> Self {
        Self::with_config(WasmSpawner, config)
    }
}
