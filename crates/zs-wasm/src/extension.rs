//! Extension-API backends supplied by the JS shell as callbacks.
//!
//! The shell wraps `chrome.storage` and `chrome.runtime.sendNativeMessage`
//! in plain functions returning promises, so this crate never binds to the
//! `chrome` namespace itself.

use js_sys::{Function, Promise};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use zs_core::storage::Origin;
use zs_core::{NativeRequest, NativeTransport, Storage, StorageError, TransportError};

use crate::{from_json, to_json};

/// Best-effort text of a thrown value or rejection reason.
pub fn describe(error: &JsValue) -> String {
    if let Some(error) = error.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    error
        .as_string()
        .or_else(|| js_sys::JSON::stringify(error).ok().and_then(|text| text.as_string()))
        .unwrap_or_else(|| "unknown JavaScript error".to_string())
}

/// Await whatever a callback returned; plain values resolve immediately.
async fn settle(returned: JsValue) -> Result<JsValue, JsValue> {
    JsFuture::from(Promise::resolve(&returned)).await
}

/// One storage area.
///
/// `get(key)` resolves to the stored value (or `undefined`);
/// `set(key, value)` resolves once the value is persisted.
pub struct JsStorage {
    get: Function,
    set: Function,
}

impl JsStorage {
    pub fn new(get: Function, set: Function) -> Self {
        Self { get, set }
    }
}

fn unavailable(error: JsValue) -> StorageError {
    StorageError::Unavailable(describe(&error))
}

impl Storage for JsStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let returned = self
            .get
            .call1(&JsValue::NULL, &JsValue::from_str(key))
            .map_err(unavailable)?;
        let value = settle(returned).await.map_err(unavailable)?;
        to_json(&value).map_err(unavailable)
    }

    // chrome.storage cannot tag writers; every write reaches listeners as
    // an untagged change
    async fn set(&self, key: &str, value: Value, _origin: Origin) -> Result<(), StorageError> {
        let value = from_json(&value).map_err(unavailable)?;
        let returned = self
            .set
            .call2(&JsValue::NULL, &JsValue::from_str(key), &value)
            .map_err(unavailable)?;
        settle(returned).await.map_err(unavailable)?;
        Ok(())
    }
}

/// `send(host, message)` resolves to the host's response, and rejects
/// when the host is missing or disconnects.
pub struct JsTransport {
    send: Function,
}

impl JsTransport {
    pub fn new(send: Function) -> Self {
        Self { send }
    }
}

impl NativeTransport for JsTransport {
    async fn exchange(&self, host: &str, request: &NativeRequest) -> Result<Value, TransportError> {
        let message = serde_json::to_value(request).map_err(|e| TransportError::Handshake(e.to_string()))?;
        let message = from_json(&message).map_err(|e| TransportError::Handshake(describe(&e)))?;

        let returned = self
            .send
            .call2(&JsValue::NULL, &JsValue::from_str(host), &message)
            .map_err(|e| TransportError::Disconnected(describe(&e)))?;
        let response = settle(returned)
            .await
            .map_err(|e| TransportError::Disconnected(describe(&e)))?;

        let response = to_json(&response).map_err(|e| TransportError::Handshake(describe(&e)))?;
        Ok(response.unwrap_or(Value::Null))
    }
}
