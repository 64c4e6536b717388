//! Native bridge to the desktop companion
//!
//! Each request is an independent round trip through whatever transport the
//! platform offers (`chrome.runtime.sendNativeMessage`, a spawned host
//! process). The bridge is a convenience: failures flip the availability
//! flag and are reported as [`BridgeError::Unavailable`], never retried or
//! queued.

use std::cell::Cell;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::document::Document;

/// Requests understood by the companion host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NativeRequest {
    /// `{type: "getSettings"}` -> `{settings}`
    GetSettings,
    /// `{type: "saveSettings", settings}` -> acknowledgement
    SaveSettings { settings: Value },
}

/// Transport-level failure: host missing, crashed, or bad handshake.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Native host not found: {0}")]
    HostNotFound(String),
    #[error("Native host disconnected: {0}")]
    Disconnected(String),
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error type for bridge calls.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Native bridge unavailable: {0}")]
    Unavailable(#[from] TransportError),
    #[error("Invalid native response: {0}")]
    InvalidResponse(String),
}

/// One request/response exchange with a named host.
#[allow(async_fn_in_trait)]
pub trait NativeTransport {
    async fn exchange(&self, host: &str, request: &NativeRequest) -> Result<Value, TransportError>;
}

pub struct NativeBridge<T> {
    transport: T,
    host: String,
    available: Cell<bool>,
}

impl<T: NativeTransport> NativeBridge<T> {
    pub fn new(transport: T, config: &Config) -> Self {
        Self {
            transport,
            host: config.native_host.clone(),
            available: Cell::new(false),
        }
    }

    /// Whether the last round trip succeeded. False until the first one does.
    pub fn is_available(&self) -> bool {
        self.available.get()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn send(&self, request: &NativeRequest) -> Result<Value, BridgeError> {
        match self.transport.exchange(&self.host, request).await {
            Ok(response) => {
                self.available.set(true);
                Ok(response)
            }
            Err(e) => {
                self.available.set(false);
                log::debug!("Native host '{}' unavailable: {e}", self.host);
                Err(BridgeError::Unavailable(e))
            }
        }
    }

    /// Pull the host's document. `Ok(None)` if the host has none to offer.
    ///
    /// Only an object counts as a document; any other `settings` value is
    /// an invalid response and must not replace local settings.
    pub async fn get_settings(&self) -> Result<Option<Value>, BridgeError> {
        let response = self.send(&NativeRequest::GetSettings).await?;
        let mut map = match response {
            Value::Null => return Ok(None),
            Value::Object(map) => map,
            other => {
                return Err(BridgeError::InvalidResponse(format!(
                    "expected an object, got {other}"
                )))
            }
        };
        match map.remove("settings") {
            None | Some(Value::Null) => Ok(None),
            Some(settings @ Value::Object(_)) => Ok(Some(settings)),
            Some(other) => Err(BridgeError::InvalidResponse(format!(
                "settings is not a document: {other}"
            ))),
        }
    }

    /// Push a document to the host. The acknowledgement is ignored.
    pub async fn save_settings(&self, document: &Document) -> Result<(), BridgeError> {
        self.send(&NativeRequest::SaveSettings {
            settings: document.to_value(),
        })
        .await?;
        Ok(())
    }
}
