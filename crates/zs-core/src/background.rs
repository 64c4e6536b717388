//! Background coordinator
//!
//! Lives in the extension's background context: upgrades the stored
//! document at install/startup, reconciles it with the companion host,
//! mirrors every change back to the host, and answers the UI's runtime
//! messages. All bridge traffic is best-effort.

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::bridge::{BridgeError, NativeBridge, NativeTransport};
use crate::distributor::{ChangeDistributor, ChangeEvent, ListenerId};
use crate::document::Document;
use crate::repository::SettingsRepository;
use crate::storage::{Origin, Storage, StorageError};

/// Result of a reconciliation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The host's document was merged and persisted
    Synced(Document),
    /// The host answered without a document
    NoSettings,
    /// The host could not be reached; local settings are untouched
    Unavailable,
}

/// Messages from the extension UI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuntimeMessage {
    GetDefaults,
    NativeStatus,
    SyncFromNative,
}

/// Replies to [`RuntimeMessage`]s.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuntimeResponse {
    Defaults {
        defaults: Document,
    },
    NativeStatus {
        #[serde(rename = "nativeMessagingAvailable")]
        native_messaging_available: bool,
    },
    Sync {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Boxed push future handed to the platform's local executor.
pub type PushTask = Pin<Box<dyn Future<Output = ()>>>;

pub struct Background<S, T> {
    repository: SettingsRepository<S>,
    bridge: NativeBridge<T>,
}

impl<S: Storage, T: NativeTransport> Background<S, T> {
    pub fn new(repository: SettingsRepository<S>, bridge: NativeBridge<T>) -> Self {
        Self { repository, bridge }
    }

    pub fn repository(&self) -> &SettingsRepository<S> {
        &self.repository
    }

    pub fn bridge(&self) -> &NativeBridge<T> {
        &self.bridge
    }

    /// Persist the defaults on first run, or the upgraded document otherwise.
    pub async fn ensure_defaults(&self) -> Result<Document, StorageError> {
        let stored = self.repository.read_stored().await?;
        let value = match stored {
            Some(value) => value,
            None => self.repository.schema().defaults().to_value(),
        };
        self.repository.replace(&value, Origin::Local).await
    }

    /// Pull the host's document and adopt it.
    pub async fn sync_from_native(&self) -> Result<SyncOutcome, StorageError> {
        let settings = match self.bridge.get_settings().await {
            Ok(Some(settings)) => settings,
            Ok(None) => return Ok(SyncOutcome::NoSettings),
            Err(e @ BridgeError::InvalidResponse(_)) => {
                log::warn!("Ignoring native settings: {e}");
                return Ok(SyncOutcome::NoSettings);
            }
            Err(e) => {
                log::debug!("Native sync skipped: {e}");
                return Ok(SyncOutcome::Unavailable);
            }
        };

        let document = self.repository.replace(&settings, Origin::Native).await?;
        log::info!("Adopted settings from native host");
        Ok(SyncOutcome::Synced(document))
    }

    /// Install/startup sequence: upgrade in place, then reconcile.
    pub async fn start(&self) -> Result<SyncOutcome, StorageError> {
        self.ensure_defaults().await?;
        self.sync_from_native().await
    }

    /// Mirror a persisted change to the host.
    pub async fn on_document_changed(&self, event: &ChangeEvent) {
        if let Err(e) = self.bridge.save_settings(&event.document).await {
            match e {
                BridgeError::Unavailable(_) => {
                    log::debug!("Native host not available to persist settings: {e}")
                }
                BridgeError::InvalidResponse(_) => log::warn!("Native host rejected settings: {e}"),
            }
        }
    }

    /// Push every document `distributor` emits to the host. Each push runs
    /// as its own task on `spawn`, so listeners never wait on the bridge.
    pub fn mirror_to_native<F>(self: &Rc<Self>, distributor: &ChangeDistributor, spawn: F) -> ListenerId
    where
        S: 'static,
        T: 'static,
        F: Fn(PushTask) + 'static,
    {
        let background = self.clone();
        distributor.subscribe(move |event| {
            let background = background.clone();
            let event = event.clone();
            spawn(Box::pin(async move { background.on_document_changed(&event).await }));
        })
    }

    pub async fn handle_message(&self, message: &RuntimeMessage) -> RuntimeResponse {
        match message {
            RuntimeMessage::GetDefaults => RuntimeResponse::Defaults {
                defaults: self.repository.schema().defaults().clone(),
            },
            RuntimeMessage::NativeStatus => RuntimeResponse::NativeStatus {
                native_messaging_available: self.bridge.is_available(),
            },
            RuntimeMessage::SyncFromNative => match self.sync_from_native().await {
                Ok(_) => RuntimeResponse::Sync { ok: true, message: None },
                Err(e) => RuntimeResponse::Sync {
                    ok: false,
                    message: Some(e.to_string()),
                },
            },
        }
    }
}
