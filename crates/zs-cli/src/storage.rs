//! The companion's settings file
//!
//! One JSON object mapping storage keys to values, rewritten whole on every
//! write through a temporary file and a rename.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use zs_core::storage::{ChangeHub, ContextId, FeedSubscription, Origin, Writer};
use zs_core::{ChangeFeed, Storage, StorageChange, StorageError};

/// Context id of the companion's own writes.
pub const COMPANION_CONTEXT: ContextId = 1;

#[derive(Clone)]
pub struct FileStorage {
    path: PathBuf,
    area: String,
    hub: ChangeHub,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>, area: &str) -> Self {
        Self {
            path: path.into(),
            area: area.to_string(),
            hub: ChangeHub::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map<String, Value>, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_json::from_slice(&bytes)?;
        match value {
            Value::Object(entries) => Ok(entries),
            _ => Err(StorageError::Unavailable(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, entries: Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&Value::Object(entries))?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value, origin: Origin) -> Result<(), StorageError> {
        let mut entries = self.load().await?;
        let old_value = entries.insert(key.to_string(), value.clone());
        if old_value.as_ref() == Some(&value) {
            return Ok(());
        }

        self.save(entries).await?;
        log::debug!("Wrote '{}' to {}", key, self.path.display());

        self.hub.deliver(&StorageChange {
            key: key.to_string(),
            old_value,
            new_value: Some(value),
            area_name: self.area.clone(),
            writer: match origin {
                Origin::Local => Writer::Context(COMPANION_CONTEXT),
                Origin::Native => Writer::Native,
            },
        });
        Ok(())
    }
}

impl ChangeFeed for FileStorage {
    fn watch(&self, handler: zs_core::storage::ChangeHandler) -> FeedSubscription {
        self.hub.watch(handler)
    }
}
