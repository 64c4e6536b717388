//! Settings repository
//!
//! Owns the persisted document of one context. Reads never fail: a storage
//! error degrades to the schema defaults. Writes always re-read the current
//! document right before applying their patch, merge the result against the
//! schema and persist the whole document; persisting is what notifies other
//! readers, so writers never distribute changes themselves.

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::config::Config;
use crate::document::{Document, SiteSettings};
use crate::schema::Schema;
use crate::storage::{Origin, Storage, StorageError};

pub struct SettingsRepository<S> {
    storage: S,
    schema: Rc<Schema>,
    key: String,
}

impl<S: Storage> SettingsRepository<S> {
    pub fn new(storage: S, schema: Rc<Schema>, config: &Config) -> Self {
        Self {
            storage,
            schema,
            key: config.storage_key.clone(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The complete document. Falls back to the defaults on storage errors.
    pub async fn read_all(&self) -> Document {
        match self.load().await {
            Ok(document) => document,
            Err(e) => {
                log::warn!("Failed to read settings, using defaults: {e}");
                self.schema.defaults().clone()
            }
        }
    }

    /// One site's subtree; empty for unknown sites.
    pub async fn read_site(&self, site: &str) -> SiteSettings {
        self.read_all().await.site(site)
    }

    /// Raw stored value, without merging. `None` if nothing was ever written.
    pub async fn read_stored(&self) -> Result<Option<Value>, StorageError> {
        self.storage.get(&self.key).await
    }

    /// Shallow-merge `patch` over the current document and persist.
    ///
    /// Patch fields replace whole top-level entries (whole sites); unknown
    /// fields are dropped by the merge.
    pub async fn write_partial(&self, patch: Map<String, Value>) -> Result<(), StorageError> {
        let mut current = self.load().await?;
        current.overlay(patch);
        self.persist(current.to_value(), Origin::Local).await?;
        Ok(())
    }

    /// Overlay `patch` onto one site's subtree and persist.
    pub async fn write_site(&self, site: &str, patch: Map<String, Value>) -> Result<(), StorageError> {
        if !self.schema.has_site(site) {
            log::debug!("Ignoring write to unknown site '{site}'");
            return Ok(());
        }

        let mut current = self.load().await?;
        let mut subtree = current.site(site);
        subtree.overlay(patch);
        current.set_site(site, subtree);
        self.persist(current.to_value(), Origin::Local).await?;
        Ok(())
    }

    /// Set exactly one flag of one site (`enabled` included).
    pub async fn write_site_feature(&self, site: &str, feature: &str, value: bool) -> Result<(), StorageError> {
        if !self.schema.has_feature(site, feature) {
            log::debug!("Ignoring write to unknown feature '{site}.{feature}'");
            return Ok(());
        }

        let mut patch = Map::new();
        patch.insert(feature.to_string(), Value::Bool(value));
        self.write_site(site, patch).await
    }

    /// Replace the whole document with `value`, normalized.
    pub async fn replace(&self, value: &Value, origin: Origin) -> Result<Document, StorageError> {
        self.persist(value.clone(), origin).await
    }

    async fn load(&self) -> Result<Document, StorageError> {
        let stored = self.storage.get(&self.key).await?;
        Ok(self.schema.merge(stored.as_ref()))
    }

    async fn persist(&self, value: Value, origin: Origin) -> Result<Document, StorageError> {
        let merged = self.schema.merge(Some(&value));
        self.storage.set(&self.key, merged.to_value(), origin).await?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChangeFeed, MemoryArea, StorageChange};
    use serde_json::json;
    use std::cell::RefCell;

    fn repository(area: &MemoryArea, context: u32) -> SettingsRepository<crate::storage::MemoryStorage> {
        SettingsRepository::new(area.handle(context), Rc::new(Schema::builtin()), &Config::default())
    }

    #[tokio::test]
    async fn test_first_read_is_defaults() {
        let area = MemoryArea::new("sync");
        let repo = repository(&area, 1);
        assert_eq!(&repo.read_all().await, repo.schema().defaults());
        assert_eq!(repo.read_stored().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_survives_storage_failure() {
        let area = MemoryArea::new("sync");
        let repo = repository(&area, 1);
        area.set_offline(true);
        assert_eq!(&repo.read_all().await, repo.schema().defaults());
        assert!(repo.read_site("facebook").await.enabled());
    }

    #[tokio::test]
    async fn test_read_malformed_stored_value() {
        let area = MemoryArea::new("sync");
        let repo = repository(&area, 1);
        repo.storage().set("zeroSixSettings", json!("garbage"), Origin::Local).await.unwrap();
        assert_eq!(&repo.read_all().await, repo.schema().defaults());
    }

    #[tokio::test]
    async fn test_unknown_site_reads_empty() {
        let area = MemoryArea::new("sync");
        let repo = repository(&area, 1);
        assert!(repo.read_site("myspace").await.is_empty());
    }

    #[tokio::test]
    async fn test_write_site_feature_touches_one_key() {
        let area = MemoryArea::new("sync");
        let repo = repository(&area, 1);
        repo.write_site_feature("youtube", "hideComments", true).await.unwrap();

        let document = repo.read_all().await;
        let youtube = document.site("youtube");
        assert!(youtube.is_true("hideComments"));
        assert!(youtube.is_true("hideShorts"));
        assert_eq!(document.site("facebook"), repo.schema().defaults().site("facebook"));
    }

    #[tokio::test]
    async fn test_write_partial_replaces_site_and_normalizes() {
        let area = MemoryArea::new("sync");
        let repo = repository(&area, 1);
        let patch = json!({"facebook": {"enabled": false}, "bogus": true}).as_object().cloned().unwrap();
        repo.write_partial(patch).await.unwrap();

        let stored = area.peek("zeroSixSettings").unwrap();
        assert!(stored.get("bogus").is_none());
        assert_eq!(stored["facebook"]["enabled"], json!(false));
        // Missing keys of the replaced site come back from the defaults
        assert_eq!(stored["facebook"]["hideNewsFeed"], json!(true));
    }

    #[tokio::test]
    async fn test_unknown_targets_are_noops() {
        let area = MemoryArea::new("sync");
        let repo = repository(&area, 1);
        repo.write_site_feature("myspace", "hideTop8", true).await.unwrap();
        repo.write_site_feature("facebook", "hideTop8", true).await.unwrap();
        assert_eq!(area.peek("zeroSixSettings"), None);
    }

    #[tokio::test]
    async fn test_write_fails_when_storage_is_down() {
        let area = MemoryArea::new("sync");
        let repo = repository(&area, 1);
        area.set_offline(true);
        assert!(repo.write_site_feature("facebook", "enabled", false).await.is_err());
        area.set_offline(false);
        assert_eq!(area.peek("zeroSixSettings"), None);
    }

    #[tokio::test]
    async fn test_write_rereads_current_state() {
        let area = MemoryArea::new("sync");
        let first = repository(&area, 1);
        let second = repository(&area, 2);

        first.write_site_feature("facebook", "hideWatch", false).await.unwrap();
        second.write_site_feature("facebook", "hideStories", false).await.unwrap();

        let facebook = first.read_site("facebook").await;
        assert!(!facebook.is_true("hideWatch"));
        assert!(!facebook.is_true("hideStories"));
    }

    #[tokio::test]
    async fn test_write_produces_one_notification() {
        let area = MemoryArea::new("sync");
        let repo = repository(&area, 1);
        let seen = Rc::new(RefCell::new(0));
        let sink = seen.clone();
        let _subscription = repo.storage().watch(Rc::new(move |_: &StorageChange| *sink.borrow_mut() += 1));

        repo.write_site_feature("reddit", "hideSidebar", true).await.unwrap();
        assert_eq!(*seen.borrow(), 1);
    }
}
