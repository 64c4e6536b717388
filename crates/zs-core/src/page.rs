//! Page controller
//!
//! Glues one page's rule engine to the settings: applies the site's
//! subtree once at attach time, then re-applies the subtree of every
//! document the distributor emits.
//!
//! The page follows the distributor before the initial read completes. A
//! change delivered while the read is in flight wins over the read's
//! result, which may predate it.

use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use crate::distributor::{ChangeDistributor, ListenerId};
use crate::document::{Document, SiteSettings};
use crate::engine::RuleEngine;
use crate::repository::SettingsRepository;
use crate::storage::Storage;
use crate::style::StyleHost;

pub struct SitePage<H: StyleHost + 'static> {
    engine: Rc<RefCell<RuleEngine<H>>>,
    subscription: Option<(ChangeDistributor, ListenerId)>,
    received: Rc<Cell<u64>>,
}

impl<H: StyleHost + 'static> SitePage<H> {
    /// A page that is not yet following any distributor.
    pub fn new(engine: RuleEngine<H>) -> Self {
        Self {
            engine: Rc::new(RefCell::new(engine)),
            subscription: None,
            received: Rc::default(),
        }
    }

    /// Read the current settings, apply them and follow `distributor`.
    pub async fn attach<S: Storage>(
        engine: RuleEngine<H>,
        repository: &SettingsRepository<S>,
        distributor: &ChangeDistributor,
    ) -> Self {
        let mut page = Self::new(engine);
        page.follow(distributor);
        let received = page.received();

        let document = repository.read_all().await;
        match page.apply_unless_changed(&document, received) {
            Some(active) => log::debug!("Attached to {} with {active} active rule(s)", page.site()),
            None => log::debug!("Settings changed while attaching to {}", page.site()),
        }
        page
    }

    pub fn site(&self) -> &'static str {
        self.engine.borrow().site().key
    }

    pub fn engine(&self) -> Ref<'_, RuleEngine<H>> {
        self.engine.borrow()
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn apply_document(&self, document: &Document) -> usize {
        let settings = document.site(self.site());
        self.apply(&settings)
    }

    pub fn apply(&self, settings: &SiteSettings) -> usize {
        self.engine.borrow_mut().apply(settings)
    }

    /// Number of change events applied so far.
    pub fn received(&self) -> u64 {
        self.received.get()
    }

    /// Apply `document` only if no change event arrived since `received`
    /// was sampled. `None` when the document was superseded.
    pub fn apply_unless_changed(&self, document: &Document, received: u64) -> Option<usize> {
        if self.received.get() != received {
            return None;
        }
        Some(self.apply_document(document))
    }

    /// Re-apply on every change event. Replaces any previous subscription.
    pub fn follow(&mut self, distributor: &ChangeDistributor) {
        self.detach();

        let engine = self.engine.clone();
        let received = self.received.clone();
        let id = distributor.subscribe(move |event| {
            received.set(received.get() + 1);
            let mut engine = engine.borrow_mut();
            let settings = event.document.site(engine.site().key);
            engine.apply(&settings);
        });
        self.subscription = Some((distributor.clone(), id));
    }

    /// Stop following. Styles already on the page stay where they are.
    pub fn detach(&mut self) -> bool {
        match self.subscription.take() {
            Some((distributor, id)) => distributor.unsubscribe(id),
            None => false,
        }
    }

    pub fn active_rules(&self) -> Vec<String> {
        self.engine.borrow().active_rules()
    }
}

impl<H: StyleHost + 'static> Drop for SitePage<H> {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::schema::Schema;
    use crate::storage::{MemoryArea, MemoryStorage, Origin};
    use crate::style::StyleSheetSet;
    use serde_json::json;

    struct Context {
        repository: SettingsRepository<MemoryStorage>,
        distributor: ChangeDistributor,
    }

    fn context(area: &MemoryArea, id: u32) -> Context {
        let config = Config::default();
        let schema = Rc::new(Schema::builtin());
        let storage = area.handle(id);
        Context {
            distributor: ChangeDistributor::new(Rc::new(storage.clone()), schema.clone(), &config, id),
            repository: SettingsRepository::new(storage, schema, &config),
        }
    }

    async fn attach(site: &str, ctx: &Context) -> SitePage<StyleSheetSet> {
        let engine = RuleEngine::for_site(site, StyleSheetSet::new(), &Config::default()).unwrap();
        SitePage::attach(engine, &ctx.repository, &ctx.distributor).await
    }

    #[tokio::test]
    async fn test_attach_applies_defaults() {
        let area = MemoryArea::new("sync");
        let page_ctx = context(&area, 2);
        let page = attach("facebook", &page_ctx).await;

        assert!(page.is_attached());
        assert_eq!(page.active_rules(), vec!["facebook-feed", "facebook-stories", "facebook-watch"]);
    }

    #[tokio::test]
    async fn test_write_in_ui_context_updates_page() {
        let area = MemoryArea::new("sync");
        let ui = context(&area, 1);
        let page_ctx = context(&area, 2);
        let page = attach("youtube", &page_ctx).await;
        assert!(!page.active_rules().contains(&"youtube-comments".to_string()));

        ui.repository.write_site_feature("youtube", "hideComments", true).await.unwrap();
        assert!(page.active_rules().contains(&"youtube-comments".to_string()));

        ui.repository.write_site_feature("youtube", "enabled", false).await.unwrap();
        assert!(page.active_rules().is_empty());

        ui.repository.write_site_feature("youtube", "enabled", true).await.unwrap();
        assert_eq!(page.active_rules().len(), 5);
    }

    #[tokio::test]
    async fn test_other_sites_do_not_disturb_page() {
        let area = MemoryArea::new("sync");
        let ui = context(&area, 1);
        let page_ctx = context(&area, 2);
        let page = attach("reddit", &page_ctx).await;
        let before = page.active_rules();
        let writes = page.engine().host().writes();

        ui.repository.write_site_feature("facebook", "enabled", false).await.unwrap();
        assert_eq!(page.active_rules(), before);
        assert_eq!(page.engine().host().writes(), writes);
    }

    #[tokio::test]
    async fn test_native_write_reaches_page() {
        let area = MemoryArea::new("sync");
        let background = context(&area, 0);
        let page_ctx = context(&area, 2);
        let page = attach("twitter", &page_ctx).await;

        background
            .repository
            .replace(&json!({"twitter": {"enabled": false}}), Origin::Native)
            .await
            .unwrap();
        assert!(page.active_rules().is_empty());
    }

    #[tokio::test]
    async fn test_detach_and_drop_unsubscribe() {
        let area = MemoryArea::new("sync");
        let ui = context(&area, 1);
        let page_ctx = context(&area, 2);

        let mut page = attach("linkedin", &page_ctx).await;
        assert_eq!(page_ctx.distributor.listener_count(), 1);
        assert!(page.detach());
        assert!(!page.detach());
        assert_eq!(page_ctx.distributor.listener_count(), 0);

        let before = page.active_rules();
        ui.repository.write_site_feature("linkedin", "enabled", false).await.unwrap();
        assert_eq!(page.active_rules(), before);

        let other = attach("linkedin", &page_ctx).await;
        assert_eq!(page_ctx.distributor.listener_count(), 1);
        drop(other);
        assert_eq!(page_ctx.distributor.listener_count(), 0);
    }

    /// Storage whose reads suspend once before answering.
    struct YieldingStorage(MemoryStorage);

    impl Storage for YieldingStorage {
        async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, crate::StorageError> {
            let value = self.0.get(key).await;
            tokio::task::yield_now().await;
            value
        }

        async fn set(&self, key: &str, value: serde_json::Value, origin: Origin) -> Result<(), crate::StorageError> {
            self.0.set(key, value, origin).await
        }
    }

    #[tokio::test]
    async fn test_write_during_attach_is_not_lost() {
        let area = MemoryArea::new("sync");
        let ui = context(&area, 1);
        let page_ctx = context(&area, 2);
        let config = Config::default();
        let slow = SettingsRepository::new(
            YieldingStorage(area.handle(2)),
            Rc::new(Schema::builtin()),
            &config,
        );

        let engine = RuleEngine::for_site("youtube", StyleSheetSet::new(), &config).unwrap();
        let (page, written) = tokio::join!(
            SitePage::attach(engine, &slow, &page_ctx.distributor),
            ui.repository.write_site_feature("youtube", "enabled", false),
        );
        written.unwrap();

        assert_eq!(area.peek("zeroSixSettings").unwrap()["youtube"]["enabled"], json!(false));
        assert_eq!(page.received(), 1);
        assert!(page.active_rules().is_empty());
    }

    #[test]
    fn test_stale_document_is_skipped() {
        let engine = RuleEngine::for_site("reddit", StyleSheetSet::new(), &Config::default()).unwrap();
        let page = SitePage::new(engine);
        let schema = Schema::builtin();
        let defaults = schema.defaults().clone();

        assert!(page.apply_unless_changed(&defaults, 0).is_some());
        assert!(page.apply_unless_changed(&defaults, 1).is_none());
    }

    #[tokio::test]
    async fn test_attach_with_storage_down_uses_defaults() {
        let area = MemoryArea::new("sync");
        let page_ctx = context(&area, 2);
        area.set_offline(true);
        let page = attach("instagram", &page_ctx).await;
        assert_eq!(page.active_rules().len(), 4);
    }
}
