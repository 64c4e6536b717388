//! Change distributor
//!
//! The single internal subscriber to a storage area's change feed. It turns
//! raw notifications about the settings key into normalized [`ChangeEvent`]s
//! and fans them out to in-process listeners, synchronously and in
//! registration order. The feed is subscribed lazily, once, when the first
//! listener registers.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde::Serialize;

use crate::config::Config;
use crate::document::Document;
use crate::schema::Schema;
use crate::storage::{ChangeFeed, ContextId, FeedSubscription, StorageChange, Writer};

/// Where a change came from, relative to the receiving context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    /// Written by this context
    Local,
    /// Written by another context
    Remote,
    /// Pulled from the native companion
    Native,
}

/// A whole new document. Never a diff.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub source: ChangeSource,
    pub document: Rc<Document>,
}

pub type Listener = Rc<dyn Fn(&ChangeEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl From<ListenerId> for u64 {
    fn from(id: ListenerId) -> u64 {
        id.0
    }
}

impl From<u64> for ListenerId {
    fn from(raw: u64) -> Self {
        ListenerId(raw)
    }
}

/// Subscription state of the distributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributorState {
    Idle,
    Watching,
}

struct State {
    listeners: Vec<(ListenerId, Listener)>,
    next_id: u64,
    subscription: Option<FeedSubscription>,
}

struct Inner {
    schema: Rc<Schema>,
    key: String,
    area: String,
    context: ContextId,
    feed: Rc<dyn ChangeFeed>,
    state: RefCell<State>,
}

/// Cheap to clone; clones share listeners and subscription.
#[derive(Clone)]
pub struct ChangeDistributor {
    inner: Rc<Inner>,
}

impl ChangeDistributor {
    pub fn new(feed: Rc<dyn ChangeFeed>, schema: Rc<Schema>, config: &Config, context: ContextId) -> Self {
        Self {
            inner: Rc::new(Inner {
                schema,
                key: config.storage_key.clone(),
                area: config.storage_area.clone(),
                context,
                feed,
                state: RefCell::new(State {
                    listeners: Vec::new(),
                    next_id: 0,
                    subscription: None,
                }),
            }),
        }
    }

    pub fn state(&self) -> DistributorState {
        if self.inner.state.borrow().subscription.is_some() {
            DistributorState::Watching
        } else {
            DistributorState::Idle
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.state.borrow().listeners.len()
    }

    /// Register a listener. Safe to call from inside a listener; the new
    /// listener sees events from the next one on.
    pub fn subscribe(&self, listener: impl Fn(&ChangeEvent) + 'static) -> ListenerId {
        let (id, needs_feed) = {
            let mut state = self.inner.state.borrow_mut();
            let id = ListenerId(state.next_id);
            state.next_id += 1;
            state.listeners.push((id, Rc::new(listener)));
            (id, state.subscription.is_none())
        };

        if needs_feed {
            let weak: Weak<Inner> = Rc::downgrade(&self.inner);
            let subscription = self.inner.feed.watch(Rc::new(move |change: &StorageChange| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle(change);
                }
            }));
            self.inner.state.borrow_mut().subscription = Some(subscription);
        }

        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut state = self.inner.state.borrow_mut();
        let before = state.listeners.len();
        state.listeners.retain(|(other, _)| *other != id);
        state.listeners.len() != before
    }

    /// Feed one raw notification through the distributor.
    pub fn handle_change(&self, change: &StorageChange) {
        self.inner.handle(change);
    }
}

impl Inner {
    fn handle(&self, change: &StorageChange) {
        if change.area_name != self.area || change.key != self.key {
            return;
        }

        let Some(new_value) = &change.new_value else {
            log::debug!("Ignoring removal of '{}'", self.key);
            return;
        };

        let source = match change.writer {
            Writer::Context(context) if context == self.context => ChangeSource::Local,
            Writer::Native => ChangeSource::Native,
            Writer::Context(_) | Writer::Unknown => ChangeSource::Remote,
        };

        let event = ChangeEvent {
            source,
            document: Rc::new(self.schema.merge(Some(new_value))),
        };
        self.emit(&event);
    }

    fn emit(&self, event: &ChangeEvent) {
        // Snapshot so listeners can (un)subscribe while we iterate
        let listeners: Vec<Listener> = self
            .state
            .borrow()
            .listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChangeHub, MemoryArea, Origin, Storage};
    use serde_json::json;
    use std::cell::Cell;

    fn distributor(feed: Rc<dyn ChangeFeed>, context: ContextId) -> ChangeDistributor {
        ChangeDistributor::new(feed, Rc::new(Schema::builtin()), &Config::default(), context)
    }

    fn change(key: &str, area: &str, value: Option<serde_json::Value>, writer: Writer) -> StorageChange {
        StorageChange {
            key: key.to_string(),
            old_value: None,
            new_value: value,
            area_name: area.to_string(),
            writer,
        }
    }

    #[test]
    fn test_fan_out_in_registration_order() {
        let hub = ChangeHub::new();
        let distributor = distributor(Rc::new(hub.clone()), 1);
        let calls = Rc::new(RefCell::new(Vec::new()));
        let documents = Rc::new(RefCell::new(Vec::new()));

        for n in 0..5 {
            let calls = calls.clone();
            let documents = documents.clone();
            distributor.subscribe(move |event| {
                calls.borrow_mut().push(n);
                documents.borrow_mut().push(event.document.clone());
            });
        }

        hub.deliver(&change("zeroSixSettings", "sync", Some(json!({})), Writer::Unknown));

        assert_eq!(*calls.borrow(), vec![0, 1, 2, 3, 4]);
        let documents = documents.borrow();
        assert!(documents.iter().all(|doc| Rc::ptr_eq(doc, &documents[0])));
    }

    #[test]
    fn test_feed_subscribed_once_on_first_listener() {
        let hub = ChangeHub::new();
        let distributor = distributor(Rc::new(hub.clone()), 1);
        assert_eq!(distributor.state(), DistributorState::Idle);
        assert_eq!(hub.watcher_count(), 0);

        let first = distributor.subscribe(|_| {});
        distributor.subscribe(|_| {});
        assert_eq!(distributor.state(), DistributorState::Watching);
        assert_eq!(hub.watcher_count(), 1);

        distributor.unsubscribe(first);
        assert_eq!(distributor.state(), DistributorState::Watching);
    }

    #[test]
    fn test_filters_foreign_keys_areas_and_removals() {
        let hub = ChangeHub::new();
        let distributor = distributor(Rc::new(hub.clone()), 1);
        let calls = Rc::new(Cell::new(0));
        let sink = calls.clone();
        distributor.subscribe(move |_| sink.set(sink.get() + 1));

        hub.deliver(&change("otherKey", "sync", Some(json!({})), Writer::Unknown));
        hub.deliver(&change("zeroSixSettings", "local", Some(json!({})), Writer::Unknown));
        hub.deliver(&change("zeroSixSettings", "sync", None, Writer::Unknown));
        assert_eq!(calls.get(), 0);

        hub.deliver(&change("zeroSixSettings", "sync", Some(json!({})), Writer::Unknown));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_event_document_is_normalized() {
        let hub = ChangeHub::new();
        let distributor = distributor(Rc::new(hub.clone()), 1);
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        distributor.subscribe(move |event| *sink.borrow_mut() = Some(event.document.clone()));

        hub.deliver(&change(
            "zeroSixSettings",
            "sync",
            Some(json!({"facebook": {"enabled": false}, "junk": 1})),
            Writer::Unknown,
        ));

        let document = seen.borrow().clone().unwrap();
        assert!(document.get("junk").is_none());
        assert!(!document.site("facebook").enabled());
        assert!(document.site("facebook").is_true("hideNewsFeed"));
        assert!(document.site("youtube").enabled());
    }

    #[test]
    fn test_source_classification() {
        let hub = ChangeHub::new();
        let distributor = distributor(Rc::new(hub.clone()), 7);
        let sources = Rc::new(RefCell::new(Vec::new()));
        let sink = sources.clone();
        distributor.subscribe(move |event| sink.borrow_mut().push(event.source));

        for writer in [Writer::Context(7), Writer::Context(8), Writer::Native, Writer::Unknown] {
            hub.deliver(&change("zeroSixSettings", "sync", Some(json!({})), writer));
        }
        assert_eq!(
            *sources.borrow(),
            vec![ChangeSource::Local, ChangeSource::Remote, ChangeSource::Native, ChangeSource::Remote]
        );
    }

    #[test]
    fn test_reentrant_subscribe_and_unsubscribe() {
        let hub = ChangeHub::new();
        let distributor = distributor(Rc::new(hub.clone()), 1);
        let late_calls = Rc::new(Cell::new(0));
        let own_id: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));

        let d = distributor.clone();
        let late = late_calls.clone();
        let own = own_id.clone();
        let id = distributor.subscribe(move |_| {
            // Removes itself and registers a newcomer from inside delivery
            if let Some(id) = own.get() {
                d.unsubscribe(id);
            }
            let late = late.clone();
            d.subscribe(move |_| late.set(late.get() + 1));
        });
        own_id.set(Some(id));

        let event = change("zeroSixSettings", "sync", Some(json!({})), Writer::Unknown);
        hub.deliver(&event);
        assert_eq!(late_calls.get(), 0);
        assert_eq!(distributor.listener_count(), 1);

        hub.deliver(&event);
        assert_eq!(late_calls.get(), 1);
    }

    #[tokio::test]
    async fn test_write_in_one_context_reaches_another() {
        let area = MemoryArea::new("sync");
        let page = area.handle(2);
        let distributor = distributor(Rc::new(page), 2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        distributor.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        let ui = area.handle(1);
        ui.set("zeroSixSettings", json!({"reddit": {"enabled": false}}), Origin::Local)
            .await
            .unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].source, ChangeSource::Remote);
        assert!(!seen[0].document.site("reddit").enabled());
    }
}
