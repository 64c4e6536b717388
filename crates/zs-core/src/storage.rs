//! Persistence and change-feed abstractions
//!
//! A storage area holds JSON values under string keys and announces every
//! write to its watchers. Backends: [`MemoryArea`] here, the companion's
//! settings file in the CLI, and `chrome.storage` behind the wasm glue.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde_json::Value;

/// Identifies one browsing context (page, extension UI, background).
pub type ContextId = u32;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage area unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// On whose behalf a write is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The writing context itself (UI toggle, startup upgrade)
    Local,
    /// A document pulled from the native companion
    Native,
}

/// Who performed a write, as reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writer {
    Context(ContextId),
    Native,
    /// The platform did not say
    Unknown,
}

/// One change notification: `{key, oldValue, newValue, areaName}`.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub area_name: String,
    pub writer: Writer,
}

/// Key/value persistence. Every call is a suspension point.
#[allow(async_fn_in_trait)]
pub trait Storage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn set(&self, key: &str, value: Value, origin: Origin) -> Result<(), StorageError>;
}

// =============================================================================
// Change Feed
// =============================================================================

pub type ChangeHandler = Rc<dyn Fn(&StorageChange)>;

/// Source of change notifications for one storage area.
pub trait ChangeFeed {
    fn watch(&self, handler: ChangeHandler) -> FeedSubscription;
}

/// Registration with a [`ChangeFeed`]. Dropping it stops delivery.
pub struct FeedSubscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl FeedSubscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSubscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[derive(Default)]
struct HubState {
    handlers: Vec<(u64, ChangeHandler)>,
    next_id: u64,
}

/// Watcher list shared by feed implementations.
///
/// Platform adapters that receive notifications through a callback (the
/// wasm glue) push them in with [`ChangeHub::deliver`].
#[derive(Clone, Default)]
pub struct ChangeHub {
    state: Rc<RefCell<HubState>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand a notification to every watcher, in registration order.
    pub fn deliver(&self, change: &StorageChange) {
        let handlers: Vec<ChangeHandler> = self
            .state
            .borrow()
            .handlers
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(change);
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.state.borrow().handlers.len()
    }
}

impl ChangeFeed for ChangeHub {
    fn watch(&self, handler: ChangeHandler) -> FeedSubscription {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id;
            state.next_id += 1;
            state.handlers.push((id, handler));
            id
        };

        let weak: Weak<RefCell<HubState>> = Rc::downgrade(&self.state);
        FeedSubscription::new(move || {
            if let Some(state) = weak.upgrade() {
                state.borrow_mut().handlers.retain(|(other, _)| *other != id);
            }
        })
    }
}

// =============================================================================
// In-memory Area
// =============================================================================

struct AreaState {
    name: String,
    values: HashMap<String, Value>,
    offline: bool,
}

/// One shared storage area, e.g. the `sync` area seen by every context.
#[derive(Clone)]
pub struct MemoryArea {
    state: Rc<RefCell<AreaState>>,
    hub: ChangeHub,
}

impl MemoryArea {
    pub fn new(name: &str) -> Self {
        Self {
            state: Rc::new(RefCell::new(AreaState {
                name: name.to_string(),
                values: HashMap::new(),
                offline: false,
            })),
            hub: ChangeHub::new(),
        }
    }

    /// A handle for one context; its writes are reported as that context's.
    pub fn handle(&self, context: ContextId) -> MemoryStorage {
        MemoryStorage {
            area: self.clone(),
            context,
        }
    }

    /// Make every read and write fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.state.borrow_mut().offline = offline;
    }

    pub fn peek(&self, key: &str) -> Option<Value> {
        self.state.borrow().values.get(key).cloned()
    }

    /// Delete a key, as the user's browser data-clearing would.
    pub fn remove(&self, key: &str) {
        let change = {
            let mut state = self.state.borrow_mut();
            let old_value = state.values.remove(key);
            if old_value.is_none() {
                return;
            }
            StorageChange {
                key: key.to_string(),
                old_value,
                new_value: None,
                area_name: state.name.clone(),
                writer: Writer::Unknown,
            }
        };
        self.hub.deliver(&change);
    }

    fn check_online(&self) -> Result<(), StorageError> {
        let state = self.state.borrow();
        if state.offline {
            return Err(StorageError::Unavailable(state.name.clone()));
        }
        Ok(())
    }
}

/// A context's view of a [`MemoryArea`].
#[derive(Clone)]
pub struct MemoryStorage {
    area: MemoryArea,
    context: ContextId,
}

impl MemoryStorage {
    pub fn area(&self) -> &MemoryArea {
        &self.area
    }

    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.area.check_online()?;
        Ok(self.area.peek(key))
    }

    async fn set(&self, key: &str, value: Value, origin: Origin) -> Result<(), StorageError> {
        self.area.check_online()?;

        let change = {
            let mut state = self.area.state.borrow_mut();
            let old_value = state.values.insert(key.to_string(), value.clone());
            // Unchanged values are not announced
            if old_value.as_ref() == Some(&value) {
                return Ok(());
            }
            StorageChange {
                key: key.to_string(),
                old_value,
                new_value: Some(value),
                area_name: state.name.clone(),
                writer: match origin {
                    Origin::Local => Writer::Context(self.context),
                    Origin::Native => Writer::Native,
                },
            }
        };

        self.area.hub.deliver(&change);
        Ok(())
    }
}

impl ChangeFeed for MemoryStorage {
    fn watch(&self, handler: ChangeHandler) -> FeedSubscription {
        self.area.hub.watch(handler)
    }
}
