//! Zero Six Core Library
//!
//! This crate keeps one small nested preference document ("which surfaces to
//! suppress on which social sites") consistent across several browsing
//! contexts and a desktop companion, and turns it into style rules on pages.
//!
//! # Architecture
//!
//! Stored bytes are never trusted: every read and every write goes through
//! the schema-driven merge, so the document always has exactly the key set
//! of the built-in defaults. Writers persist the whole document; readers are
//! notified by the change distributor, which is the only fan-out point.
//! Pages hide surfaces through keyed style elements, one per rule, so the
//! applied state survives the host page re-rendering its own nodes.
//!
//! # Modules
//!
//! - `config`: storage key, host name and other tunables
//! - `schema`: versioned defaults and the typed schema tree
//! - `merge`: total, idempotent merge of stored data against the schema
//! - `document`: the settings document and per-site views
//! - `storage`: persistence and change-feed abstractions, in-memory area
//! - `repository`: read/write operations over one storage area
//! - `distributor`: fan-out of normalized change events to listeners
//! - `bridge`: best-effort channel to the native companion host
//! - `background`: startup reconciliation and runtime message handling
//! - `rules`: static per-site rule tables
//! - `url`: page URL to site resolution
//! - `style`: keyed style element bookkeeping
//! - `engine`: per-site rule engine
//! - `watch`: observe-until-found primitive
//! - `page`: per-page controller wiring engine and distributor

pub mod background;
pub mod bridge;
pub mod config;
pub mod distributor;
pub mod document;
pub mod engine;
pub mod merge;
pub mod page;
pub mod repository;
pub mod rules;
pub mod schema;
pub mod storage;
pub mod style;
pub mod url;
pub mod watch;

// Re-export commonly used types
pub use background::{Background, PushTask, RuntimeMessage, RuntimeResponse, SyncOutcome};
pub use bridge::{BridgeError, NativeBridge, NativeRequest, NativeTransport, TransportError};
pub use config::Config;
pub use distributor::{ChangeDistributor, ChangeEvent, ChangeSource, ListenerId};
pub use document::{Document, SiteSettings};
pub use engine::RuleEngine;
pub use merge::merge;
pub use page::SitePage;
pub use repository::SettingsRepository;
pub use rules::{site_rules, FeatureRule, RuleBody, SiteRules, SITES};
pub use schema::{Schema, SchemaNode, SCHEMA_VERSION};
pub use storage::{ChangeFeed, MemoryArea, MemoryStorage, Storage, StorageChange, StorageError};
pub use style::{StyleChange, StyleHost, StyleSheetSet};
pub use url::{site_for_host, site_for_url};
pub use watch::{ElementQuery, ElementWatcher, MutationSource, WatchHandle};
