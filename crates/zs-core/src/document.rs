//! The settings document and per-site views

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{ENABLED_KEY, VERSION_KEY};

/// The whole settings tree: `siteKey -> featureKey -> bool` plus `version`.
///
/// A `Document` is only as well-shaped as the value it was built from; run
/// it through [`Schema::merge`](crate::schema::Schema::merge) before
/// trusting its key set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn version(&self) -> Option<i64> {
        self.0.get(VERSION_KEY).and_then(Value::as_i64)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The subtree of one site; empty if the site is unknown or malformed.
    pub fn site(&self, key: &str) -> SiteSettings {
        match self.0.get(key) {
            Some(Value::Object(map)) => SiteSettings(map.clone()),
            _ => SiteSettings::default(),
        }
    }

    /// Replace top-level fields wholesale with those of `patch`.
    pub fn overlay(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.0.insert(key, value);
        }
    }

    pub fn set_site(&mut self, key: &str, site: SiteSettings) {
        self.0.insert(key.to_string(), Value::Object(site.0));
    }
}

/// One site's subtree: `{ enabled, <featureKey>: bool, ... }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteSettings(Map<String, Value>);

impl SiteSettings {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Master switch. Anything but a literal `true` counts as off.
    pub fn enabled(&self) -> bool {
        self.is_true(ENABLED_KEY)
    }

    /// Stored flag of a feature, ignoring the master switch.
    pub fn is_true(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(Value::Bool(true)))
    }

    /// Effective state of a feature: the site is enabled and the flag is `true`.
    pub fn is_active(&self, feature: &str) -> bool {
        self.enabled() && self.is_true(feature)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    pub fn overlay(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            self.0.insert(key, value);
        }
    }
}
