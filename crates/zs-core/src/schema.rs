//! Versioned settings schema
//!
//! The built-in defaults are the only authority on which keys exist. The
//! typed [`SchemaNode`] tree is derived from them once and drives the merge:
//! the expected shape at every key comes from the defaults, never from the
//! stored data.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::document::Document;
use crate::merge::merge;

/// Current schema version, stored under the top-level `version` key.
pub const SCHEMA_VERSION: i64 = 1;

/// Key of the per-site master switch.
pub const ENABLED_KEY: &str = "enabled";

/// Key of the schema version.
pub const VERSION_KEY: &str = "version";

// =============================================================================
// Built-in Defaults
// =============================================================================

/// Default value and label of one feature flag.
#[derive(Debug, Clone, Copy)]
pub struct FeatureDefault {
    pub key: &'static str,
    pub label: &'static str,
    pub default: bool,
}

/// Defaults for one site.
#[derive(Debug, Clone, Copy)]
pub struct SiteDefault {
    pub key: &'static str,
    pub label: &'static str,
    pub features: &'static [FeatureDefault],
}

const fn feature(key: &'static str, label: &'static str, default: bool) -> FeatureDefault {
    FeatureDefault { key, label, default }
}

/// Every supported site with its feature flags. All sites start enabled.
pub static SITE_DEFAULTS: &[SiteDefault] = &[
    SiteDefault {
        key: "facebook",
        label: "Facebook",
        features: &[
            feature("hideNewsFeed", "Hide News Feed", true),
            feature("hideStories", "Hide Stories", true),
            feature("hideWatch", "Hide Watch Tab", true),
            feature("hideMarketplace", "Hide Marketplace", false),
            feature("hideNotifications", "Hide Notifications", false),
        ],
    },
    SiteDefault {
        key: "youtube",
        label: "YouTube",
        features: &[
            feature("hideHomeFeed", "Hide Home Feed", true),
            feature("hideSidebar", "Hide Sidebar Recommendations", true),
            feature("hideComments", "Hide Comments", false),
            feature("hideEndscreen", "Hide End Screen Cards", true),
            feature("hideShorts", "Hide Shorts Surface", true),
        ],
    },
    SiteDefault {
        key: "twitter",
        label: "Twitter / X",
        features: &[
            feature("hideHomeTimeline", "Hide Home Timeline", true),
            feature("hideTrends", "Hide Trending", true),
            feature("hideWhoToFollow", "Hide Who to Follow", true),
            feature("hideNotifications", "Hide Notifications", false),
        ],
    },
    SiteDefault {
        key: "reddit",
        label: "Reddit",
        features: &[
            feature("hideHomeFeed", "Hide Home Feed", true),
            feature("hideTrending", "Hide Trending Modules", true),
            feature("hideSidebar", "Hide Sidebar Widgets", false),
        ],
    },
    SiteDefault {
        key: "linkedin",
        label: "LinkedIn",
        features: &[
            feature("hideFeed", "Hide Main Feed", true),
            feature("hideNotifications", "Hide Notifications", false),
            feature("hideMessaging", "Hide Messaging Overlay", false),
        ],
    },
    SiteDefault {
        key: "instagram",
        label: "Instagram",
        features: &[
            feature("hideFeed", "Hide Feed", true),
            feature("hideStories", "Hide Stories", true),
            feature("hideExplore", "Hide Explore", true),
            feature("hideReels", "Hide Reels", true),
        ],
    },
];

/// Look up the built-in defaults of a site.
pub fn site_default(key: &str) -> Option<&'static SiteDefault> {
    SITE_DEFAULTS.iter().find(|site| site.key == key)
}

/// The built-in default document as JSON.
pub fn builtin_defaults() -> Map<String, Value> {
    let mut root = Map::new();
    root.insert(VERSION_KEY.to_string(), Value::from(SCHEMA_VERSION));
    for site in SITE_DEFAULTS {
        let mut subtree = Map::new();
        subtree.insert(ENABLED_KEY.to_string(), Value::Bool(true));
        for feature in site.features {
            subtree.insert(feature.key.to_string(), Value::Bool(feature.default));
        }
        root.insert(site.key.to_string(), Value::Object(subtree));
    }
    root
}

// =============================================================================
// Schema Tree
// =============================================================================

/// One node of the schema: a nested group of keys, or a leaf default.
///
/// Lists are leaves: they are taken from storage wholesale, never merged.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Group(BTreeMap<String, SchemaNode>),
    Leaf(Value),
}

impl SchemaNode {
    /// Derive the schema from a defaults value.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::Group(
                map.iter()
                    .map(|(key, child)| (key.clone(), Self::from_value(child)))
                    .collect(),
            ),
            other => Self::Leaf(other.clone()),
        }
    }

    /// Render the defaults this node describes.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Group(children) => Value::Object(
                children
                    .iter()
                    .map(|(key, child)| (key.clone(), child.to_value()))
                    .collect(),
            ),
            Self::Leaf(value) => value.clone(),
        }
    }

    pub fn child(&self, key: &str) -> Option<&SchemaNode> {
        match self {
            Self::Group(children) => children.get(key),
            Self::Leaf(_) => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }
}

/// Error type for schema construction.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema defaults must be a JSON object")]
    NotAnObject,
}

/// The schema together with its pre-rendered default document.
#[derive(Debug, Clone)]
pub struct Schema {
    root: SchemaNode,
    defaults: Document,
}

impl Schema {
    /// The schema of the shipped extension.
    pub fn builtin() -> Self {
        Self::from_map(builtin_defaults())
    }

    /// Build a schema from an arbitrary defaults object.
    pub fn from_defaults(defaults: &Value) -> Result<Self, SchemaError> {
        match defaults {
            Value::Object(map) => Ok(Self::from_map(map.clone())),
            _ => Err(SchemaError::NotAnObject),
        }
    }

    fn from_map(map: Map<String, Value>) -> Self {
        let root = SchemaNode::Group(
            map.iter()
                .map(|(key, child)| (key.clone(), SchemaNode::from_value(child)))
                .collect(),
        );
        Self {
            root,
            defaults: Document::from_map(map),
        }
    }

    pub fn root(&self) -> &SchemaNode {
        &self.root
    }

    /// The default document.
    pub fn defaults(&self) -> &Document {
        &self.defaults
    }

    /// Merge stored data against this schema.
    pub fn merge(&self, stored: Option<&Value>) -> Document {
        match merge(&self.root, stored) {
            Value::Object(map) => Document::from_map(map),
            _ => self.defaults.clone(),
        }
    }

    /// Top-level keys whose defaults are groups, i.e. sites.
    pub fn site_keys(&self) -> Vec<&str> {
        match &self.root {
            SchemaNode::Group(children) => children
                .iter()
                .filter(|(_, child)| child.is_group())
                .map(|(key, _)| key.as_str())
                .collect(),
            SchemaNode::Leaf(_) => Vec::new(),
        }
    }

    pub fn has_site(&self, site: &str) -> bool {
        self.root.child(site).is_some_and(SchemaNode::is_group)
    }

    /// Whether `key` is a leaf of `site` (`enabled` included).
    pub fn has_feature(&self, site: &str, key: &str) -> bool {
        self.root
            .child(site)
            .and_then(|node| node.child(key))
            .is_some_and(|node| !node.is_group())
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_shape() {
        let schema = Schema::builtin();
        let defaults = schema.defaults();
        assert_eq!(defaults.version(), Some(SCHEMA_VERSION));
        assert_eq!(schema.site_keys().len(), SITE_DEFAULTS.len());

        let facebook = defaults.site("facebook");
        assert!(facebook.enabled());
        assert!(facebook.is_active("hideNewsFeed"));
        assert!(!facebook.is_active("hideMarketplace"));
    }

    #[test]
    fn test_feature_lookup() {
        let schema = Schema::builtin();
        assert!(schema.has_site("youtube"));
        assert!(!schema.has_site("version"));
        assert!(!schema.has_site("myspace"));
        assert!(schema.has_feature("youtube", "hideShorts"));
        assert!(schema.has_feature("youtube", ENABLED_KEY));
        assert!(!schema.has_feature("youtube", "hideNewsFeed"));
    }

    #[test]
    fn test_lists_are_leaves() {
        let node = SchemaNode::from_value(&json!({"a": [1, 2], "b": {"c": true}}));
        assert!(matches!(node.child("a"), Some(SchemaNode::Leaf(_))));
        assert!(node.child("b").is_some_and(SchemaNode::is_group));
        assert_eq!(node.to_value(), json!({"a": [1, 2], "b": {"c": true}}));
    }

    #[test]
    fn test_rejects_scalar_defaults() {
        assert!(Schema::from_defaults(&json!(true)).is_err());
    }
}
