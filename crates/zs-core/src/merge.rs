//! Schema-driven document merge
//!
//! `merge` walks the schema, not the stored value. Keys the schema does not
//! know are dropped, keys the stored value lacks come back with their
//! default, and a stored value of the wrong shape where the schema expects a
//! group is replaced by the group's defaults. The function is total.

use serde_json::{Map, Value};

use crate::schema::SchemaNode;

/// Merge `stored` against `defaults`, producing a value with exactly the
/// schema's key set at every level.
///
/// Leaves are taken from `stored` as-is whenever present, with no type
/// coercion; readers decide how to interpret odd values.
pub fn merge(defaults: &SchemaNode, stored: Option<&Value>) -> Value {
    match defaults {
        SchemaNode::Leaf(default) => stored.cloned().unwrap_or_else(|| default.clone()),
        SchemaNode::Group(children) => {
            let stored = match stored {
                Some(Value::Object(map)) => Some(map),
                _ => None,
            };

            let mut merged = Map::new();
            for (key, child) in children {
                let value = merge(child, stored.and_then(|map| map.get(key)));
                merged.insert(key.clone(), value);
            }
            Value::Object(merged)
        }
    }
}
