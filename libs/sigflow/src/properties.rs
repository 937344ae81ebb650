//! Property and settings maps.
//!
//! Blocks are constructed from a loosely-typed settings map and carry a
//! free-form meta-information map for anything that is not part of the
//! processing contract (UI hints, provenance, counters). Both are JSON-valued
//! so they serialise with the rest of the system.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Free-form string-keyed map of JSON values.
pub type PropertyMap = HashMap<String, Value>;

/// Initial configuration handed to a block constructor.
pub type SettingsMap = PropertyMap;

/// Payload of one message-port message.
pub type Message = PropertyMap;

/// Read a typed value out of a property map.
///
/// Returns `None` when the key is absent or the value does not deserialize
/// into `T`.
pub fn get_typed<T: DeserializeOwned>(map: &PropertyMap, key: &str) -> Option<T> {
    map.get(key)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Convenience constructor for single-entry maps, mostly used in tests and
/// examples.
pub fn property(key: &str, value: impl Into<Value>) -> PropertyMap {
    let mut map = PropertyMap::new();
    map.insert(key.to_string(), value.into());
    map
}
