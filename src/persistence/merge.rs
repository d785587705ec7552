//! Structural deep merge of JSON documents

use serde_json::Value;

/// Merge `overlay` into `base`.
///
/// - Keys present in both where both values are objects are merged recursively
/// - Any other key present in `overlay` replaces the value in `base`
/// - Keys present only in `base` are kept untouched, at every depth
///
/// A non-object overlay replaces the base outright.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => {
                        let base_value = slot.take();
                        *slot = deep_merge(base_value, overlay_value);
                    }
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}
