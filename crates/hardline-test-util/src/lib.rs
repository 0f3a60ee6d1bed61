//! Shared test utilities for the hardline workspace.
//!
//! This crate exists because several crates' tests (domain, exec, app, render) need the same
//! policy builders, and `xtask` needs `normalize_nondeterministic` at runtime, so a
//! `#[cfg(test)]` module in one crate would not suffice.

pub mod changes;
pub mod policies;

use serde_json::Value;

const ID_KEYS: &[&str] = &["change_id", "snapshot_id"];
const TIMESTAMP_KEYS: &[&str] = &["applied_at", "created_at"];

/// Normalize non-deterministic JSON fields for golden-file comparison.
///
/// - id keys (`change_id`, `snapshot_id`) are replaced with `"__ID__"` when they hold a string
/// - timestamp keys (`applied_at`, `created_at`) are replaced with `"__TIMESTAMP__"`
///
/// Both are normalized at any depth; `null` values are left alone so "no snapshot" stays visible.
pub fn normalize_nondeterministic(mut value: Value) -> Value {
    normalize_recursive(&mut value);
    value
}

fn normalize_recursive(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for key in ID_KEYS {
                if let Some(v) = map.get_mut(*key)
                    && v.is_string()
                {
                    *v = Value::String("__ID__".to_string());
                }
            }
            for key in TIMESTAMP_KEYS {
                if let Some(v) = map.get_mut(*key)
                    && v.is_string()
                {
                    *v = Value::String("__TIMESTAMP__".to_string());
                }
            }
            for val in map.values_mut() {
                normalize_recursive(val);
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                normalize_recursive(val);
            }
        }
        _ => {}
    }
}
