//! `Key=Value;Key=Value` state strings used by the service and scheduled task executors.

use std::collections::BTreeMap;

pub fn format_state(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// Unknown or malformed segments are ignored. Keys are case-sensitive.
pub fn parse_state(s: &str) -> BTreeMap<String, String> {
    s.split(';')
        .filter_map(|segment| {
            let (k, v) = segment.split_once('=')?;
            let k = k.trim();
            if k.is_empty() {
                return None;
            }
            Some((k.to_string(), v.trim().to_string()))
        })
        .collect()
}

pub fn state_bool(state: &BTreeMap<String, String>, key: &str) -> Option<bool> {
    match state.get(key)?.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
