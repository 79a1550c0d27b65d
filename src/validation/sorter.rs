//! Canonical ordering of lists and placeholder maps

use crate::blackboard::merge::{identity_key, merge_into, scalar_string};
use crate::core::types::ValueType;
use crate::schema::structure::normalize_placeholder;
use crate::schema::StateSchema;
use ordered_float::OrderedFloat;
use serde_json::Value;
use std::cmp::Ordering;

/// One component of a sort key: numbers order before text
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    Number(OrderedFloat<f64>),
    Text(String),
}

impl KeyPart {
    fn of(s: &str) -> Self {
        match s.parse::<f64>() {
            Ok(n) if n.is_finite() => KeyPart::Number(OrderedFloat(n)),
            _ => KeyPart::Text(s.to_string()),
        }
    }
}

fn sort_key(item: &Value, fields: &[String]) -> Vec<KeyPart> {
    if item.is_object() {
        identity_key(item, fields).iter().map(|s| KeyPart::of(s)).collect()
    } else {
        vec![KeyPart::of(&scalar_string(item))]
    }
}

/// Dedupe declared lists by identity and sort them numeric-then-lexicographic
///
/// Object keys need no work: `serde_json::Map` keeps them sorted. Maps
/// holding the `"" -> ""` placeholder are normalized.
pub fn sort_state(value: &Value, schema: &StateSchema) -> Value {
    let mut out = value.clone();

    for (raw, entry) in schema.iter_paths() {
        if entry.value_type != ValueType::List || entry.opaque_items.is_some() {
            continue;
        }
        let Some(path) = schema.parsed_path(raw) else {
            continue;
        };
        let fields = schema.identity_fields(raw);
        let member_path = format!("{}[]", raw);
        for list in path.resolve_mut(&mut out) {
            if let Some(items) = list.as_array_mut() {
                let deduped = dedupe(std::mem::take(items), &fields, schema, &member_path);
                *items = deduped;
                items.sort_by(|a, b| compare(a, b, &fields));
            }
        }
    }

    normalize_all_placeholders(&mut out);
    out
}

/// Later duplicates merge into the first item with the same identity
fn dedupe(items: Vec<Value>, fields: &[String], schema: &StateSchema, member_path: &str) -> Vec<Value> {
    let mut kept: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        let key = sort_key(&item, fields);
        match kept.iter_mut().find(|k| sort_key(k, fields) == key) {
            Some(existing) => merge_into(existing, &item, schema, member_path),
            None => kept.push(item),
        }
    }
    kept
}

fn compare(a: &Value, b: &Value, fields: &[String]) -> Ordering {
    sort_key(a, fields).cmp(&sort_key(b, fields))
}

fn normalize_all_placeholders(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.contains_key("") {
                normalize_placeholder(map);
            }
            for child in map.values_mut() {
                normalize_all_placeholders(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_all_placeholders),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_services_sorted_numeric_first() {
        let schema = StateSchema::default_recon();
        let state = json!({"target": {"services": [
            {"port": 80, "protocol": "tcp", "service": "http"},
            {"port": 21, "protocol": "tcp", "service": "ftp"},
            {"port": 22, "protocol": "tcp", "service": "ssh"}
        ]}});
        let sorted = sort_state(&state, &schema);
        let ports: Vec<_> = sorted["target"]["services"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["port"].as_i64().unwrap())
            .collect();
        assert_eq!(ports, vec![21, 22, 80]);
    }

    #[test]
    fn test_duplicates_merge() {
        let schema = StateSchema::default_recon();
        let state = json!({"target": {"services": [
            {"port": 22, "protocol": "tcp", "service": ""},
            {"port": 22, "protocol": "tcp", "service": "ssh"}
        ]}});
        let sorted = sort_state(&state, &schema);
        let services = sorted["target"]["services"].as_array().unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0]["service"], "ssh");
    }

    #[test]
    fn test_scalar_lists_and_placeholders() {
        let schema = StateSchema::default_recon();
        let state = json!({
            "target": {"services": [{"port": 443, "protocol": "tcp",
                                     "supported_protocols": ["tls", "http", "tls"]}]},
            "web_directories_status": {"200": {"": "", "/b": "OK"}}
        });
        let sorted = sort_state(&state, &schema);
        assert_eq!(sorted["target"]["services"][0]["supported_protocols"], json!(["http", "tls"]));
        assert_eq!(sorted["web_directories_status"]["200"], json!({"/b": "OK"}));
    }

    #[test]
    fn test_key_part_order() {
        assert!(KeyPart::of("9") < KeyPart::of("10"));
        assert!(KeyPart::of("10") < KeyPart::of("abc"));
        assert!(KeyPart::of("abc") < KeyPart::of("abd"));
    }
}
