//! Schema-guided flattening of the world-model into primitive features

use crate::core::types::EncoderKind;
use crate::encoder::features::Primitive;
use crate::schema::path::join;
use crate::schema::structure::prototype_at;
use crate::schema::StateSchema;
use serde_json::Value;
use std::collections::BTreeMap;

/// Top-level keys that never reach the policy
pub const EXCLUDED_PREFIXES: [&str; 5] = [
    "cpes",
    "vulnerabilities_found",
    "actions_log",
    "errors",
    "reward_log",
];

/// Flatten a state into `canonical dotted key -> primitive`
///
/// `structure` supplies list prototypes used when a list is padded to its
/// declared `max_items`.
pub fn flatten(state: &Value, schema: &StateSchema, structure: &Value) -> BTreeMap<String, Primitive> {
    let mut out = BTreeMap::new();
    walk(state, "", "", schema, structure, &mut out);
    out
}

fn walk(
    value: &Value,
    key: &str,
    schema_path: &str,
    schema: &StateSchema,
    structure: &Value,
    out: &mut BTreeMap<String, Primitive>,
) {
    if is_excluded(key) {
        return;
    }
    let entry = schema.get(schema_path);

    match value {
        Value::Object(map) => {
            if entry.and_then(|e| e.encoder) == Some(EncoderKind::Count) {
                let real = map.keys().filter(|k| !k.is_empty()).count();
                out.insert(key.to_string(), Primitive::Number(real as f64));
                return;
            }
            for (k, v) in map {
                walk(v, &join(key, k), &join(schema_path, k), schema, structure, out);
            }
        }
        Value::Array(items) => {
            if let Some(n) = entry.and_then(|e| e.opaque_items) {
                for i in 0..n {
                    let id = items.get(i).map(numeric_identifier).unwrap_or(0.0);
                    out.insert(format!("{}[{}]", key, i), Primitive::Number(id));
                }
                return;
            }

            let member_path = format!("{}[]", schema_path);
            let corrected = match entry.and_then(|e| e.max_items) {
                Some(max) => correct_list(items, max, structure, &member_path),
                None => items.clone(),
            };
            for (i, item) in corrected.iter().enumerate() {
                walk(item, &format!("{}[{}]", key, i), &member_path, schema, structure, out);
            }
        }
        other => {
            out.insert(key.to_string(), primitive_of(other));
        }
    }
}

fn is_excluded(key: &str) -> bool {
    EXCLUDED_PREFIXES.iter().any(|prefix| {
        key == *prefix
            || key
                .strip_prefix(prefix)
                .map(|rest| rest.starts_with('.') || rest.starts_with('['))
                .unwrap_or(false)
    })
}

/// Pad with the member prototype or truncate to exactly `max` items
pub fn correct_list(items: &[Value], max: usize, structure: &Value, member_path: &str) -> Vec<Value> {
    let mut corrected: Vec<Value> = items.iter().take(max).cloned().collect();
    if corrected.len() < max {
        let prototype = prototype_at(structure, member_path).unwrap_or(Value::Null);
        corrected.resize(max, prototype);
    }
    corrected
}

/// Primitive form of a JSON scalar
pub fn primitive_of(value: &Value) -> Primitive {
    match value {
        Value::Bool(b) => Primitive::Number(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => Primitive::Number(n.as_f64().unwrap_or(0.0)),
        Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
            Primitive::Number(s.parse::<f64>().unwrap_or(0.0))
        }
        Value::String(s) => Primitive::Text(s.clone()),
        _ => Primitive::Number(0.0),
    }
}

/// Digits of an opaque identifier (`CVE-2021-44228` -> 202144228)
fn numeric_identifier(value: &Value) -> f64 {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<f64>().unwrap_or(0.0)
}
