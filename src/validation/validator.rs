//! Type validation and default filling
//!
//! `validate` is idempotent: every leaf is coerced to its declared type (or
//! the type's empty value), every declared path is present, and list items
//! equal to the list prototype are pruned.

use crate::core::types::ValueType;
use crate::schema::path::join;
use crate::schema::structure::{is_placeholder_map, normalize_placeholder, strip_prototypes};
use crate::schema::{target_structure, Segment, StateSchema};
use serde_json::{Map, Number, Value};
use std::sync::Arc;

pub struct Validator {
    schema: Arc<StateSchema>,
    structure: Value,
}

impl Validator {
    pub fn new(schema: Arc<StateSchema>) -> Self {
        Self {
            structure: target_structure(&schema),
            schema,
        }
    }

    pub fn validate(&self, value: &Value) -> Value {
        let mut out = self.walk(value, &self.structure, "");
        self.fill_declared(&mut out);
        out
    }

    fn walk(&self, value: &Value, proto: &Value, path: &str) -> Value {
        match proto {
            Value::Object(proto_map) if is_placeholder_map(proto_map) => {
                let mut map: Map<String, Value> = match value {
                    Value::Object(entries) => entries
                        .iter()
                        .map(|(k, v)| (k.clone(), coerce(v, ValueType::String)))
                        .collect(),
                    _ => Map::new(),
                };
                normalize_placeholder(&mut map);
                Value::Object(map)
            }
            Value::Object(proto_map) => {
                let mut out = Map::new();
                for (key, child_proto) in proto_map {
                    let child_path = join(path, key);
                    let child = value.get(key).unwrap_or(&Value::Null);
                    out.insert(key.clone(), self.walk(child, child_proto, &child_path));
                }
                Value::Object(out)
            }
            Value::Array(proto_items) => {
                let member_path = format!("{}[]", path);
                let Some(item_proto) = proto_items.first() else {
                    return Value::Array(value.as_array().cloned().unwrap_or_default());
                };
                let pruned_proto = self.walk(item_proto, item_proto, &member_path);
                let items = value
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .map(|item| self.walk(item, item_proto, &member_path))
                            .filter(|item| *item != pruned_proto && *item != *item_proto)
                            .collect()
                    })
                    .unwrap_or_default();
                Value::Array(items)
            }
            scalar_proto => {
                let expected = self
                    .schema
                    .get(path)
                    .map(|e| e.value_type)
                    .unwrap_or_else(|| type_of(scalar_proto));
                coerce(value, expected)
            }
        }
    }

    /// Insert every declared non-member path missing from the value
    fn fill_declared(&self, out: &mut Value) {
        for (raw, entry) in self.schema.iter_paths() {
            let Some(path) = self.schema.parsed_path(raw) else {
                continue;
            };
            let mut keys = Vec::new();
            let mut member = false;
            for segment in path.segments() {
                match segment {
                    Segment::Key(k) => keys.push(k.as_str()),
                    Segment::Each => member = true,
                }
            }
            if member {
                continue;
            }
            ensure_path(out, &keys, entry.value_type.empty_value());
        }
    }
}

fn ensure_path(root: &mut Value, keys: &[&str], default: Value) {
    let Some((last, parents)) = keys.split_last() else {
        return;
    };
    let mut current = root;
    for key in parents {
        let Some(map) = current.as_object_mut() else {
            return;
        };
        current = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Some(map) = current.as_object_mut() {
        map.entry(last.to_string()).or_insert(default);
    }
}

fn type_of(proto: &Value) -> ValueType {
    match proto {
        Value::Bool(_) => ValueType::Bool,
        Value::Number(n) if n.is_f64() => ValueType::Float,
        Value::Number(_) => ValueType::Int,
        Value::Array(_) => ValueType::List,
        Value::Object(_) => ValueType::Dict,
        _ => ValueType::String,
    }
}

/// Coerce a value to a declared type, or that type's empty value
pub fn coerce(value: &Value, expected: ValueType) -> Value {
    let text = match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    };

    match expected {
        ValueType::String => match value {
            Value::String(s) => Value::String(s.clone()),
            Value::Number(_) | Value::Bool(_) => Value::String(text.unwrap_or_default()),
            _ => expected.empty_value(),
        },
        ValueType::Int => {
            let parsed = text.and_then(|t| {
                t.parse::<i64>().ok().or_else(|| {
                    t.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0 && f.is_finite())
                        .map(|f| f as i64)
                })
            });
            parsed.map(Value::from).unwrap_or_else(|| expected.empty_value())
        }
        ValueType::Float => text
            .and_then(|t| t.parse::<f64>().ok())
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| expected.empty_value()),
        ValueType::Bool => match text.as_deref() {
            Some("true") => Value::Bool(true),
            Some("false") => Value::Bool(false),
            _ => expected.empty_value(),
        },
        ValueType::Dict => match value {
            Value::Object(_) => value.clone(),
            _ => expected.empty_value(),
        },
        ValueType::List => match value {
            Value::Array(_) => value.clone(),
            _ => expected.empty_value(),
        },
    }
}

/// Fresh patch with every declared path at its default
pub fn default_patch(schema: Arc<StateSchema>) -> Value {
    let validator = Validator::new(schema);
    let mut out = strip_prototypes(&validator.structure);
    validator.fill_declared(&mut out);
    out
}
