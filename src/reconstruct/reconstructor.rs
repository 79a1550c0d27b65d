//! Schema-guided recovery of a structured patch from LLM text
//!
//! The clean path parses the outermost `{...}` as JSON and conforms it to the
//! target structure. When that fails the text is cut by key names: at each
//! node every child key is located (shallowest occurrence wins) and the value
//! is the text between it and the next located sibling.

use crate::core::types::{is_empty_value, ValueType};
use crate::reconstruct::scanner::{
    clean_scalar, extract_json_span, extract_pairs, find_all_keys, find_key, split_scalars,
};
use crate::schema::path::join;
use crate::schema::structure::{is_placeholder_map, status_placeholder, strip_prototypes};
use crate::schema::{target_structure, StateSchema};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Result of one reconstruction
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    /// Best-effort object with the full structure, defaults filled
    pub value: Value,
    /// Only the non-empty facts actually found in the text
    pub extracted: Value,
    /// Structure paths not found in the text
    pub missing: Vec<String>,
}

pub struct Reconstructor {
    schema: Arc<StateSchema>,
    structure: Value,
}

impl Reconstructor {
    pub fn new(schema: Arc<StateSchema>) -> Self {
        Self {
            structure: target_structure(&schema),
            schema,
        }
    }

    pub fn with_structure(schema: Arc<StateSchema>, structure: Value) -> Self {
        Self { schema, structure }
    }

    pub fn reconstruct(&self, text: &str) -> Reconstruction {
        let mut missing = Vec::new();

        let parsed = extract_json_span(text)
            .and_then(|span| serde_json::from_str::<Value>(span).ok())
            .filter(Value::is_object);

        let value = match parsed {
            Some(json) => self.conform(&json, &self.structure, "", &mut missing),
            None => {
                tracing::debug!("response is not valid JSON, cutting by keys");
                let body = text.find('{').map(|i| &text[i..]).unwrap_or(text);
                match self.structure.as_object() {
                    Some(proto) => Value::Object(self.cut_object(body, proto, "", &mut missing)),
                    None => Value::Object(Map::new()),
                }
            }
        };

        if !missing.is_empty() {
            tracing::debug!(missing = ?missing, "reconstruction filled defaults");
        }

        Reconstruction {
            extracted: prune_empty(&value).unwrap_or_else(|| Value::Object(Map::new())),
            value,
            missing,
        }
    }

    /// Reshape parsed JSON to the structure: unknown fields dropped,
    /// absent ones defaulted
    fn conform(&self, input: &Value, proto: &Value, path: &str, missing: &mut Vec<String>) -> Value {
        match proto {
            Value::Object(proto_map) if is_placeholder_map(proto_map) => match input {
                Value::Object(entries) => {
                    let map: Map<String, Value> = entries
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(scalar_text(v))))
                        .collect();
                    if map.is_empty() {
                        status_placeholder()
                    } else {
                        Value::Object(map)
                    }
                }
                _ => status_placeholder(),
            },
            Value::Object(proto_map) => {
                let input = match input {
                    // `"os": "Linux"` is accepted as the object's name
                    Value::String(s) if proto_map.contains_key("name") => {
                        let mut lifted = Map::new();
                        lifted.insert("name".into(), Value::String(s.clone()));
                        Value::Object(lifted)
                    }
                    other => other.clone(),
                };
                let mut out = Map::new();
                for (key, child_proto) in proto_map {
                    let child_path = join(path, key);
                    match input.get(key) {
                        Some(child) => {
                            out.insert(key.clone(), self.conform(child, child_proto, &child_path, missing));
                        }
                        None => {
                            missing.push(child_path);
                            out.insert(key.clone(), strip_prototypes(child_proto));
                        }
                    }
                }
                Value::Object(out)
            }
            Value::Array(proto_items) => {
                let member_path = format!("{}[]", path);
                let items = match input {
                    Value::Array(items) => items.clone(),
                    Value::Null => Vec::new(),
                    other if !is_empty_value(other) => vec![other.clone()],
                    _ => Vec::new(),
                };
                match proto_items.first() {
                    Some(item_proto) => Value::Array(
                        items
                            .iter()
                            .map(|item| self.conform(item, item_proto, &member_path, missing))
                            .collect(),
                    ),
                    None => Value::Array(items),
                }
            }
            scalar_proto => match input {
                Value::Object(_) | Value::Array(_) | Value::Null => scalar_proto.clone(),
                other => other.clone(),
            },
        }
    }

    fn cut_object(
        &self,
        text: &str,
        proto: &Map<String, Value>,
        path: &str,
        missing: &mut Vec<String>,
    ) -> Map<String, Value> {
        let mut hits: Vec<(&String, usize, usize)> = proto
            .keys()
            .filter_map(|key| find_key(text, key).map(|hit| (key, hit.start, hit.end)))
            .collect();
        hits.sort_by_key(|&(_, start, _)| start);

        let mut out = Map::new();
        for (i, &(key, _, end)) in hits.iter().enumerate() {
            let stop = hits.get(i + 1).map(|&(_, start, _)| start).unwrap_or(text.len());
            let segment = text.get(end..stop.max(end)).unwrap_or("");
            if let Some(child_proto) = proto.get(key) {
                let child_path = join(path, key);
                out.insert(key.clone(), self.cut_value(segment, child_proto, &child_path, missing));
            }
        }

        for (key, child_proto) in proto {
            if !out.contains_key(key) {
                missing.push(join(path, key));
                out.insert(key.clone(), strip_prototypes(child_proto));
            }
        }
        out
    }

    fn cut_value(&self, segment: &str, proto: &Value, path: &str, missing: &mut Vec<String>) -> Value {
        match proto {
            Value::Object(map) if is_placeholder_map(map) => {
                let pairs: Map<String, Value> = extract_pairs(segment)
                    .into_iter()
                    .filter(|(p, _)| !p.is_empty())
                    .map(|(p, reason)| (p, Value::String(reason)))
                    .collect();
                if pairs.is_empty() {
                    status_placeholder()
                } else {
                    Value::Object(pairs)
                }
            }
            Value::Object(map) => {
                // A bare string where an object belongs is taken as its name
                if !segment.contains('{') && map.contains_key("name") {
                    let name = clean_scalar(segment);
                    let mut out = strip_prototypes(proto);
                    out["name"] = Value::String(name);
                    return out;
                }
                Value::Object(self.cut_object(segment, map, path, missing))
            }
            Value::Array(items) => match items.first() {
                Some(Value::Object(item_proto)) => {
                    Value::Array(self.cut_list(segment, item_proto, &format!("{}[]", path)))
                }
                _ => Value::Array(split_scalars(segment).into_iter().map(Value::String).collect()),
            },
            _ => self.typed_scalar(clean_scalar(segment), path),
        }
    }

    /// Split a list body into items by repeated field keywords
    ///
    /// An item is flushed when every prototype field is filled or when a
    /// field it already holds appears again.
    fn cut_list(&self, segment: &str, item_proto: &Map<String, Value>, member_path: &str) -> Vec<Value> {
        let mut hits: Vec<(&String, usize, usize)> = item_proto
            .keys()
            .flat_map(|key| {
                find_all_keys(segment, key)
                    .into_iter()
                    .map(move |hit| (key, hit.start, hit.end))
            })
            .collect();
        hits.sort_by_key(|&(_, start, _)| start);

        let mut items = Vec::new();
        let mut current = Map::new();
        let mut nested_missing = Vec::new();

        // Keys inside a nested list value belong to that value, not to this item
        let mut skip_until = 0;
        for (i, &(key, start, end)) in hits.iter().enumerate() {
            if start < skip_until {
                continue;
            }
            if current.contains_key(key.as_str()) {
                items.push(self.finish_item(std::mem::take(&mut current), item_proto));
            }
            let Some(child_proto) = item_proto.get(key) else {
                continue;
            };
            let stop = if child_proto.is_array() {
                next_field_outside(segment, end, &hits[i + 1..], item_proto)
            } else {
                hits.get(i + 1).map(|&(_, s, _)| s).unwrap_or(segment.len())
            };
            skip_until = stop;
            let piece = segment.get(end..stop.max(end)).unwrap_or("");
            let child_path = join(member_path, key);
            current.insert(key.clone(), self.cut_value(piece, child_proto, &child_path, &mut nested_missing));

            if item_proto.keys().all(|k| current.contains_key(k)) {
                items.push(self.finish_item(std::mem::take(&mut current), item_proto));
            }
        }
        if !current.is_empty() {
            items.push(self.finish_item(current, item_proto));
        }
        items
    }

    fn finish_item(&self, mut item: Map<String, Value>, item_proto: &Map<String, Value>) -> Value {
        for (key, child_proto) in item_proto {
            if !item.contains_key(key) {
                item.insert(key.clone(), strip_prototypes(child_proto));
            }
        }
        Value::Object(item)
    }

    /// Numbers for numeric schema types, strings otherwise
    fn typed_scalar(&self, text: String, path: &str) -> Value {
        let value_type = self.schema.get(path).map(|e| e.value_type);
        match value_type {
            Some(ValueType::Int) => text
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(Value::String(text)),
            Some(ValueType::Float) => text
                .parse::<f64>()
                .ok()
                .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
                .unwrap_or(Value::String(text)),
            Some(ValueType::Bool) => match text.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(text),
            },
            _ => Value::String(text),
        }
    }
}

/// End of a nested list value: the first later field hit past its closing bracket
fn next_field_outside(
    segment: &str,
    from: usize,
    later: &[(&String, usize, usize)],
    item_proto: &Map<String, Value>,
) -> usize {
    let close = closing_bracket(segment, from);
    later
        .iter()
        .filter(|(key, _, _)| item_proto.contains_key(key.as_str()))
        .map(|&(_, start, _)| start)
        .find(|&start| close.map(|c| start > c).unwrap_or(true))
        .unwrap_or(segment.len())
}

/// Offset of the `]` closing the first `[` at or after `from`
fn closing_bracket(segment: &str, from: usize) -> Option<usize> {
    let bytes = segment.as_bytes();
    let open = (from..bytes.len()).find(|&i| bytes[i] == b'[')?;
    let mut depth = 0;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Keep only non-empty facts; placeholder maps count as empty
pub fn prune_empty(value: &Value) -> Option<Value> {
    match value {
        Value::Object(map) => {
            if is_placeholder_map(map) {
                return None;
            }
            let kept: Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| prune_empty(v).map(|p| (k.clone(), p)))
                .collect();
            (!kept.is_empty()).then_some(Value::Object(kept))
        }
        Value::Array(items) => {
            let kept: Vec<Value> = items.iter().filter_map(prune_empty).collect();
            (!kept.is_empty()).then_some(Value::Array(kept))
        }
        other if is_empty_value(other) => None,
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reconstructor() -> Reconstructor {
        Reconstructor::new(Arc::new(StateSchema::default_recon()))
    }

    #[test]
    fn test_clean_json_fast_path() {
        let text = r#"Here is the result: {"target": {"os": {"name": "Linux"}, "services": [{"port": 22, "protocol": "tcp", "service": "ssh", "extra": 1}]}}"#;
        let r = reconstructor().reconstruct(text);
        assert_eq!(r.value["target"]["os"]["name"], "Linux");
        assert_eq!(r.value["target"]["services"][0]["port"], 22);
        assert!(r.value["target"]["services"][0].get("extra").is_none());
        assert_eq!(r.value["web_directories_status"]["200"], json!({"": ""}));
        assert!(r.missing.contains(&"web_directories_status".to_string()));
    }

    #[test]
    fn test_os_string_lifted_to_name() {
        let r = reconstructor().reconstruct(r#"{"target": {"os": "Linux"}}"#);
        assert_eq!(r.value["target"]["os"]["name"], "Linux");
        assert_eq!(r.value["target"]["os"]["kernel"], "");
    }

    #[test]
    fn test_extracted_holds_only_found_facts() {
        let r = reconstructor().reconstruct(r#"{"target": {"os": {"name": "Linux"}}}"#);
        assert_eq!(r.extracted, json!({"target": {"os": {"name": "Linux"}}}));
    }

    #[test]
    fn test_fallback_cuts_services() {
        let text = r#"{"target": {"services": [{"port": 21 "protocol": "tcp", "service": "ftp"}, {"port": 80, "protocol": "tcp" "service": "http""#;
        let r = reconstructor().reconstruct(text);
        let services = r.value["target"]["services"].as_array().unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0]["port"], 21);
        assert_eq!(services[0]["service"], "ftp");
        assert_eq!(services[1]["port"], 80);
        assert_eq!(services[1]["service"], "http");
        assert_eq!(services[1]["server_type"], "");
    }

    #[test]
    fn test_fallback_status_codes() {
        let text = r#"{"web_directories_status": {"200": {"/index.php": "OK"}, "403": {"/server-status": "Forbidden"#;
        let r = reconstructor().reconstruct(text);
        assert_eq!(r.value["web_directories_status"]["200"], json!({"/index.php": "OK"}));
        assert_eq!(r.value["web_directories_status"]["403"], json!({"/server-status": "Forbidden"}));
        assert_eq!(r.value["web_directories_status"]["500"], json!({"": ""}));
    }

    #[test]
    fn test_fallback_nested_lists() {
        let text = r#"{"target": {"services": [{"port": 21, "protocol": "tcp", "service": "ftp", "supported_protocols": ["ftp"], "softwares": [{"name": "vsftpd", "version": "2.3.4"}], "server_type": "vsftpd"#;
        let r = reconstructor().reconstruct(text);
        let service = &r.value["target"]["services"][0];
        assert_eq!(service["supported_protocols"], json!(["ftp"]));
        assert_eq!(service["softwares"], json!([{"name": "vsftpd", "version": "2.3.4"}]));
        assert_eq!(service["server_type"], "vsftpd");
    }

    #[test]
    fn test_canonical_round_trip() {
        let rec = reconstructor();
        let first = rec.reconstruct(r#"{"target": {"ip": "10.0.0.1", "os": {"name": "Linux"}}}"#);
        let again = rec.reconstruct(&serde_json::to_string(&first.value).unwrap());
        assert_eq!(first.value, again.value);
        assert!(again.missing.is_empty());
    }
}
