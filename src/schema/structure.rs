//! World-model structure derived from the state schema
//!
//! `target_structure` is the shape the LLM is asked to fill and the
//! reconstructor walks. Lists carry one prototype item describing their
//! members. `blackboard_for` is the episode starting point: the same shape
//! with every list emptied, plus the auxiliary keys.

use crate::core::types::ValueType;
use crate::schema::state_schema::StateSchema;
use serde_json::{json, Map, Value};

/// HTTP status codes the built-in schema declares under `web_directories_status`
pub const STATUS_CODES: [&str; 9] = ["200", "204", "301", "302", "307", "401", "403", "404", "500"];

/// Top-level keys the LLM patch is allowed to touch
pub const PATCH_KEYS: [&str; 2] = ["target", "web_directories_status"];

/// The empty `path -> reason` map kept for status codes without entries
pub fn status_placeholder() -> Value {
    json!({"": ""})
}

/// Expected structure of a parsed observation, built from the declared
/// paths under `PATCH_KEYS`
///
/// Undeclared intermediate nodes are implied by their descendants. Leaves
/// take the empty value of their type; a dict leaf is a free-form
/// `key -> value` map and is shown as the placeholder.
pub fn target_structure(schema: &StateSchema) -> Value {
    let mut root = Value::Object(Map::new());
    for (path, entry) in schema.iter_paths() {
        let top = split_list_suffix(path.split('.').next().unwrap_or("")).0;
        if !PATCH_KEYS.contains(&top) || has_declared_descendants(schema, path) {
            continue;
        }
        let leaf = match entry.value_type {
            ValueType::Dict => status_placeholder(),
            ValueType::List => json!([""]),
            other => other.empty_value(),
        };
        let parts: Vec<&str> = path.split('.').collect();
        insert_leaf(&mut root, &parts, leaf);
    }
    root
}

/// Structure of the built-in schema
pub fn default_target_structure() -> Value {
    target_structure(&StateSchema::default_recon())
}

fn has_declared_descendants(schema: &StateSchema, path: &str) -> bool {
    let nested = format!("{}.", path);
    let member = format!("{}[]", path);
    schema
        .iter_paths()
        .any(|(other, _)| other.starts_with(&nested) || other.starts_with(&member))
}

fn insert_leaf(node: &mut Value, parts: &[&str], leaf: Value) {
    let Some((first, rest)) = parts.split_first() else {
        *node = leaf;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };
    let (key, depth) = split_list_suffix(first);
    let mut slot = map.entry(key.to_string()).or_insert(Value::Null);
    for _ in 0..depth {
        if !matches!(&*slot, Value::Array(items) if items.len() == 1) {
            *slot = Value::Array(vec![Value::Null]);
        }
        let Some(prototype) = slot.as_array_mut().and_then(|items| items.first_mut()) else {
            return;
        };
        slot = prototype;
    }
    insert_leaf(slot, rest, leaf);
}

/// Fresh blackboard contents for a target
pub fn blackboard_for(schema: &StateSchema, target_ip: &str) -> Value {
    let mut board = strip_prototypes(&target_structure(schema));
    if let Some(target) = board.get_mut("target").and_then(Value::as_object_mut) {
        target.insert("ip".into(), Value::String(target_ip.to_string()));
    }
    if let Some(map) = board.as_object_mut() {
        for key in ["actions_log", "errors", "reward_log", "vulnerabilities_found", "cpes", "failed_cves"] {
            map.insert(key.into(), json!([]));
        }
        map.insert("attack_impact".into(), json!({"shell_opened": false}));
        map.insert("runtime_behavior".into(), json!({"detected_by_defenses": false}));
    }
    board
}

/// Fresh blackboard for the built-in schema
pub fn default_blackboard(target_ip: &str) -> Value {
    blackboard_for(&StateSchema::default_recon(), target_ip)
}

/// Copy of a structure with every list emptied
pub fn strip_prototypes(value: &Value) -> Value {
    match value {
        Value::Array(_) => Value::Array(Vec::new()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), strip_prototypes(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Prototype list member at a schema path such as `target.services[]`
///
/// Walks the default structure, taking the first element at each `[]`.
pub fn prototype_at(structure: &Value, member_path: &str) -> Option<Value> {
    let mut current = structure;
    for part in member_path.split('.') {
        let (key, depth) = split_list_suffix(part);
        current = current.get(key)?;
        for _ in 0..depth {
            current = current.as_array()?.first()?;
        }
    }
    Some(current.clone())
}

fn split_list_suffix(part: &str) -> (&str, usize) {
    let mut key = part;
    let mut depth = 0;
    while let Some(stripped) = key.strip_suffix("[]") {
        key = stripped;
        depth += 1;
    }
    (key, depth)
}

/// Whether a map is a `path -> reason` map holding only the placeholder
pub fn is_placeholder_map(map: &Map<String, Value>) -> bool {
    map.len() == 1 && map.get("").map(|v| v == "").unwrap_or(false)
}

/// Keep the `"" -> ""` placeholder iff the map has no real entries
pub fn normalize_placeholder(map: &mut Map<String, Value>) {
    let has_real = map.keys().any(|k| !k.is_empty());
    if has_real {
        map.remove("");
    } else {
        map.clear();
        map.insert(String::new(), Value::String(String::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_blackboard_shape() {
        let board = default_blackboard("192.168.56.101");
        assert_eq!(board["target"]["ip"], "192.168.56.101");
        assert_eq!(board["target"]["services"], json!([]));
        assert_eq!(board["web_directories_status"]["404"], json!({"": ""}));
        assert_eq!(board["attack_impact"]["shell_opened"], false);
        assert!(board["actions_log"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_prototype_lookup() {
        let structure = default_target_structure();
        let service = prototype_at(&structure, "target.services[]").unwrap();
        assert_eq!(service["port"], 0);
        let software = prototype_at(&structure, "target.services[].softwares[]").unwrap();
        assert_eq!(software, json!({"name": "", "version": ""}));
        assert!(prototype_at(&structure, "target.nothing[]").is_none());
    }

    #[test]
    fn test_structure_follows_declared_paths() {
        let expected = json!({
            "target": {
                "ip": "",
                "os": {
                    "name": "",
                    "distribution": {"name": "", "version": ""},
                    "kernel": "",
                    "architecture": ""
                },
                "services": [{
                    "port": 0,
                    "protocol": "",
                    "service": "",
                    "server_type": "",
                    "server_version": "",
                    "supported_protocols": [""],
                    "softwares": [{"name": "", "version": ""}]
                }]
            },
            "web_directories_status": {
                "200": {"": ""}, "204": {"": ""}, "301": {"": ""},
                "302": {"": ""}, "307": {"": ""}, "401": {"": ""},
                "403": {"": ""}, "404": {"": ""}, "500": {"": ""}
            }
        });
        assert_eq!(default_target_structure(), expected);
    }

    #[test]
    fn test_structure_tracks_schema_changes() {
        use crate::schema::SchemaEntry;

        let schema = StateSchema::from_entries(vec![
            ("target.services[].port".to_string(), SchemaEntry::new(ValueType::Int)),
            ("target.services[].banner_lines[]".to_string(), SchemaEntry::new(ValueType::String)),
            ("web_directories_status.418".to_string(), SchemaEntry::new(ValueType::Dict)),
            ("failed_cves".to_string(), SchemaEntry::new(ValueType::List)),
        ])
        .unwrap();
        assert_eq!(
            target_structure(&schema),
            json!({
                "target": {"services": [{"port": 0, "banner_lines": [""]}]},
                "web_directories_status": {"418": {"": ""}}
            })
        );
        assert_eq!(schema.status_codes(), vec!["418"]);

        let board = blackboard_for(&schema, "10.0.0.2");
        assert_eq!(board["target"]["ip"], "10.0.0.2");
        assert_eq!(board["target"]["services"], json!([]));
        assert_eq!(board["web_directories_status"], json!({"418": {"": ""}}));
    }

    #[test]
    fn test_normalize_placeholder() {
        let mut map = Map::new();
        map.insert("".into(), json!(""));
        map.insert("/admin".into(), json!("Forbidden"));
        normalize_placeholder(&mut map);
        assert!(!map.contains_key(""));

        let mut empty = Map::new();
        normalize_placeholder(&mut empty);
        assert!(is_placeholder_map(&empty));
    }
}
