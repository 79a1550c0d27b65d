//! Pure merge of an observation patch into the world-model
//!
//! Rules:
//! - scalars overwrite only when the current value is empty
//! - objects recurse, new keys are inserted
//! - lists of objects append items whose identity is not present yet and
//!   merge the rest into the matching item
//! - lists of scalars union-append
//! - `path -> reason` maps drop the `"" -> ""` placeholder once a real path
//!   exists
//!
//! `merge(merge(b, p), p) == merge(b, p)` for every patch.

use crate::core::types::is_empty_value;
use crate::schema::path::join;
use crate::schema::structure::normalize_placeholder;
use crate::schema::StateSchema;
use serde_json::Value;

/// Merge `patch` into a copy of `old`
pub fn merge(old: &Value, patch: &Value, schema: &StateSchema) -> Value {
    let mut out = old.clone();
    merge_into(&mut out, patch, schema, "");
    out
}

/// In-place variant used by the blackboard
pub fn merge_into(current: &mut Value, patch: &Value, schema: &StateSchema, path: &str) {
    match (current, patch) {
        (Value::Object(cur), Value::Object(inc)) => {
            for (key, value) in inc {
                let child_path = join(path, key);
                match cur.get_mut(key) {
                    Some(existing) => merge_into(existing, value, schema, &child_path),
                    None => {
                        cur.insert(key.clone(), value.clone());
                    }
                }
            }
            if cur.contains_key("") {
                normalize_placeholder(cur);
            }
        }
        (Value::Array(cur), Value::Array(inc)) => {
            let fields = schema.identity_fields(path);
            let member_path = format!("{}[]", path);
            for item in inc {
                if item.is_object() {
                    let key = identity_key(item, &fields);
                    if key.iter().all(|k| k.is_empty()) {
                        continue;
                    }
                    match cur.iter_mut().find(|c| identity_key(c, &fields) == key) {
                        Some(existing) => merge_into(existing, item, schema, &member_path),
                        None => cur.push(item.clone()),
                    }
                } else if !is_empty_value(item) && !cur.contains(item) {
                    cur.push(item.clone());
                }
            }
        }
        (cur, inc) => {
            if is_empty_value(cur) && !is_empty_value(inc) {
                *cur = inc.clone();
            }
        }
    }
}

/// Identity tuple of a list item, stringified
///
/// With no declared fields the whole item is the identity.
pub fn identity_key(item: &Value, fields: &[String]) -> Vec<String> {
    if fields.is_empty() {
        return vec![item.to_string()];
    }
    fields
        .iter()
        .map(|f| match item.get(f) {
            Some(value) if !is_empty_value(value) => scalar_string(value),
            _ => String::new(),
        })
        .collect()
}

/// String form of a primitive (strings unquoted)
pub fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::default_blackboard;
    use serde_json::json;

    fn schema() -> StateSchema {
        StateSchema::default_recon()
    }

    #[test]
    fn test_scalar_overwrites_only_empty() {
        let board = default_blackboard("10.0.0.1");
        let patch = json!({"target": {"ip": "10.9.9.9", "os": {"name": "Linux"}}});
        let merged = merge(&board, &patch, &schema());
        assert_eq!(merged["target"]["ip"], "10.0.0.1");
        assert_eq!(merged["target"]["os"]["name"], "Linux");

        let again = merge(&merged, &json!({"target": {"os": {"name": "Windows"}}}), &schema());
        assert_eq!(again["target"]["os"]["name"], "Linux");
    }

    #[test]
    fn test_services_append_by_identity() {
        let board = default_blackboard("10.0.0.1");
        let patch = json!({"target": {"services": [
            {"port": 22, "protocol": "tcp", "service": "ssh"},
            {"port": 80, "protocol": "tcp", "service": ""}
        ]}});
        let merged = merge(&board, &patch, &schema());
        assert_eq!(merged["target"]["services"].as_array().unwrap().len(), 2);

        let update = json!({"target": {"services": [
            {"port": 80, "protocol": "tcp", "service": "http", "server_type": "Apache httpd"}
        ]}});
        let merged = merge(&merged, &update, &schema());
        let services = merged["target"]["services"].as_array().unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[1]["service"], "http");
        assert_eq!(services[1]["server_type"], "Apache httpd");
    }

    #[test]
    fn test_placeholder_dropped_on_real_path() {
        let board = default_blackboard("10.0.0.1");
        let patch = json!({"web_directories_status": {"200": {"/index.html": "OK"}, "403": {"": ""}}});
        let merged = merge(&board, &patch, &schema());
        assert_eq!(merged["web_directories_status"]["200"], json!({"/index.html": "OK"}));
        assert_eq!(merged["web_directories_status"]["403"], json!({"": ""}));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let board = default_blackboard("10.0.0.1");
        let patch = json!({
            "target": {"services": [{"port": 21, "protocol": "tcp", "service": "ftp",
                                      "supported_protocols": ["ftp", "ftps"]}]},
            "web_directories_status": {"301": {"/admin": "Moved"}}
        });
        let once = merge(&board, &patch, &schema());
        let twice = merge(&once, &patch, &schema());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_identity_key_stringifies() {
        let fields = vec!["port".to_string(), "protocol".to_string()];
        assert_eq!(
            identity_key(&json!({"port": 22, "protocol": "tcp"}), &fields),
            vec!["22".to_string(), "tcp".to_string()]
        );
    }
}
