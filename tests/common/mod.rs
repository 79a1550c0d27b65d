//! Shared proptest strategies for world-model shaped values

#![allow(dead_code)]

use proptest::prelude::*;
use recon_agent::schema::STATUS_CODES;
use serde_json::{json, Map, Value};

pub const TARGET: &str = "10.0.0.5";

pub fn service() -> impl Strategy<Value = Value> {
    (
        prop::sample::select(vec![21u16, 22, 25, 80, 139, 443, 445, 3306, 8080]),
        prop::sample::select(vec!["tcp", "udp"]),
        prop::sample::select(vec!["", "ftp", "ssh", "http", "mysql"]),
        prop::collection::vec(prop::sample::select(vec!["tls", "http", "ftp"]), 0..3),
    )
        .prop_map(|(port, protocol, service, protocols)| {
            json!({
                "port": port,
                "protocol": protocol,
                "service": service,
                "supported_protocols": protocols,
            })
        })
}

pub fn web_statuses() -> impl Strategy<Value = Value> {
    prop::collection::vec(
        (
            prop::sample::select(STATUS_CODES.to_vec()),
            prop::sample::select(vec!["/", "/admin", "/index.php", "/login", "/.git"]),
            prop::sample::select(vec!["OK", "Forbidden", "Moved", ""]),
        ),
        0..6,
    )
    .prop_map(|entries| {
        let mut codes = Map::new();
        for (code, path, reason) in entries {
            let paths = codes
                .entry(code.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(map) = paths.as_object_mut() {
                map.insert(path.to_string(), Value::String(reason.to_string()));
            }
        }
        Value::Object(codes)
    })
}

/// A patch shaped like a parsed observation
pub fn patch() -> impl Strategy<Value = Value> {
    (
        prop::option::of(prop::sample::select(vec!["Linux", "Windows", "FreeBSD"])),
        prop::collection::vec(service(), 0..5),
        web_statuses(),
    )
        .prop_map(|(os, services, statuses)| {
            let mut target = Map::new();
            if let Some(name) = os {
                target.insert("os".into(), json!({"name": name}));
            }
            target.insert("services".into(), Value::Array(services));
            json!({"target": Value::Object(target), "web_directories_status": statuses})
        })
}

/// Any JSON leaf a model might emit where a scalar is expected
pub fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-70_000i64..70_000).prop_map(Value::from),
        (-1.0e4f64..1.0e4).prop_map(Value::from),
        "[a-zA-Z0-9 ./-]{0,12}".prop_map(Value::String),
    ]
}

/// Loosely shaped output with wrongly typed leaves and stray keys
pub fn messy_patch() -> impl Strategy<Value = Value> {
    (
        leaf(),
        prop_oneof![leaf(), leaf().prop_map(|name| json!({"name": name}))],
        prop::collection::vec((leaf(), leaf(), leaf()), 0..4),
        prop::collection::vec((prop::sample::select(STATUS_CODES.to_vec()), leaf()), 0..4),
        leaf(),
    )
        .prop_map(|(ip, os, services, statuses, stray)| {
            let services: Vec<Value> = services
                .into_iter()
                .map(|(port, protocol, service)| {
                    json!({"port": port, "protocol": protocol, "service": service})
                })
                .collect();
            let mut codes = Map::new();
            for (code, reason) in statuses {
                codes.insert(code.to_string(), json!({"/probe": reason}));
            }
            json!({
                "target": {"ip": ip, "os": os, "services": services, "hostname": stray},
                "web_directories_status": Value::Object(codes),
                "notes": "unparsed",
            })
        })
}
