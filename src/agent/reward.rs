//! Schema-driven step reward
//!
//! ```text
//! r = (repeat ? -2 * count(a) : +0.1)
//!   + Σ_path w(path) * |new primitives at path|
//!   + (no discovery ? -1 : 0)
//! return r / reward_scale
//! ```

use crate::blackboard::scalar_string;
use crate::core::types::is_empty_value;
use crate::schema::StateSchema;
use serde_json::Value;
use std::collections::BTreeSet;

pub const FIRST_USE_BONUS: f32 = 0.1;
pub const REPEAT_PENALTY: f32 = -2.0;
pub const NO_DISCOVERY_PENALTY: f32 = -1.0;

/// Reward for moving from `prev` to `next` with an action already taken
/// `times_taken` times this episode
pub fn compute_reward(
    prev: &Value,
    next: &Value,
    schema: &StateSchema,
    times_taken: usize,
    reward_scale: f32,
) -> f32 {
    let mut reward = if times_taken > 0 {
        REPEAT_PENALTY * times_taken as f32
    } else {
        FIRST_USE_BONUS
    };

    let discovery = discovery_reward(prev, next, schema);
    if discovery > 0.0 {
        reward += discovery;
    } else {
        reward += NO_DISCOVERY_PENALTY;
    }

    let scaled = reward / reward_scale;
    tracing::debug!(times_taken, discovery, reward = scaled, "step reward");
    scaled
}

/// `Σ w·k` over rewarded paths, `k` = primitives in `next` absent from `prev`
pub fn discovery_reward(prev: &Value, next: &Value, schema: &StateSchema) -> f32 {
    schema
        .rewarded_paths()
        .map(|(path, weight)| {
            let before = reachable_primitives(&path.resolve(prev));
            let after = reachable_primitives(&path.resolve(next));
            let fresh = after.difference(&before).count();
            weight * fresh as f32
        })
        .sum()
}

fn reachable_primitives(values: &[&Value]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for value in values {
        collect(value, &mut out);
    }
    out
}

fn collect(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            out.extend(map.keys().filter(|k| !k.is_empty()).cloned());
        }
        Value::Array(items) => {
            for item in items {
                collect(item, out);
            }
        }
        scalar if !is_empty_value(scalar) => {
            out.insert(scalar_string(scalar));
        }
        _ => {}
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

    fn with_services(ports: &[u64]) -> Value {
        let mut board = default_blackboard("192.168.56.101");
        board["target"]["services"] = ports
            .iter()
            .map(|p| json!({"port": p, "protocol": "tcp", "service": ""}))
            .collect();
        board
    }

    #[test]
    fn test_three_new_ports() {
        let reward = compute_reward(&with_services(&[]), &with_services(&[21, 22, 80]), &schema(), 0, 4.0);
        assert!((reward - 0.175).abs() < 1e-6);
    }

    #[test]
    fn test_repeat_without_discovery() {
        let state = with_services(&[21, 22, 80]);
        let reward = compute_reward(&state, &state, &schema(), 1, 4.0);
        assert!((reward + 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_novel_action_without_discovery() {
        let state = with_services(&[22]);
        let reward = compute_reward(&state, &state, &schema(), 0, 4.0);
        assert!((reward + 0.225).abs() < 1e-6);
    }

    #[test]
    fn test_web_paths_count_keys_not_placeholder() {
        let prev = default_blackboard("10.0.0.1");
        let mut next = prev.clone();
        next["web_directories_status"]["200"] = json!({"/admin": "OK", "/login": "OK"});
        assert!((discovery_reward(&prev, &next, &schema()) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_os_name_discovery() {
        let prev = default_blackboard("10.0.0.1");
        let mut next = prev.clone();
        next["target"]["os"]["name"] = json!("Linux");
        let reward = compute_reward(&prev, &next, &schema(), 0, 4.0);
        assert!(reward > 0.0);
        assert!((reward - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_lost_facts_are_not_discoveries() {
        let reward = compute_reward(&with_services(&[21, 22]), &with_services(&[21]), &schema(), 0, 4.0);
        assert!(reward < 0.0);
    }
}
