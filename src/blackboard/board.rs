//! Shared world-model for one episode

use crate::blackboard::merge::merge_into;
use crate::schema::{blackboard_for, StateSchema};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// The blackboard every agent reads from and writes to
///
/// Created per episode with a fixed target IP. Agents mutate it only through
/// `update` and the log operations; everything else is read-only.
pub struct Blackboard {
    state: Value,
    schema: Arc<StateSchema>,
    target_ip: String,
    started: Instant,
}

impl Blackboard {
    /// Fresh blackboard matching the schema's structure
    pub fn initialize(target_ip: &str, schema: Arc<StateSchema>) -> Self {
        Self {
            state: blackboard_for(&schema, target_ip),
            schema,
            target_ip: target_ip.to_string(),
            started: Instant::now(),
        }
    }

    /// Discard everything learned and start over with the same target
    pub fn reset(&mut self) {
        self.state = blackboard_for(&self.schema, &self.target_ip);
        self.started = Instant::now();
    }

    /// Deep copy of the world-model for an agent
    pub fn snapshot(&self, agent: &str) -> Value {
        tracing::trace!(agent, "blackboard snapshot");
        self.state.clone()
    }

    /// Merge an observation patch into the world-model
    pub fn update(&mut self, agent: &str, patch: &Value) {
        tracing::debug!(agent, "blackboard update");
        merge_into(&mut self.state, patch, &self.schema, "");
    }

    pub fn append_action_log(&mut self, mut entry: Value) {
        if let Some(map) = entry.as_object_mut() {
            map.insert("timestamp".into(), json!(self.elapsed()));
            map.insert("time".into(), json!(Utc::now().to_rfc3339()));
        }
        self.push_aux("actions_log", entry);
    }

    pub fn record_reward(&mut self, action: &str, reward: f32) {
        let entry = json!({
            "action": action,
            "reward": reward,
            "timestamp": self.elapsed(),
        });
        self.push_aux("reward_log", entry);
    }

    pub fn add_error(&mut self, agent: &str, action: &str, message: &str) {
        tracing::warn!(agent, action, message, "agent error recorded");
        let entry = json!({
            "agent": agent,
            "action": action,
            "message": message,
            "timestamp": self.elapsed(),
            "time": Utc::now().to_rfc3339(),
        });
        self.push_aux("errors", entry);
    }

    /// Number of errors recorded for an agent
    pub fn errors_for(&self, agent: &str) -> usize {
        self.state["errors"]
            .as_array()
            .map(|errors| errors.iter().filter(|e| e["agent"] == agent).count())
            .unwrap_or(0)
    }

    /// Seconds since the last error recorded for an agent
    pub fn seconds_since_last_error(&self, agent: &str) -> Option<f64> {
        let last = self.state["errors"]
            .as_array()?
            .iter()
            .rev()
            .find(|e| e["agent"] == agent)?
            .get("timestamp")?
            .as_f64()?;
        Some(self.elapsed() - last)
    }

    pub fn has_services(&self) -> bool {
        self.state["target"]["services"]
            .as_array()
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    pub fn shell_opened(&self) -> bool {
        self.state["attack_impact"]["shell_opened"]
            .as_bool()
            .unwrap_or(false)
    }

    pub fn detected_by_defenses(&self) -> bool {
        self.state["runtime_behavior"]["detected_by_defenses"]
            .as_bool()
            .unwrap_or(false)
    }

    /// Set by exploitation collaborators once a shell is obtained
    pub fn mark_shell_opened(&mut self) {
        self.state["attack_impact"]["shell_opened"] = Value::Bool(true);
    }

    /// Set by the defense-monitoring collaborator
    pub fn mark_detected(&mut self) {
        self.state["runtime_behavior"]["detected_by_defenses"] = Value::Bool(true);
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn schema(&self) -> &Arc<StateSchema> {
        &self.schema
    }

    pub fn target_ip(&self) -> &str {
        &self.target_ip
    }

    /// Monotonic seconds since the board was created
    pub fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn push_aux(&mut self, key: &str, entry: Value) {
        let slot = &mut self.state[key];
        match slot.as_array_mut() {
            Some(list) => list.push(entry),
            None => *slot = Value::Array(vec![entry]),
        }
    }
}
