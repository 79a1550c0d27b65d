//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a training or evaluation episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeId(pub Uuid);

impl EpisodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EpisodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into the action space
pub type ActionIndex = usize;

/// Encoded state vector (always `MAX_ENCODING_FEATURES` long)
pub type StateVector = Vec<f32>;

/// One step of experience: `(s, a, r, s', done)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: StateVector,
    pub action: ActionIndex,
    pub reward: f32,
    pub next_state: StateVector,
    pub done: bool,
}

impl Transition {
    pub fn new(
        state: StateVector,
        action: ActionIndex,
        reward: f32,
        next_state: StateVector,
        done: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }
}

/// Value type declared for a schema path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Int,
    Float,
    Bool,
    Dict,
    List,
}

impl ValueType {
    /// The empty value used for missing or mistyped leaves
    pub fn empty_value(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            ValueType::String => Value::String(String::new()),
            ValueType::Int => Value::from(0),
            ValueType::Float => Value::from(0.0),
            ValueType::Bool => Value::Bool(false),
            ValueType::Dict => Value::Object(serde_json::Map::new()),
            ValueType::List => Value::Array(Vec::new()),
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, ValueType::Dict | ValueType::List)
    }
}

/// Per-feature normalization applied by the state encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    #[serde(rename = "base100_encode")]
    Base100,
    #[serde(rename = "count_encoder")]
    Count,
    #[serde(rename = "normalize_by_specific_number")]
    NormalizeBySpecificNumber,
    Identity,
}

/// Whether a JSON value counts as "empty" for merge and reward purposes
pub fn is_empty_value(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::Bool(_) => false,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_values_per_type() {
        assert_eq!(ValueType::String.empty_value(), json!(""));
        assert_eq!(ValueType::Int.empty_value(), json!(0));
        assert_eq!(ValueType::List.empty_value(), json!([]));
        assert_eq!(ValueType::Dict.empty_value(), json!({}));
    }

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!(0)));
        assert!(is_empty_value(&json!(null)));
        assert!(!is_empty_value(&json!(false)));
        assert!(!is_empty_value(&json!("ssh")));
        assert!(!is_empty_value(&json!(22)));
    }

    #[test]
    fn test_encoder_kind_deserialization() {
        let kind: EncoderKind = serde_json::from_str("\"count_encoder\"").unwrap();
        assert_eq!(kind, EncoderKind::Count);
        let kind: EncoderKind = serde_json::from_str("\"base100_encode\"").unwrap();
        assert_eq!(kind, EncoderKind::Base100);
        let kind: EncoderKind = serde_json::from_str("\"identity\"").unwrap();
        assert_eq!(kind, EncoderKind::Identity);
    }
}
