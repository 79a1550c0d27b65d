//! Fixed-length state vectors for the policy

use crate::encoder::features::{count_encoder, encode_primitive, state_hash, Primitive};
use crate::encoder::flatten::flatten;
use crate::schema::{blackboard_for, generalize_key, target_structure, SchemaEntry, StateSchema};
use ahash::AHashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

const HISTORY_PREFIX: &str = "action_history_idx_";

/// Upper bound on remembered `hash -> snapshot` pairs
const REVERSE_MAP_CAPACITY: usize = 4096;

enum FeatureSlot {
    State,
    History(usize),
}

/// Encodes `(state, action_history)` into a vector of exactly `length` floats
///
/// Feature keys are fixed when the encoder is built: the flattening of a
/// fully padded default blackboard plus one histogram key per action, in
/// lexicographic order. Keys a later state adds are ignored; keys it lacks
/// encode as 0.
pub struct StateEncoder {
    schema: Arc<StateSchema>,
    structure: Value,
    feature_keys: Vec<String>,
    slots: Vec<FeatureSlot>,
    key_index: AHashMap<String, usize>,
    action_count: usize,
    length: usize,
    reverse: Mutex<AHashMap<String, Value>>,
}

impl StateEncoder {
    pub fn new(schema: Arc<StateSchema>, action_count: usize, length: usize) -> Self {
        let structure = target_structure(&schema);
        let reference = blackboard_for(&schema, "0.0.0.0");

        let mut feature_keys: Vec<String> = flatten(&reference, &schema, &structure)
            .into_keys()
            .collect();
        feature_keys.extend((0..action_count).map(|i| format!("{}{}", HISTORY_PREFIX, i)));
        feature_keys.sort();

        let slots = feature_keys
            .iter()
            .map(|key| match key.strip_prefix(HISTORY_PREFIX).and_then(|i| i.parse().ok()) {
                Some(i) => FeatureSlot::History(i),
                None => FeatureSlot::State,
            })
            .collect();
        let key_index = feature_keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), i))
            .collect();

        tracing::debug!(
            features = feature_keys.len(),
            length,
            "state encoder initialized"
        );

        Self {
            schema,
            structure,
            feature_keys,
            slots,
            key_index,
            action_count,
            length,
            reverse: Mutex::new(AHashMap::new()),
        }
    }

    /// Encode a state and the actions taken so far this episode
    pub fn encode(&self, state: &Value, action_history: &[usize]) -> Vec<f32> {
        let flat = flatten(state, &self.schema, &self.structure);

        let mut histogram = vec![0usize; self.action_count];
        for &a in action_history {
            if let Some(slot) = histogram.get_mut(a) {
                *slot += 1;
            }
        }

        let mut vector: Vec<f32> = self
            .feature_keys
            .iter()
            .zip(&self.slots)
            .map(|(key, slot)| match slot {
                FeatureSlot::History(i) => count_encoder(histogram[*i] as f64) as f32,
                FeatureSlot::State => match flat.get(key) {
                    Some(value) => self.encode_feature(key, value) as f32,
                    None => 0.0,
                },
            })
            .collect();
        vector.resize(self.length, 0.0);

        let mut reverse = self.reverse.lock();
        if reverse.len() < REVERSE_MAP_CAPACITY {
            reverse.entry(state_hash(&vector)).or_insert_with(|| state.clone());
        }
        vector
    }

    fn encode_feature(&self, key: &str, value: &Primitive) -> f64 {
        let entry = self.entry_for(key);
        encode_primitive(
            entry.and_then(|e| e.encoder),
            entry.and_then(|e| e.num_for_normalization),
            value,
        )
    }

    /// Schema entry governing a concrete feature key
    ///
    /// Opaque list members (`failed_cves[0]`) fall back to the list entry.
    fn entry_for(&self, key: &str) -> Option<&SchemaEntry> {
        let general = generalize_key(key);
        self.schema.get(&general).or_else(|| {
            general
                .strip_suffix("[]")
                .and_then(|parent| self.schema.get(parent))
        })
    }

    /// Snapshot that produced a vector, if still remembered
    pub fn decode(&self, vector: &[f32]) -> Option<Value> {
        self.reverse.lock().get(&state_hash(vector)).cloned()
    }

    pub fn feature_keys(&self) -> &[String] {
        &self.feature_keys
    }

    /// Position of a feature key in the vector (if within `length`)
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.key_index.get(key).copied().filter(|&i| i < self.length)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn action_count(&self) -> usize {
        self.action_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::features::base100_encode;
    use crate::schema::default_blackboard;
    use serde_json::json;

    fn encoder(length: usize) -> StateEncoder {
        StateEncoder::new(Arc::new(StateSchema::default_recon()), 8, length)
    }

    #[test]
    fn test_length_is_fixed() {
        let board = default_blackboard("10.0.0.1");
        assert_eq!(encoder(256).encode(&board, &[]).len(), 256);
        assert_eq!(encoder(16).encode(&board, &[0, 1]).len(), 16);
    }

    #[test]
    fn test_feature_keys_sorted() {
        let enc = encoder(256);
        let keys = enc.feature_keys().to_vec();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(keys.contains(&"action_history_idx_7".to_string()));
        assert!(keys.contains(&"target.services[0].port".to_string()));
    }

    #[test]
    fn test_histogram_counts_actions() {
        let enc = encoder(256);
        let board = default_blackboard("10.0.0.1");
        let v = enc.encode(&board, &[2, 2, 5]);
        let i2 = enc.index_of("action_history_idx_2").unwrap();
        let i5 = enc.index_of("action_history_idx_5").unwrap();
        assert!((v[i2] - 0.02).abs() < 1e-6);
        assert!((v[i5] - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_service_features() {
        let enc = encoder(256);
        let mut board = default_blackboard("10.0.0.1");
        board["target"]["services"] = json!([{"port": 22, "protocol": "tcp", "service": "ssh"}]);
        let v = enc.encode(&board, &[]);
        let port = enc.index_of("target.services[0].port").unwrap();
        let proto = enc.index_of("target.services[0].protocol").unwrap();
        assert!((v[port] as f64 - 22.0 / 65535.0).abs() < 1e-6);
        assert!((v[proto] as f64 - base100_encode("tcp")).abs() < 1e-6);
    }

    #[test]
    fn test_undeclared_keys_ignored() {
        let enc = encoder(256);
        let board = default_blackboard("10.0.0.1");
        let mut noisy = board.clone();
        noisy["banner"] = json!("SSH-2.0-OpenSSH_8.2");
        noisy["target"]["hostname"] = json!("metasploitable");
        assert_eq!(enc.encode(&board, &[1]), enc.encode(&noisy, &[1]));
    }

    #[test]
    fn test_decode_returns_snapshot() {
        let enc = encoder(256);
        let mut board = default_blackboard("10.0.0.1");
        board["target"]["os"]["name"] = json!("Linux");
        let v = enc.encode(&board, &[]);
        assert_eq!(enc.decode(&v), Some(board));
    }
}
