//! Proportional prioritized experience replay
//!
//! Entries sample with probability `p_i^α / Σ p_j^α` and are corrected with
//! importance weights `(N·P(i))^-β`, normalized so the largest weight in a
//! batch is 1. The ring evicts the oldest transition and its priority
//! together.

use crate::core::error::{ReconError, Result};
use crate::core::types::{ActionIndex, Transition};
use crate::learning::sum_tree::SumTree;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Added to |TD error| so every stored priority stays strictly positive
pub const PRIORITY_EPSILON: f64 = 1e-6;

/// A sampled minibatch in array form
#[derive(Debug, Clone)]
pub struct SampledBatch {
    pub states: Array2<f32>,
    pub actions: Vec<ActionIndex>,
    pub rewards: Array1<f32>,
    pub next_states: Array2<f32>,
    pub dones: Array1<f32>,
    pub weights: Array1<f32>,
    pub indices: Vec<usize>,
}

impl SampledBatch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

pub struct PrioritizedReplayBuffer {
    capacity: usize,
    alpha: f64,
    beta: f64,
    transitions: Vec<Transition>,
    priorities: Vec<f64>,
    tree: SumTree,
    next: usize,
    max_priority: f64,
    rng: ChaCha8Rng,
}

impl PrioritizedReplayBuffer {
    pub fn new(capacity: usize, alpha: f32, beta: f32, seed: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            alpha: alpha as f64,
            beta: beta as f64,
            transitions: Vec::with_capacity(capacity),
            priorities: Vec::with_capacity(capacity),
            tree: SumTree::new(capacity),
            next: 0,
            max_priority: 1.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Store a transition at the current maximum priority
    pub fn add(&mut self, transition: Transition) {
        let priority = self.max_priority;
        if self.transitions.len() < self.capacity {
            self.transitions.push(transition);
            self.priorities.push(priority);
        } else {
            self.transitions[self.next] = transition;
            self.priorities[self.next] = priority;
        }
        self.tree.set(self.next, priority.powf(self.alpha));
        self.next = (self.next + 1) % self.capacity;
    }

    /// Draw `batch_size` independent proportional samples
    pub fn sample(&mut self, batch_size: usize) -> Result<SampledBatch> {
        let n = self.transitions.len();
        if n < batch_size || batch_size == 0 {
            return Err(ReconError::InsufficientSamples {
                have: n,
                need: batch_size.max(1),
            });
        }

        let total = self.tree.total();
        let mut indices = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let mass = self.rng.gen::<f64>() * total;
            indices.push(self.tree.find(mass).min(n - 1));
        }

        let raw_weights: Vec<f64> = indices
            .iter()
            .map(|&i| {
                let p = self.tree.get(i) / total;
                (n as f64 * p).powf(-self.beta)
            })
            .collect();
        let max_weight = raw_weights.iter().cloned().fold(f64::MIN, f64::max);
        let weights: Array1<f32> = raw_weights
            .iter()
            .map(|w| (w / max_weight) as f32)
            .collect();

        let dim = self.transitions[indices[0]].state.len();
        let mut states = Vec::with_capacity(batch_size * dim);
        let mut next_states = Vec::with_capacity(batch_size * dim);
        let mut actions = Vec::with_capacity(batch_size);
        let mut rewards = Vec::with_capacity(batch_size);
        let mut dones = Vec::with_capacity(batch_size);
        for &i in &indices {
            let t = &self.transitions[i];
            if t.state.len() != dim || t.next_state.len() != dim {
                return Err(ReconError::Model(format!(
                    "transition {} has state length {} (expected {})",
                    i,
                    t.state.len(),
                    dim
                )));
            }
            states.extend_from_slice(&t.state);
            next_states.extend_from_slice(&t.next_state);
            actions.push(t.action);
            rewards.push(t.reward);
            dones.push(if t.done { 1.0 } else { 0.0 });
        }

        let shape_err = |e: ndarray::ShapeError| ReconError::Model(e.to_string());
        Ok(SampledBatch {
            states: Array2::from_shape_vec((batch_size, dim), states).map_err(shape_err)?,
            actions,
            rewards: Array1::from(rewards),
            next_states: Array2::from_shape_vec((batch_size, dim), next_states).map_err(shape_err)?,
            dones: Array1::from(dones),
            weights,
            indices,
        })
    }

    /// Overwrite priorities with `|td_error| + PRIORITY_EPSILON`
    pub fn update_priorities(&mut self, indices: &[usize], td_errors: &[f32]) {
        for (&i, &td) in indices.iter().zip(td_errors) {
            if i >= self.transitions.len() {
                continue;
            }
            let priority = (td.abs() as f64).max(0.0) + PRIORITY_EPSILON;
            let priority = if priority.is_finite() { priority } else { self.max_priority };
            self.priorities[i] = priority;
            self.tree.set(i, priority.powf(self.alpha));
            self.max_priority = self.max_priority.max(priority);
        }
        self.tree.rebuild();
    }

    /// Sampling distribution over stored entries (sums to 1)
    pub fn probabilities(&self) -> Vec<f64> {
        let total = self.tree.total();
        (0..self.transitions.len())
            .map(|i| if total > 0.0 { self.tree.get(i) / total } else { 0.0 })
            .collect()
    }

    pub fn priorities(&self) -> &[f64] {
        &self.priorities
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn set_beta(&mut self, beta: f32) {
        self.beta = beta.clamp(0.0, 1.0) as f64;
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
