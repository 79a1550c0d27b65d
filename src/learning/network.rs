//! Feed-forward Q-network with Adam
//!
//! `L -> h1 -> h2 -> |A|`, ReLU on the hidden layers, linear output.

use crate::core::error::{ReconError, Result};
use ndarray::{Array1, Array2, Axis, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dense {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl Dense {
    fn new(input: usize, output: usize, rng: &mut impl Rng) -> Self {
        let bound = (6.0 / input.max(1) as f32).sqrt();
        Self {
            weights: Array2::from_shape_fn((input, output), |_| rng.gen_range(-bound..bound)),
            bias: Array1::zeros(output),
        }
    }

    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weights) + &self.bias
    }
}

/// Per-layer gradients, same shapes as the layers
pub struct Gradients {
    layers: Vec<(Array2<f32>, Array1<f32>)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QNetwork {
    layers: Vec<Dense>,
    input_dim: usize,
    output_dim: usize,
}

impl QNetwork {
    pub fn new(input_dim: usize, hidden: [usize; 2], output_dim: usize, rng: &mut impl Rng) -> Self {
        let sizes = [input_dim, hidden[0], hidden[1], output_dim];
        let layers = sizes
            .windows(2)
            .map(|pair| Dense::new(pair[0], pair[1], rng))
            .collect();
        Self {
            layers,
            input_dim,
            output_dim,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    /// Q-values for a batch of states (`batch x |A|`)
    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        self.forward_cached(x).0
    }

    /// Q-values for one state
    pub fn predict(&self, state: &[f32]) -> Vec<f32> {
        let x = Array2::from_shape_fn((1, self.input_dim), |(_, j)| state.get(j).copied().unwrap_or(0.0));
        self.forward(&x).row(0).to_vec()
    }

    /// Output plus the input to every layer and the hidden pre-activations
    fn forward_cached(&self, x: &Array2<f32>) -> (Array2<f32>, Vec<Array2<f32>>, Vec<Array2<f32>>) {
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre = Vec::with_capacity(self.layers.len());
        let mut current = x.clone();
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&current);
            inputs.push(current);
            if i == last {
                current = z;
            } else {
                current = z.mapv(|v| v.max(0.0));
                pre.push(z);
            }
        }
        (current, inputs, pre)
    }

    /// Gradients of the loss given `d_out = dL/dQ` for a batch `x`
    pub fn backward(&self, x: &Array2<f32>, d_out: &Array2<f32>) -> Gradients {
        let (_, inputs, pre) = self.forward_cached(x);
        let mut grads = Vec::with_capacity(self.layers.len());
        let mut delta = d_out.clone();
        for i in (0..self.layers.len()).rev() {
            let dw = inputs[i].t().dot(&delta);
            let db = delta.sum_axis(Axis(0));
            if i > 0 {
                let upstream = delta.dot(&self.layers[i].weights.t());
                let mask = pre[i - 1].mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                delta = upstream * mask;
            }
            grads.push((dw, db));
        }
        grads.reverse();
        Gradients { layers: grads }
    }

    /// Copy every weight from another network of the same shape
    pub fn copy_from(&mut self, other: &QNetwork) {
        self.layers.clone_from(&other.layers);
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReconError::MissingFile(path.to_path_buf()));
        }
        let network: QNetwork = serde_json::from_str(&fs::read_to_string(path)?)?;
        if network.layers.len() != 3 {
            return Err(ReconError::Model(format!(
                "expected 3 layers, found {}",
                network.layers.len()
            )));
        }
        Ok(network)
    }
}

/// Adam optimizer state for a `QNetwork`
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step: i32,
    moments: Vec<(Array2<f32>, Array1<f32>, Array2<f32>, Array1<f32>)>,
}

impl Adam {
    pub fn new(network: &QNetwork, learning_rate: f32) -> Self {
        let moments = network
            .layers
            .iter()
            .map(|l| {
                (
                    Array2::zeros(l.weights.dim()),
                    Array1::zeros(l.bias.len()),
                    Array2::zeros(l.weights.dim()),
                    Array1::zeros(l.bias.len()),
                )
            })
            .collect();
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            moments,
        }
    }

    pub fn step(&mut self, network: &mut QNetwork, grads: &Gradients) {
        self.step += 1;
        let (b1, b2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let c1 = 1.0 - b1.powi(self.step);
        let c2 = 1.0 - b2.powi(self.step);

        for ((layer, (gw, gb)), (mw, mb, vw, vb)) in network
            .layers
            .iter_mut()
            .zip(&grads.layers)
            .zip(self.moments.iter_mut())
        {
            Zip::from(&mut layer.weights)
                .and(mw)
                .and(vw)
                .and(gw)
                .for_each(|w, m, v, &g| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    *w -= lr * (*m / c1) / ((*v / c2).sqrt() + eps);
                });
            Zip::from(&mut layer.bias)
                .and(mb)
                .and(vb)
                .and(gb)
                .for_each(|w, m, v, &g| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    *w -= lr * (*m / c1) / ((*v / c2).sqrt() + eps);
                });
        }
    }
}
