//! DQN trainer: online and target networks over the replay buffer

use crate::core::config::LearningConfig;
use crate::core::error::{ReconError, Result};
use crate::core::types::{ActionIndex, Transition};
use crate::learning::network::{Adam, QNetwork};
use crate::learning::replay::PrioritizedReplayBuffer;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::Path;

/// Loss and mean absolute TD error of one update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateStats {
    pub loss: f32,
    pub mean_td_error: f32,
}

pub struct DqnTrainer {
    online: QNetwork,
    target: QNetwork,
    optimizer: Adam,
    buffer: PrioritizedReplayBuffer,
    learning_rate: f32,
    gamma: f32,
    epsilon: f32,
    epsilon_min: f32,
    epsilon_decay: f32,
    target_sync_period: usize,
    double_q: bool,
    train_steps: usize,
    rng: ChaCha8Rng,
}

impl DqnTrainer {
    pub fn new(state_dim: usize, action_count: usize, config: &LearningConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let online = QNetwork::new(state_dim, config.hidden_sizes, action_count.max(1), &mut rng);
        let target = online.clone();
        let optimizer = Adam::new(&online, config.learning_rate);
        let buffer = PrioritizedReplayBuffer::new(
            config.buffer_capacity,
            config.alpha,
            config.beta,
            config.seed.wrapping_add(1),
        );
        Self {
            online,
            target,
            optimizer,
            buffer,
            learning_rate: config.learning_rate,
            gamma: config.gamma,
            epsilon: config.epsilon_start,
            epsilon_min: config.epsilon_min,
            epsilon_decay: config.epsilon_decay,
            target_sync_period: config.target_sync_period.max(1),
            double_q: config.double_q,
            train_steps: 0,
            rng,
        }
    }

    pub fn state_dim(&self) -> usize {
        self.online.input_dim()
    }

    pub fn action_count(&self) -> usize {
        self.online.output_dim()
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn train_steps(&self) -> usize {
        self.train_steps
    }

    pub fn q_values(&self, state: &[f32]) -> Vec<f32> {
        self.online.predict(state)
    }

    /// ε-greedy selection; ties in Q go to the lowest index
    pub fn choose_action(&mut self, state: &[f32], epsilon: f32) -> ActionIndex {
        if self.rng.gen::<f32>() < epsilon {
            let action = self.rng.gen_range(0..self.action_count());
            tracing::debug!(action, epsilon, "random action");
            return action;
        }
        let q = self.q_values(state);
        let action = argmax(&q);
        tracing::debug!(action, q_values = ?q, "greedy action");
        action
    }

    /// `ε <- max(ε * decay, ε_min)`
    pub fn decay_epsilon(&mut self) {
        self.epsilon = (self.epsilon * self.epsilon_decay).max(self.epsilon_min);
    }

    pub fn push(&mut self, transition: Transition) {
        self.buffer.add(transition);
    }

    /// One prioritized minibatch update
    pub fn train_batch(&mut self, batch_size: usize) -> Result<UpdateStats> {
        let batch = self.buffer.sample(batch_size)?;
        let (stats, td_errors) = self.fit(
            &batch.states,
            &batch.actions,
            &batch.rewards,
            &batch.next_states,
            &batch.dones,
            &batch.weights,
        )?;
        self.buffer.update_priorities(&batch.indices, &td_errors);
        tracing::debug!(
            loss = stats.loss,
            td = stats.mean_td_error,
            step = self.train_steps,
            "trained batch"
        );
        Ok(stats)
    }

    /// Single-transition update with unit weight; the buffer is untouched
    pub fn train_online(&mut self, transition: &Transition) -> Result<UpdateStats> {
        let dim = self.state_dim();
        let shape_err = |e: ndarray::ShapeError| ReconError::Model(e.to_string());
        let states = Array2::from_shape_vec((1, dim), transition.state.clone()).map_err(shape_err)?;
        let next_states =
            Array2::from_shape_vec((1, dim), transition.next_state.clone()).map_err(shape_err)?;
        let done = if transition.done { 1.0 } else { 0.0 };
        let (stats, _) = self.fit(
            &states,
            &[transition.action],
            &Array1::from(vec![transition.reward]),
            &next_states,
            &Array1::from(vec![done]),
            &Array1::from(vec![1.0]),
        )?;
        Ok(stats)
    }

    fn fit(
        &mut self,
        states: &Array2<f32>,
        actions: &[ActionIndex],
        rewards: &Array1<f32>,
        next_states: &Array2<f32>,
        dones: &Array1<f32>,
        weights: &Array1<f32>,
    ) -> Result<(UpdateStats, Vec<f32>)> {
        let n = actions.len();
        if states.ncols() != self.state_dim() {
            return Err(ReconError::Model(format!(
                "state length {} does not match network input {}",
                states.ncols(),
                self.state_dim()
            )));
        }
        if let Some(&bad) = actions.iter().find(|&&a| a >= self.action_count()) {
            return Err(ReconError::UnknownAction(bad));
        }

        let q = self.online.forward(states);
        let next_target = self.target.forward(next_states);
        let next_online = self.double_q.then(|| self.online.forward(next_states));

        let mut td_errors = Vec::with_capacity(n);
        let mut grad = Array2::<f32>::zeros(q.dim());
        let mut loss = 0.0;
        for i in 0..n {
            let row = next_target.row(i);
            let bootstrap = match &next_online {
                Some(online) => row[argmax(&online.row(i).to_vec())],
                None => row.iter().cloned().fold(f32::NEG_INFINITY, f32::max),
            };
            let y = rewards[i] + self.gamma * bootstrap * (1.0 - dones[i]);
            let td = y - q[[i, actions[i]]];
            loss += weights[i] * td * td;
            grad[[i, actions[i]]] = -2.0 * weights[i] * td / n as f32;
            td_errors.push(td);
        }
        loss /= n.max(1) as f32;

        let grads = self.online.backward(states, &grad);
        self.optimizer.step(&mut self.online, &grads);

        self.train_steps += 1;
        if self.train_steps % self.target_sync_period == 0 {
            self.target.copy_from(&self.online);
            tracing::debug!(step = self.train_steps, "target network synchronized");
        }

        let mean_td_error = td_errors.iter().map(|t| t.abs()).sum::<f32>() / n.max(1) as f32;
        Ok((UpdateStats { loss, mean_td_error }, td_errors))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.online.save(path)?;
        tracing::info!(path = %path.display(), "model saved");
        Ok(())
    }

    /// Replace both networks with saved weights of the same shape
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let network = QNetwork::load(path)?;
        if network.input_dim() != self.state_dim() || network.output_dim() != self.action_count() {
            return Err(ReconError::Model(format!(
                "saved model is {}x{}, expected {}x{}",
                network.input_dim(),
                network.output_dim(),
                self.state_dim(),
                self.action_count()
            )));
        }
        self.optimizer = Adam::new(&network, self.learning_rate);
        self.target = network.clone();
        self.online = network;
        tracing::info!(path = %path.display(), "model loaded");
        Ok(())
    }

    pub fn buffer(&self) -> &PrioritizedReplayBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut PrioritizedReplayBuffer {
        &mut self.buffer
    }
}

fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
