//! Value learning over the discrete action space
//!
//! A prioritized replay buffer feeds a DQN trainer with online and target
//! Q-networks.

pub mod network;
pub mod replay;
pub mod sum_tree;
pub mod trainer;

pub use network::QNetwork;
pub use replay::{PrioritizedReplayBuffer, SampledBatch, PRIORITY_EPSILON};
pub use sum_tree::SumTree;
pub use trainer::{DqnTrainer, UpdateStats};
