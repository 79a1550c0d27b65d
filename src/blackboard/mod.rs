//! Blackboard: the shared, schema-shaped world-model of the target

pub mod board;
pub mod merge;

pub use board::Blackboard;
pub use merge::{identity_key, merge, merge_into, scalar_string};
