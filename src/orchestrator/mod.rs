//! Episode orchestration
//!
//! The orchestrator owns the blackboard for an episode and hands turns to
//! agents through the round-robin manager until a stop condition holds.

pub mod manager;
pub mod policies;
pub mod scenario;

pub use manager::{Agent, AgentManager};
pub use policies::{RunPolicy, StopPredicate};
pub use scenario::{EpisodeSummary, Orchestrator, StopReason};
