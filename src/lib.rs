//! Recon Agent - reinforcement-learning reconnaissance with LLM-assisted parsing

pub mod agent;
pub mod blackboard;
pub mod core;
pub mod encoder;
pub mod learning;
pub mod llm;
pub mod orchestrator;
pub mod reconstruct;
pub mod schema;
pub mod validation;
