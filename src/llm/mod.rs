//! LLM integration for parsing tool output
//!
//! The model only turns raw command output into structure-shaped JSON.
//! Action choice stays with the learned policy.

pub mod cache;
pub mod client;
pub mod engine;
pub mod gateway;
pub mod prompt;

pub use cache::DiskCache;
pub use client::LlmClient;
pub use engine::{LlmEngine, ProcessEngine};
pub use gateway::{GatewaySettings, LlmGateway};
