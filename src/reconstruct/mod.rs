//! Tolerant reconstruction of structured patches from LLM output

pub mod reconstructor;
pub mod scanner;

pub use reconstructor::{prune_empty, Reconstruction, Reconstructor};
