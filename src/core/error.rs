use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Unknown action index: {0}")]
    UnknownAction(usize),

    #[error("Unknown schema path: {0}")]
    UnknownSchemaPath(String),

    #[error("Invalid schema path '{path}': {reason}")]
    InvalidSchemaPath { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Required file not found: {0}")]
    MissingFile(PathBuf),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Command timed out after {0}s: {1}")]
    CommandTimeout(u64, String),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Replay buffer holds {have} transitions, batch needs {need}")]
    InsufficientSamples { have: usize, need: usize },

    #[error("Model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ReconError>;
