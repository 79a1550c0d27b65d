//! Agent configuration with documented constants
//!
//! All tunables of the learning loop are collected here with explanations of
//! their purpose and how they interact with each other. Values can be loaded
//! from a TOML file; any field left out keeps its default.

use crate::core::error::{ReconError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration for training and evaluation runs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    /// Target host every action is rendered against (`{ip}` slot)
    pub target_ip: String,

    /// Root directory for caches and models
    pub data_dir: PathBuf,

    /// Optional TOML schema replacing the built-in state schema
    pub schema_path: Option<PathBuf>,

    /// Ordered action space: command templates with an `{ip}` slot
    ///
    /// The order is fixed for the lifetime of a model. Reordering or removing
    /// entries invalidates saved weights and the action histogram features.
    pub actions: Vec<String>,

    pub learning: LearningConfig,
    pub llm: LlmConfig,
    pub execution: ExecutionConfig,
    pub datasets: DatasetConfig,
}

/// Reinforcement learning hyperparameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Number of episodes in a training run
    pub num_episodes: usize,

    /// Step budget per episode
    pub max_steps_per_episode: usize,

    /// Length of every encoded state vector (`L`)
    ///
    /// Must be at least the number of feature keys produced by the default
    /// blackboard, otherwise trailing features are truncated away.
    pub max_encoding_features: usize,

    /// Starting exploration rate
    pub epsilon_start: f32,

    /// Exploration floor
    pub epsilon_min: f32,

    /// Multiplicative decay applied once per episode
    ///
    /// At 0.995 the rate reaches the 0.01 floor after roughly 920 episodes.
    pub epsilon_decay: f32,

    /// Discount factor γ
    pub gamma: f32,

    /// Adam learning rate
    pub learning_rate: f32,

    /// Replay buffer capacity (oldest transitions evicted first)
    pub buffer_capacity: usize,

    /// Prioritization exponent α (0 = uniform sampling)
    pub alpha: f32,

    /// Importance-sampling exponent β (1 = full correction)
    pub beta: f32,

    /// Minibatch size for `train_batch`
    pub batch_size: usize,

    /// Training steps between target network synchronizations (`K`)
    pub target_sync_period: usize,

    /// Minibatches trained at the end of each episode
    pub batches_per_episode: usize,

    /// Hidden layer widths of the Q-network
    pub hidden_sizes: [usize; 2],

    /// Select a' with the online network when building TD targets
    pub double_q: bool,

    /// Divisor applied to every step reward
    ///
    /// Couples reward magnitude to the learning rate; tune the two together.
    pub reward_scale: f32,

    /// Seed for action selection, sampling and weight initialization
    pub seed: u64,
}

/// LLM gateway settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Endpoint for the HTTP engine (Anthropic or OpenAI-compatible)
    pub api_url: String,

    /// Model identifier sent with each request
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// External program used instead of HTTP when set (prompt on stdin)
    pub command: Option<String>,

    /// Context budget in estimated tokens; longer prompts are truncated
    pub context_budget: usize,

    /// Raw outputs with more words than this go through the cleanup prompt
    pub cleanup_word_budget: usize,

    /// Retries for short or empty responses
    pub max_retries: usize,

    /// Responses shorter than this (in characters) count as empty
    pub min_response_chars: usize,
}

/// Command execution and fact probing settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Hard timeout for each command (seconds)
    pub command_timeout_secs: u64,

    /// Timeout for correctness probes (seconds)
    pub probe_timeout_secs: u64,

    /// Raw outputs longer than this (characters) are compacted before parsing
    pub output_size_threshold: usize,

    /// URL scheme for web path probes
    pub web_scheme: String,
}

/// External dataset locations (read-only)
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DatasetConfig {
    /// OS catalogue JSON: distribution -> { versions, architecture }
    pub os_catalogue: Option<PathBuf>,

    /// Kernel version list JSON (array of strings)
    pub kernel_list: Option<PathBuf>,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            target_ip: "192.168.56.101".into(),
            data_dir: PathBuf::from("data"),
            schema_path: None,
            actions: default_actions(),
            learning: LearningConfig::default(),
            llm: LlmConfig::default(),
            execution: ExecutionConfig::default(),
            datasets: DatasetConfig::default(),
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            num_episodes: 1000,
            max_steps_per_episode: 20,
            max_encoding_features: 256,

            // Exploration (1.0 -> 0.01)
            epsilon_start: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,

            gamma: 0.99,
            learning_rate: 1e-3,

            // Prioritized replay
            buffer_capacity: 10_000,
            alpha: 0.6,
            beta: 0.4,
            batch_size: 32,

            target_sync_period: 100,
            batches_per_episode: 4,
            hidden_sizes: [128, 64],
            double_q: false,
            reward_scale: 4.0,
            seed: 42,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".into(),
            model: "claude-3-haiku-20240307".into(),
            api_key_env: "LLM_API_KEY".into(),
            command: None,
            context_budget: 8192,
            cleanup_word_budget: 1500,
            max_retries: 3,
            min_response_chars: 10,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 10,
            probe_timeout_secs: 5,
            output_size_threshold: 8000,
            web_scheme: "http".into(),
        }
    }
}

/// Built-in reconnaissance action space
pub fn default_actions() -> Vec<String> {
    [
        "nmap -F {ip}",
        "nmap -sV {ip}",
        "nmap -O {ip}",
        "nmap -sC -p 80,443 {ip}",
        "whatweb {ip}",
        "curl -sI http://{ip}",
        "gobuster dir -q -u http://{ip} -w /usr/share/wordlists/dirb/common.txt",
        "nikto -h {ip}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl ReconConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ReconConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; a missing file is a fatal startup error
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReconError::MissingFile(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        let l = &self.learning;

        if self.actions.is_empty() {
            return Err(ReconError::Config("action space must not be empty".into()));
        }

        if !(0.0..=1.0).contains(&l.epsilon_min) || !(0.0..=1.0).contains(&l.epsilon_start) {
            return Err(ReconError::Config("epsilon values must lie in [0, 1]".into()));
        }
        if l.epsilon_min > l.epsilon_start {
            return Err(ReconError::Config(format!(
                "epsilon_min ({}) should be <= epsilon_start ({})",
                l.epsilon_min, l.epsilon_start
            )));
        }
        if !(0.0..=1.0).contains(&l.epsilon_decay) {
            return Err(ReconError::Config("epsilon_decay must lie in [0, 1]".into()));
        }

        if !(0.0..=1.0).contains(&l.alpha) || !(0.0..=1.0).contains(&l.beta) {
            return Err(ReconError::Config("alpha and beta must lie in [0, 1]".into()));
        }

        if l.batch_size == 0 || l.batch_size > l.buffer_capacity {
            return Err(ReconError::Config(format!(
                "batch_size ({}) must be in 1..=buffer_capacity ({})",
                l.batch_size, l.buffer_capacity
            )));
        }

        if l.max_encoding_features == 0 || l.target_sync_period == 0 {
            return Err(ReconError::Config(
                "max_encoding_features and target_sync_period must be positive".into(),
            ));
        }

        if l.reward_scale <= 0.0 {
            return Err(ReconError::Config("reward_scale must be positive".into()));
        }

        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("caches")
    }

    pub fn llm_cache_path(&self) -> PathBuf {
        self.cache_dir().join("llm_cache")
    }

    pub fn command_llm_cache_path(&self) -> PathBuf {
        self.cache_dir().join("command_llm_cache")
    }

    pub fn correctness_cache_path(&self) -> PathBuf {
        self.cache_dir().join("correctness_cache.json")
    }

    pub fn model_path(&self) -> PathBuf {
        self.data_dir.join("models").join("recon_model")
    }
}
