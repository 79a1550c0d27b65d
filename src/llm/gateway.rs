//! LLM access wrapped in the two disk caches
//!
//! The command cache maps an action string to the parsing instruction
//! generated once by `PROMPT_FOR_A_PROMPT`. The state cache maps
//! `state_hash || action` to the patch already extracted for that pair, so a
//! repeated observation skips the model entirely.

use crate::core::config::{ExecutionConfig, LlmConfig};
use crate::llm::cache::DiskCache;
use crate::llm::engine::LlmEngine;
use crate::llm::prompt::{cleanup_prompt, instruction_request, parse_prompt, truncate_to_budget, word_count};
use crate::schema::{target_structure, StateSchema};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub context_budget: usize,
    pub cleanup_word_budget: usize,
    pub output_size_threshold: usize,
    pub max_retries: usize,
    pub min_response_chars: usize,
}

impl GatewaySettings {
    pub fn from_config(llm: &LlmConfig, execution: &ExecutionConfig) -> Self {
        Self {
            context_budget: llm.context_budget,
            cleanup_word_budget: llm.cleanup_word_budget,
            output_size_threshold: execution.output_size_threshold,
            max_retries: llm.max_retries,
            min_response_chars: llm.min_response_chars,
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default(), &ExecutionConfig::default())
    }
}

pub struct LlmGateway {
    engine: Arc<dyn LlmEngine>,
    command_cache: DiskCache,
    state_cache: DiskCache,
    schema: Arc<StateSchema>,
    structure: Value,
    settings: GatewaySettings,
}

impl LlmGateway {
    pub fn new(
        engine: Arc<dyn LlmEngine>,
        command_cache: DiskCache,
        state_cache: DiskCache,
        schema: Arc<StateSchema>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            engine,
            command_cache,
            state_cache,
            structure: target_structure(&schema),
            schema,
            settings,
        }
    }

    pub fn state_key(state_hash: &str, action: &str) -> String {
        format!("{}{}", state_hash, action)
    }

    /// Patch stored for an encoded state and action
    pub fn cached_patch(&self, state_hash: &str, action: &str) -> Option<Value> {
        self.state_cache.get(&Self::state_key(state_hash, action))
    }

    pub fn store_patch(&self, state_hash: &str, action: &str, patch: Value) {
        self.state_cache.set(&Self::state_key(state_hash, action), patch);
    }

    /// Parsing instruction for an action, generated on first use
    ///
    /// A failed generation yields an empty instruction and is not cached.
    pub async fn parsing_instruction(&self, action: &str) -> String {
        if let Some(Value::String(cached)) = self.command_cache.get(action) {
            return cached;
        }
        match self.invoke(&instruction_request(action)).await {
            Some(instruction) => {
                self.command_cache
                    .set(action, Value::String(instruction.clone()));
                instruction
            }
            None => String::new(),
        }
    }

    pub fn needs_cleanup(&self, output: &str) -> bool {
        output.len() > self.settings.output_size_threshold
            || word_count(output) > self.settings.cleanup_word_budget
    }

    /// Compact an oversized output; the raw text is kept when cleanup fails
    pub async fn cleanup(&self, output: &str) -> String {
        if !self.needs_cleanup(output) {
            return output.to_string();
        }
        tracing::debug!(words = word_count(output), "compacting command output");
        match self.invoke(&cleanup_prompt(output)).await {
            Some(compact) => compact,
            None => output.to_string(),
        }
    }

    /// Ask the model to turn command output into structure-shaped JSON
    ///
    /// `None` once every retry returned an error or a too-short answer.
    pub async fn parse_output(&self, action: &str, output: &str) -> Option<String> {
        let instruction = self.parsing_instruction(action).await;
        let prompt = parse_prompt(&self.schema, &self.structure, &instruction, action, output);
        self.invoke(&prompt).await
    }

    /// One prompt with bounded retries on empty or failed responses
    async fn invoke(&self, prompt: &str) -> Option<String> {
        let tokens = self.engine.count_tokens(prompt);
        tracing::debug!(tokens, "llm prompt");
        let prompt = truncate_to_budget(prompt, tokens, self.settings.context_budget);

        for attempt in 1..=self.settings.max_retries.max(1) {
            match self.engine.run(&prompt).await {
                Ok(text) if text.trim().chars().count() >= self.settings.min_response_chars => {
                    return Some(text);
                }
                Ok(text) => {
                    tracing::warn!(attempt, chars = text.trim().len(), "llm response too short");
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "llm call failed");
                }
            }
        }
        None
    }
}
