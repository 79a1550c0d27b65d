//! The reconnaissance agent
//!
//! Each turn picks a command with the ε-greedy policy, runs it against the
//! target, turns the output into a validated patch, merges it into the board
//! and learns from the resulting transition.

use crate::agent::actions::ActionSpace;
use crate::agent::executor::{CommandRunner, ShellRunner};
use crate::agent::reward::compute_reward;
use crate::blackboard::Blackboard;
use crate::core::config::ReconConfig;
use crate::core::error::{ReconError, Result};
use crate::core::types::{is_empty_value, ActionIndex, Transition};
use crate::encoder::{state_hash, StateEncoder};
use crate::learning::DqnTrainer;
use crate::llm::{DiskCache, GatewaySettings, LlmClient, LlmEngine, LlmGateway, ProcessEngine};
use crate::orchestrator::{Agent, RunPolicy};
use crate::reconstruct::Reconstructor;
use crate::schema::structure::PATCH_KEYS;
use crate::schema::StateSchema;
use crate::validation::{
    sort_state, CorrectnessCache, Corrector, HttpPathProbe, KernelList, NmapPortProbe, OsCatalogue,
    Validator,
};
use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

pub const RECON_AGENT: &str = "recon";

const LLM_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// What happened during one step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub action_index: ActionIndex,
    pub action: String,
    pub reward: f32,
    pub transition: Transition,
    /// Whether a patch was merged into the board
    pub merged: bool,
}

pub struct ReconAgent {
    schema: Arc<StateSchema>,
    actions: ActionSpace,
    encoder: StateEncoder,
    trainer: Arc<Mutex<DqnTrainer>>,
    runner: Arc<dyn CommandRunner>,
    gateway: LlmGateway,
    reconstructor: Reconstructor,
    validator: Validator,
    corrector: Corrector,
    policy: RunPolicy,
    reward_scale: f32,
    explore: bool,
    learn: bool,
    command_cache: AHashMap<String, String>,
    history: Vec<ActionIndex>,
    last_action: Option<String>,
    last_run: Option<f64>,
    last_outcome: Option<StepOutcome>,
}

impl ReconAgent {
    pub fn new(
        schema: Arc<StateSchema>,
        actions: ActionSpace,
        trainer: Arc<Mutex<DqnTrainer>>,
        runner: Arc<dyn CommandRunner>,
        gateway: LlmGateway,
        corrector: Corrector,
    ) -> Result<Self> {
        let (state_dim, action_count) = {
            let trainer = trainer.lock();
            (trainer.state_dim(), trainer.action_count())
        };
        if action_count != actions.len() {
            return Err(ReconError::Config(format!(
                "policy has {} outputs but the action space has {} actions",
                action_count,
                actions.len()
            )));
        }

        let encoder = StateEncoder::new(schema.clone(), actions.len(), state_dim);
        if encoder.feature_keys().len() > state_dim {
            tracing::warn!(
                features = encoder.feature_keys().len(),
                length = state_dim,
                "encoding length truncates features"
            );
        }

        Ok(Self {
            reconstructor: Reconstructor::new(schema.clone()),
            validator: Validator::new(schema.clone()),
            schema,
            actions,
            encoder,
            trainer,
            runner,
            gateway,
            corrector,
            policy: RunPolicy::default(),
            reward_scale: 4.0,
            explore: true,
            learn: true,
            command_cache: AHashMap::new(),
            history: Vec::new(),
            last_action: None,
            last_run: None,
            last_outcome: None,
        })
    }

    /// Production wiring: shell runner, configured LLM engine, disk caches,
    /// live probes and the optional datasets
    pub fn from_config(
        config: &ReconConfig,
        schema: Arc<StateSchema>,
        trainer: Arc<Mutex<DqnTrainer>>,
    ) -> Result<Self> {
        let actions = ActionSpace::new(config.actions.clone())?;
        let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new(Duration::from_secs(
            config.execution.command_timeout_secs,
        )));

        let engine: Arc<dyn LlmEngine> = match &config.llm.command {
            Some(command) => Arc::new(ProcessEngine::new(command, LLM_COMMAND_TIMEOUT)?),
            None => Arc::new(LlmClient::from_config(&config.llm)?),
        };
        let gateway = LlmGateway::new(
            engine,
            DiskCache::open(config.command_llm_cache_path()),
            DiskCache::open(config.llm_cache_path()),
            schema.clone(),
            GatewaySettings::from_config(&config.llm, &config.execution),
        );

        let probe_timeout = Duration::from_secs(config.execution.probe_timeout_secs);
        let cache = Arc::new(CorrectnessCache::new(DiskCache::open(
            config.correctness_cache_path(),
        )));
        let mut corrector = Corrector::new(&config.target_ip, cache)
            .with_port_probe(Arc::new(NmapPortProbe::new(Arc::new(ShellRunner::new(
                probe_timeout,
            )))))
            .with_path_probe(Arc::new(HttpPathProbe::new(probe_timeout)?))
            .with_web_scheme(&config.execution.web_scheme)
            .with_status_codes(&schema.status_codes());
        if let Some(path) = &config.datasets.os_catalogue {
            corrector = corrector.with_catalogue(OsCatalogue::from_json_file(path)?);
        }
        if let Some(path) = &config.datasets.kernel_list {
            corrector = corrector.with_kernels(KernelList::from_json_file(path)?);
        }

        Ok(Self::new(schema, actions, trainer, runner, gateway, corrector)?
            .with_reward_scale(config.learning.reward_scale))
    }

    pub fn with_reward_scale(mut self, scale: f32) -> Self {
        self.reward_scale = scale;
        self
    }

    pub fn with_policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Greedy actions, no buffer writes or online updates
    pub fn evaluation(mut self) -> Self {
        self.explore = false;
        self.learn = false;
        self
    }

    pub fn history(&self) -> &[ActionIndex] {
        &self.history
    }

    pub fn last_outcome(&self) -> Option<&StepOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn encoder(&self) -> &StateEncoder {
        &self.encoder
    }

    /// One full observe-act-learn step
    pub async fn step(&mut self, board: &mut Blackboard) -> Result<StepOutcome> {
        let prev = board.snapshot(RECON_AGENT);
        let state = self.encoder.encode(&prev, &self.history);

        let action_index = {
            let mut trainer = self.trainer.lock();
            let epsilon = if self.explore { trainer.epsilon() } else { 0.0 };
            trainer.choose_action(&state, epsilon)
        };
        let action = self.actions.render(action_index, board.target_ip())?;
        tracing::debug!(action, "chosen");

        let output = self.execute(&action, board).await;
        let patch = self.observe(&state, &action, &output).await;
        let merged = match &patch {
            Some(patch) => {
                board.update(RECON_AGENT, patch);
                true
            }
            None => false,
        };

        let next = board.snapshot(RECON_AGENT);
        let times_taken = self.history.iter().filter(|&&a| a == action_index).count();
        self.history.push(action_index);
        let next_state = self.encoder.encode(&next, &self.history);

        let reward = compute_reward(&prev, &next, &self.schema, times_taken, self.reward_scale);
        let transition = Transition::new(state, action_index, reward, next_state, false);

        if self.learn {
            let mut trainer = self.trainer.lock();
            trainer.push(transition.clone());
            if let Err(e) = trainer.train_online(&transition) {
                tracing::warn!(error = %e, "online update failed");
            }
        }

        board.append_action_log(json!({
            "agent": RECON_AGENT,
            "action": action,
            "reward": reward,
        }));
        board.record_reward(&action, reward);
        tracing::info!(action, reward, merged, "recon step");

        self.last_action = Some(action.clone());
        self.last_run = Some(board.elapsed());
        Ok(StepOutcome {
            action_index,
            action,
            reward,
            transition,
            merged,
        })
    }

    /// Command output, from the per-process cache when possible
    ///
    /// Failures are recorded on the board and yield empty output.
    async fn execute(&mut self, action: &str, board: &mut Blackboard) -> String {
        if let Some(output) = self.command_cache.get(action) {
            tracing::debug!(action, "command cache hit");
            return output.clone();
        }
        match self.runner.run(action).await {
            Ok(output) => {
                self.command_cache.insert(action.to_string(), output.clone());
                output
            }
            Err(e) => {
                board.add_error(RECON_AGENT, action, &e.to_string());
                String::new()
            }
        }
    }

    /// Validated, corrected and sorted patch for an output
    ///
    /// `None` when there is nothing to parse or the model never answered.
    async fn observe(&self, state: &[f32], action: &str, output: &str) -> Option<Value> {
        let hash = state_hash(state);
        let extracted = match self.gateway.cached_patch(&hash, action) {
            Some(cached) => {
                tracing::debug!(action, "state cache hit");
                cached
            }
            None => {
                if output.trim().is_empty() {
                    return None;
                }
                let compact = self.gateway.cleanup(output).await;
                let Some(text) = self.gateway.parse_output(action, &compact).await else {
                    tracing::warn!(action, "no usable llm response, board unchanged");
                    return None;
                };
                let reconstruction = self.reconstructor.reconstruct(&text);
                if !reconstruction.missing.is_empty() {
                    tracing::debug!(missing = ?reconstruction.missing, "fields missing from llm output");
                }
                if !is_empty_value(&reconstruction.extracted) {
                    self.gateway
                        .store_patch(&hash, action, reconstruction.extracted.clone());
                }
                reconstruction.extracted
            }
        };

        let validated = self.validator.validate(&extracted);
        let corrected = self.corrector.correct(validated).await;
        let sorted = sort_state(&corrected, &self.schema);
        Some(restrict_to_patch_keys(sorted))
    }
}

/// Drop everything but the keys an observation may write
fn restrict_to_patch_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| PATCH_KEYS.contains(&k.as_str()))
                .collect::<Map<String, Value>>(),
        ),
        _ => Value::Object(Map::new()),
    }
}

#[async_trait]
impl Agent for ReconAgent {
    fn name(&self) -> &str {
        RECON_AGENT
    }

    fn should_run(&self, board: &Blackboard) -> bool {
        self.policy.allows(board, RECON_AGENT, self.last_run)
    }

    async fn run(&mut self, board: &mut Blackboard) -> Result<()> {
        let outcome = self.step(board).await?;
        self.last_outcome = Some(outcome);
        Ok(())
    }

    fn last_action(&self) -> Option<&str> {
        self.last_action.as_deref()
    }

    fn reset(&mut self) {
        self.history.clear();
        self.last_action = None;
        self.last_run = None;
        self.last_outcome = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::LearningConfig;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    struct FixedRunner(String);

    #[async_trait]
    impl CommandRunner for FixedRunner {
        async fn run(&self, _command_line: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl CommandRunner for FailingRunner {
        async fn run(&self, command_line: &str) -> Result<String> {
            Err(ReconError::CommandTimeout(10, command_line.to_string()))
        }
    }

    struct ScriptedEngine(parking_lot::Mutex<VecDeque<String>>);

    #[async_trait]
    impl LlmEngine for ScriptedEngine {
        async fn run(&self, _prompt: &str) -> Result<String> {
            self.0
                .lock()
                .pop_front()
                .ok_or_else(|| ReconError::LlmError("script exhausted".into()))
        }
    }

    fn agent(runner: Arc<dyn CommandRunner>, responses: &[&str]) -> ReconAgent {
        let schema = Arc::new(StateSchema::default_recon());
        let config = LearningConfig {
            hidden_sizes: [16, 16],
            epsilon_start: 0.0,
            epsilon_min: 0.0,
            ..LearningConfig::default()
        };
        let trainer = Arc::new(Mutex::new(DqnTrainer::new(256, 1, &config)));
        let engine = Arc::new(ScriptedEngine(parking_lot::Mutex::new(
            responses.iter().map(|s| s.to_string()).collect(),
        )));
        let gateway = LlmGateway::new(
            engine,
            DiskCache::in_memory(),
            DiskCache::in_memory(),
            schema.clone(),
            GatewaySettings::default(),
        );
        let corrector = Corrector::new(
            "192.168.56.101",
            Arc::new(CorrectnessCache::new(DiskCache::in_memory())),
        );
        let actions = ActionSpace::new(vec!["nmap -F {ip}".into()]).unwrap();
        ReconAgent::new(schema, actions, trainer, runner, gateway, corrector).unwrap()
    }

    fn board() -> Blackboard {
        Blackboard::initialize("192.168.56.101", Arc::new(StateSchema::default_recon()))
    }

    #[tokio::test]
    async fn test_failed_command_recorded_and_step_proceeds() {
        let mut agent = agent(Arc::new(FailingRunner), &[]);
        let mut board = board();
        let outcome = agent.step(&mut board).await.unwrap();
        assert!(!outcome.merged);
        assert_eq!(board.errors_for(RECON_AGENT), 1);
        assert!((outcome.reward + 0.225).abs() < 1e-6);
        assert_eq!(agent.history(), &[0]);
        assert_eq!(outcome.transition.state.len(), 256);
    }

    #[tokio::test]
    async fn test_exhausted_llm_leaves_board_unchanged() {
        let mut agent = agent(Arc::new(FixedRunner("21/tcp open ftp".into())), &[]);
        let mut board = board();
        let before = board.state()["target"].clone();
        let outcome = agent.step(&mut board).await.unwrap();
        assert!(!outcome.merged);
        assert_eq!(board.state()["target"], before);
    }

    #[tokio::test]
    async fn test_patch_merged_and_logged() {
        let mut agent = agent(
            Arc::new(FixedRunner("21/tcp open ftp".into())),
            &[
                "Read each PORT line.",
                r#"{"target": {"services": [{"port": 21, "protocol": "tcp", "service": "ftp"}]}}"#,
            ],
        );
        let mut board = board();
        let outcome = agent.step(&mut board).await.unwrap();
        assert!(outcome.merged);
        assert_eq!(board.state()["target"]["services"][0]["port"], 21);
        assert_eq!(board.state()["actions_log"].as_array().unwrap().len(), 1);
        assert_eq!(board.state()["reward_log"][0]["action"], "nmap -F 192.168.56.101");
        assert_eq!(agent.last_action(), Some("nmap -F 192.168.56.101"));
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let mut agent = agent(Arc::new(FailingRunner), &[]);
        let mut board = board();
        agent.run(&mut board).await.unwrap();
        assert!(agent.last_outcome().is_some());
        agent.reset();
        assert!(agent.history().is_empty());
        assert!(agent.last_action().is_none());
    }

    #[test]
    fn test_patch_restricted_to_observation_keys() {
        let patch = restrict_to_patch_keys(json!({
            "target": {"ip": "1.2.3.4"},
            "web_directories_status": {},
            "attack_impact": {"shell_opened": true}
        }));
        assert!(patch.get("attack_impact").is_none());
        assert!(patch.get("target").is_some());
    }

    #[test]
    fn test_action_count_must_match_policy() {
        let schema = Arc::new(StateSchema::default_recon());
        let trainer = Arc::new(Mutex::new(DqnTrainer::new(
            256,
            3,
            &LearningConfig {
                hidden_sizes: [8, 8],
                ..LearningConfig::default()
            },
        )));
        let gateway = LlmGateway::new(
            Arc::new(ScriptedEngine(parking_lot::Mutex::new(VecDeque::new()))),
            DiskCache::in_memory(),
            DiskCache::in_memory(),
            schema.clone(),
            GatewaySettings::default(),
        );
        let corrector = Corrector::new("10.0.0.1", Arc::new(CorrectnessCache::new(DiskCache::in_memory())));
        let actions = ActionSpace::new(vec!["nmap -F {ip}".into()]).unwrap();
        assert!(ReconAgent::new(schema, actions, trainer, Arc::new(FailingRunner), gateway, corrector).is_err());
    }
}
