//! One reconnaissance episode

use crate::blackboard::Blackboard;
use crate::core::error::Result;
use crate::core::types::EpisodeId;
use crate::orchestrator::manager::AgentManager;
use crate::orchestrator::policies::StopPredicate;
use serde::Serialize;

/// Why an episode ended
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StopReason {
    StepBudget,
    Predicate(String),
    Inactive,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpisodeSummary {
    pub episode: EpisodeId,
    pub steps: usize,
    pub total_reward: f32,
    pub services: usize,
    pub errors: usize,
    pub actions: Vec<String>,
    pub stop_reason: StopReason,
}

pub struct Orchestrator {
    board: Blackboard,
    manager: AgentManager,
    stop_predicates: Vec<StopPredicate>,
    max_steps: usize,
    steps: usize,
    active: bool,
    episode: EpisodeId,
}

impl Orchestrator {
    pub fn new(board: Blackboard, manager: AgentManager, max_steps: usize) -> Self {
        Self {
            board,
            manager,
            stop_predicates: Vec::new(),
            max_steps,
            steps: 0,
            active: false,
            episode: EpisodeId::new(),
        }
    }

    pub fn with_stop_predicate(mut self, predicate: StopPredicate) -> Self {
        self.stop_predicates.push(predicate);
        self
    }

    /// Stop when a shell is opened or the agent is detected
    pub fn with_default_stops(self) -> Self {
        self.with_stop_predicate(StopPredicate::ShellOpened)
            .with_stop_predicate(StopPredicate::DetectedByDefenses)
    }

    pub fn start(&mut self) {
        self.board.reset();
        self.manager.reset_all();
        self.steps = 0;
        self.active = true;
        self.episode = EpisodeId::new();
        tracing::info!(episode = %self.episode, host = self.board.target_ip(), "episode started");
    }

    pub fn should_continue(&self) -> bool {
        self.stop_reason().is_none()
    }

    fn stop_reason(&self) -> Option<StopReason> {
        if !self.active {
            return Some(StopReason::Inactive);
        }
        if self.steps >= self.max_steps {
            return Some(StopReason::StepBudget);
        }
        self.stop_predicates
            .iter()
            .find(|p| p.holds(&self.board))
            .map(|p| StopReason::Predicate(p.name()))
    }

    /// One manager turn; counts against the step budget even when idle
    pub async fn step(&mut self) -> Result<()> {
        self.steps += 1;
        if self.manager.run_next(&mut self.board).await?.is_none() {
            tracing::debug!(step = self.steps, "no agent ready");
        }
        Ok(())
    }

    pub fn end(&mut self) {
        self.active = false;
        tracing::info!(episode = %self.episode, steps = self.steps, "episode ended");
    }

    pub async fn run_scenario_loop(&mut self) -> Result<EpisodeSummary> {
        self.start();
        while self.should_continue() {
            if let Err(e) = self.step().await {
                tracing::warn!(episode = %self.episode, step = self.steps, error = %e, "step failed");
                self.end();
                return Err(e);
            }
        }
        let stop_reason = self.stop_reason().unwrap_or(StopReason::Inactive);
        self.end();
        Ok(self.summary(stop_reason))
    }

    fn summary(&self, stop_reason: StopReason) -> EpisodeSummary {
        let state = self.board.state();
        let rewards = state["reward_log"].as_array();
        EpisodeSummary {
            episode: self.episode,
            steps: self.steps,
            total_reward: rewards
                .map(|log| log.iter().filter_map(|e| e["reward"].as_f64()).sum::<f64>() as f32)
                .unwrap_or(0.0),
            services: state["target"]["services"].as_array().map_or(0, Vec::len),
            errors: state["errors"].as_array().map_or(0, Vec::len),
            actions: rewards
                .map(|log| {
                    log.iter()
                        .filter_map(|e| e["action"].as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            stop_reason,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn board(&self) -> &Blackboard {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Blackboard {
        &mut self.board
    }

    pub fn manager_mut(&mut self) -> &mut AgentManager {
        &mut self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ReconError;
    use crate::orchestrator::manager::Agent;
    use crate::schema::StateSchema;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Opens a shell on its third turn
    struct Exploiter {
        turns: usize,
    }

    #[async_trait]
    impl Agent for Exploiter {
        fn name(&self) -> &str {
            "exploiter"
        }

        fn should_run(&self, _board: &Blackboard) -> bool {
            true
        }

        async fn run(&mut self, board: &mut Blackboard) -> Result<()> {
            self.turns += 1;
            board.record_reward("probe", 0.5);
            if self.turns == 3 {
                board.mark_shell_opened();
            }
            Ok(())
        }

        fn last_action(&self) -> Option<&str> {
            Some("probe")
        }

        fn reset(&mut self) {
            self.turns = 0;
        }
    }

    fn orchestrator(max_steps: usize) -> Orchestrator {
        let board = Blackboard::initialize("10.0.0.1", Arc::new(StateSchema::default_recon()));
        let mut manager = AgentManager::new();
        manager.register(Box::new(Exploiter { turns: 0 }));
        Orchestrator::new(board, manager, max_steps)
    }

    #[tokio::test]
    async fn test_step_budget_ends_episode() {
        let mut orch = orchestrator(2);
        let summary = orch.run_scenario_loop().await.unwrap();
        assert_eq!(summary.steps, 2);
        assert_eq!(summary.stop_reason, StopReason::StepBudget);
        assert!((summary.total_reward - 1.0).abs() < 1e-6);
        assert!(!orch.is_active());
    }

    #[tokio::test]
    async fn test_shell_opened_stops_early() {
        let mut orch = orchestrator(10).with_default_stops();
        let summary = orch.run_scenario_loop().await.unwrap();
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.stop_reason, StopReason::Predicate("shell_opened".into()));
    }

    #[tokio::test]
    async fn test_start_resets_between_episodes() {
        let mut orch = orchestrator(10).with_default_stops();
        orch.run_scenario_loop().await.unwrap();
        let second = orch.run_scenario_loop().await.unwrap();
        assert_eq!(second.steps, 3);
        assert_eq!(second.actions.len(), 3);
    }

    /// Fails on its second turn
    struct Crasher {
        turns: usize,
    }

    #[async_trait]
    impl Agent for Crasher {
        fn name(&self) -> &str {
            "crasher"
        }

        fn should_run(&self, _board: &Blackboard) -> bool {
            true
        }

        async fn run(&mut self, _board: &mut Blackboard) -> Result<()> {
            self.turns += 1;
            if self.turns == 2 {
                return Err(ReconError::Command("nmap: exit status 1".into()));
            }
            Ok(())
        }

        fn last_action(&self) -> Option<&str> {
            None
        }

        fn reset(&mut self) {
            self.turns = 0;
        }
    }

    #[tokio::test]
    async fn test_failed_step_ends_episode() {
        let board = Blackboard::initialize("10.0.0.1", Arc::new(StateSchema::default_recon()));
        let mut manager = AgentManager::new();
        manager.register(Box::new(Crasher { turns: 0 }));
        let mut orch = Orchestrator::new(board, manager, 10);

        let err = orch.run_scenario_loop().await.unwrap_err();
        assert!(matches!(err, ReconError::Command(_)));
        assert!(!orch.is_active());
        assert!(!orch.should_continue());
        assert_eq!(orch.steps(), 2);
    }

    #[test]
    fn test_inactive_orchestrator_does_not_continue() {
        let orch = orchestrator(10);
        assert!(!orch.should_continue());
    }
}
