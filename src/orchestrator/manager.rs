//! Agent trait and round-robin scheduling

use crate::blackboard::Blackboard;
use crate::core::error::Result;
use async_trait::async_trait;

/// A participant in an episode
///
/// Agents run one at a time; each `run` sees the board as left by the
/// previous agent.
#[async_trait]
pub trait Agent: Send {
    fn name(&self) -> &str;

    fn should_run(&self, board: &Blackboard) -> bool;

    async fn run(&mut self, board: &mut Blackboard) -> Result<()>;

    fn last_action(&self) -> Option<&str>;

    /// Clear per-episode state
    fn reset(&mut self) {}
}

/// Round-robin cursor over registered agents
#[derive(Default)]
pub struct AgentManager {
    agents: Vec<Box<dyn Agent>>,
    cursor: usize,
}

impl AgentManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: Box<dyn Agent>) {
        tracing::debug!(agent = agent.name(), "agent registered");
        self.agents.push(agent);
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    pub fn reset_all(&mut self) {
        self.cursor = 0;
        for agent in &mut self.agents {
            agent.reset();
        }
    }

    /// Run the next agent whose policy allows it; returns its name
    ///
    /// `None` when no agent is ready this turn.
    pub async fn run_next(&mut self, board: &mut Blackboard) -> Result<Option<String>> {
        let n = self.agents.len();
        for offset in 0..n {
            let idx = (self.cursor + offset) % n;
            if !self.agents[idx].should_run(board) {
                continue;
            }
            self.cursor = (idx + 1) % n;
            let agent = &mut self.agents[idx];
            agent.run(board).await?;
            tracing::info!(
                agent = agent.name(),
                action = agent.last_action().unwrap_or("-"),
                "agent step"
            );
            return Ok(Some(agent.name().to_string()));
        }
        Ok(None)
    }
}
