//! Episode stop predicates and per-agent run policies

use crate::blackboard::Blackboard;

/// Ends the episode when it holds for the blackboard
#[derive(Debug, Clone, PartialEq)]
pub enum StopPredicate {
    ShellOpened,
    DetectedByDefenses,
    All(Vec<StopPredicate>),
    Any(Vec<StopPredicate>),
}

impl StopPredicate {
    pub fn holds(&self, board: &Blackboard) -> bool {
        match self {
            StopPredicate::ShellOpened => board.shell_opened(),
            StopPredicate::DetectedByDefenses => board.detected_by_defenses(),
            StopPredicate::All(parts) => parts.iter().all(|p| p.holds(board)),
            StopPredicate::Any(parts) => parts.iter().any(|p| p.holds(board)),
        }
    }

    pub fn name(&self) -> String {
        match self {
            StopPredicate::ShellOpened => "shell_opened".into(),
            StopPredicate::DetectedByDefenses => "detected_by_defenses".into(),
            StopPredicate::All(parts) => format!(
                "all({})",
                parts.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
            ),
            StopPredicate::Any(parts) => format!(
                "any({})",
                parts.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

/// Decides whether an agent takes its turn
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RunPolicy {
    Always,
    /// No services discovered yet
    NoServicesYet,
    /// The agent has errors recorded on the board
    ErrorsRecorded,
    /// Not run for more than this many seconds (or never run)
    IdleFor(f64),
    /// Skip once a shell is open
    #[default]
    SkipWhenShellOpen,
    All(Vec<RunPolicy>),
    Any(Vec<RunPolicy>),
}

impl RunPolicy {
    /// `last_run` is the board clock (seconds) at the agent's previous turn
    pub fn allows(&self, board: &Blackboard, agent: &str, last_run: Option<f64>) -> bool {
        match self {
            RunPolicy::Always => true,
            RunPolicy::NoServicesYet => !board.has_services(),
            RunPolicy::ErrorsRecorded => board.errors_for(agent) > 0,
            RunPolicy::IdleFor(secs) => match last_run {
                Some(t) => board.elapsed() - t > *secs,
                None => true,
            },
            RunPolicy::SkipWhenShellOpen => !board.shell_opened(),
            RunPolicy::All(parts) => parts.iter().all(|p| p.allows(board, agent, last_run)),
            RunPolicy::Any(parts) => parts.iter().any(|p| p.allows(board, agent, last_run)),
        }
    }
}
