//! The reconnaissance agent and its collaborators

pub mod actions;
pub mod executor;
pub mod recon;
pub mod reward;

pub use actions::ActionSpace;
pub use executor::{CommandRunner, ShellRunner};
pub use recon::{ReconAgent, StepOutcome, RECON_AGENT};
pub use reward::compute_reward;
