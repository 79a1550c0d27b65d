//! Recon Agent - Training Entry Point
//!
//! Runs reconnaissance episodes against the configured target, trains the
//! Q-network from prioritized replay after every episode and saves the
//! weights at the end of the run.

use clap::Parser;
use parking_lot::Mutex;
use recon_agent::agent::ReconAgent;
use recon_agent::blackboard::Blackboard;
use recon_agent::core::error::{ReconError, Result};
use recon_agent::core::ReconConfig;
use recon_agent::learning::DqnTrainer;
use recon_agent::orchestrator::{AgentManager, Orchestrator};
use recon_agent::schema::StateSchema;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Train the reconnaissance policy
#[derive(Parser, Debug)]
#[command(name = "recon-agent")]
#[command(about = "Train the reconnaissance policy against a target host")]
struct Args {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Target IP, overrides the config
    #[arg(long)]
    target: Option<String>,

    /// Number of episodes, overrides the config
    #[arg(long)]
    episodes: Option<usize>,

    /// Random seed, overrides the config
    #[arg(long)]
    seed: Option<u64>,

    /// Continue from the saved model instead of fresh weights
    #[arg(long)]
    resume: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("recon_agent=info")),
        )
        .init();

    let args = Args::parse();
    match train(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "training aborted");
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

async fn train(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ReconConfig::from_toml_file(path)?,
        None => ReconConfig::default(),
    };
    if let Some(target) = args.target {
        config.target_ip = target;
    }
    if let Some(episodes) = args.episodes {
        config.learning.num_episodes = episodes;
    }
    if let Some(seed) = args.seed {
        config.learning.seed = seed;
    }
    config.validate()?;

    let schema = Arc::new(StateSchema::load(config.schema_path.as_deref())?);
    let learning = config.learning.clone();

    let trainer = Arc::new(Mutex::new(DqnTrainer::new(
        learning.max_encoding_features,
        config.actions.len(),
        &learning,
    )));
    if args.resume {
        trainer.lock().load(&config.model_path())?;
    }

    let agent = ReconAgent::from_config(&config, schema.clone(), trainer.clone())?;
    let mut manager = AgentManager::new();
    manager.register(Box::new(agent));

    let board = Blackboard::initialize(&config.target_ip, schema);
    let mut orchestrator =
        Orchestrator::new(board, manager, learning.max_steps_per_episode).with_default_stops();

    tracing::info!(
        host = config.target_ip,
        episodes = learning.num_episodes,
        actions = config.actions.len(),
        "Recon Agent training starting..."
    );

    for episode in 0..learning.num_episodes {
        let summary = orchestrator.run_scenario_loop().await?;

        let mut trainer = trainer.lock();
        trainer.decay_epsilon();
        let mut losses = Vec::new();
        for _ in 0..learning.batches_per_episode {
            match trainer.train_batch(learning.batch_size) {
                Ok(stats) => losses.push(stats.loss),
                Err(ReconError::InsufficientSamples { .. }) => break,
                Err(e) => return Err(e),
            }
        }
        let mean_loss = if losses.is_empty() {
            0.0
        } else {
            losses.iter().sum::<f32>() / losses.len() as f32
        };

        tracing::info!(
            episode,
            steps = summary.steps,
            reward = summary.total_reward,
            services = summary.services,
            epsilon = trainer.epsilon(),
            loss = mean_loss,
            "episode complete"
        );
    }

    trainer.lock().save(&config.model_path())?;
    Ok(())
}
