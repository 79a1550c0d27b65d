//! Greedy Policy Evaluation
//!
//! Loads the saved Q-network and drives reconnaissance with argmax actions,
//! without exploration or learning. Prints one JSON summary per episode.

use clap::Parser;
use parking_lot::Mutex;
use recon_agent::agent::ReconAgent;
use recon_agent::blackboard::Blackboard;
use recon_agent::core::error::Result;
use recon_agent::core::ReconConfig;
use recon_agent::learning::DqnTrainer;
use recon_agent::orchestrator::{AgentManager, Orchestrator};
use recon_agent::schema::StateSchema;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Recon Evaluation - replay the trained policy against a target
#[derive(Parser, Debug)]
#[command(name = "recon-eval")]
#[command(about = "Run the trained reconnaissance policy greedily")]
struct Args {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Model weights, defaults to <data_dir>/models/recon_model
    #[arg(long)]
    model: Option<PathBuf>,

    /// Target IP, overrides the config
    #[arg(long)]
    target: Option<String>,

    /// Episodes to run
    #[arg(long, default_value_t = 1)]
    episodes: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("recon_agent=info")),
        )
        .init();

    let args = Args::parse();
    match evaluate(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "evaluation aborted");
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

async fn evaluate(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ReconConfig::from_toml_file(path)?,
        None => ReconConfig::default(),
    };
    if let Some(target) = args.target {
        config.target_ip = target;
    }
    config.validate()?;

    let schema = Arc::new(StateSchema::load(config.schema_path.as_deref())?);
    let model_path = args.model.unwrap_or_else(|| config.model_path());

    let trainer = Arc::new(Mutex::new(DqnTrainer::new(
        config.learning.max_encoding_features,
        config.actions.len(),
        &config.learning,
    )));
    trainer.lock().load(&model_path)?;

    let agent = ReconAgent::from_config(&config, schema.clone(), trainer)?.evaluation();
    let mut manager = AgentManager::new();
    manager.register(Box::new(agent));

    let board = Blackboard::initialize(&config.target_ip, schema);
    let mut orchestrator =
        Orchestrator::new(board, manager, config.learning.max_steps_per_episode)
            .with_default_stops();

    for _ in 0..args.episodes {
        let summary = orchestrator.run_scenario_loop().await?;
        println!("{}", serde_json::to_string(&summary)?);
        println!("{}", serde_json::to_string_pretty(&orchestrator.board().state()["target"])?);
    }
    Ok(())
}
