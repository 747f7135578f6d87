use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use oversight_grid::modes::{run_play, run_training};
use oversight_grid::rl::{RewardFn, TrainConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "oversight_grid")]
#[command(version, about = "Policy-gradient experiments in a grid world with oversight")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a policy and write metrics, weights and snapshots
    Train {
        /// TOML run configuration (defaults are used when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the run id
        #[arg(long)]
        run_id: Option<String>,

        /// Override the seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the number of learning updates
        #[arg(long)]
        updates: Option<usize>,

        /// Override the training reward
        #[arg(long, value_enum)]
        reward: Option<RewardFn>,
    },

    /// Watch a trained policy play
    Play {
        /// Metadata file written next to the weights (`policy_<run_id>.meta.json`)
        #[arg(long)]
        model: PathBuf,

        /// Number of episodes to play
        #[arg(long, default_value = "5")]
        episodes: usize,

        /// Only print episode outcomes
        #[arg(long)]
        no_render: bool,

        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            run_id,
            seed,
            updates,
            reward,
        } => {
            let mut train_config = match config {
                Some(path) => TrainConfig::from_file(&path)?,
                None => TrainConfig::default(),
            };
            if run_id.is_some() {
                train_config.run_id = run_id;
            }
            if seed.is_some() {
                train_config.seed = seed;
            }
            if let Some(updates) = updates {
                train_config.num_learning_updates = updates;
            }
            if let Some(reward) = reward {
                train_config.reward_fn = reward;
            }

            let outputs = run_training(train_config)?;
            tracing::info!(run_id = %outputs.run_id, "Run finished");
        }
        Command::Play {
            model,
            episodes,
            no_render,
            seed,
        } => {
            run_play(&model, episodes, !no_render, seed)?;
        }
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,burn=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
