use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use pixel_dqn::config::{AppConfig, Architecture};
use pixel_dqn::maze::PelletMaze;
use pixel_dqn::mlp::MlpQNetwork;
use pixel_dqn::{ActionValueFunction, ConvQNetwork, DeviceStrategy, DqnAgent, Environment, Trainer};

#[derive(Parser)]
#[command(name = "pixel-dqn", about = "Deep Q-learning on a pixel game level")]
struct Args {
    /// TOML config; defaults are used when the file does not exist.
    #[arg(long, default_value = "pixel-dqn.toml")]
    config: PathBuf,
    #[arg(long)]
    episodes: Option<usize>,
    #[arg(long, value_enum)]
    device: Option<DeviceStrategy>,
    #[arg(long, value_enum)]
    architecture: Option<Architecture>,
    /// Where to write the online parameters once the level is solved.
    #[arg(long)]
    checkpoint: Option<PathBuf>,
    /// Start from a previously saved parameter snapshot.
    #[arg(long)]
    resume: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    history_csv: Option<PathBuf>,
    /// Pixel size of one maze cell.
    #[arg(long, default_value_t = 8)]
    cell_px: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let args = Args::parse();

    let mut config = AppConfig::load_or_default(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Some(episodes) = args.episodes {
        config.training.episodes = episodes;
    }
    if let Some(device) = args.device {
        config.device = device;
    }
    if let Some(architecture) = args.architecture {
        config.network.architecture = architecture;
    }
    if let Some(checkpoint) = args.checkpoint {
        config.training.checkpoint_path = checkpoint;
    }
    if let Some(seed) = args.seed {
        config.agent.seed = Some(seed);
    }
    if args.history_csv.is_some() {
        config.training.history_csv = args.history_csv;
    }
    config.validate()?;

    let mut env = PelletMaze::new(args.cell_px);
    info!(
        observation_shape = ?env.observation_shape(),
        actions = env.action_count(),
        architecture = ?config.network.architecture,
        "environment ready"
    );

    match config.network.architecture {
        Architecture::Conv => train::<ConvQNetwork, _>(
            &config,
            &config.network.conv,
            &mut env,
            args.resume.as_deref(),
        ),
        Architecture::Mlp => train::<MlpQNetwork, _>(
            &config,
            &config.network.mlp,
            &mut env,
            args.resume.as_deref(),
        ),
    }
}

fn train<N, E>(
    config: &AppConfig,
    network: &N::Config,
    env: &mut E,
    resume: Option<&Path>,
) -> Result<()>
where
    N: ActionValueFunction,
    E: Environment,
{
    let mut agent = DqnAgent::<N>::new(
        config.agent.clone(),
        config.frame,
        network,
        env.action_count(),
        config.device,
    )?;
    if let Some(path) = resume {
        agent
            .load(path)
            .with_context(|| format!("failed to resume from {}", path.display()))?;
    }

    let trainer = Trainer::new(config.training.clone())?;
    let summary = trainer.run(&mut agent, env)?;

    if summary.solved() {
        info!(
            episodes = summary.episodes_run,
            average_score = summary.average_score,
            "level solved"
        );
    } else {
        info!(
            episodes = summary.episodes_run,
            average_score = summary.average_score,
            "episode budget exhausted before solving"
        );
    }
    Ok(())
}
