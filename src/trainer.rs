use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::DqnAgent;
use crate::environment::Environment;
use crate::error::{ConfigError, Result};
use crate::metrics::{EpisodeRecord, ScoreWindow, write_history_csv};
use crate::network::ActionValueFunction;

/// Episode loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: usize,
    pub max_steps_per_episode: usize,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    /// Multiplied into epsilon after every episode.
    pub epsilon_decay: f64,
    pub score_window: usize,
    /// Training stops once the window mean reaches this score.
    pub solved_threshold: f32,
    pub checkpoint_path: PathBuf,
    pub log_interval: usize,
    pub history_csv: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            episodes: 500,
            max_steps_per_episode: 2000,
            epsilon_start: 1.0,
            epsilon_end: 0.01,
            epsilon_decay: 0.99,
            score_window: 100,
            solved_threshold: 500.0,
            checkpoint_path: PathBuf::from("checkpoint.safetensors"),
            log_interval: 100,
            history_csv: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.episodes == 0 {
            return Err(ConfigError::Validation(
                "training.episodes must be > 0".into(),
            ));
        }
        if self.max_steps_per_episode == 0 {
            return Err(ConfigError::Validation(
                "training.max_steps_per_episode must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.epsilon_start) || !(0.0..=1.0).contains(&self.epsilon_end)
        {
            return Err(ConfigError::Validation(
                "training.epsilon_start and training.epsilon_end must be in [0, 1]".into(),
            ));
        }
        if self.epsilon_end > self.epsilon_start {
            return Err(ConfigError::Validation(
                "training.epsilon_end must be <= training.epsilon_start".into(),
            ));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(ConfigError::Validation(
                "training.epsilon_decay must be in (0, 1]".into(),
            ));
        }
        if self.score_window == 0 {
            return Err(ConfigError::Validation(
                "training.score_window must be > 0".into(),
            ));
        }
        if self.log_interval == 0 {
            return Err(ConfigError::Validation(
                "training.log_interval must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub episodes_run: usize,
    pub total_steps: usize,
    pub final_epsilon: f64,
    pub average_score: f32,
    /// Where the parameters were written, set only when the level was solved.
    pub checkpoint: Option<PathBuf>,
    pub history: Vec<EpisodeRecord>,
}

impl TrainingSummary {
    pub fn solved(&self) -> bool {
        self.checkpoint.is_some()
    }
}

pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Trainer { config })
    }

    /// Plays episodes until the score window reaches the solved threshold or
    /// the episode budget runs out. Any error aborts the run.
    pub fn run<N, E>(&self, agent: &mut DqnAgent<N>, env: &mut E) -> Result<TrainingSummary>
    where
        N: ActionValueFunction,
        E: Environment,
    {
        if env.action_count() != agent.action_count() {
            return Err(ConfigError::Validation(format!(
                "environment has {} actions, agent was built for {}",
                env.action_count(),
                agent.action_count()
            ))
            .into());
        }

        let cfg = &self.config;
        let mut epsilon = cfg.epsilon_start;
        let mut window = ScoreWindow::new(cfg.score_window);
        let mut history = Vec::new();
        let mut total_steps = 0;
        let mut checkpoint = None;

        info!(
            episodes = cfg.episodes,
            max_steps = cfg.max_steps_per_episode,
            "starting training"
        );

        for episode in 1..=cfg.episodes {
            let (mut state, _) = env.reset()?;
            let mut score = 0.0f32;
            let mut steps = 0;
            let mut loss_sum = 0.0f32;
            let mut loss_count = 0usize;

            for _ in 0..cfg.max_steps_per_episode {
                let action = agent.act(&state, epsilon)?;
                let step = env.step(action)?;
                if let Some(loss) =
                    agent.observe(&state, action, step.reward, &step.observation, step.terminated)?
                {
                    loss_sum += loss;
                    loss_count += 1;
                }
                state = step.observation;
                score += step.reward;
                steps += 1;
                if step.terminated || step.truncated {
                    break;
                }
            }
            total_steps += steps;
            window.push(score);

            let record = EpisodeRecord {
                episode,
                score,
                average_score: window.mean(),
                epsilon,
                steps,
                mean_loss: (loss_count > 0).then(|| loss_sum / loss_count as f32),
            };
            epsilon = (epsilon * cfg.epsilon_decay).max(cfg.epsilon_end);

            if episode % cfg.log_interval == 0 {
                info!(
                    episode,
                    average_score = record.average_score,
                    epsilon = record.epsilon,
                    "progress"
                );
            } else {
                debug!(episode, score, steps, "episode finished");
            }
            history.push(record);

            if window.mean() >= cfg.solved_threshold {
                info!(episode, average_score = window.mean(), "environment solved");
                agent.save(&cfg.checkpoint_path)?;
                checkpoint = Some(cfg.checkpoint_path.clone());
                break;
            }
        }

        if let Some(path) = &cfg.history_csv {
            write_history_csv(path, &history)?;
            info!(path = %path.display(), "wrote episode history");
        }

        Ok(TrainingSummary {
            episodes_run: history.len(),
            total_steps,
            final_epsilon: epsilon,
            average_score: window.mean(),
            checkpoint,
            history,
        })
    }
}
