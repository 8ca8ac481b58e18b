use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;

use polars::frame::DataFrame;
use polars::io::SerWriter;
use polars::prelude::{Column, CsvWriter};

use crate::error::Result;

/// Rolling window over the most recent episode scores.
pub struct ScoreWindow {
    scores: VecDeque<f32>,
    capacity: usize,
}

impl ScoreWindow {
    pub fn new(capacity: usize) -> Self {
        ScoreWindow {
            scores: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, score: f32) {
        if self.scores.len() == self.capacity {
            self.scores.pop_front();
        }
        self.scores.push_back(score);
    }

    pub fn mean(&self) -> f32 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.iter().sum::<f32>() / self.scores.len() as f32
    }
}

/// Summary of one finished episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRecord {
    pub episode: usize,
    pub score: f32,
    pub average_score: f32,
    pub epsilon: f64,
    pub steps: usize,
    /// Mean loss over the learning steps run during the episode, if any.
    pub mean_loss: Option<f32>,
}

pub fn write_history_csv(path: &Path, history: &[EpisodeRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut df = DataFrame::new(vec![
        Column::new(
            "episode".into(),
            history.iter().map(|r| r.episode as u32).collect::<Vec<_>>(),
        ),
        Column::new(
            "score".into(),
            history.iter().map(|r| r.score).collect::<Vec<_>>(),
        ),
        Column::new(
            "average_score".into(),
            history.iter().map(|r| r.average_score).collect::<Vec<_>>(),
        ),
        Column::new(
            "epsilon".into(),
            history.iter().map(|r| r.epsilon).collect::<Vec<_>>(),
        ),
        Column::new(
            "steps".into(),
            history.iter().map(|r| r.steps as u32).collect::<Vec<_>>(),
        ),
        Column::new(
            "mean_loss".into(),
            history.iter().map(|r| r.mean_loss).collect::<Vec<_>>(),
        ),
    ])?;

    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}
