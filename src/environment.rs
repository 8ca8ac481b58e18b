use std::collections::HashMap;

use crate::error::Result;
use crate::state::Frame;

/// Free-form diagnostics an environment may attach to a reset or step.
pub type StepInfo = HashMap<String, f64>;

pub struct Step {
    pub observation: Frame,
    pub reward: f32,
    /// The episode reached a terminal state; nothing follows it.
    pub terminated: bool,
    /// The episode was cut short from outside (time limit and the like).
    pub truncated: bool,
    pub info: StepInfo,
}

/// A game level the agent can play, one discrete action per step.
pub trait Environment {
    fn reset(&mut self) -> Result<(Frame, StepInfo)>;

    fn step(&mut self, action: usize) -> Result<Step>;

    /// `(height, width, channels)` of every observation.
    fn observation_shape(&self) -> (usize, usize, usize);

    fn action_count(&self) -> usize;
}
