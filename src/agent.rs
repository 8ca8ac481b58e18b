use std::collections::HashMap;
use std::path::Path;

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Optimizer, VarBuilder, VarMap, loss};
use candle_optimisers::adam::{Adam, ParamsAdam};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::device::DeviceStrategy;
use crate::error::{ConfigError, DqnError, Result};
use crate::experience::Transition;
use crate::memory::ReplayMemory;
use crate::network::{ActionValueFunction, ConvQNetwork, Mode};
use crate::preprocess::{FrameConfig, FramePreprocessor};
use crate::state::Frame;

/// How the target network follows the online network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum TargetSync {
    /// Only explicit [`DqnAgent::sync_target`] calls touch the target.
    Never,
    /// Full copy after every `every` learning steps.
    Hard { every: usize },
    /// `target = tau * online + (1 - tau) * target` after each learning step.
    Soft { tau: f64 },
}

impl Default for TargetSync {
    fn default() -> Self {
        TargetSync::Hard { every: 1000 }
    }
}

/// Agent hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub memory_capacity: usize,
    pub minibatch_size: usize,
    pub target_sync: TargetSync,
    /// Seeds weight initialization, exploration and minibatch sampling.
    /// `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            learning_rate: 5e-4,
            discount_factor: 0.99,
            memory_capacity: 10_000,
            minibatch_size: 64,
            target_sync: TargetSync::default(),
            seed: None,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.learning_rate <= 0.0 {
            return Err(ConfigError::Validation(
                "agent.learning_rate must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return Err(ConfigError::Validation(
                "agent.discount_factor must be in [0, 1]".into(),
            ));
        }
        if self.minibatch_size == 0 {
            return Err(ConfigError::Validation(
                "agent.minibatch_size must be > 0".into(),
            ));
        }
        if self.memory_capacity <= self.minibatch_size {
            return Err(ConfigError::Validation(
                "agent.memory_capacity must be > agent.minibatch_size".into(),
            ));
        }
        match self.target_sync {
            TargetSync::Hard { every: 0 } => Err(ConfigError::Validation(
                "agent.target_sync.every must be > 0".into(),
            )),
            TargetSync::Soft { tau } if !(tau > 0.0 && tau <= 1.0) => Err(
                ConfigError::Validation("agent.target_sync.tau must be in (0, 1]".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// One-step temporal-difference targets, `r + gamma * max_next_q * (1 - done)`.
///
/// All inputs are `(B, 1)`. Callers pass `max_next_q` detached from any graph.
pub fn td_targets(
    rewards: &Tensor,
    max_next_q: &Tensor,
    dones: &Tensor,
    discount_factor: f64,
) -> candle_core::Result<Tensor> {
    let not_done = dones.affine(-1.0, 1.0)?;
    let bootstrap = max_next_q.affine(discount_factor, 0.0)?.mul(&not_done)?;
    rewards.add(&bootstrap)
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Deep Q-learning agent with an online and a target copy of the network.
pub struct DqnAgent<N: ActionValueFunction = ConvQNetwork> {
    online: N,
    target: N,
    online_vars: VarMap,
    target_vars: VarMap,
    optimiser: Adam,
    memory: ReplayMemory,
    preprocessor: FramePreprocessor,
    config: AgentConfig,
    device: Device,
    action_count: usize,
    steps_done: usize,
    learn_steps: usize,
    rng: StdRng,
}

impl<N: ActionValueFunction> DqnAgent<N> {
    pub fn new(
        config: AgentConfig,
        frame: FrameConfig,
        network: &N::Config,
        action_count: usize,
        device: DeviceStrategy,
    ) -> Result<Self> {
        config.validate()?;
        frame.validate()?;
        if action_count == 0 {
            return Err(ConfigError::Validation("action space must not be empty".into()).into());
        }
        let device = device.resolve();

        let online_vars = VarMap::new();
        let target_vars = VarMap::new();
        let online = N::build(
            network,
            &frame,
            action_count,
            VarBuilder::from_varmap(&online_vars, DType::F32, &device),
        )?;
        let target = N::build(
            network,
            &frame,
            action_count,
            VarBuilder::from_varmap(&target_vars, DType::F32, &device),
        )?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        reinitialize(&online_vars, &mut rng)?;

        let optimiser = Adam::new(
            online_vars.all_vars(),
            ParamsAdam {
                lr: config.learning_rate,
                ..Default::default()
            },
        )?;

        let mut agent = Self {
            online,
            target,
            online_vars,
            target_vars,
            optimiser,
            memory: ReplayMemory::new(config.memory_capacity)?,
            preprocessor: FramePreprocessor::new(frame, &device),
            config,
            device,
            action_count,
            steps_done: 0,
            learn_steps: 0,
            rng,
        };
        agent.sync_target()?;
        Ok(agent)
    }

    /// Epsilon-greedy action selection.
    pub fn act(&mut self, frame: &Frame, epsilon: f64) -> Result<usize> {
        if self.rng.random::<f64>() < epsilon {
            return Ok(self.rng.random_range(0..self.action_count));
        }
        let values = self.action_values(frame)?;
        Ok(argmax(&values))
    }

    /// Online network estimates for one frame, normalization in eval mode and
    /// no gradient tracking.
    pub fn action_values(&self, frame: &Frame) -> Result<Vec<f32>> {
        let state = self.preprocessor.preprocess(frame)?;
        let q = self.online.action_values(&state, Mode::Eval)?.detach();
        Ok(q.squeeze(0)?.to_vec1::<f32>()?)
    }

    /// Stores a transition. Once the memory holds more than a minibatch, every
    /// call also runs one learning step and returns its loss.
    pub fn observe(
        &mut self,
        state: &Frame,
        action: usize,
        reward: f32,
        next_state: &Frame,
        done: bool,
    ) -> Result<Option<f32>> {
        self.check_action(action)?;
        let transition = Transition {
            state: self.preprocessor.preprocess(state)?,
            action,
            reward,
            next_state: self.preprocessor.preprocess(next_state)?,
            done,
        };
        self.memory.push(transition);
        self.steps_done += 1;

        if self.memory.len() > self.config.minibatch_size {
            let batch = self
                .memory
                .sample(self.config.minibatch_size, &mut self.rng)?;
            let loss = self.learn(&batch, self.config.discount_factor)?;
            return Ok(Some(loss));
        }
        Ok(None)
    }

    /// One gradient step on the online network against targets computed by
    /// the target network. Returns the minibatch loss.
    pub fn learn(&mut self, batch: &[Transition], discount_factor: f64) -> Result<f32> {
        if batch.is_empty() {
            return Err(DqnError::InsufficientSamples {
                requested: 1,
                available: 0,
            });
        }
        let n = batch.len();

        let mut states = Vec::with_capacity(n);
        let mut next_states = Vec::with_capacity(n);
        let mut actions = Vec::with_capacity(n);
        let mut rewards = Vec::with_capacity(n);
        let mut dones: Vec<f32> = Vec::with_capacity(n);
        for transition in batch {
            self.check_action(transition.action)?;
            states.push(&transition.state);
            next_states.push(&transition.next_state);
            actions.push(transition.action as u32);
            rewards.push(transition.reward);
            dones.push(if transition.done { 1.0 } else { 0.0 });
        }

        let state_tensor = Tensor::cat(&states, 0)?;
        let next_state_tensor = Tensor::cat(&next_states, 0)?;
        let action_tensor = Tensor::from_vec(actions, (n, 1), &self.device)?;
        let reward_tensor = Tensor::from_vec(rewards, (n, 1), &self.device)?;
        let done_tensor = Tensor::from_vec(dones, (n, 1), &self.device)?;

        let next_q_values = self
            .target
            .action_values(&next_state_tensor, Mode::Eval)?
            .detach();
        let max_next_q = next_q_values.max_keepdim(D::Minus1)?;
        let expected_q_values =
            td_targets(&reward_tensor, &max_next_q, &done_tensor, discount_factor)?;

        let predicted_q_values = self.online.action_values(&state_tensor, Mode::Train)?;
        let relevant_q_values = predicted_q_values.gather(&action_tensor, D::Minus1)?;
        let loss = loss::mse(&relevant_q_values, &expected_q_values)?;

        self.optimiser.backward_step(&loss)?;
        self.learn_steps += 1;
        self.follow_online()?;

        Ok(loss.to_scalar::<f32>()?)
    }

    /// Overwrites every target parameter with the online one.
    pub fn sync_target(&mut self) -> Result<()> {
        let source_vars = self.online_vars.data().lock().map_err(lock_poisoned)?;
        let target_vars = self.target_vars.data().lock().map_err(lock_poisoned)?;
        for (name, target_var) in target_vars.iter() {
            let source_var = source_vars.get(name).ok_or_else(|| missing_var(name))?;
            target_var.set(&source_var.as_tensor().detach())?;
        }
        Ok(())
    }

    /// Moves every target parameter a fraction `tau` of the way to the online one.
    pub fn soft_update_target(&mut self, tau: f64) -> Result<()> {
        let source_vars = self.online_vars.data().lock().map_err(lock_poisoned)?;
        let target_vars = self.target_vars.data().lock().map_err(lock_poisoned)?;
        for (name, target_var) in target_vars.iter() {
            let source_var = source_vars.get(name).ok_or_else(|| missing_var(name))?;
            let blended = source_var
                .as_tensor()
                .detach()
                .affine(tau, 0.0)?
                .add(&target_var.as_tensor().affine(1.0 - tau, 0.0)?)?;
            target_var.set(&blended)?;
        }
        Ok(())
    }

    /// Writes the online parameters as a safetensors file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.online_vars.save(path)?;
        info!(path = %path.display(), "saved online parameters");
        Ok(())
    }

    /// Restores online parameters written by [`save`](Self::save) and copies
    /// them into the target.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.online_vars.load(path)?;
        self.sync_target()?;
        info!(path = %path.display(), "loaded online parameters");
        Ok(())
    }

    pub fn action_count(&self) -> usize {
        self.action_count
    }

    pub fn steps_done(&self) -> usize {
        self.steps_done
    }

    pub fn learn_steps(&self) -> usize {
        self.learn_steps
    }

    pub fn memory(&self) -> &ReplayMemory {
        &self.memory
    }

    pub fn online_vars(&self) -> &VarMap {
        &self.online_vars
    }

    pub fn target_vars(&self) -> &VarMap {
        &self.target_vars
    }

    fn check_action(&self, action: usize) -> Result<()> {
        if action >= self.action_count {
            return Err(DqnError::InvalidActionIndex {
                action,
                action_count: self.action_count,
            });
        }
        Ok(())
    }

    fn follow_online(&mut self) -> Result<()> {
        match self.config.target_sync {
            TargetSync::Never => {}
            TargetSync::Hard { every } => {
                if self.learn_steps % every == 0 {
                    self.sync_target()?;
                    debug!(learn_steps = self.learn_steps, "target network synchronized");
                }
            }
            TargetSync::Soft { tau } => self.soft_update_target(tau)?,
        }
        Ok(())
    }
}

/// Redraws every layer weight and bias from `rng`, uniform in
/// `±1 / sqrt(fan_in)`, visiting variables in name order. Normalization
/// parameters and running statistics keep their initial values.
fn reinitialize<R: Rng + ?Sized>(vars: &VarMap, rng: &mut R) -> Result<()> {
    let data = vars.data().lock().map_err(lock_poisoned)?;
    let mut names: Vec<&String> = data.keys().collect();
    names.sort();

    // Layers with a weight of rank >= 2 are linear or convolutional.
    let mut fan_in = HashMap::new();
    for name in &names {
        let dims = data[*name].as_tensor().dims();
        if let Some(prefix) = name.strip_suffix(".weight") {
            if dims.len() >= 2 {
                fan_in.insert(prefix, dims[1..].iter().product::<usize>());
            }
        }
    }

    for name in names {
        let prefix = match name.rsplit_once('.') {
            Some((prefix, "weight" | "bias")) => prefix,
            _ => continue,
        };
        let Some(&layer_fan_in) = fan_in.get(prefix) else {
            continue;
        };
        let var = &data[name];
        let bound = 1.0 / (layer_fan_in as f32).sqrt();
        let values: Vec<f32> = (0..var.elem_count())
            .map(|_| rng.random_range(-bound..bound))
            .collect();
        let tensor = Tensor::from_vec(values, var.dims(), var.device())?.to_dtype(var.dtype())?;
        var.set(&tensor)?;
    }
    Ok(())
}

fn lock_poisoned<T>(_: T) -> candle_core::Error {
    candle_core::Error::Msg("var map lock poisoned".into())
}

fn missing_var(name: &str) -> candle_core::Error {
    candle_core::Error::Msg(format!("online network has no variable {name}"))
}
