use candle_core::Tensor;
use candle_nn::{Linear, Module, VarBuilder, linear};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::network::{ActionValueFunction, Mode};
use crate::preprocess::FrameConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpConfig {
    pub hidden: Vec<usize>,
}

impl Default for MlpConfig {
    fn default() -> Self {
        MlpConfig { hidden: vec![256] }
    }
}

/// Fully connected Q-network over the flattened frame. Has no normalization
/// layers, so train and eval mode behave the same.
pub struct MlpQNetwork {
    layers: Vec<Linear>,
}

impl ActionValueFunction for MlpQNetwork {
    type Config = MlpConfig;

    fn build(
        config: &MlpConfig,
        frame: &FrameConfig,
        action_count: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let mut topology = Vec::with_capacity(config.hidden.len() + 2);
        topology.push(frame.numel());
        topology.extend_from_slice(&config.hidden);
        topology.push(action_count);

        let mut layers: Vec<Linear> = Vec::with_capacity(topology.len() - 1);
        for i in 0..(topology.len() - 1) {
            layers.push(linear(topology[i], topology[i + 1], vb.pp(i))?);
        }
        Ok(Self { layers })
    }

    fn action_values(&self, states: &Tensor, _mode: Mode) -> candle_core::Result<Tensor> {
        let mut x = states.flatten_from(1)?;
        for layer in self.layers.iter().take(self.layers.len() - 1) {
            x = layer.forward(&x)?;
            x = x.relu()?;
        }
        if let Some(last_layer) = self.layers.last() {
            x = last_layer.forward(&x)?;
        }
        Ok(x)
    }
}
