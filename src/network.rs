use candle_core::Tensor;
use candle_nn::{
    BatchNorm, Conv2d, Conv2dConfig, Linear, Module, ModuleT, VarBuilder, batch_norm, conv2d,
    linear,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::preprocess::FrameConfig;

/// Whether normalization layers use minibatch statistics (and update their
/// running estimates) or the running estimates alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

impl Mode {
    fn is_train(self) -> bool {
        self == Mode::Train
    }
}

/// Maps a batch of preprocessed states `(B, C, H, W)` to action values
/// `(B, action_count)`.
pub trait ActionValueFunction: Sized {
    type Config: Clone;

    /// Registers every parameter under `vb`.
    fn build(
        config: &Self::Config,
        frame: &FrameConfig,
        action_count: usize,
        vb: VarBuilder,
    ) -> Result<Self>;

    fn action_values(&self, states: &Tensor, mode: Mode) -> candle_core::Result<Tensor>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvLayerConfig {
    pub out_channels: usize,
    pub kernel: usize,
    pub stride: usize,
}

impl ConvLayerConfig {
    pub const fn new(out_channels: usize, kernel: usize, stride: usize) -> Self {
        Self {
            out_channels,
            kernel,
            stride,
        }
    }
}

/// Convolutional Q-network layout.
///
/// ```text
/// Input:  [batch, 3, 128, 128]
/// Conv1:  3 -> 32, 8x8 stride 4   => [batch, 32, 31, 31]  BN, ReLU
/// Conv2:  32 -> 64, 4x4 stride 2  => [batch, 64, 14, 14]  BN, ReLU
/// Conv3:  64 -> 64, 3x3 stride 1  => [batch, 64, 12, 12]  BN, ReLU
/// Conv4:  64 -> 128, 3x3 stride 1 => [batch, 128, 10, 10] BN, ReLU
/// Flatten: 12800
/// FC1:    12800 -> 512, ReLU
/// FC2:    512 -> 256, ReLU
/// Out:    256 -> action_count
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvNetConfig {
    pub conv_layers: Vec<ConvLayerConfig>,
    pub hidden: Vec<usize>,
}

impl Default for ConvNetConfig {
    fn default() -> Self {
        ConvNetConfig {
            conv_layers: vec![
                ConvLayerConfig::new(32, 8, 4),
                ConvLayerConfig::new(64, 4, 2),
                ConvLayerConfig::new(64, 3, 1),
                ConvLayerConfig::new(128, 3, 1),
            ],
            hidden: vec![512, 256],
        }
    }
}

impl ConvNetConfig {
    /// Spatial size and channel count after the conv stack.
    pub fn feature_shape(&self, frame: &FrameConfig) -> std::result::Result<(usize, usize, usize), ConfigError> {
        let (mut c, mut h, mut w) = (frame.channels, frame.height, frame.width);
        for (i, layer) in self.conv_layers.iter().enumerate() {
            if layer.stride == 0 || layer.kernel == 0 {
                return Err(ConfigError::Validation(format!(
                    "conv layer {i} needs a non-zero kernel and stride"
                )));
            }
            if layer.kernel > h || layer.kernel > w {
                return Err(ConfigError::Validation(format!(
                    "conv layer {i} kernel {} does not fit a {h}x{w} feature map",
                    layer.kernel
                )));
            }
            h = (h - layer.kernel) / layer.stride + 1;
            w = (w - layer.kernel) / layer.stride + 1;
            c = layer.out_channels;
        }
        Ok((c, h, w))
    }
}

pub struct ConvQNetwork {
    blocks: Vec<(Conv2d, BatchNorm)>,
    hidden: Vec<Linear>,
    head: Linear,
}

impl ActionValueFunction for ConvQNetwork {
    type Config = ConvNetConfig;

    fn build(
        config: &ConvNetConfig,
        frame: &FrameConfig,
        action_count: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let (c, h, w) = config.feature_shape(frame)?;

        let mut blocks = Vec::with_capacity(config.conv_layers.len());
        let mut in_channels = frame.channels;
        for (i, layer) in config.conv_layers.iter().enumerate() {
            let conv_cfg = Conv2dConfig {
                stride: layer.stride,
                ..Default::default()
            };
            let conv = conv2d(
                in_channels,
                layer.out_channels,
                layer.kernel,
                conv_cfg,
                vb.pp(format!("conv{i}")),
            )?;
            let bn = batch_norm(layer.out_channels, 1e-5, vb.pp(format!("bn{i}")))?;
            blocks.push((conv, bn));
            in_channels = layer.out_channels;
        }

        let mut width = c * h * w;
        let mut hidden = Vec::with_capacity(config.hidden.len());
        for (i, &size) in config.hidden.iter().enumerate() {
            hidden.push(linear(width, size, vb.pp(format!("fc{i}")))?);
            width = size;
        }
        let head = linear(width, action_count, vb.pp("head"))?;

        Ok(Self {
            blocks,
            hidden,
            head,
        })
    }

    fn action_values(&self, states: &Tensor, mode: Mode) -> candle_core::Result<Tensor> {
        let mut x = states.clone();
        for (conv, bn) in &self.blocks {
            x = conv.forward(&x)?;
            x = bn.forward_t(&x, mode.is_train())?;
            x = x.relu()?;
        }
        x = x.flatten_from(1)?;
        for layer in &self.hidden {
            x = layer.forward(&x)?.relu()?;
        }
        self.head.forward(&x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn tiny_frame() -> FrameConfig {
        FrameConfig {
            height: 32,
            width: 32,
            channels: 3,
        }
    }

    fn tiny_net() -> ConvNetConfig {
        ConvNetConfig {
            conv_layers: vec![ConvLayerConfig::new(8, 8, 4), ConvLayerConfig::new(16, 4, 2)],
            hidden: vec![32, 16],
        }
    }

    fn build(config: &ConvNetConfig, frame: &FrameConfig) -> Result<ConvQNetwork> {
        let vm = VarMap::new();
        let vb = VarBuilder::from_varmap(&vm, DType::F32, &Device::Cpu);
        ConvQNetwork::build(config, frame, 4, vb)
    }

    #[test]
    fn test_default_feature_shape_matches_layout() {
        let shape = ConvNetConfig::default()
            .feature_shape(&FrameConfig::default())
            .unwrap();
        assert_eq!(shape, (128, 10, 10));
    }

    #[test]
    fn test_output_shape() {
        let net = build(&tiny_net(), &tiny_frame()).unwrap();
        let input = Tensor::rand(0f32, 1f32, (5, 3, 32, 32), &Device::Cpu).unwrap();
        let out = net.action_values(&input, Mode::Train).unwrap();
        assert_eq!(out.dims(), &[5, 4]);
        let out = net.action_values(&input, Mode::Eval).unwrap();
        assert_eq!(out.dims(), &[5, 4]);
    }

    #[test]
    fn test_frame_too_small_is_rejected() {
        let frame = FrameConfig {
            height: 6,
            width: 6,
            channels: 3,
        };
        assert!(build(&tiny_net(), &frame).is_err());
    }

    #[test]
    fn test_eval_mode_ignores_batch_companions() {
        let net = build(&tiny_net(), &tiny_frame()).unwrap();
        let batch = Tensor::rand(0f32, 1f32, (4, 3, 32, 32), &Device::Cpu).unwrap();
        let first = batch.narrow(0, 0, 1).unwrap();

        let alone = net.action_values(&first, Mode::Eval).unwrap();
        let in_batch = net.action_values(&batch, Mode::Eval).unwrap().narrow(0, 0, 1).unwrap();
        let diff = (alone - in_batch)
            .unwrap()
            .abs()
            .unwrap()
            .max_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(diff < 1e-4, "eval output changed with batch contents: {diff}");
    }
}
