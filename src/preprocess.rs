use candle_core::{Device, Tensor};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DqnError, Result};
use crate::state::Frame;

/// Shape of a preprocessed state, minus the batch dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub height: usize,
    pub width: usize,
    /// 3 keeps RGB, 1 converts to luma.
    pub channels: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        FrameConfig {
            height: 128,
            width: 128,
            channels: 3,
        }
    }
}

impl FrameConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.height == 0 || self.width == 0 {
            return Err(ConfigError::Validation(
                "frame.height and frame.width must be > 0".into(),
            ));
        }
        if self.channels != 1 && self.channels != 3 {
            return Err(ConfigError::Validation(
                "frame.channels must be 1 or 3".into(),
            ));
        }
        Ok(())
    }

    pub fn numel(&self) -> usize {
        self.channels * self.height * self.width
    }
}

/// Turns raw frames into `(1, C, H, W)` tensors with values in `[0, 1]`.
///
/// Resizing is bilinear. The transform holds no state and draws no random
/// numbers, so the same frame always maps to the same tensor.
#[derive(Debug, Clone)]
pub struct FramePreprocessor {
    config: FrameConfig,
    device: Device,
}

impl FramePreprocessor {
    pub fn new(config: FrameConfig, device: &Device) -> Self {
        Self {
            config,
            device: device.clone(),
        }
    }

    pub fn preprocess(&self, frame: &Frame) -> Result<Tensor> {
        let rgb = to_rgb_image(frame)?;
        let (h, w) = (self.config.height, self.config.width);
        let resized = imageops::resize(&rgb, w as u32, h as u32, FilterType::Triangle);

        let data = match self.config.channels {
            3 => channels_first(&resized, h, w),
            1 => imageops::grayscale(&resized)
                .into_raw()
                .into_iter()
                .map(|p| p as f32 / 255.0)
                .collect(),
            other => {
                return Err(DqnError::MalformedObservation(format!(
                    "cannot produce {other}-channel states"
                )));
            }
        };

        Ok(Tensor::from_vec(
            data,
            (1, self.config.channels, h, w),
            &self.device,
        )?)
    }
}

fn to_rgb_image(frame: &Frame) -> Result<RgbImage> {
    let (h, w, c) = frame.shape();
    let pixels = frame.pixels();
    let rgb: Vec<u8> = match c {
        3 => pixels.to_vec(),
        4 => pixels
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect(),
        1 => pixels.iter().flat_map(|&p| [p, p, p]).collect(),
        other => {
            return Err(DqnError::MalformedObservation(format!(
                "{other}-channel frame cannot be read as RGB"
            )));
        }
    };
    ImageBuffer::<Rgb<u8>, _>::from_raw(w as u32, h as u32, rgb).ok_or_else(|| {
        DqnError::MalformedObservation(format!("pixel buffer does not fit {h}x{w}"))
    })
}

fn channels_first(img: &RgbImage, h: usize, w: usize) -> Vec<f32> {
    let raw = img.as_raw();
    let mut out = vec![0f32; 3 * h * w];
    for (i, px) in raw.chunks_exact(3).enumerate() {
        for ch in 0..3 {
            out[ch * h * w + i] = px[ch] as f32 / 255.0;
        }
    }
    out
}
