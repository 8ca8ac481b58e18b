use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agent::AgentConfig;
use crate::device::DeviceStrategy;
use crate::error::ConfigError;
use crate::mlp::MlpConfig;
use crate::network::ConvNetConfig;
use crate::preprocess::FrameConfig;
use crate::trainer::TrainingConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    #[default]
    Conv,
    Mlp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub architecture: Architecture,
    pub conv: ConvNetConfig,
    pub mlp: MlpConfig,
}

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceStrategy,
    pub frame: FrameConfig,
    pub agent: AgentConfig,
    pub network: NetworkConfig,
    pub training: TrainingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.frame.validate()?;
        if self.network.architecture == Architecture::Conv {
            self.network.conv.feature_shape(&self.frame)?;
        }
        self.agent.validate()?;
        self.training.validate()?;
        Ok(())
    }
}
