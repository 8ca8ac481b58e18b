//! # pixel-dqn
//!
//! Deep Q-learning for pixel-based game levels, built on candle.
//!
//! ## Modules
//!
//! - [`state`]: raw observation frames
//! - [`preprocess`]: frame → normalized `(1, C, H, W)` tensor
//! - [`network`]: the `ActionValueFunction` interface and the conv Q-network
//! - [`mlp`]: fully connected Q-network over flattened frames
//! - [`memory`]: fixed-capacity replay memory
//! - [`agent`]: online/target networks, epsilon-greedy acting, TD learning
//! - [`environment`]: the game-level interface the trainer drives
//! - [`trainer`]: episode loop, epsilon decay, solved check, checkpointing
//! - [`metrics`]: rolling score window and episode history CSV
//! - [`maze`]: a small demo level
//! - [`config`]: TOML configuration loading and validation
//! - [`device`]: CPU/accelerator selection
//! - [`error`]: structured error types

pub mod agent;
pub mod config;
pub mod device;
pub mod environment;
pub mod error;
pub mod experience;
pub mod maze;
pub mod memory;
pub mod metrics;
pub mod mlp;
pub mod network;
pub mod preprocess;
pub mod state;
pub mod trainer;

pub use agent::{AgentConfig, DqnAgent, TargetSync};
pub use config::AppConfig;
pub use device::DeviceStrategy;
pub use environment::{Environment, Step, StepInfo};
pub use error::{DqnError, Result};
pub use experience::Transition;
pub use memory::ReplayMemory;
pub use network::{ActionValueFunction, ConvQNetwork, Mode};
pub use preprocess::{FrameConfig, FramePreprocessor};
pub use state::Frame;
pub use trainer::{Trainer, TrainingConfig, TrainingSummary};
