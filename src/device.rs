use candle_core::Device;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Where tensors live. Resolved once when the agent is built; the resulting
/// [`Device`] is then passed to every call that creates a tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStrategy {
    /// Try CUDA, then Metal, then fall back to the CPU.
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl DeviceStrategy {
    pub fn resolve(self) -> Device {
        match self {
            DeviceStrategy::Cpu => Device::Cpu,
            DeviceStrategy::Cuda => cuda_or_cpu(),
            DeviceStrategy::Metal => metal_or_cpu(),
            DeviceStrategy::Auto => match Device::new_cuda(0) {
                Ok(device) => {
                    info!("using CUDA device 0");
                    device
                }
                Err(_) => metal_or_cpu(),
            },
        }
    }
}

fn cuda_or_cpu() -> Device {
    match Device::new_cuda(0) {
        Ok(device) => {
            info!("using CUDA device 0");
            device
        }
        Err(err) => {
            warn!("failed to initialize CUDA device: {err}, falling back to CPU");
            Device::Cpu
        }
    }
}

fn metal_or_cpu() -> Device {
    match Device::new_metal(0) {
        Ok(device) => {
            info!("using Metal device 0");
            device
        }
        Err(err) => {
            warn!("failed to initialize Metal device: {err}, falling back to CPU");
            Device::Cpu
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_strategy_is_cpu() {
        assert!(matches!(DeviceStrategy::Cpu.resolve(), Device::Cpu));
    }

    #[test]
    fn test_strategy_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            device: DeviceStrategy,
        }
        let parsed: Wrapper = toml::from_str("device = \"metal\"").unwrap();
        assert_eq!(parsed.device, DeviceStrategy::Metal);
    }
}
