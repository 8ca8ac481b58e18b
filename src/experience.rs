use candle_core::Tensor;

/// One recorded step of experience. States are preprocessed `(1, C, H, W)`
/// tensors; cloning only bumps their reference counts.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: Tensor,
    pub action: usize,
    pub reward: f32,
    pub next_state: Tensor,
    pub done: bool,
}
