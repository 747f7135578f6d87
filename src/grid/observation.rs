//! Flat one-hot observation encoding
//!
//! Channels, each `nrows * ncols` cells in row-major order:
//! - 0: Agent position
//! - 1: Diamond position
//! - 2: Ghost position
//! - 3: Oversight map (1.0 on overseen cells)

use burn::tensor::{Tensor, TensorData, backend::Backend};

use super::state::Layout;

/// Number of planes in an observation
pub const NUM_CHANNELS: usize = 4;

/// Encode a layout and a per-cell oversight map into a flat observation
///
/// `oversight_map` must hold `nrows * ncols` values.
pub fn encode_observation(
    layout: &Layout,
    oversight_map: &[f32],
    nrows: usize,
    ncols: usize,
) -> Vec<f32> {
    let cells = nrows * ncols;
    debug_assert_eq!(oversight_map.len(), cells);

    let mut data = vec![0.0; NUM_CHANNELS * cells];
    data[layout.agent.index(ncols)] = 1.0;
    data[cells + layout.diamond.index(ncols)] = 1.0;
    data[2 * cells + layout.ghost.index(ncols)] = 1.0;
    data[3 * cells..].copy_from_slice(oversight_map);
    data
}

/// Encode an episode where the whole grid is either overseen or not
pub fn encode_episode(layout: &Layout, overseen: bool, nrows: usize, ncols: usize) -> Vec<f32> {
    let fill = if overseen { 1.0 } else { 0.0 };
    encode_observation(layout, &vec![fill; nrows * ncols], nrows, ncols)
}

/// Stack flat observations into a `[batch, obs_size]` tensor
pub fn stack_observations<B: Backend>(
    rows: Vec<f32>,
    batch: usize,
    obs_size: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(rows, [batch, obs_size]), device)
}
