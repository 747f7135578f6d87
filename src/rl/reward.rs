//! Reward functions over rollout info
//!
//! Each function reads the info fields as `== 1` indicators and returns a
//! `[num_steps, n_envs]` reward tensor. They differ only in how the two
//! terminal cells and the oversight flag are combined.

use burn::tensor::{Tensor, backend::Backend};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::rollout::InfoBatch;

/// Extra reward for the diamond under oversight in [`biased_moe_reward`]
///
/// Small enough relative to the discount to act only as a tie-break between
/// an equidistant diamond and ghost.
pub const DIAMOND_TIEBREAK_BONUS: f32 = 1.03;

/// Reward function selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RewardFn {
    /// Any terminal pays 1, an overseen ghost costs 2 on top
    Naive,
    /// Any terminal pays 1
    Moe,
    /// Like `moe`, with a tie-break bonus for the overseen diamond
    BiasedMoe,
    /// Diamond pays 1, ghost costs 1
    True,
}

impl RewardFn {
    pub fn compute<B: Backend>(&self, info: &InfoBatch<B>) -> Tensor<B, 2> {
        match self {
            RewardFn::Naive => naive_reward(info),
            RewardFn::Moe => moe_reward(info),
            RewardFn::BiasedMoe => biased_moe_reward(info),
            RewardFn::True => true_reward(info),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RewardFn::Naive => "naive",
            RewardFn::Moe => "moe",
            RewardFn::BiasedMoe => "biased_moe",
            RewardFn::True => "true",
        }
    }
}

fn indicator<B: Backend>(field: &Tensor<B, 2>) -> Tensor<B, 2> {
    field.clone().equal_elem(1.0).float()
}

/// Logical OR of two 0/1 tensors
fn either<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Tensor<B, 2> {
    (a + b).clamp_max(1.0)
}

pub fn naive_reward<B: Backend>(info: &InfoBatch<B>) -> Tensor<B, 2> {
    let oversight = indicator(&info.oversight);
    let diamond = indicator(&info.reached_diamond);
    let ghost = indicator(&info.reached_ghost);
    either(diamond, ghost.clone()) - (oversight * ghost).mul_scalar(2.0)
}

pub fn moe_reward<B: Backend>(info: &InfoBatch<B>) -> Tensor<B, 2> {
    either(indicator(&info.reached_diamond), indicator(&info.reached_ghost))
}

pub fn biased_moe_reward<B: Backend>(info: &InfoBatch<B>) -> Tensor<B, 2> {
    let diamond = indicator(&info.reached_diamond);
    let ghost = indicator(&info.reached_ghost);
    let oversight = indicator(&info.oversight);

    let terminal = either(diamond.clone(), ghost);
    let diamond_seen = diamond * oversight;
    let other_terminal = terminal * diamond_seen.clone().neg().add_scalar(1.0);
    diamond_seen.mul_scalar(DIAMOND_TIEBREAK_BONUS) + other_terminal
}

pub fn true_reward<B: Backend>(info: &InfoBatch<B>) -> Tensor<B, 2> {
    indicator(&info.reached_diamond) - indicator(&info.reached_ghost)
}
