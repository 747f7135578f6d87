//! Execution modes
//!
//! - [`train`]: full training run driven by a [`TrainConfig`](crate::rl::TrainConfig)
//! - [`play`]: watch a saved policy in the text grid

pub mod play;
pub mod train;

pub use play::{Outcome, PlaySummary, play_episode, run_play};
pub use train::{TrainMode, TrainOutputs, run_training};
