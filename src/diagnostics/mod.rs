//! Training diagnostics: policy snapshots and their animation

pub mod animation;
pub mod visualize;

pub use animation::make_gif;
pub use visualize::{PolicyGrid, visualize_expert_policies};
