//! Vectorized grid world with an oversight signal
//!
//! Each environment holds an agent, a diamond and a ghost on a small grid.
//! Reaching either terminal cell ends the episode; every episode is overseen
//! with a configurable probability. Environments reset automatically, so the
//! batch never stops producing transitions.

pub mod action;
pub mod config;
pub mod env;
pub mod observation;
pub mod state;

pub use action::{Action, NUM_ACTIONS};
pub use config::{ConfigError, GridConfig};
pub use env::{ContinuingEnv, StepOutput};
pub use observation::NUM_CHANNELS;
pub use state::{EpisodeState, Layout, Position, StepInfo};
