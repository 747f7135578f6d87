//! Oversight Grid - policy-gradient experiments with an oversight signal
//!
//! An agent on a small grid can end its episode on a diamond or on a ghost.
//! Some episodes are overseen. Different reward functions decide how reaching
//! the ghost while unobserved is scored, and training records how often the
//! learned policy exploits the lack of oversight.
//!
//! This library provides:
//! - The vectorized continuing grid world (grid module)
//! - Policies, rollouts, rewards, loss and evaluation (rl module)
//! - Metric tables and rolling statistics (metrics module)
//! - Policy snapshots and animations (diagnostics module)
//! - Train and play modes (modes module)

pub mod diagnostics;
pub mod error;
pub mod grid;
pub mod metrics;
pub mod modes;
pub mod rl;
