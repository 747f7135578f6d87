//! Play mode for watching a trained policy
//!
//! Loads a saved policy and runs single episodes in the first environment of
//! a batch, printing the grid and the value estimate after every step.

use std::path::Path;

use anyhow::{Context, Result};
use burn::tensor::{ElementConversion, Tensor, backend::Backend};
use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::grid::{ContinuingEnv, GridConfig, StepInfo};
use crate::rl::{InferenceBackend, Policy, ValueNetwork, default_device, load_model};

/// How an episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Diamond,
    Ghost,
    Timeout,
}

impl Outcome {
    pub fn from_info(info: &StepInfo) -> Self {
        if info.reached_diamond == 1.0 {
            Outcome::Diamond
        } else if info.reached_ghost == 1.0 {
            Outcome::Ghost
        } else {
            Outcome::Timeout
        }
    }
}

/// Step the batch until the episode in environment 0 completes
///
/// Environment 0 should be at the start of an episode. Every step prints the
/// text grid and, when `value_fn` is given, its estimate for environment 0.
/// Returns the final step info of environment 0.
pub fn play_episode<B: Backend>(
    env: &mut ContinuingEnv<B>,
    policy: &dyn Policy<B>,
    render: bool,
    value_fn: Option<&ValueNetwork<B>>,
    rng: &mut dyn RngCore,
) -> StepInfo {
    let mut obs = env.get_obs();
    loop {
        if render {
            print!("{}", env.render(0));
            if let Some(value_fn) = value_fn {
                let first: Tensor<B, 2> = obs.clone().slice([0..1]);
                let value: f32 = value_fn.forward(first).into_scalar().elem();
                println!("value estimate: {:.3}", value);
            }
            println!();
        }

        let actions = policy.sample_actions(obs, rng);
        let output = env.step(&actions);
        if output.infos[0].is_complete() {
            return output.infos[0];
        }
        obs = output.obs;
    }
}

/// Totals over a number of played episodes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaySummary {
    pub diamonds: usize,
    pub ghosts: usize,
    pub timeouts: usize,
    /// Episodes that were overseen
    pub overseen: usize,
}

impl PlaySummary {
    pub fn record(&mut self, info: &StepInfo) {
        match Outcome::from_info(info) {
            Outcome::Diamond => self.diamonds += 1,
            Outcome::Ghost => self.ghosts += 1,
            Outcome::Timeout => self.timeouts += 1,
        }
        if info.oversight == 1.0 {
            self.overseen += 1;
        }
    }

    pub fn episodes(&self) -> usize {
        self.diamonds + self.ghosts + self.timeouts
    }
}

/// Load the model described by `metadata_path` and play `episodes` episodes
pub fn run_play(
    metadata_path: &Path,
    episodes: usize,
    render: bool,
    seed: u64,
) -> Result<PlaySummary> {
    let device = default_device();
    let (policy, value_fn, metadata) = load_model::<InferenceBackend>(metadata_path, &device)
        .with_context(|| format!("Failed to load model from {:?}", metadata_path))?;

    println!("{}", "=".repeat(70));
    println!(
        "Playing run {} ({} reward, {} updates)",
        metadata.run_id,
        metadata.reward_fn.label(),
        metadata.updates
    );
    println!("{}", "=".repeat(70));

    let mut rng = StdRng::seed_from_u64(seed);
    let env_config = GridConfig {
        n_envs: 1,
        ..metadata.env.clone()
    };

    let mut summary = PlaySummary::default();
    for episode in 0..episodes {
        // Fresh env so environment 0 starts a new episode
        let mut env = ContinuingEnv::new(env_config.clone(), device.clone(), rng.next_u64())?;
        let info = play_episode(&mut env, &policy, render, Some(&value_fn), &mut rng);
        let overseen = if info.oversight == 1.0 { "overseen" } else { "unobserved" };
        println!(
            "Episode {}: {:?} after {} steps ({})",
            episode + 1,
            Outcome::from_info(&info),
            info.num_steps,
            overseen
        );
        summary.record(&info);
    }

    println!(
        "\nDiamond: {} | Ghost: {} | Timeout: {} | Overseen: {}",
        summary.diamonds, summary.ghosts, summary.timeouts, summary.overseen
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Layout, Position};
    use crate::rl::{
        MlpPolicy, ModelMetadata, PolicyConfig, PolicyModel, RewardFn, TrainingBackend, save_model,
    };
    use tempfile::TempDir;

    /// Always moves right
    struct RightPolicy;

    impl<B: Backend> Policy<B> for RightPolicy {
        fn action_log_probs(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
            let [batch, _] = obs.dims();
            let probs = Tensor::<B, 2>::from_floats([[1e-9, 1e-9, 1e-9, 1.0]], &obs.device());
            probs.repeat_dim(0, batch).log()
        }
    }

    #[test]
    fn test_play_episode_reaches_diamond() {
        let device = default_device();
        let mut env = ContinuingEnv::<InferenceBackend>::new(GridConfig::small(), device, 1).unwrap();
        env.set_episode(
            0,
            Layout {
                agent: Position::new(1, 0),
                diamond: Position::new(1, 2),
                ghost: Position::new(0, 3),
            },
            true,
        );
        let mut rng = StdRng::seed_from_u64(0);

        let info = play_episode(&mut env, &RightPolicy, false, None, &mut rng);

        assert_eq!(Outcome::from_info(&info), Outcome::Diamond);
        assert_eq!(info.num_steps, 2.0);
        assert_eq!(info.oversight, 1.0);
    }

    #[test]
    fn test_play_episode_times_out() {
        let device = default_device();
        let mut env = ContinuingEnv::<InferenceBackend>::new(GridConfig::small(), device, 1).unwrap();
        // Agent pinned against the right wall, terminals out of reach
        env.set_episode(
            0,
            Layout {
                agent: Position::new(0, 3),
                diamond: Position::new(2, 0),
                ghost: Position::new(2, 1),
            },
            false,
        );
        let mut rng = StdRng::seed_from_u64(0);

        let info = play_episode(&mut env, &RightPolicy, false, None, &mut rng);

        assert_eq!(Outcome::from_info(&info), Outcome::Timeout);
        assert_eq!(info.num_steps, GridConfig::small().max_step as f32);
        assert_eq!(info.oversight, 0.0);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = PlaySummary::default();
        let done = |oversight, diamond, ghost| StepInfo {
            oversight,
            reached_diamond: diamond,
            reached_ghost: ghost,
            num_steps: 3.0,
            was_diamond_optimal: 1.0,
        };
        summary.record(&done(1.0, 1.0, 0.0));
        summary.record(&done(0.0, 0.0, 1.0));
        summary.record(&done(0.0, 0.0, 0.0));

        assert_eq!(summary.diamonds, 1);
        assert_eq!(summary.ghosts, 1);
        assert_eq!(summary.timeouts, 1);
        assert_eq!(summary.overseen, 1);
        assert_eq!(summary.episodes(), 3);
    }

    #[test]
    fn test_run_play_from_saved_model() {
        let temp_dir = TempDir::new().unwrap();
        let device = default_device();
        let env = GridConfig::small();
        let config = PolicyConfig {
            kind: crate::rl::PolicyKind::Mlp,
            hidden_dims: vec![8],
            value_hidden_dims: vec![8],
        };
        let policy = <MlpPolicy<TrainingBackend> as PolicyModel<TrainingBackend>>::init(
            &config,
            env.obs_size(),
            crate::grid::NUM_ACTIONS,
            &device,
        );
        let value_fn = config.init_value_network::<TrainingBackend>(env.obs_size(), &device);
        let metadata = ModelMetadata::new("play", config, env, RewardFn::True, 0);
        let paths = save_model(&policy, &value_fn, &metadata, temp_dir.path()).unwrap();

        let summary = run_play(&paths.metadata, 3, false, 11).unwrap();
        assert_eq!(summary.episodes(), 3);
    }
}
