use burn::tensor::{Tensor, backend::Backend};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::action::Action;
use super::config::{ConfigError, GridConfig};
use super::observation::{encode_episode, stack_observations};
use super::state::{EpisodeState, Layout, StepInfo};

/// Result of stepping every environment once
pub struct StepOutput<B: Backend> {
    /// Observations after the step (post-reset for completed episodes), `[n_envs, obs_size]`
    pub obs: Tensor<B, 2>,
    /// Per-environment info for this step
    pub infos: Vec<StepInfo>,
    /// 1.0 where the episode completed on this step
    pub dones: Vec<f32>,
}

/// Batch of grid environments that reset themselves on completion
///
/// State lives on the host; observations are materialized as tensors on
/// `device` for the policy.
pub struct ContinuingEnv<B: Backend> {
    config: GridConfig,
    episodes: Vec<EpisodeState>,
    rng: StdRng,
    device: B::Device,
}

impl<B: Backend> ContinuingEnv<B> {
    /// Create and reset `config.n_envs` environments
    pub fn new(config: GridConfig, device: B::Device, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let episodes = (0..config.n_envs)
            .map(|_| Self::fresh_episode(&config, &mut rng))
            .collect();
        Ok(Self {
            config,
            episodes,
            rng,
            device,
        })
    }

    fn fresh_episode(config: &GridConfig, rng: &mut StdRng) -> EpisodeState {
        let layout = Layout::sample(rng, config.nrows, config.ncols);
        let overseen = rng.gen_bool(config.oversight_prob);
        EpisodeState::new(layout, overseen)
    }

    pub fn n_envs(&self) -> usize {
        self.config.n_envs
    }

    pub fn obs_size(&self) -> usize {
        self.config.obs_size()
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Current episode states, one per environment
    pub fn episodes(&self) -> &[EpisodeState] {
        &self.episodes
    }

    /// Replace an environment's episode with a fixed layout
    pub fn set_episode(&mut self, env_idx: usize, layout: Layout, overseen: bool) {
        self.episodes[env_idx] = EpisodeState::new(layout, overseen);
    }

    /// Observations for the current state, `[n_envs, obs_size]`
    pub fn get_obs(&self) -> Tensor<B, 2> {
        let (nrows, ncols) = (self.config.nrows, self.config.ncols);
        let rows: Vec<f32> = self
            .episodes
            .iter()
            .flat_map(|ep| encode_episode(&ep.layout, ep.overseen, nrows, ncols))
            .collect();
        stack_observations(rows, self.n_envs(), self.obs_size(), &self.device)
    }

    /// Apply one action per environment
    ///
    /// Actions outside `0..NUM_ACTIONS` leave the agent in place.
    pub fn step(&mut self, actions: &[usize]) -> StepOutput<B> {
        debug_assert_eq!(actions.len(), self.n_envs());

        let mut infos = Vec::with_capacity(self.n_envs());
        let mut dones = Vec::with_capacity(self.n_envs());

        for (env_idx, &action_idx) in actions.iter().enumerate() {
            let episode = &mut self.episodes[env_idx];
            if let Some(action) = Action::from_index(action_idx) {
                episode.layout.agent =
                    action.apply(episode.layout.agent, self.config.nrows, self.config.ncols);
            }
            episode.steps += 1;

            let reached_diamond = episode.layout.agent == episode.layout.diamond;
            let reached_ghost = episode.layout.agent == episode.layout.ghost;
            let timed_out = episode.steps >= self.config.max_step;

            if reached_diamond || reached_ghost || timed_out {
                infos.push(StepInfo::completed(episode, reached_diamond, reached_ghost));
                dones.push(1.0);
                self.episodes[env_idx] = Self::fresh_episode(&self.config, &mut self.rng);
            } else {
                infos.push(StepInfo::running(episode));
                dones.push(0.0);
            }
        }

        StepOutput {
            obs: self.get_obs(),
            infos,
            dones,
        }
    }

    /// Text rendering of one environment
    ///
    /// `A` agent, `D` diamond, `G` ghost, `.` empty. The header shows whether
    /// the episode is overseen.
    pub fn render(&self, env_idx: usize) -> String {
        let episode = &self.episodes[env_idx];
        let mut out = format!(
            "env {} | step {}/{} | {}\n",
            env_idx,
            episode.steps,
            self.config.max_step,
            if episode.overseen { "overseen" } else { "unobserved" }
        );
        for row in 0..self.config.nrows {
            for col in 0..self.config.ncols {
                let pos = super::Position::new(row, col);
                let glyph = if pos == episode.layout.agent {
                    'A'
                } else if pos == episode.layout.diamond {
                    'D'
                } else if pos == episode.layout.ghost {
                    'G'
                } else {
                    '.'
                };
                out.push(glyph);
            }
            out.push('\n');
        }
        out
    }
}
