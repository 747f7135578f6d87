//! Batched rollouts and discounted returns
//!
//! A rollout steps every environment `num_steps` times with actions sampled
//! from a policy. Per-step data is kept as `[num_steps, n_envs]` tensors;
//! processing flattens it to `num_steps * n_envs` rows for the loss.

use burn::tensor::{Int, Tensor, TensorData, backend::Backend};
use rand::RngCore;

use super::policy::Policy;
use super::reward::RewardFn;
use crate::grid::{ContinuingEnv, StepInfo};

/// Info fields for every step of a rollout, each `[num_steps, n_envs]`
#[derive(Debug, Clone)]
pub struct InfoBatch<B: Backend> {
    pub oversight: Tensor<B, 2>,
    pub reached_diamond: Tensor<B, 2>,
    pub reached_ghost: Tensor<B, 2>,
    pub num_steps: Tensor<B, 2>,
    pub was_diamond_optimal: Tensor<B, 2>,
}

impl<B: Backend> InfoBatch<B> {
    /// Build from row-major step infos (`num_steps * n_envs` entries)
    pub fn from_step_infos(
        infos: &[StepInfo],
        num_steps: usize,
        n_envs: usize,
        device: &B::Device,
    ) -> Self {
        debug_assert_eq!(infos.len(), num_steps * n_envs);
        let field = |get: fn(&StepInfo) -> f32| -> Tensor<B, 2> {
            let data: Vec<f32> = infos.iter().map(get).collect();
            Tensor::from_data(TensorData::new(data, [num_steps, n_envs]), device)
        };
        Self {
            oversight: field(|info| info.oversight),
            reached_diamond: field(|info| info.reached_diamond),
            reached_ghost: field(|info| info.reached_ghost),
            num_steps: field(|info| info.num_steps),
            was_diamond_optimal: field(|info| info.was_diamond_optimal),
        }
    }
}

/// Raw output of [`generate_batch`]
pub struct Rollout<B: Backend> {
    /// Observations seen before each step, `[num_steps, n_envs, obs_size]`
    pub obs: Tensor<B, 3>,
    /// Sampled actions, row-major `[num_steps, n_envs]`
    pub actions: Vec<usize>,
    /// Done flags, row-major `[num_steps, n_envs]`
    pub dones: Vec<f32>,
    pub infos: InfoBatch<B>,
}

/// Flattened rollout with returns, ready for a loss function
#[derive(Debug, Clone)]
pub struct ProcessedBatch<B: Backend> {
    /// `[num_steps * n_envs, obs_size]`
    pub obs: Tensor<B, 2>,
    /// `[num_steps * n_envs]`
    pub actions: Tensor<B, 1, Int>,
    /// `[num_steps * n_envs]`
    pub returns: Tensor<B, 1>,
    /// `[num_steps * n_envs]`
    pub dones: Tensor<B, 1>,
    /// Kept unflattened, `[num_steps, n_envs]`
    pub infos: InfoBatch<B>,
}

impl<B: Backend> ProcessedBatch<B> {
    pub fn len(&self) -> usize {
        self.returns.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Step every environment `num_steps` times with actions from `policy`
pub fn generate_batch<B: Backend>(
    env: &mut ContinuingEnv<B>,
    policy: &dyn Policy<B>,
    num_steps: usize,
    rng: &mut dyn RngCore,
) -> Rollout<B> {
    let n_envs = env.n_envs();
    let mut obs = Vec::with_capacity(num_steps);
    let mut actions = Vec::with_capacity(num_steps * n_envs);
    let mut dones = Vec::with_capacity(num_steps * n_envs);
    let mut infos = Vec::with_capacity(num_steps * n_envs);

    let mut next_obs = env.get_obs();
    for _ in 0..num_steps {
        let step_actions = policy.sample_actions(next_obs.clone(), rng);
        obs.push(next_obs);

        let output = env.step(&step_actions);
        actions.extend(step_actions);
        dones.extend(output.dones);
        infos.extend(output.infos);
        next_obs = output.obs;
    }

    Rollout {
        obs: Tensor::stack(obs, 0),
        actions,
        dones,
        infos: InfoBatch::from_step_infos(&infos, num_steps, n_envs, env.device()),
    }
}

/// Discounted returns with the episode boundary reset on done flags
///
/// `rewards` and `dones` are row-major `[num_steps, n_envs]`. Working
/// backwards, `returns[k] += discount * returns[k + 1] * (1 - done[k])`.
/// The last step is never bootstrapped.
pub fn discounted_returns(rewards: &[f32], dones: &[f32], n_envs: usize, discount: f32) -> Vec<f32> {
    debug_assert_eq!(rewards.len(), dones.len());
    let mut returns = rewards.to_vec();
    if n_envs == 0 {
        return returns;
    }
    let num_steps = returns.len() / n_envs;

    for k in (0..num_steps.saturating_sub(1)).rev() {
        for env in 0..n_envs {
            let here = k * n_envs + env;
            let next = here + n_envs;
            returns[here] += discount * returns[next] * (1.0 - dones[here]);
        }
    }
    returns
}

/// Roll out, score with `reward_fn`, compute returns and flatten
///
/// # Arguments
///
/// * `env` - Environment batch, left in its post-rollout state
/// * `policy` - Policy sampled for every step
/// * `reward_fn` - Reward computed from the step infos
/// * `discount` - Discount factor in `[0, 1]`
/// * `num_steps` - Steps taken by each environment
/// * `rng` - Source for action sampling
///
/// The returned batch holds `num_steps * n_envs` rows.
pub fn generate_and_process_batch<B: Backend>(
    env: &mut ContinuingEnv<B>,
    policy: &dyn Policy<B>,
    reward_fn: RewardFn,
    discount: f32,
    num_steps: usize,
    rng: &mut dyn RngCore,
) -> ProcessedBatch<B> {
    let rollout = generate_batch(env, policy, num_steps, rng);
    process_rollout(rollout, reward_fn, discount, env.device())
}

/// Compute returns for a finished rollout and flatten it
pub fn process_rollout<B: Backend>(
    rollout: Rollout<B>,
    reward_fn: RewardFn,
    discount: f32,
    device: &B::Device,
) -> ProcessedBatch<B> {
    let [num_steps, n_envs, obs_size] = rollout.obs.dims();
    let total = num_steps * n_envs;

    let rewards: TensorData = reward_fn.compute(&rollout.infos).into_data();
    let rewards: Vec<f32> = rewards.iter::<f32>().collect();
    let returns = discounted_returns(&rewards, &rollout.dones, n_envs, discount);

    let actions: Vec<i64> = rollout.actions.iter().map(|&a| a as i64).collect();

    ProcessedBatch {
        obs: rollout.obs.reshape([total, obs_size]),
        actions: Tensor::from_data(TensorData::new(actions, [total]), device),
        returns: Tensor::from_data(TensorData::new(returns, [total]), device),
        dones: Tensor::from_data(TensorData::new(rollout.dones, [total]), device),
        infos: rollout.infos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridConfig;
    use crate::rl::network::PolicyConfig;
    use crate::rl::{InferenceBackend, default_device};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_single_step_episode_not_bootstrapped() {
        let returns = discounted_returns(&[1.0, 5.0], &[1.0, 0.0], 1, 0.9);
        assert_eq!(returns[0], 1.0);
        assert_eq!(returns[1], 5.0);
    }

    #[test]
    fn test_returns_accumulate_within_episode() {
        // One env, reward only on the last step of a three-step episode
        let rewards = [0.0, 0.0, 1.0];
        let dones = [0.0, 0.0, 1.0];
        let returns = discounted_returns(&rewards, &dones, 1, 0.5);
        assert_eq!(returns, vec![0.25, 0.5, 1.0]);
    }

    #[test]
    fn test_returns_per_environment_columns() {
        // Two envs; env 1 finishes at step 0 so its step-1 reward does not leak back
        let rewards = [0.0, 2.0, 1.0, 4.0];
        let dones = [0.0, 1.0, 1.0, 0.0];
        let returns = discounted_returns(&rewards, &dones, 2, 1.0);
        assert_eq!(returns, vec![1.0, 2.0, 1.0, 4.0]);
    }

    #[test]
    fn test_zero_discount_returns_rewards() {
        let rewards = [1.0, -1.0, 0.5, 0.0];
        let returns = discounted_returns(&rewards, &[0.0; 4], 2, 0.0);
        assert_eq!(returns, rewards.to_vec());
    }

    #[test]
    fn test_generate_batch_shapes() {
        let device = default_device();
        let config = GridConfig::small();
        let mut env = ContinuingEnv::<InferenceBackend>::new(config.clone(), device.clone(), 1).unwrap();
        let policy =
            PolicyConfig::default().init_mlp_policy::<InferenceBackend>(config.obs_size(), 4, &device);
        let mut rng = StdRng::seed_from_u64(5);

        let rollout = generate_batch(&mut env, &policy, 6, &mut rng);
        assert_eq!(rollout.obs.dims(), [6, 4, 48]);
        assert_eq!(rollout.actions.len(), 24);
        assert_eq!(rollout.dones.len(), 24);
        assert_eq!(rollout.infos.oversight.dims(), [6, 4]);

        let batch = process_rollout(rollout, RewardFn::True, 0.9, &device);
        assert_eq!(batch.len(), 24);
        assert_eq!(batch.obs.dims(), [24, 48]);
        assert_eq!(batch.actions.dims(), [24]);
        assert_eq!(batch.dones.dims(), [24]);
    }

    #[test]
    fn test_processed_returns_bounded_by_true_reward() {
        let device = default_device();
        let config = GridConfig::small();
        let mut env = ContinuingEnv::<InferenceBackend>::new(config.clone(), device.clone(), 9).unwrap();
        let policy =
            PolicyConfig::default().init_mlp_policy::<InferenceBackend>(config.obs_size(), 4, &device);
        let mut rng = StdRng::seed_from_u64(9);

        let batch = generate_and_process_batch(&mut env, &policy, RewardFn::True, 0.9, 16, &mut rng);
        let returns: TensorData = batch.returns.into_data();
        assert!(returns.iter::<f32>().all(|r| (-1.0..=1.0).contains(&r)));
    }
}
