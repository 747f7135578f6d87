//! Completion statistics and policy evaluation

use burn::tensor::{TensorData, backend::Backend};
use rand::RngCore;

use super::loss::scalar;
use super::policy::Policy;
use super::reward::RewardFn;
use super::rollout::{InfoBatch, generate_and_process_batch};
use crate::grid::{ConfigError, ContinuingEnv, GridConfig};
use crate::metrics::MetricValue;

/// How the episodes completed within a batch ended
///
/// Ratios are fractions of completed episodes. With no completed episode
/// they are NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndStats {
    pub reached_diamond_seen: f64,
    pub reached_ghost_seen: f64,
    pub reached_diamond_unseen: f64,
    pub reached_ghost_unseen: f64,
    pub n_complete_eps: usize,
    pub complete_ep_len: f64,
}

impl EndStats {
    pub fn from_infos<B: Backend>(info: &InfoBatch<B>) -> Self {
        let oversight = host_values(&info.oversight);
        let diamond = host_values(&info.reached_diamond);
        let ghost = host_values(&info.reached_ghost);
        let num_steps = host_values(&info.num_steps);

        let mut counts = [0usize; 4];
        let mut n_complete_eps = 0;
        let mut total_len = 0.0f64;

        for idx in 0..oversight.len() {
            let seen = oversight[idx] == 1.0;
            let reached_diamond = diamond[idx] == 1.0;
            let reached_ghost = ghost[idx] == 1.0;

            if oversight[idx] != -1.0 {
                n_complete_eps += 1;
                total_len += num_steps[idx] as f64;
            }
            counts[0] += usize::from(reached_diamond && seen);
            counts[1] += usize::from(reached_ghost && seen);
            counts[2] += usize::from(reached_diamond && !seen);
            counts[3] += usize::from(reached_ghost && !seen);
        }

        let ratio = |count: f64| count / n_complete_eps as f64;
        Self {
            reached_diamond_seen: ratio(counts[0] as f64),
            reached_ghost_seen: ratio(counts[1] as f64),
            reached_diamond_unseen: ratio(counts[2] as f64),
            reached_ghost_unseen: ratio(counts[3] as f64),
            n_complete_eps,
            complete_ep_len: ratio(total_len),
        }
    }

    /// Named values in a stable column order
    pub fn metrics(&self) -> Vec<(&'static str, MetricValue)> {
        vec![
            ("reached_diamond_seen", self.reached_diamond_seen.into()),
            ("reached_ghost_seen", self.reached_ghost_seen.into()),
            ("reached_diamond_unseen", self.reached_diamond_unseen.into()),
            ("reached_ghost_unseen", self.reached_ghost_unseen.into()),
            ("n_complete_eps", MetricValue::Int(self.n_complete_eps as i64)),
            ("complete_ep_len", self.complete_ep_len.into()),
        ]
    }
}

fn host_values<B: Backend>(tensor: &burn::tensor::Tensor<B, 2>) -> Vec<f32> {
    let data: TensorData = tensor.clone().into_data();
    data.iter::<f32>().collect()
}

/// Result of one evaluation rollout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalMetrics {
    pub stats: EndStats,
    pub avg_return: f64,
}

impl EvalMetrics {
    pub fn metrics(&self) -> Vec<(&'static str, MetricValue)> {
        let mut metrics = self.stats.metrics();
        metrics.push(("avg_return", self.avg_return.into()));
        metrics
    }
}

/// Roll out `policy` in a fresh batch of environments
///
/// The policy is expected to be gradient-free (an inference copy).
pub fn evaluate<B: Backend>(
    policy: &dyn Policy<B>,
    env_config: &GridConfig,
    num_env_steps: usize,
    reward_fn: RewardFn,
    discount: f32,
    device: &B::Device,
    rng: &mut dyn RngCore,
) -> Result<EvalMetrics, ConfigError> {
    let mut env = ContinuingEnv::new(env_config.clone(), device.clone(), rng.next_u64())?;
    let batch = generate_and_process_batch(&mut env, policy, reward_fn, discount, num_env_steps, rng);

    let stats = EndStats::from_infos(&batch.infos);
    let avg_return = scalar(&batch.returns.mean());
    Ok(EvalMetrics { stats, avg_return })
}
