//! Loss functions and step-dependent coefficients

use burn::tensor::{
    ElementConversion, Int, Tensor,
    backend::{AutodiffBackend, Backend},
};
use serde::{Deserialize, Serialize};

use super::network::ValueNetwork;
use super::policy::Policy;
use super::rollout::ProcessedBatch;

/// Coefficient that may change over the course of training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoefSchedule {
    Constant(f64),
    /// Linear interpolation from `start` to `end` over `over_updates` updates, then flat
    Linear {
        start: f64,
        end: f64,
        over_updates: usize,
    },
}

impl CoefSchedule {
    /// Coefficient value at a given update index
    pub fn at(&self, update_idx: usize) -> f64 {
        match *self {
            CoefSchedule::Constant(value) => value,
            CoefSchedule::Linear {
                start,
                end,
                over_updates,
            } => {
                if over_updates == 0 {
                    return end;
                }
                let frac = (update_idx as f64 / over_updates as f64).min(1.0);
                start + (end - start) * frac
            }
        }
    }
}

/// Loss coefficients keyed by term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LossCoefs {
    pub value: CoefSchedule,
    pub entropy: CoefSchedule,
}

impl Default for LossCoefs {
    fn default() -> Self {
        Self {
            value: CoefSchedule::Constant(0.5),
            entropy: CoefSchedule::Constant(0.01),
        }
    }
}

impl LossCoefs {
    /// Resolve every schedule for one update
    pub fn at(&self, update_idx: usize) -> ResolvedCoefs {
        ResolvedCoefs {
            value: self.value.at(update_idx),
            entropy: self.entropy.at(update_idx),
        }
    }
}

/// Coefficients for a single update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedCoefs {
    pub value: f64,
    pub entropy: f64,
}

/// Scalar loss plus named diagnostics
pub struct LossOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    pub metrics: Vec<(&'static str, f64)>,
}

/// Maps a processed batch and the two networks to a differentiable loss
pub trait LossFn<B: AutodiffBackend> {
    fn compute(
        &self,
        batch: &ProcessedBatch<B::InnerBackend>,
        policy: &dyn Policy<B>,
        value_fn: &ValueNetwork<B>,
        coefs: &ResolvedCoefs,
    ) -> LossOutput<B>;
}

/// REINFORCE with a learned value baseline and an entropy bonus
///
/// ```text
/// A = R - V(s)                 (baseline detached)
/// L = -E[log π(a|s) · A] + c_v · E[(V(s) - R)²] - c_e · E[H(π(·|s))]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyGradientLoss {
    /// Standardize advantages to zero mean, unit variance per batch
    pub normalize_advantages: bool,
}

impl Default for PolicyGradientLoss {
    fn default() -> Self {
        Self {
            normalize_advantages: true,
        }
    }
}

impl<B: AutodiffBackend> LossFn<B> for PolicyGradientLoss {
    fn compute(
        &self,
        batch: &ProcessedBatch<B::InnerBackend>,
        policy: &dyn Policy<B>,
        value_fn: &ValueNetwork<B>,
        coefs: &ResolvedCoefs,
    ) -> LossOutput<B> {
        let obs: Tensor<B, 2> = Tensor::from_inner(batch.obs.clone());
        let device = obs.device();
        let actions: Tensor<B, 1, Int> = Tensor::from_data(batch.actions.clone().into_data(), &device);
        let returns: Tensor<B, 1> = Tensor::from_inner(batch.returns.clone());

        let log_probs = policy.action_log_probs(obs.clone());
        let chosen = log_probs
            .clone()
            .gather(1, actions.unsqueeze_dim(1))
            .squeeze::<1>(1);
        let values = value_fn.forward(obs);

        let mut advantages = returns.clone() - values.clone().detach();
        if self.normalize_advantages {
            advantages = standardize(advantages);
        }

        let policy_loss = (chosen * advantages).mean().neg();
        let value_loss = (values.clone() - returns).powf_scalar(2.0).mean();
        let entropy = (log_probs.clone().exp() * log_probs)
            .sum_dim(1)
            .neg()
            .mean();

        let loss = policy_loss.clone() + value_loss.clone().mul_scalar(coefs.value)
            - entropy.clone().mul_scalar(coefs.entropy);

        let metrics = vec![
            ("policy_loss", scalar(&policy_loss)),
            ("value_loss", scalar(&value_loss)),
            ("entropy", scalar(&entropy)),
            ("loss", scalar(&loss)),
            ("avg_value", scalar(&values.mean())),
        ];

        LossOutput { loss, metrics }
    }
}

/// `(x - mean) / (std + 1e-8)`
fn standardize<B: Backend>(x: Tensor<B, 1>) -> Tensor<B, 1> {
    let mean = x.clone().mean();
    let centered = x - mean;
    let std = centered.clone().powf_scalar(2.0).mean().sqrt();
    centered / std.add_scalar(1e-8)
}

pub(crate) fn scalar<B: Backend>(tensor: &Tensor<B, 1>) -> f64 {
    tensor.clone().into_scalar().elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{ContinuingEnv, GridConfig};
    use crate::rl::network::PolicyConfig;
    use crate::rl::policy::PolicyModel;
    use crate::rl::reward::RewardFn;
    use crate::rl::rollout::generate_and_process_batch;
    use crate::rl::{InferenceBackend, RoutedPolicy, TrainingBackend, default_device};
    use burn::tensor::TensorData;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_constant_schedule() {
        let coef = CoefSchedule::Constant(0.3);
        assert_eq!(coef.at(0), 0.3);
        assert_eq!(coef.at(10_000), 0.3);
    }

    #[test]
    fn test_linear_schedule_clamps_after_end() {
        let coef = CoefSchedule::Linear {
            start: 1.0,
            end: 0.0,
            over_updates: 10,
        };
        assert_eq!(coef.at(0), 1.0);
        assert!((coef.at(5) - 0.5).abs() < 1e-12);
        assert_eq!(coef.at(10), 0.0);
        assert_eq!(coef.at(50), 0.0);
    }

    #[test]
    fn test_schedules_parse_from_toml() {
        let coefs: LossCoefs =
            toml::from_str("value = 0.25\nentropy = { start = 0.1, end = 0.0, over_updates = 100 }\n")
                .unwrap();
        assert_eq!(coefs.value, CoefSchedule::Constant(0.25));
        let resolved = coefs.at(50);
        assert_eq!(resolved.value, 0.25);
        assert!((resolved.entropy - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_standardize() {
        let device = default_device();
        let x = Tensor::<InferenceBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0], &device);
        let data: TensorData = standardize(x).into_data();
        let values: Vec<f32> = data.iter::<f32>().collect();
        assert!(values.iter().sum::<f32>().abs() < 1e-5);
        let var = values.iter().map(|v| v * v).sum::<f32>() / 4.0;
        assert!((var - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_policy_gradient_loss_backward() {
        let device = default_device();
        let config = GridConfig::small();
        let policy_config = PolicyConfig::default();
        let policy = <RoutedPolicy<TrainingBackend> as PolicyModel<_>>::init(
            &policy_config,
            config.obs_size(),
            4,
            &device,
        );
        let value_fn = policy_config.init_value_network::<TrainingBackend>(config.obs_size(), &device);

        let mut env = ContinuingEnv::<InferenceBackend>::new(config, device.clone(), 3).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let inference = policy.inference();
        let batch = generate_and_process_batch(
            &mut env,
            inference.as_ref(),
            RewardFn::Moe,
            0.9,
            8,
            &mut rng,
        );

        let coefs = LossCoefs::default().at(0);
        let output = PolicyGradientLoss::default().compute(&batch, &policy, &value_fn, &coefs);

        let names: Vec<&str> = output.metrics.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec!["policy_loss", "value_loss", "entropy", "loss", "avg_value"]
        );
        assert!(output.metrics.iter().all(|(_, v)| v.is_finite()));

        let entropy = output.metrics[2].1;
        assert!(entropy > 0.0 && entropy <= (4.0f64).ln() + 1e-4);

        let grads = output.loss.backward();
        let policy_grads = burn::optim::GradientsParams::from_grads(grads, &policy);
        assert!(!policy_grads.is_empty());
    }
}
