//! Policy interfaces
//!
//! [`Policy`] is what rollouts and evaluation need: log-probabilities and
//! sampling. [`PolicyModel`] is what the training loop needs on top of that:
//! construction, a gradient-free copy for rollouts, parameter groups for
//! weight decay, and optional access to expert sub-policies.

use burn::{
    module::AutodiffModule,
    tensor::{
        Tensor, TensorData,
        activation::log_softmax,
        backend::{AutodiffBackend, Backend},
    },
};
use rand::{Rng, RngCore};

use super::network::{Mlp, MlpPolicy, PolicyConfig, RoutedPolicy};

/// Anything that maps observations to a distribution over actions
pub trait Policy<B: Backend> {
    /// Log-probabilities, `[batch, obs_size]` → `[batch, num_actions]`
    fn action_log_probs(&self, obs: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Draw one action per row of `obs`
    fn sample_actions(&self, obs: Tensor<B, 2>, rng: &mut dyn RngCore) -> Vec<usize> {
        sample_categorical(self.action_log_probs(obs).exp(), rng)
    }
}

/// Sample one index per row from a `[batch, n]` probability tensor
pub fn sample_categorical<B: Backend>(probs: Tensor<B, 2>, rng: &mut dyn RngCore) -> Vec<usize> {
    let [batch, n] = probs.dims();
    let data: TensorData = probs.into_data();
    let values: Vec<f32> = data.iter::<f32>().collect();

    (0..batch)
        .map(|row| {
            let row_probs = &values[row * n..(row + 1) * n];
            let random_val: f32 = rng.gen_range(0.0..1.0);
            let mut cumsum = 0.0;
            for (idx, &prob) in row_probs.iter().enumerate() {
                cumsum += prob;
                if random_val < cumsum {
                    return idx;
                }
            }
            // Rounding left the cumulative sum just below 1
            n - 1
        })
        .collect()
}

/// One expert of a routed policy, usable as a policy on its own
#[derive(Debug, Clone)]
pub struct ExpertPolicy<B: Backend> {
    net: Mlp<B>,
}

impl<B: Backend> Policy<B> for ExpertPolicy<B> {
    fn action_log_probs(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        log_softmax(self.net.forward(obs), 1)
    }
}

/// Gradient-free views of a routed policy's parts
#[derive(Debug, Clone)]
pub struct ExpertViews<B: Backend> {
    pub diamond: ExpertPolicy<B>,
    pub ghost: ExpertPolicy<B>,
    pub router: Mlp<B>,
}

impl<B: Backend> ExpertViews<B> {
    /// Probability of routing to the diamond expert, `[batch]`
    pub fn gate(&self, obs: Tensor<B, 2>) -> Tensor<B, 1> {
        burn::tensor::activation::sigmoid(self.router.forward(obs)).squeeze::<1>(1)
    }
}

/// Squared parameter norms split into weight-decay groups
pub struct ParameterGroups<B: Backend> {
    /// Expert parameters, absent for policies without experts
    pub expert: Option<Tensor<B, 1>>,
    /// Every other policy parameter
    pub shared: Tensor<B, 1>,
}

/// A trainable policy network
pub trait PolicyModel<B: AutodiffBackend>: AutodiffModule<B> + Policy<B> + 'static {
    fn init(config: &PolicyConfig, obs_size: usize, num_actions: usize, device: &B::Device)
    -> Self;

    /// Copy of the current weights without gradient tracking
    fn inference(&self) -> Box<dyn Policy<B::InnerBackend>>;

    fn parameter_groups(&self) -> ParameterGroups<B>;

    /// Diamond/ghost sub-policies, for architectures that have them
    fn experts(&self) -> Option<ExpertViews<B::InnerBackend>> {
        None
    }
}

impl<B: Backend> Policy<B> for MlpPolicy<B> {
    fn action_log_probs(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        log_softmax(self.logits(obs), 1)
    }
}

impl<B: AutodiffBackend> PolicyModel<B> for MlpPolicy<B> {
    fn init(
        config: &PolicyConfig,
        obs_size: usize,
        num_actions: usize,
        device: &B::Device,
    ) -> Self {
        config.init_mlp_policy(obs_size, num_actions, device)
    }

    fn inference(&self) -> Box<dyn Policy<B::InnerBackend>> {
        Box::new(self.clone().valid())
    }

    fn parameter_groups(&self) -> ParameterGroups<B> {
        ParameterGroups {
            expert: None,
            shared: self.net.squared_norm(),
        }
    }
}

impl<B: Backend> Policy<B> for RoutedPolicy<B> {
    fn action_log_probs(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        self.mixture_log_probs(obs)
    }
}

impl<B: Backend> RoutedPolicy<B> {
    pub fn into_views(self) -> ExpertViews<B> {
        ExpertViews {
            diamond: ExpertPolicy {
                net: self.diamond_expert,
            },
            ghost: ExpertPolicy {
                net: self.ghost_expert,
            },
            router: self.router,
        }
    }
}

impl<B: AutodiffBackend> PolicyModel<B> for RoutedPolicy<B> {
    fn init(
        config: &PolicyConfig,
        obs_size: usize,
        num_actions: usize,
        device: &B::Device,
    ) -> Self {
        config.init_routed_policy(obs_size, num_actions, device)
    }

    fn inference(&self) -> Box<dyn Policy<B::InnerBackend>> {
        Box::new(self.clone().valid())
    }

    fn parameter_groups(&self) -> ParameterGroups<B> {
        ParameterGroups {
            expert: Some(self.diamond_expert.squared_norm() + self.ghost_expert.squared_norm()),
            shared: self.router.squared_norm(),
        }
    }

    fn experts(&self) -> Option<ExpertViews<B::InnerBackend>> {
        Some(self.clone().valid().into_views())
    }
}
