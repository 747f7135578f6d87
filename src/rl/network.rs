//! Policy and value networks
//!
//! All networks are plain MLPs over the flattened grid observation:
//!
//! ```text
//! Input: [batch, 4 * nrows * ncols]
//!   ↓ Linear + ReLU   (one per hidden dim)
//!   ↓ Linear          → output
//! ```
//!
//! `RoutedPolicy` holds two expert MLPs (diamond, ghost) and a router MLP
//! producing a single gate logit. Its action distribution is the mixture
//! `g * π_diamond + (1 - g) * π_ghost` with `g = sigmoid(router(obs))`.

use burn::{
    module::Module,
    nn::{Initializer, Linear, LinearConfig},
    tensor::{
        Tensor,
        activation::{log_sigmoid, log_softmax, relu},
        backend::Backend,
    },
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration of a multi-layer perceptron
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpConfig {
    pub input_dim: usize,
    pub hidden_dims: Vec<usize>,
    pub output_dim: usize,
}

impl MlpConfig {
    pub fn new(input_dim: usize, hidden_dims: Vec<usize>, output_dim: usize) -> Self {
        Self {
            input_dim,
            hidden_dims,
            output_dim,
        }
    }

    /// Initialize the MLP with freshly drawn Xavier-uniform weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let mut dims = Vec::with_capacity(self.hidden_dims.len() + 2);
        dims.push(self.input_dim);
        dims.extend(self.hidden_dims.iter().copied());
        dims.push(self.output_dim);

        let layers = dims
            .windows(2)
            .map(|pair| {
                LinearConfig::new(pair[0], pair[1])
                    .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                    .init(device)
            })
            .collect();

        Mlp { layers }
    }
}

/// Fully connected network with ReLU between layers
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<Linear<B>>,
}

impl<B: Backend> Mlp<B> {
    /// Forward pass, `[batch, input_dim]` → `[batch, output_dim]`
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len() - 1;
        let mut x = input;
        for (idx, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if idx < last {
                x = relu(x);
            }
        }
        x
    }

    /// Sum of squares of every weight and bias
    pub fn squared_norm(&self) -> Tensor<B, 1> {
        self.layers
            .iter()
            .flat_map(|layer| {
                let weight = layer.weight.val().powf_scalar(2.0).sum();
                let bias = layer.bias.as_ref().map(|b| b.val().powf_scalar(2.0).sum());
                std::iter::once(weight).chain(bias)
            })
            .reduce(|acc, term| acc + term)
            .unwrap_or_else(|| Tensor::zeros([1], &Default::default()))
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

/// Which policy architecture to train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Single MLP
    Mlp,
    /// Diamond and ghost experts mixed by a learned router
    Routed,
}

/// Policy architecture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub kind: PolicyKind,
    /// Hidden layer widths, shared by every MLP in the policy
    pub hidden_dims: Vec<usize>,
    /// Hidden layer widths of the value network
    pub value_hidden_dims: Vec<usize>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::Routed,
            hidden_dims: vec![64, 64],
            value_hidden_dims: vec![64, 64],
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hidden_dims.is_empty() || self.value_hidden_dims.is_empty() {
            return Err(ConfigError::NoHiddenLayers);
        }
        if self.hidden_dims.iter().chain(&self.value_hidden_dims).any(|&d| d == 0) {
            return Err(ConfigError::Zero {
                field: "hidden_dims",
            });
        }
        Ok(())
    }

    pub fn init_mlp_policy<B: Backend>(
        &self,
        obs_size: usize,
        num_actions: usize,
        device: &B::Device,
    ) -> MlpPolicy<B> {
        MlpPolicy {
            net: MlpConfig::new(obs_size, self.hidden_dims.clone(), num_actions).init(device),
        }
    }

    pub fn init_routed_policy<B: Backend>(
        &self,
        obs_size: usize,
        num_actions: usize,
        device: &B::Device,
    ) -> RoutedPolicy<B> {
        let expert = MlpConfig::new(obs_size, self.hidden_dims.clone(), num_actions);
        RoutedPolicy {
            diamond_expert: expert.init(device),
            ghost_expert: expert.init(device),
            router: MlpConfig::new(obs_size, self.hidden_dims.clone(), 1).init(device),
        }
    }

    pub fn init_value_network<B: Backend>(
        &self,
        obs_size: usize,
        device: &B::Device,
    ) -> ValueNetwork<B> {
        ValueNetwork {
            net: MlpConfig::new(obs_size, self.value_hidden_dims.clone(), 1).init(device),
        }
    }
}

/// Policy made of a single MLP producing action logits
#[derive(Module, Debug)]
pub struct MlpPolicy<B: Backend> {
    pub(crate) net: Mlp<B>,
}

impl<B: Backend> MlpPolicy<B> {
    pub fn logits(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        self.net.forward(obs)
    }
}

/// Mixture of a diamond expert and a ghost expert
#[derive(Module, Debug)]
pub struct RoutedPolicy<B: Backend> {
    pub(crate) diamond_expert: Mlp<B>,
    pub(crate) ghost_expert: Mlp<B>,
    pub(crate) router: Mlp<B>,
}

impl<B: Backend> RoutedPolicy<B> {
    /// Router output before the sigmoid, `[batch, 1]`
    pub fn gate_logits(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        self.router.forward(obs)
    }

    /// Log-probabilities of the mixture policy, `[batch, num_actions]`
    pub fn mixture_log_probs(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let diamond = log_softmax(self.diamond_expert.forward(obs.clone()), 1);
        let ghost = log_softmax(self.ghost_expert.forward(obs.clone()), 1);
        let gate = self.gate_logits(obs);

        let weighted_diamond = diamond + log_sigmoid(gate.clone());
        let weighted_ghost = ghost + log_sigmoid(gate.neg());
        log_add_exp(weighted_diamond, weighted_ghost)
    }
}

/// Numerically stable `log(exp(a) + exp(b))`
pub(crate) fn log_add_exp<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Tensor<B, 2> {
    let max = a.clone().max_pair(b.clone());
    let sum = (a - max.clone()).exp() + (b - max.clone()).exp();
    max + sum.log()
}

/// State-value estimator
#[derive(Module, Debug)]
pub struct ValueNetwork<B: Backend> {
    net: Mlp<B>,
}

impl<B: Backend> ValueNetwork<B> {
    /// Value estimates, `[batch, obs_size]` → `[batch]`
    pub fn forward(&self, obs: Tensor<B, 2>) -> Tensor<B, 1> {
        self.net.forward(obs).squeeze::<1>(1)
    }

    pub fn squared_norm(&self) -> Tensor<B, 1> {
        self.net.squared_norm()
    }
}
