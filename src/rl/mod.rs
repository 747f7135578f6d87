//! Policy-gradient training for the oversight grid
//!
//! Provides:
//! - MLP and routed (mixture-of-experts) policies behind the [`Policy`] and
//!   [`PolicyModel`] traits
//! - Batched rollouts with discounted returns
//! - Four reward functions over step infos
//! - A policy-gradient loss with a learned value baseline
//! - Global gradient-norm clipping shared by both optimizers
//! - Evaluation with completion statistics
//! - Run configuration and model persistence

pub mod backend;
pub mod clipping;
pub mod config;
pub mod eval;
pub mod loss;
pub mod network;
pub mod persistence;
pub mod policy;
pub mod reward;
pub mod rollout;

pub use backend::{Device, InferenceBackend, TrainingBackend, default_device};
pub use config::{TrainConfig, VisualizationConfig};
pub use eval::{EndStats, EvalMetrics, evaluate};
pub use loss::{CoefSchedule, LossCoefs, LossFn, PolicyGradientLoss, ResolvedCoefs};
pub use network::{MlpPolicy, PolicyConfig, PolicyKind, RoutedPolicy, ValueNetwork};
pub use persistence::{LoadedPolicy, ModelMetadata, ModelPaths, load_model, save_model};
pub use policy::{ExpertPolicy, ExpertViews, ParameterGroups, Policy, PolicyModel};
pub use reward::RewardFn;
pub use rollout::{InfoBatch, ProcessedBatch, generate_and_process_batch, generate_batch};
