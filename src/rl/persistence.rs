//! Saving and loading trained networks
//!
//! A run writes three files into its save directory:
//! - `policy_<run_id>.mpk` - policy weights (Burn record format)
//! - `value_<run_id>.mpk` - value network weights
//! - `policy_<run_id>.meta.json` - [`ModelMetadata`] as JSON
//!
//! Metadata carries the configs needed to rebuild the networks before their
//! records are loaded.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::{
    module::{AutodiffModule, Module},
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::{Tensor, backend::{AutodiffBackend, Backend}},
};
use serde::{Deserialize, Serialize};

use super::network::{MlpPolicy, PolicyConfig, PolicyKind, RoutedPolicy, ValueNetwork};
use super::policy::{ExpertViews, Policy, PolicyModel};
use super::reward::RewardFn;
use crate::grid::{GridConfig, NUM_ACTIONS};

/// Metadata saved with the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub run_id: String,
    pub policy: PolicyConfig,
    pub env: GridConfig,
    pub obs_size: usize,
    pub num_actions: usize,
    /// Reward the policy was trained on
    pub reward_fn: RewardFn,
    /// Learning updates completed
    pub updates: usize,
    /// Crate version that wrote the files
    pub version: String,
}

impl ModelMetadata {
    pub fn new(
        run_id: impl Into<String>,
        policy: PolicyConfig,
        env: GridConfig,
        reward_fn: RewardFn,
        updates: usize,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            obs_size: env.obs_size(),
            num_actions: NUM_ACTIONS,
            policy,
            env,
            reward_fn,
            updates,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// File locations for one run inside a save directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    /// Policy record path without the `.mpk` extension
    pub policy: PathBuf,
    /// Value record path without the `.mpk` extension
    pub value: PathBuf,
    pub metadata: PathBuf,
}

impl ModelPaths {
    pub fn new(save_dir: &Path, run_id: &str) -> Self {
        Self {
            policy: save_dir.join(format!("policy_{run_id}")),
            value: save_dir.join(format!("value_{run_id}")),
            metadata: save_dir.join(format!("policy_{run_id}.meta.json")),
        }
    }
}

/// Save policy, value network and metadata into `save_dir`
pub fn save_model<B, P>(
    policy: &P,
    value_fn: &ValueNetwork<B>,
    metadata: &ModelMetadata,
    save_dir: &Path,
) -> Result<ModelPaths>
where
    B: AutodiffBackend,
    P: PolicyModel<B>,
{
    std::fs::create_dir_all(save_dir)
        .with_context(|| format!("Failed to create directory: {:?}", save_dir))?;
    let paths = ModelPaths::new(save_dir, &metadata.run_id);

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(policy.clone().valid().into_record(), paths.policy.clone())
        .context("Failed to save policy weights")?;
    recorder
        .record(value_fn.clone().valid().into_record(), paths.value.clone())
        .context("Failed to save value weights")?;

    let meta_json =
        serde_json::to_string_pretty(metadata).context("Failed to serialize metadata")?;
    std::fs::write(&paths.metadata, meta_json)
        .with_context(|| format!("Failed to write metadata to {:?}", paths.metadata))?;

    Ok(paths)
}

/// A policy rebuilt from disk, either architecture
#[derive(Debug, Clone)]
pub enum LoadedPolicy<B: Backend> {
    Mlp(MlpPolicy<B>),
    Routed(RoutedPolicy<B>),
}

impl<B: Backend> LoadedPolicy<B> {
    pub fn experts(&self) -> Option<ExpertViews<B>> {
        match self {
            LoadedPolicy::Mlp(_) => None,
            LoadedPolicy::Routed(policy) => Some(policy.clone().into_views()),
        }
    }
}

impl<B: Backend> Policy<B> for LoadedPolicy<B> {
    fn action_log_probs(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            LoadedPolicy::Mlp(policy) => policy.action_log_probs(obs),
            LoadedPolicy::Routed(policy) => policy.action_log_probs(obs),
        }
    }
}

/// Load networks saved by [`save_model`]
///
/// `metadata_path` is the `.meta.json` file; the weight files are found next
/// to it by run id.
pub fn load_model<B: Backend>(
    metadata_path: &Path,
    device: &B::Device,
) -> Result<(LoadedPolicy<B>, ValueNetwork<B>, ModelMetadata)> {
    let meta_json = std::fs::read_to_string(metadata_path)
        .with_context(|| format!("Failed to read metadata from {:?}", metadata_path))?;
    let metadata: ModelMetadata =
        serde_json::from_str(&meta_json).context("Failed to deserialize metadata")?;

    let save_dir = metadata_path.parent().unwrap_or_else(|| Path::new("."));
    let paths = ModelPaths::new(save_dir, &metadata.run_id);
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

    let policy = match metadata.policy.kind {
        PolicyKind::Mlp => {
            let policy: MlpPolicy<B> =
                metadata
                    .policy
                    .init_mlp_policy(metadata.obs_size, metadata.num_actions, device);
            let record = recorder
                .load(paths.policy.clone(), device)
                .with_context(|| format!("Failed to load policy weights from {:?}", paths.policy))?;
            LoadedPolicy::Mlp(policy.load_record(record))
        }
        PolicyKind::Routed => {
            let policy: RoutedPolicy<B> =
                metadata
                    .policy
                    .init_routed_policy(metadata.obs_size, metadata.num_actions, device);
            let record = recorder
                .load(paths.policy.clone(), device)
                .with_context(|| format!("Failed to load policy weights from {:?}", paths.policy))?;
            LoadedPolicy::Routed(policy.load_record(record))
        }
    };

    let value_fn: ValueNetwork<B> = metadata.policy.init_value_network(metadata.obs_size, device);
    let record = recorder
        .load(paths.value.clone(), device)
        .with_context(|| format!("Failed to load value weights from {:?}", paths.value))?;
    let value_fn = value_fn.load_record(record);

    Ok((policy, value_fn, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::{InferenceBackend, TrainingBackend, default_device};
    use tempfile::TempDir;

    #[test]
    fn test_metadata_creation() {
        let env = GridConfig::small();
        let metadata = ModelMetadata::new("42", PolicyConfig::default(), env.clone(), RewardFn::Moe, 10);

        assert_eq!(metadata.run_id, "42");
        assert_eq!(metadata.obs_size, env.obs_size());
        assert_eq!(metadata.num_actions, NUM_ACTIONS);
        assert_eq!(metadata.updates, 10);
        assert_eq!(metadata.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_metadata_serialization() {
        let metadata = ModelMetadata::new(
            "7",
            PolicyConfig::default(),
            GridConfig::default(),
            RewardFn::BiasedMoe,
            3,
        );
        let json = serde_json::to_string(&metadata).unwrap();
        let deserialized: ModelMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, metadata);
    }

    #[test]
    fn test_paths_follow_run_id() {
        let paths = ModelPaths::new(Path::new("out"), "123");
        assert_eq!(paths.policy, Path::new("out/policy_123"));
        assert_eq!(paths.value, Path::new("out/value_123"));
        assert_eq!(paths.metadata, Path::new("out/policy_123.meta.json"));
    }

    #[test]
    fn test_save_and_load_routed_policy() {
        let temp_dir = TempDir::new().unwrap();
        let device = default_device();
        let env = GridConfig::small();
        let config = PolicyConfig {
            hidden_dims: vec![8],
            value_hidden_dims: vec![8],
            ..Default::default()
        };

        let policy =
            <RoutedPolicy<TrainingBackend> as PolicyModel<TrainingBackend>>::init(
                &config,
                env.obs_size(),
                NUM_ACTIONS,
                &device,
            );
        let value_fn = config.init_value_network::<TrainingBackend>(env.obs_size(), &device);
        let metadata = ModelMetadata::new("run", config.clone(), env.clone(), RewardFn::True, 1);

        let paths = save_model(&policy, &value_fn, &metadata, temp_dir.path()).unwrap();
        assert!(paths.metadata.exists());

        let (loaded, loaded_value, loaded_meta) =
            load_model::<InferenceBackend>(&paths.metadata, &device).unwrap();
        assert_eq!(loaded_meta, metadata);
        assert!(loaded.experts().is_some());

        let obs = Tensor::<InferenceBackend, 2>::ones([2, env.obs_size()], &device);
        let expected: Vec<f32> = policy
            .clone()
            .valid()
            .action_log_probs(obs.clone())
            .into_data()
            .iter::<f32>()
            .collect();
        let actual: Vec<f32> = loaded
            .action_log_probs(obs.clone())
            .into_data()
            .iter::<f32>()
            .collect();
        for (a, b) in expected.iter().zip(&actual) {
            assert!((a - b).abs() < 1e-6);
        }

        let expected_value: Vec<f32> = value_fn.valid().forward(obs.clone()).into_data().iter::<f32>().collect();
        let actual_value: Vec<f32> = loaded_value.forward(obs).into_data().iter::<f32>().collect();
        assert_eq!(expected_value, actual_value);
    }

    #[test]
    fn test_load_missing_metadata_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_model::<InferenceBackend>(
            &temp_dir.path().join("policy_none.meta.json"),
            &default_device(),
        );
        assert!(result.is_err());
    }
}
