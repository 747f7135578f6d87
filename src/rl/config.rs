//! Training run configuration
//!
//! A run is described by a TOML file. Every table rejects unknown keys so a
//! typo fails loudly instead of silently falling back to a default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::loss::{LossCoefs, PolicyGradientLoss};
use super::network::{PolicyConfig, PolicyKind};
use super::reward::RewardFn;
use crate::error::ConfigError;
use crate::grid::{GridConfig, Position};

/// Fixed diamond/ghost placement used for policy snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisualizationConfig {
    /// `(row, col)` of the ghost
    pub ghost_loc: (usize, usize),
    /// `(row, col)` of the diamond
    pub diamond_loc: (usize, usize),
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            ghost_loc: (2, 3),
            diamond_loc: (0, 1),
        }
    }
}

impl VisualizationConfig {
    pub fn ghost(&self) -> Position {
        Position::new(self.ghost_loc.0, self.ghost_loc.1)
    }

    pub fn diamond(&self) -> Position {
        Position::new(self.diamond_loc.0, self.diamond_loc.1)
    }

    fn validate(&self, env: &GridConfig) -> Result<(), ConfigError> {
        for (name, (row, col)) in [("ghost", self.ghost_loc), ("diamond", self.diamond_loc)] {
            if row >= env.nrows || col >= env.ncols {
                return Err(ConfigError::LocationOutOfBounds {
                    name,
                    row,
                    col,
                    nrows: env.nrows,
                    ncols: env.ncols,
                });
            }
        }
        if self.ghost_loc == self.diamond_loc {
            return Err(ConfigError::OverlappingLocations);
        }
        Ok(())
    }
}

/// Everything a training run needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    /// Steps taken in every environment per learning update
    pub steps_per_learning_update: usize,
    pub num_learning_updates: usize,
    /// Evaluate every this many updates (and after the final one)
    pub eval_freq: usize,
    /// Save a policy snapshot every this many updates (and after the final one)
    pub policy_log_freq: usize,
    pub discount: f64,
    pub loss_coefs: LossCoefs,
    pub learning_rate: f64,
    /// L2 penalty on expert parameters
    pub expert_weight_decay: f64,
    /// L2 penalty on router and value parameters
    pub shared_weight_decay: f64,
    /// Clip the joint gradient of policy and value network to this L2 norm
    /// when set
    pub max_grad_norm: Option<f64>,
    pub policy: PolicyConfig,
    /// Reward the policy is trained on; evaluation always uses the true reward
    pub reward_fn: RewardFn,
    pub loss: PolicyGradientLoss,
    pub env: GridConfig,
    pub save_dir: PathBuf,
    pub policy_visualization_dir: PathBuf,
    /// Free-form label copied into every CSV row
    pub run_label: String,
    /// Random when absent
    pub run_id: Option<String>,
    /// Derived from time and process id when absent
    pub seed: Option<u64>,
    pub sleep_after_run_secs: u64,
    pub visualization: VisualizationConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            steps_per_learning_update: 20,
            num_learning_updates: 1000,
            eval_freq: 50,
            policy_log_freq: 50,
            discount: 0.99,
            loss_coefs: LossCoefs::default(),
            learning_rate: 1e-3,
            expert_weight_decay: 0.0,
            shared_weight_decay: 0.0,
            max_grad_norm: None,
            policy: PolicyConfig::default(),
            reward_fn: RewardFn::Naive,
            loss: PolicyGradientLoss::default(),
            env: GridConfig::default(),
            save_dir: PathBuf::from("results"),
            policy_visualization_dir: PathBuf::from("policy_visualizations"),
            run_label: String::from("default"),
            run_id: None,
            seed: None,
            sleep_after_run_secs: 0,
            visualization: VisualizationConfig::default(),
        }
    }
}

impl TrainConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let raw: toml::Table =
            toml::from_str(source).map_err(|err| ConfigError::Parse(err.to_string()))?;
        if raw
            .get("env")
            .and_then(toml::Value::as_table)
            .is_some_and(|env| env.contains_key("device"))
        {
            return Err(ConfigError::DeviceInEnvConfig);
        }

        let config: Self = toml::Value::Table(raw)
            .try_into()
            .map_err(|err: toml::de::Error| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        Self::from_toml_str(&source).with_context(|| format!("Invalid config in {:?}", path))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(ConfigError::DiscountOutOfRange(self.discount));
        }
        if self.learning_rate <= 0.0 || !self.learning_rate.is_finite() {
            return Err(ConfigError::LearningRate(self.learning_rate));
        }

        for (field, value) in [
            ("steps_per_learning_update", self.steps_per_learning_update),
            ("num_learning_updates", self.num_learning_updates),
            ("eval_freq", self.eval_freq),
            ("policy_log_freq", self.policy_log_freq),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }

        for (field, value) in [
            ("expert_weight_decay", self.expert_weight_decay),
            ("shared_weight_decay", self.shared_weight_decay),
        ] {
            if value < 0.0 {
                return Err(ConfigError::Negative { field, value });
            }
        }

        if let Some(value) = self.max_grad_norm {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive {
                    field: "max_grad_norm",
                    value,
                });
            }
        }

        self.env.validate()?;
        self.policy.validate()?;
        // Only routed policies are snapshotted
        if self.policy.kind == PolicyKind::Routed {
            self.visualization.validate(&self.env)?;
        }
        Ok(())
    }

    /// Environment steps consumed by one learning update
    pub fn steps_per_update(&self) -> usize {
        self.steps_per_learning_update * self.env.n_envs
    }
}
