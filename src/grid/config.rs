use serde::{Deserialize, Serialize};

pub use crate::error::ConfigError;

/// Configuration for a batch of grid environments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Number of environments stepped in lockstep
    pub n_envs: usize,
    /// Grid height in cells
    pub nrows: usize,
    /// Grid width in cells
    pub ncols: usize,
    /// Episodes are cut off after this many steps
    pub max_step: usize,
    /// Probability that a freshly reset episode is overseen
    pub oversight_prob: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            n_envs: 256,
            nrows: 5,
            ncols: 5,
            max_step: 20,
            oversight_prob: 0.5,
        }
    }
}

impl GridConfig {
    /// Create a configuration with a custom grid size
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            ..Default::default()
        }
    }

    /// Small batch for tests
    pub fn small() -> Self {
        Self {
            n_envs: 4,
            nrows: 3,
            ncols: 4,
            max_step: 8,
            oversight_prob: 0.5,
        }
    }

    /// Size of a flattened observation
    pub fn obs_size(&self) -> usize {
        crate::grid::observation::NUM_CHANNELS * self.nrows * self.ncols
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_envs == 0 {
            return Err(ConfigError::Zero { field: "n_envs" });
        }
        if self.nrows == 0 {
            return Err(ConfigError::Zero { field: "nrows" });
        }
        if self.ncols == 0 {
            return Err(ConfigError::Zero { field: "ncols" });
        }
        if self.max_step == 0 {
            return Err(ConfigError::Zero { field: "max_step" });
        }
        if self.nrows * self.ncols < 3 {
            return Err(ConfigError::GridTooSmall {
                nrows: self.nrows,
                ncols: self.ncols,
            });
        }
        if !(0.0..=1.0).contains(&self.oversight_prob) {
            return Err(ConfigError::OversightProb(self.oversight_prob));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GridConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.obs_size(), 4 * 5 * 5);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = GridConfig::small();
        config.n_envs = 0;
        assert_eq!(config.validate(), Err(ConfigError::Zero { field: "n_envs" }));

        let mut config = GridConfig::small();
        config.oversight_prob = 1.5;
        assert_eq!(config.validate(), Err(ConfigError::OversightProb(1.5)));

        let config = GridConfig {
            nrows: 1,
            ncols: 2,
            ..GridConfig::small()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::GridTooSmall { .. })
        ));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let parsed: Result<GridConfig, _> = toml::from_str("nrows = 4\nspeed = 2\n");
        assert!(parsed.is_err());
    }
}
