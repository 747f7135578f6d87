//! Training mode
//!
//! Runs the policy-gradient loop: roll out the batch of environments, score
//! the rollout with the configured reward, update policy and value network,
//! and periodically evaluate and snapshot the policy. At the end of a run the
//! metric tables, weights and the snapshot animation are written to disk.
//!
//! # Example
//!
//! ```rust,ignore
//! use oversight_grid::modes::TrainMode;
//! use oversight_grid::rl::{
//!     RewardFn, RoutedPolicy, TrainConfig, TrainingBackend, default_device,
//! };
//!
//! let config = TrainConfig {
//!     num_learning_updates: 500,
//!     reward_fn: RewardFn::Moe,
//!     max_grad_norm: Some(1.0),
//!     seed: Some(7),
//!     ..Default::default()
//! };
//!
//! let mut train_mode = TrainMode::<TrainingBackend, RoutedPolicy<TrainingBackend>>::new(
//!     config,
//!     default_device(),
//! )?;
//! let outputs = train_mode.run()?;
//! println!("Results in {:?}", outputs.train_results);
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use burn::{
    optim::{Adam, AdamConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    tensor::{Tensor, backend::AutodiffBackend},
};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::diagnostics::{make_gif, visualize_expert_policies};
use crate::grid::{ContinuingEnv, NUM_ACTIONS};
use crate::metrics::{MetricValue, MetricsTable, TrainingStats};
use crate::rl::clipping::{clip_factor, scale_grads, squared_grad_norm};
use crate::rl::{
    EndStats, LossFn, ModelMetadata, ModelPaths, MlpPolicy, Policy, PolicyKind, PolicyModel,
    RewardFn, RoutedPolicy, TrainConfig, TrainingBackend, ValueNetwork, default_device, evaluate,
    generate_and_process_batch, save_model,
};

/// Files written by a finished run
#[derive(Debug, Clone)]
pub struct TrainOutputs {
    pub run_id: String,
    pub train_results: PathBuf,
    pub eval_results: PathBuf,
    pub model: ModelPaths,
    /// Absent for policies without experts
    pub animation: Option<PathBuf>,
}

/// Train with the CPU backend, picking the policy type from the config
pub fn run_training(config: TrainConfig) -> Result<TrainOutputs> {
    let device = default_device();
    match config.policy.kind {
        PolicyKind::Mlp => {
            TrainMode::<TrainingBackend, MlpPolicy<TrainingBackend>>::new(config, device)?.run()
        }
        PolicyKind::Routed => {
            TrainMode::<TrainingBackend, RoutedPolicy<TrainingBackend>>::new(config, device)?.run()
        }
    }
}

/// Training loop state for one run
pub struct TrainMode<B: AutodiffBackend, P: PolicyModel<B>> {
    config: TrainConfig,
    run_id: String,
    env: ContinuingEnv<B::InnerBackend>,
    policy: P,
    value_fn: ValueNetwork<B>,
    policy_optim: OptimizerAdaptor<Adam, P, B>,
    value_optim: OptimizerAdaptor<Adam, ValueNetwork<B>, B>,
    rng: StdRng,
    device: B::Device,
    stats: TrainingStats,
    train_metrics: MetricsTable,
    eval_metrics: MetricsTable,
    global_step: usize,
}

impl<B: AutodiffBackend, P: PolicyModel<B>> TrainMode<B, P> {
    /// Validate the config, seed every generator and build the networks
    ///
    /// # Arguments
    ///
    /// * `config` - Run configuration, checked with [`TrainConfig::validate`]
    /// * `device` - Device the networks and environments live on
    ///
    /// Creates `save_dir` and `policy_visualization_dir` when missing.
    pub fn new(config: TrainConfig, device: B::Device) -> Result<Self> {
        config.validate().context("Invalid training configuration")?;

        std::fs::create_dir_all(&config.save_dir)
            .with_context(|| format!("Failed to create directory: {:?}", config.save_dir))?;
        std::fs::create_dir_all(&config.policy_visualization_dir).with_context(|| {
            format!(
                "Failed to create directory: {:?}",
                config.policy_visualization_dir
            )
        })?;

        let seed = config.seed.unwrap_or_else(time_seed);
        B::seed(seed);
        let mut rng = StdRng::seed_from_u64(seed);

        let run_id = match &config.run_id {
            Some(run_id) => run_id.clone(),
            None => rng.gen_range(0..1_000_000u32).to_string(),
        };

        let env = ContinuingEnv::new(config.env.clone(), device.clone(), rng.next_u64())?;
        let policy = P::init(&config.policy, env.obs_size(), NUM_ACTIONS, &device);
        let value_fn = config.policy.init_value_network(env.obs_size(), &device);

        tracing::info!(run_id = %run_id, seed, "Initialized training run");

        Ok(Self {
            policy_optim: AdamConfig::new().init(),
            value_optim: AdamConfig::new().init(),
            stats: TrainingStats::new(100),
            train_metrics: MetricsTable::new(),
            eval_metrics: MetricsTable::new(),
            global_step: 0,
            config,
            run_id,
            env,
            policy,
            value_fn,
            rng,
            device,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn train_metrics(&self) -> &MetricsTable {
        &self.train_metrics
    }

    pub fn eval_metrics(&self) -> &MetricsTable {
        &self.eval_metrics
    }

    /// Run every learning update, then write results
    pub fn run(&mut self) -> Result<TrainOutputs> {
        self.print_header();

        let total = self.config.num_learning_updates;
        let progress = ProgressBar::new(total as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
                .progress_chars("#>-"),
        );

        for update_idx in 0..total {
            self.learning_update(update_idx)?;

            let is_final_step = update_idx == total - 1;
            if update_idx % self.config.eval_freq == 0 || is_final_step {
                self.evaluate_policies(update_idx)?;
            }
            if update_idx % self.config.policy_log_freq == 0 || is_final_step {
                self.snapshot_policy(update_idx)?;
            }

            progress.set_message(self.stats.format_summary());
            progress.inc(1);
        }
        progress.finish();

        let outputs = self.save_results()?;

        println!("\nTraining complete!");
        println!("Results saved to: {:?}", self.config.save_dir);
        println!("\nFinal Statistics:");
        println!("{}", self.stats.format_summary());

        if self.config.sleep_after_run_secs > 0 {
            std::thread::sleep(Duration::from_secs(self.config.sleep_after_run_secs));
        }

        Ok(outputs)
    }

    /// One rollout and one optimizer step for both networks
    fn learning_update(&mut self, update_idx: usize) -> Result<()> {
        let t_start = Instant::now();
        let rollout_policy = self.policy.inference();
        let batch = generate_and_process_batch(
            &mut self.env,
            rollout_policy.as_ref(),
            self.config.reward_fn,
            self.config.discount as f32,
            self.config.steps_per_learning_update,
            &mut self.rng,
        );
        let t_generate = t_start.elapsed().as_secs_f64();

        let coefs = self.config.loss_coefs.at(update_idx);
        let output = self
            .config
            .loss
            .compute(&batch, &self.policy, &self.value_fn, &coefs);
        let penalty = self.weight_decay_penalty();
        let weight_decay_loss = crate::rl::loss::scalar(&penalty);

        let mut grads = (output.loss + penalty).backward();
        let mut policy_grads = GradientsParams::from_module(&mut grads, &self.policy);
        let mut value_grads = GradientsParams::from_module(&mut grads, &self.value_fn);
        let grad_norm = self.clip_gradients(&mut policy_grads, &mut value_grads);

        let lr = self.config.learning_rate;
        self.policy = self.policy_optim.step(lr, self.policy.clone(), policy_grads);
        self.value_fn = self.value_optim.step(lr, self.value_fn.clone(), value_grads);
        let t_full_step = t_start.elapsed().as_secs_f64();

        self.global_step += self.config.steps_per_update();

        self.train_metrics.push("t_generate_and_process_batch", t_generate);
        self.train_metrics.push("t_full_step", t_full_step);
        self.train_metrics.push("update_idx", update_idx);
        self.train_metrics.push("global_step", self.global_step);
        self.train_metrics.extend(output.metrics.iter().copied());
        self.train_metrics.push("weight_decay_loss", weight_decay_loss);
        self.train_metrics.push("grad_norm", grad_norm);

        let end_stats = EndStats::from_infos(&batch.infos);
        if end_stats.n_complete_eps == 0 {
            tracing::warn!(update_idx, "No episode completed in training batch");
        }
        self.train_metrics.extend(end_stats.metrics());

        let metric = |name: &str| {
            output
                .metrics
                .iter()
                .find(|(key, _)| *key == name)
                .map_or(0.0, |(_, value)| *value)
        };
        self.stats
            .record_update(metric("policy_loss"), metric("value_loss"), metric("entropy"));
        self.stats
            .record_batch(&end_stats, self.config.steps_per_update());

        Ok(())
    }

    /// Rescale both gradient sets so their joint L2 norm is at most
    /// `max_grad_norm`. Returns the norm before clipping.
    fn clip_gradients(
        &self,
        policy_grads: &mut GradientsParams,
        value_grads: &mut GradientsParams,
    ) -> f64 {
        let grad_norm = (squared_grad_norm::<B, _>(&self.policy, policy_grads)
            + squared_grad_norm::<B, _>(&self.value_fn, value_grads))
        .sqrt();
        if let Some(max_norm) = self.config.max_grad_norm {
            let factor = clip_factor(grad_norm, max_norm);
            if factor < 1.0 {
                scale_grads::<B, _>(&self.policy, policy_grads, factor);
                scale_grads::<B, _>(&self.value_fn, value_grads, factor);
            }
        }
        grad_norm
    }

    /// `½·wd_expert·‖θ_expert‖² + ½·wd_shared·(‖θ_shared‖² + ‖θ_value‖²)`
    fn weight_decay_penalty(&self) -> Tensor<B, 1> {
        let groups = self.policy.parameter_groups();
        let shared = (groups.shared + self.value_fn.squared_norm())
            .mul_scalar(0.5 * self.config.shared_weight_decay);
        match groups.expert {
            Some(expert) => shared + expert.mul_scalar(0.5 * self.config.expert_weight_decay),
            None => shared,
        }
    }

    /// Evaluate the training policy and, when present, each expert on its own
    fn evaluate_policies(&mut self, update_idx: usize) -> Result<()> {
        let mut eval_policies: Vec<(&'static str, Box<dyn Policy<B::InnerBackend>>)> =
            vec![("training_policy", self.policy.inference())];
        if let Some(views) = self.policy.experts() {
            eval_policies.push(("diamond", Box::new(views.diamond)));
            eval_policies.push(("ghost", Box::new(views.ghost)));
        }

        for (policy_type, policy) in eval_policies {
            let result = evaluate(
                policy.as_ref(),
                &self.config.env,
                self.config.env.max_step,
                RewardFn::True,
                self.config.discount as f32,
                &self.device,
                &mut self.rng,
            )?;
            if result.stats.n_complete_eps == 0 {
                tracing::warn!(update_idx, policy_type, "No episode completed during evaluation");
            }
            tracing::info!(
                update_idx,
                policy_type,
                avg_return = result.avg_return,
                diamond_seen = result.stats.reached_diamond_seen,
                diamond_unseen = result.stats.reached_diamond_unseen,
                "Evaluation"
            );

            self.eval_metrics.push("update_idx", update_idx);
            self.eval_metrics.push("policy_type", policy_type);
            self.eval_metrics.extend(result.metrics());
        }
        Ok(())
    }

    /// Save a PNG of the experts; policies without experts are skipped
    fn snapshot_policy(&self, update_idx: usize) -> Result<()> {
        let Some(views) = self.policy.experts() else {
            return Ok(());
        };
        let env = &self.config.env;
        let path = self
            .config
            .policy_visualization_dir
            .join(format!("policy_{}_{:08}.png", self.run_id, update_idx));
        let title = format!("run id: {}, update step: {}", self.run_id, update_idx);
        let progress = (update_idx + 1) as f64 / self.config.num_learning_updates as f64;

        visualize_expert_policies(
            &views,
            env.nrows,
            env.ncols,
            self.config.visualization.ghost(),
            self.config.visualization.diamond(),
            &vec![0.0; env.nrows * env.ncols],
            &title,
            &path,
            progress,
            &self.device,
        )
        .with_context(|| format!("Failed to save policy snapshot to {:?}", path))
    }

    /// Write both CSV files, the weights and the animation
    fn save_results(&self) -> Result<TrainOutputs> {
        let leading = [
            ("run_label", MetricValue::from(self.config.run_label.as_str())),
            ("oversight_prob", MetricValue::from(self.config.env.oversight_prob)),
        ];
        let trailing = [("run_id", MetricValue::from(self.run_id.as_str()))];

        let train_results = self
            .config
            .save_dir
            .join(format!("train_results_{}.csv", self.run_id));
        self.train_metrics
            .write_csv(&train_results, "update_idx", &leading, &trailing)
            .with_context(|| format!("Failed to write {:?}", train_results))?;

        let eval_results = self
            .config
            .save_dir
            .join(format!("eval_results_{}.csv", self.run_id));
        self.eval_metrics
            .write_csv(&eval_results, "update_idx", &leading, &trailing)
            .with_context(|| format!("Failed to write {:?}", eval_results))?;

        let metadata = ModelMetadata::new(
            self.run_id.clone(),
            self.config.policy.clone(),
            self.config.env.clone(),
            self.config.reward_fn,
            self.config.num_learning_updates,
        );
        let model = save_model(&self.policy, &self.value_fn, &metadata, &self.config.save_dir)?;

        let animation = make_gif(
            &self.config.policy_visualization_dir,
            &format!("policy_{}", self.run_id),
            true,
        )
        .context("Failed to assemble policy animation")?;

        tracing::info!(run_id = %self.run_id, path = ?train_results, "Saved training results");

        Ok(TrainOutputs {
            run_id: self.run_id.clone(),
            train_results,
            eval_results,
            model,
            animation,
        })
    }

    fn print_header(&self) {
        let config = &self.config;
        println!("{}", "=".repeat(70));
        println!("Policy Gradient Training - Oversight Grid");
        println!("{}", "=".repeat(70));
        println!("Run id: {} ({})", self.run_id, config.run_label);
        println!(
            "Env: {} envs, {}x{} grid, max step {}, oversight prob {}",
            config.env.n_envs,
            config.env.nrows,
            config.env.ncols,
            config.env.max_step,
            config.env.oversight_prob
        );
        println!("Policy: {:?} {:?}", config.policy.kind, config.policy.hidden_dims);
        println!("Reward: {}", config.reward_fn.label());
        println!("Training:");
        println!("  Learning updates: {}", config.num_learning_updates);
        println!("  Steps per update: {}", config.steps_per_learning_update);
        println!("  Learning rate: {}", config.learning_rate);
        println!("  Discount: {}", config.discount);
        println!(
            "  Weight decay: expert {}, shared {}",
            config.expert_weight_decay, config.shared_weight_decay
        );
        println!("Evaluation: Every {} updates", config.eval_freq);
        println!("Snapshots: Every {} updates", config.policy_log_freq);
        println!("Save dir: {:?}", config.save_dir);
        println!("{}", "=".repeat(70));
        println!();
    }
}

fn time_seed() -> u64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs());
    secs + u64::from(std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridConfig;
    use crate::rl::PolicyConfig;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir, kind: PolicyKind) -> TrainConfig {
        TrainConfig {
            steps_per_learning_update: 4,
            num_learning_updates: 3,
            eval_freq: 2,
            policy_log_freq: 2,
            policy: PolicyConfig {
                kind,
                hidden_dims: vec![8],
                value_hidden_dims: vec![8],
            },
            env: GridConfig::small(),
            save_dir: temp_dir.path().join("results"),
            policy_visualization_dir: temp_dir.path().join("frames"),
            run_label: "test".to_string(),
            run_id: Some("17".to_string()),
            seed: Some(5),
            expert_weight_decay: 0.01,
            shared_weight_decay: 0.01,
            max_grad_norm: Some(1.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config = TrainConfig {
            discount: 2.0,
            ..test_config(&temp_dir, PolicyKind::Mlp)
        };
        let result = TrainMode::<TrainingBackend, MlpPolicy<TrainingBackend>>::new(
            config,
            default_device(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_random_run_id_in_range() {
        let temp_dir = TempDir::new().unwrap();
        let config = TrainConfig {
            run_id: None,
            ..test_config(&temp_dir, PolicyKind::Mlp)
        };
        let mode = TrainMode::<TrainingBackend, MlpPolicy<TrainingBackend>>::new(
            config,
            default_device(),
        )
        .unwrap();
        let run_id: u32 = mode.run_id().parse().unwrap();
        assert!(run_id < 1_000_000);
    }

    #[test]
    fn test_routed_run_writes_all_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, PolicyKind::Routed);
        let frames_dir = config.policy_visualization_dir.clone();

        let mut mode = TrainMode::<TrainingBackend, RoutedPolicy<TrainingBackend>>::new(
            config,
            default_device(),
        )
        .unwrap();
        let outputs = mode.run().unwrap();

        assert_eq!(outputs.run_id, "17");
        assert_eq!(mode.train_metrics().len(), 3);
        // Updates 0 and 2, three policies each
        assert_eq!(mode.eval_metrics().len(), 6);
        assert_eq!(
            mode.train_metrics().column("global_step").map(|values| values[2].clone()),
            Some(MetricValue::Int(3 * 4 * 4))
        );

        let train_csv = std::fs::read_to_string(&outputs.train_results).unwrap();
        let header = train_csv.lines().next().unwrap();
        assert!(header.starts_with(
            "update_idx,run_label,oversight_prob,t_generate_and_process_batch,t_full_step,global_step,policy_loss"
        ));
        assert!(header.ends_with(",run_id"));
        assert_eq!(train_csv.lines().count(), 4);

        let eval_csv = std::fs::read_to_string(&outputs.eval_results).unwrap();
        let policy_types: Vec<&str> = eval_csv
            .lines()
            .skip(1)
            .filter_map(|line| line.split(',').nth(3))
            .collect();
        assert_eq!(
            policy_types,
            vec!["training_policy", "diamond", "ghost", "training_policy", "diamond", "ghost"]
        );

        assert!(outputs.model.metadata.exists());
        let animation = outputs.animation.unwrap();
        assert_eq!(animation, frames_dir.join("policy_17.gif"));
        assert!(animation.exists());
        let leftover_frames = std::fs::read_dir(&frames_dir)
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "png"))
            .count();
        assert_eq!(leftover_frames, 0);
    }

    #[test]
    fn test_mlp_run_skips_expert_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, PolicyKind::Mlp);

        let mut mode = TrainMode::<TrainingBackend, MlpPolicy<TrainingBackend>>::new(
            config,
            default_device(),
        )
        .unwrap();
        let outputs = mode.run().unwrap();

        assert_eq!(mode.eval_metrics().len(), 2);
        assert!(outputs.animation.is_none());
        assert!(outputs.eval_results.exists());
    }

    #[test]
    fn test_gradients_clipped_to_joint_norm() {
        let temp_dir = TempDir::new().unwrap();
        let config = TrainConfig {
            max_grad_norm: Some(1e-3),
            expert_weight_decay: 1.0,
            shared_weight_decay: 1.0,
            ..test_config(&temp_dir, PolicyKind::Routed)
        };
        let mode = TrainMode::<TrainingBackend, RoutedPolicy<TrainingBackend>>::new(
            config,
            default_device(),
        )
        .unwrap();

        let mut grads = mode.weight_decay_penalty().backward();
        let mut policy_grads = GradientsParams::from_module(&mut grads, &mode.policy);
        let mut value_grads = GradientsParams::from_module(&mut grads, &mode.value_fn);
        let before = mode.clip_gradients(&mut policy_grads, &mut value_grads);
        let after = (squared_grad_norm::<TrainingBackend, _>(&mode.policy, &policy_grads)
            + squared_grad_norm::<TrainingBackend, _>(&mode.value_fn, &value_grads))
        .sqrt();

        assert!(before > 1e-2);
        assert!((after - 1e-3).abs() < 1e-5);
    }

    #[test]
    fn test_gradients_below_limit_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let config = TrainConfig {
            max_grad_norm: Some(1e9),
            expert_weight_decay: 1.0,
            shared_weight_decay: 1.0,
            ..test_config(&temp_dir, PolicyKind::Mlp)
        };
        let mode =
            TrainMode::<TrainingBackend, MlpPolicy<TrainingBackend>>::new(config, default_device())
                .unwrap();

        let mut grads = mode.weight_decay_penalty().backward();
        let mut policy_grads = GradientsParams::from_module(&mut grads, &mode.policy);
        let mut value_grads = GradientsParams::from_module(&mut grads, &mode.value_fn);
        let before = mode.clip_gradients(&mut policy_grads, &mut value_grads);
        let after = (squared_grad_norm::<TrainingBackend, _>(&mode.policy, &policy_grads)
            + squared_grad_norm::<TrainingBackend, _>(&mode.value_fn, &value_grads))
        .sqrt();

        assert!((before - after).abs() < 1e-6 * before.max(1.0));
    }

    #[test]
    fn test_weight_decay_penalty_matches_norms() {
        let temp_dir = TempDir::new().unwrap();
        let config = TrainConfig {
            expert_weight_decay: 0.2,
            shared_weight_decay: 0.1,
            ..test_config(&temp_dir, PolicyKind::Routed)
        };
        let mode = TrainMode::<TrainingBackend, RoutedPolicy<TrainingBackend>>::new(
            config,
            default_device(),
        )
        .unwrap();

        let groups = mode.policy.parameter_groups();
        let expert = crate::rl::loss::scalar(&groups.expert.unwrap());
        let shared = crate::rl::loss::scalar(&groups.shared);
        let value = crate::rl::loss::scalar(&mode.value_fn.squared_norm());
        let expected = 0.5 * 0.2 * expert + 0.5 * 0.1 * (shared + value);

        let actual = crate::rl::loss::scalar(&mode.weight_decay_penalty());
        assert!((actual - expected).abs() < 1e-4 * expected.max(1.0));
    }
}
