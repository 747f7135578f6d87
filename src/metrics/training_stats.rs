//! Rolling training statistics for progress display
//!
//! Batch-level completion rates and per-update loss values are kept in
//! fixed-size windows so the progress bar shows smoothed values.

use std::collections::VecDeque;

use crate::rl::EndStats;

/// Training statistics tracker with rolling averages
///
/// # Example
///
/// ```rust
/// use oversight_grid::metrics::TrainingStats;
///
/// let mut stats = TrainingStats::new(100);
/// stats.record_update(0.02, 0.05, 0.8);
///
/// assert!((stats.mean_policy_loss() - 0.02).abs() < 1e-9);
/// println!("{}", stats.format_summary());
/// ```
#[derive(Debug, Clone)]
pub struct TrainingStats {
    /// Fraction of completed episodes ending on the diamond (rolling window)
    diamond_rates: VecDeque<f64>,

    /// Fraction of completed episodes ending on the ghost (rolling window)
    ghost_rates: VecDeque<f64>,

    /// Mean completed episode length per batch (rolling window)
    episode_lengths: VecDeque<f64>,

    policy_losses: VecDeque<f64>,
    value_losses: VecDeque<f64>,
    entropies: VecDeque<f64>,

    /// Total number of completed episodes seen in training batches
    total_episodes: usize,

    /// Total number of environment steps taken
    total_steps: usize,

    window_size: usize,
}

impl TrainingStats {
    pub fn new(window_size: usize) -> Self {
        Self {
            diamond_rates: VecDeque::with_capacity(window_size),
            ghost_rates: VecDeque::with_capacity(window_size),
            episode_lengths: VecDeque::with_capacity(window_size),
            policy_losses: VecDeque::with_capacity(window_size),
            value_losses: VecDeque::with_capacity(window_size),
            entropies: VecDeque::with_capacity(window_size),
            total_episodes: 0,
            total_steps: 0,
            window_size,
        }
    }

    /// Record the end statistics of one training batch
    ///
    /// Batches without a completed episode only add to the step count.
    pub fn record_batch(&mut self, stats: &EndStats, env_steps: usize) {
        self.total_steps += env_steps;
        if stats.n_complete_eps == 0 {
            return;
        }
        self.total_episodes += stats.n_complete_eps;
        Self::push_deque(
            &mut self.diamond_rates,
            stats.reached_diamond_seen + stats.reached_diamond_unseen,
            self.window_size,
        );
        Self::push_deque(
            &mut self.ghost_rates,
            stats.reached_ghost_seen + stats.reached_ghost_unseen,
            self.window_size,
        );
        Self::push_deque(&mut self.episode_lengths, stats.complete_ep_len, self.window_size);
    }

    /// Record the loss terms of a learning update
    pub fn record_update(&mut self, policy_loss: f64, value_loss: f64, entropy: f64) {
        Self::push_deque(&mut self.policy_losses, policy_loss, self.window_size);
        Self::push_deque(&mut self.value_losses, value_loss, self.window_size);
        Self::push_deque(&mut self.entropies, entropy, self.window_size);
    }

    pub fn mean_diamond_rate(&self) -> f64 {
        Self::mean(&self.diamond_rates)
    }

    pub fn mean_ghost_rate(&self) -> f64 {
        Self::mean(&self.ghost_rates)
    }

    pub fn mean_episode_length(&self) -> f64 {
        Self::mean(&self.episode_lengths)
    }

    pub fn mean_policy_loss(&self) -> f64 {
        Self::mean(&self.policy_losses)
    }

    pub fn mean_value_loss(&self) -> f64 {
        Self::mean(&self.value_losses)
    }

    pub fn mean_entropy(&self) -> f64 {
        Self::mean(&self.entropies)
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// One-line summary of the current windows
    pub fn format_summary(&self) -> String {
        format!(
            "Episodes: {} | Steps: {} | Diamond: {:.3} | Ghost: {:.3} | Len: {:.1} | P_Loss: {:.4} | V_Loss: {:.4} | Entropy: {:.4}",
            self.total_episodes,
            self.total_steps,
            self.mean_diamond_rate(),
            self.mean_ghost_rate(),
            self.mean_episode_length(),
            self.mean_policy_loss(),
            self.mean_value_loss(),
            self.mean_entropy(),
        )
    }

    fn mean(deque: &VecDeque<f64>) -> f64 {
        if deque.is_empty() {
            0.0
        } else {
            deque.iter().sum::<f64>() / deque.len() as f64
        }
    }

    fn push_deque<T>(deque: &mut VecDeque<T>, value: T, window_size: usize) {
        if deque.len() >= window_size {
            deque.pop_front();
        }
        deque.push_back(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end_stats(diamond: f64, ghost: f64, n_complete_eps: usize, len: f64) -> EndStats {
        EndStats {
            reached_diamond_seen: diamond / 2.0,
            reached_ghost_seen: ghost / 2.0,
            reached_diamond_unseen: diamond / 2.0,
            reached_ghost_unseen: ghost / 2.0,
            n_complete_eps,
            complete_ep_len: len,
        }
    }

    #[test]
    fn test_new() {
        let stats = TrainingStats::new(100);
        assert_eq!(stats.window_size(), 100);
        assert_eq!(stats.total_episodes(), 0);
        assert_eq!(stats.total_steps(), 0);
    }

    #[test]
    fn test_record_batch() {
        let mut stats = TrainingStats::new(100);
        stats.record_batch(&end_stats(0.6, 0.4, 10, 3.0), 80);

        assert_eq!(stats.total_episodes(), 10);
        assert_eq!(stats.total_steps(), 80);
        assert!((stats.mean_diamond_rate() - 0.6).abs() < 1e-9);
        assert!((stats.mean_ghost_rate() - 0.4).abs() < 1e-9);
        assert!((stats.mean_episode_length() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_batch_without_completed_episodes_only_counts_steps() {
        let mut stats = TrainingStats::new(100);
        let empty = EndStats {
            reached_diamond_seen: f64::NAN,
            reached_ghost_seen: f64::NAN,
            reached_diamond_unseen: f64::NAN,
            reached_ghost_unseen: f64::NAN,
            n_complete_eps: 0,
            complete_ep_len: f64::NAN,
        };
        stats.record_batch(&empty, 16);

        assert_eq!(stats.total_steps(), 16);
        assert_eq!(stats.total_episodes(), 0);
        assert_eq!(stats.mean_diamond_rate(), 0.0);
    }

    #[test]
    fn test_rolling_window_update() {
        let mut stats = TrainingStats::new(2);

        stats.record_update(0.1, 0.2, 0.9);
        stats.record_update(0.2, 0.3, 0.8);
        assert!((stats.mean_policy_loss() - 0.15).abs() < 1e-9);

        // Third update evicts the first
        stats.record_update(0.3, 0.4, 0.7);
        assert!((stats.mean_policy_loss() - 0.25).abs() < 1e-9);
        assert!((stats.mean_entropy() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_rolling_batches() {
        let mut stats = TrainingStats::new(3);
        for rate in [0.0, 0.5, 1.0, 1.0] {
            stats.record_batch(&end_stats(rate, 1.0 - rate, 4, 2.0), 10);
        }

        assert_eq!(stats.total_episodes(), 16);
        assert_eq!(stats.total_steps(), 40);
        // (0.5 + 1.0 + 1.0) / 3
        assert!((stats.mean_diamond_rate() - 2.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_format_summary() {
        let mut stats = TrainingStats::new(100);
        stats.record_batch(&end_stats(0.5, 0.25, 4, 6.0), 100);
        stats.record_update(0.02, 0.05, 0.8);

        let summary = stats.format_summary();
        assert!(summary.contains("Episodes: 4"));
        assert!(summary.contains("Steps: 100"));
        assert!(summary.contains("Diamond: 0.500"));
        assert!(summary.contains("Ghost: 0.250"));
        assert!(summary.contains("Len: 6.0"));
        assert!(summary.contains("P_Loss: 0.0200"));
        assert!(summary.contains("V_Loss: 0.0500"));
        assert!(summary.contains("Entropy: 0.8000"));
    }

    #[test]
    fn test_empty_stats() {
        let stats = TrainingStats::new(100);
        assert_eq!(stats.mean_diamond_rate(), 0.0);
        assert_eq!(stats.mean_episode_length(), 0.0);
        assert_eq!(stats.mean_policy_loss(), 0.0);
        assert_eq!(stats.mean_value_loss(), 0.0);
    }
}
