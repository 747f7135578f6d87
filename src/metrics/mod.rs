//! Metrics collection and export
//!
//! - [`MetricsTable`]: per-update metric columns written to CSV at the end of a run
//! - [`TrainingStats`]: rolling averages shown while training

pub mod table;
pub mod training_stats;

pub use table::{MetricValue, MetricsError, MetricsTable};
pub use training_stats::TrainingStats;
