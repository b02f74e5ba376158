//! Training metrics and logging.
//!
//! ## Metrics
//!
//! - [`TrainingMetrics`]: Thread-safe counters for training progress
//! - [`SharedTrainingMetrics`]: Arc wrapper for multi-threaded access
//!
//! ## Loggers
//!
//! - [`TracingLogger`]: Structured `tracing` events
//! - [`CsvLogger`]: CSV files for analysis
//! - [`MultiLogger`]: Combine multiple loggers

pub mod logger;
pub mod training_metrics;

pub use logger::{
    shared_logger, CsvLogger, EpisodeSnapshot, MetricsLogger, MultiLogger, SharedMetricsLogger,
    TracingLogger, TrainingSnapshot,
};
pub use training_metrics::{
    training_metrics, SharedTrainingMetrics, TrainingMetrics, REWARD_WINDOW,
};
