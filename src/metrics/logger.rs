//! Metrics sinks for the learner and the agents.
//!
//! The learner reports a [`TrainingSnapshot`] every `log_interval` updates;
//! every agent reports an [`EpisodeSnapshot`] when an episode ends. Sinks are
//! shared across threads behind a `parking_lot::Mutex`.

use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;

/// Learner progress at one training step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSnapshot {
    /// Learner step.
    pub train_step: u64,
    /// Environment steps summed over agents.
    pub env_steps: usize,
    /// Completed episodes summed over agents.
    pub episodes: usize,
    /// Mean episode return so far.
    pub avg_reward: f32,
    /// Critic Huber loss.
    pub critic_loss: f32,
    /// Actor loss.
    pub policy_loss: f32,
    /// Temperature loss.
    pub alpha_loss: f32,
    /// Entropy temperature.
    pub alpha: f32,
    /// Mean critic value of policy actions.
    pub mean_q: f32,
    /// Transitions held by the experience store.
    pub store_len: usize,
}

/// Summary of one finished episode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeSnapshot {
    /// Agent that ran the episode.
    pub agent_id: usize,
    /// Episode index local to the agent.
    pub episode: usize,
    /// Steps in the episode.
    pub steps: usize,
    /// Undiscounted return.
    pub reward: f32,
    /// Last learner step seen by the agent.
    pub train_step: u64,
}

/// Logger trait for different logging backends.
pub trait MetricsLogger: Send {
    /// Log learner progress.
    fn log_training(&mut self, snapshot: &TrainingSnapshot);

    /// Log a finished episode.
    fn log_episode(&mut self, snapshot: &EpisodeSnapshot);

    /// Flush any buffered output.
    fn flush(&mut self);
}

/// Logger shared by the learner and every agent.
pub type SharedMetricsLogger = Arc<Mutex<dyn MetricsLogger>>;

/// Wrap a logger for sharing across threads.
pub fn shared_logger<L: MetricsLogger + 'static>(logger: L) -> SharedMetricsLogger {
    Arc::new(Mutex::new(logger))
}

// ============================================================================
// Tracing
// ============================================================================

/// Emits structured `tracing` events.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl TracingLogger {
    /// Create a new tracing logger.
    pub fn new() -> Self {
        Self
    }
}

impl MetricsLogger for TracingLogger {
    fn log_training(&mut self, s: &TrainingSnapshot) {
        tracing::info!(
            target: "distributed_sac::metrics",
            train_step = s.train_step,
            env_steps = s.env_steps,
            episodes = s.episodes,
            avg_reward = s.avg_reward,
            critic_loss = s.critic_loss,
            policy_loss = s.policy_loss,
            alpha_loss = s.alpha_loss,
            alpha = s.alpha,
            mean_q = s.mean_q,
            store_len = s.store_len,
            "training"
        );
    }

    fn log_episode(&mut self, s: &EpisodeSnapshot) {
        tracing::info!(
            target: "distributed_sac::metrics",
            agent_id = s.agent_id,
            episode = s.episode,
            steps = s.steps,
            reward = s.reward,
            train_step = s.train_step,
            "episode"
        );
    }

    fn flush(&mut self) {}
}

// ============================================================================
// CSV
// ============================================================================

/// Writes `training.csv` and `episodes.csv` into a directory.
pub struct CsvLogger {
    training: BufWriter<File>,
    episodes: BufWriter<File>,
    start_time: Instant,
}

impl CsvLogger {
    /// Training log file name.
    pub const TRAINING_FILE: &'static str = "training.csv";
    /// Episode log file name.
    pub const EPISODES_FILE: &'static str = "episodes.csv";

    /// Create both files (truncating existing ones) and write the headers.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut training = BufWriter::new(File::create(dir.join(Self::TRAINING_FILE))?);
        writeln!(
            training,
            "train_step,env_steps,episodes,avg_reward,critic_loss,policy_loss,alpha_loss,alpha,mean_q,store_len,elapsed_secs"
        )?;

        let mut episodes = BufWriter::new(File::create(dir.join(Self::EPISODES_FILE))?);
        writeln!(episodes, "agent_id,episode,steps,reward,train_step,elapsed_secs")?;

        Ok(Self {
            training,
            episodes,
            start_time: Instant::now(),
        })
    }
}

impl MetricsLogger for CsvLogger {
    fn log_training(&mut self, s: &TrainingSnapshot) {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let _ = writeln!(
            self.training,
            "{},{},{},{:.4},{:.6},{:.6},{:.6},{:.6},{:.4},{},{:.2}",
            s.train_step,
            s.env_steps,
            s.episodes,
            s.avg_reward,
            s.critic_loss,
            s.policy_loss,
            s.alpha_loss,
            s.alpha,
            s.mean_q,
            s.store_len,
            elapsed
        );
    }

    fn log_episode(&mut self, s: &EpisodeSnapshot) {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let _ = writeln!(
            self.episodes,
            "{},{},{},{:.4},{},{:.2}",
            s.agent_id, s.episode, s.steps, s.reward, s.train_step, elapsed
        );
    }

    fn flush(&mut self) {
        let _ = self.training.flush();
        let _ = self.episodes.flush();
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

// ============================================================================
// Fan-out
// ============================================================================

/// Multi-logger that writes to multiple backends.
#[derive(Default)]
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    /// Create an empty multi-logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a logger.
    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }
}

impl MetricsLogger for MultiLogger {
    fn log_training(&mut self, snapshot: &TrainingSnapshot) {
        for logger in &mut self.loggers {
            logger.log_training(snapshot);
        }
    }

    fn log_episode(&mut self, snapshot: &EpisodeSnapshot) {
        for logger in &mut self.loggers {
            logger.log_episode(snapshot);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}
