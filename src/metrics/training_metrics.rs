//! Run-wide counters shared by the agents and the learner.
//!
//! Agents add environment steps, committed transitions, weight reloads and
//! finished episodes; the learner adds train steps and reads everything back
//! for its progress reports.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Episodes averaged by [`TrainingMetrics::avg_reward`].
pub const REWARD_WINDOW: usize = 100;

#[derive(Debug, Default)]
struct EpisodeLog {
    count: usize,
    recent: VecDeque<f32>,
}

/// Thread-safe run counters.
#[derive(Debug, Default)]
pub struct TrainingMetrics {
    env_steps: AtomicUsize,
    transitions: AtomicU64,
    weight_reloads: AtomicU64,
    train_steps: AtomicUsize,
    episodes: Mutex<EpisodeLog>,
}

impl TrainingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_env_steps(&self, steps: usize) {
        self.env_steps.fetch_add(steps, Ordering::Relaxed);
    }

    /// One transition written to the experience table.
    pub fn add_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    /// One agent replaced its actor weights with a newer snapshot.
    pub fn add_weight_reload(&self) {
        self.weight_reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_train_steps(&self) {
        self.train_steps.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished episode's return.
    pub fn record_episode(&self, reward: f32) {
        let mut log = self.episodes.lock();
        log.count += 1;
        if log.recent.len() == REWARD_WINDOW {
            log.recent.pop_front();
        }
        log.recent.push_back(reward);
    }

    pub fn env_steps(&self) -> usize {
        self.env_steps.load(Ordering::Relaxed)
    }

    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    pub fn weight_reloads(&self) -> u64 {
        self.weight_reloads.load(Ordering::Relaxed)
    }

    pub fn train_steps(&self) -> usize {
        self.train_steps.load(Ordering::Relaxed)
    }

    pub fn episodes(&self) -> usize {
        self.episodes.lock().count
    }

    /// Mean return over the last [`REWARD_WINDOW`] episodes, 0 before the first.
    pub fn avg_reward(&self) -> f32 {
        let log = self.episodes.lock();
        if log.recent.is_empty() {
            return 0.0;
        }
        log.recent.iter().sum::<f32>() / log.recent.len() as f32
    }

    /// Return of the most recent episode.
    pub fn last_reward(&self) -> f32 {
        self.episodes.lock().recent.back().copied().unwrap_or(0.0)
    }
}

pub type SharedTrainingMetrics = Arc<TrainingMetrics>;

pub fn training_metrics() -> SharedTrainingMetrics {
    Arc::new(TrainingMetrics::new())
}
