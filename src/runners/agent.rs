//! Agent process: acts in one environment and commits transitions.
//!
//! ```text
//!            start-up: wait for first snapshot, load actor, reset_noise
//!                                 │
//!          total_steps < warmup   ▼   total_steps >= warmup
//!   ┌──────────── Warmup ───────────────→ Active ─────────────┐
//!   │ env.sample_action()                 actor.act(obs)      │
//!   │ pull: stop flag only                pull: load weights  │
//!   └──────────────┬──────────────────────────────┬───────────┘
//!                  └──── stop seen + episode ends ┘
//!                                 ▼
//!                              Stopped
//! ```
//!
//! Every `update_interval` steps the agent pulls the variables table. An
//! `Unavailable` pull is not an error: the agent keeps acting with the
//! weights it already has. After the stop flag is observed the agent runs
//! the current episode to its end so the final transition is committed.

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::algorithms::sac::{Actor, ActorConfig};
use crate::checkpoint::module_from_bytes;
use crate::core::episode_history::EpisodeHistory;
use crate::core::tables::{ExperienceTable, VariableTable};
use crate::core::transition::{StepRecord, Transition};
use crate::core::variable_channel::{Pull, VariableSnapshot};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::metrics::{EpisodeSnapshot, SharedMetricsLogger, SharedTrainingMetrics};

/// Priority attached to every committed transition.
pub const DEFAULT_PRIORITY: f64 = 1.0;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Environment steps between pulls of the variables table.
    pub update_interval: u64,

    /// Treat an episode as finished after this many steps.
    pub max_episode_steps: Option<usize>,

    /// Delay between pulls while waiting for the first snapshot.
    pub start_poll: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            update_interval: 64,
            max_episode_steps: None,
            start_poll: Duration::from_millis(10),
        }
    }
}

impl AgentConfig {
    /// Create config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set pull interval.
    pub fn with_update_interval(mut self, update_interval: u64) -> Self {
        self.update_interval = update_interval;
        self
    }

    /// Builder pattern: truncate episodes.
    pub fn with_max_episode_steps(mut self, max_episode_steps: usize) -> Self {
        self.max_episode_steps = Some(max_episode_steps);
        self
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.update_interval == 0 {
            return Err(Error::InvalidConfig("update_interval must be positive".into()));
        }
        if self.max_episode_steps == Some(0) {
            return Err(Error::InvalidConfig("max_episode_steps must be positive".into()));
        }
        Ok(())
    }
}

// ============================================================================
// State
// ============================================================================

/// Lifecycle phase of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Random actions from the environment sampler.
    Warmup,
    /// Actions from the local actor copy.
    Active,
    /// Stop observed and the last episode committed.
    Stopped,
}

/// Counters returned when an agent stops.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentStats {
    /// Agent index.
    pub agent_id: usize,
    /// Environment steps taken.
    pub total_steps: u64,
    /// Episodes completed.
    pub episodes: usize,
    /// Transitions committed.
    pub transitions: u64,
    /// Times new weights were loaded after start-up.
    pub weight_updates: u64,
    /// Highest learner step observed.
    pub train_step: u64,
    /// Return of the last completed episode.
    pub last_reward: f32,
}

// ============================================================================
// Agent
// ============================================================================

/// One rollout worker.
pub struct Agent<B, Env, E, V>
where
    B: Backend,
    Env: Environment,
    E: ExperienceTable,
    V: VariableTable,
{
    config: AgentConfig,
    actor: Actor<B>,
    env: Env,
    experience: E,
    variables: V,
    device: B::Device,
    history: EpisodeHistory,
    state: AgentState,
    stats: AgentStats,
    warmup_steps: u64,
    stop_seen: bool,
    logger: Option<SharedMetricsLogger>,
    metrics: Option<SharedTrainingMetrics>,
}

impl<B, Env, E, V> Agent<B, Env, E, V>
where
    B: Backend,
    Env: Environment,
    E: ExperienceTable,
    V: VariableTable,
{
    /// Create an agent. The actor is randomly initialized until the first
    /// snapshot is loaded in [`Agent::run`].
    pub fn new(
        agent_id: usize,
        config: AgentConfig,
        actor: &ActorConfig,
        env: Env,
        experience: E,
        variables: V,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;
        if env.observation_dim() != actor.obs_dim || env.action_dim() != actor.action_dim {
            return Err(Error::Environment(format!(
                "environment is {}->{}, actor expects {}->{}",
                env.observation_dim(),
                env.action_dim(),
                actor.obs_dim,
                actor.action_dim
            )));
        }

        Ok(Self {
            config,
            actor: actor.init(device),
            env,
            experience,
            variables,
            device: device.clone(),
            history: EpisodeHistory::new(),
            state: AgentState::Warmup,
            stats: AgentStats {
                agent_id,
                ..AgentStats::default()
            },
            warmup_steps: 0,
            stop_seen: false,
            logger: None,
            metrics: None,
        })
    }

    /// Report finished episodes to `logger`.
    pub fn with_logger(mut self, logger: SharedMetricsLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Count steps and episodes in `metrics`.
    pub fn with_metrics(mut self, metrics: SharedTrainingMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Current phase.
    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Counters so far.
    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    /// Act until the learner stops the run.
    pub fn run(&mut self) -> Result<AgentStats> {
        let agent_id = self.stats.agent_id;
        let Some(snapshot) = self.wait_for_snapshot()? else {
            tracing::info!(agent_id, "stopped before the first snapshot");
            self.state = AgentState::Stopped;
            return Ok(self.stats.clone());
        };
        self.warmup_steps = snapshot.warmup_steps;
        self.stats.train_step = snapshot.train_step;
        self.load_weights(snapshot.actor)?;
        if snapshot.stop_agents {
            self.state = AgentState::Stopped;
            return Ok(self.stats.clone());
        }
        tracing::debug!(agent_id, warmup_steps = self.warmup_steps, "agent started");

        let mut obs = self.env.reset();
        let mut episode_reward = 0.0f32;
        let mut episode_steps = 0usize;

        loop {
            let total = self.stats.total_steps;
            self.state = if total < self.warmup_steps {
                AgentState::Warmup
            } else {
                AgentState::Active
            };
            if total > 0 && total % self.config.update_interval == 0 {
                self.sync()?;
            }

            let action = match self.state {
                AgentState::Warmup => {
                    self.stats.train_step = self.stats.train_step.max(total);
                    self.env.sample_action()
                }
                _ => self.actor.act(&obs, false)?,
            };

            let step = self.env.step(&action)?;
            self.stats.total_steps += 1;
            episode_steps += 1;
            episode_reward += step.reward;
            if let Some(metrics) = &self.metrics {
                metrics.add_env_steps(1);
            }

            let truncated = self
                .config
                .max_episode_steps
                .is_some_and(|max| episode_steps >= max);
            let done = step.terminal || truncated;

            let record = StepRecord::new(obs, action, step.reward, done);
            if let Some(transition) = self.history.record(record) {
                self.commit(transition)?;
            }

            if !done {
                obs = step.observation;
                continue;
            }

            if let Some(transition) = self.history.finish(step.observation) {
                self.commit(transition)?;
            }
            self.end_episode(episode_steps, episode_reward);

            if self.stop_seen {
                break;
            }
            obs = self.env.reset();
            episode_reward = 0.0;
            episode_steps = 0;
        }

        self.state = AgentState::Stopped;
        tracing::info!(
            agent_id,
            total_steps = self.stats.total_steps,
            episodes = self.stats.episodes,
            "agent stopped"
        );
        Ok(self.stats.clone())
    }

    /// Block until the variables table yields a snapshot. `None` when the
    /// stop flag is raised first.
    fn wait_for_snapshot(&self) -> Result<Option<VariableSnapshot>> {
        loop {
            if let Pull::Ready(snapshot) = self.variables.pull()? {
                return Ok(Some(snapshot));
            }
            if self.variables.is_stopped()? {
                return Ok(None);
            }
            std::thread::sleep(self.config.start_poll);
        }
    }

    /// Periodic pull. Warmup agents only look at the stop flag.
    fn sync(&mut self) -> Result<()> {
        match self.variables.pull()? {
            Pull::Ready(snapshot) => {
                self.stop_seen |= snapshot.stop_agents;
                self.stats.train_step = self.stats.train_step.max(snapshot.train_step);
                if self.state == AgentState::Active {
                    self.load_weights(snapshot.actor)?;
                    self.stats.weight_updates += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.add_weight_reload();
                    }
                }
            }
            Pull::Unavailable => {
                self.stop_seen |= self.variables.is_stopped()?;
            }
        }
        Ok(())
    }

    fn load_weights(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.actor = module_from_bytes(self.actor.clone(), bytes, &self.device)?;
        self.actor.reset_noise();
        Ok(())
    }

    fn commit(&mut self, transition: Transition) -> Result<()> {
        self.experience.commit(transition, DEFAULT_PRIORITY)?;
        self.stats.transitions += 1;
        if let Some(metrics) = &self.metrics {
            metrics.add_transition();
        }
        Ok(())
    }

    fn end_episode(&mut self, steps: usize, reward: f32) {
        self.stats.episodes += 1;
        self.stats.last_reward = reward;

        tracing::info!(
            agent_id = self.stats.agent_id,
            episode = self.stats.episodes,
            steps,
            reward,
            train_step = self.stats.train_step,
            "episode finished"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_episode(reward);
        }
        if let Some(logger) = &self.logger {
            logger.lock().log_episode(&EpisodeSnapshot {
                agent_id: self.stats.agent_id,
                episode: self.stats.episodes,
                steps,
                reward,
                train_step: self.stats.train_step,
            });
        }
    }
}
