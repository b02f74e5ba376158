//! In-process distributed SAC: N agent threads and one learner thread around
//! a shared experience store and variable channel.
//!
//! ```text
//! ┌──────────────┐ ┌──────────────┐       ┌──────────────┐
//! │   Agent 0    │ │   Agent 1    │  ...  │  Agent N-1   │
//! │ own env      │ │ own env      │       │ own env      │
//! └──┬────────▲──┘ └──┬────────▲──┘       └──┬────────▲──┘
//!    │commit  │pull   │        │             │        │
//!    ▼        │       ▼        │             ▼        │
//! ┌──────────────────────┐  ┌───────────────────────────┐
//! │   ExperienceStore    │  │      VariableChannel      │
//! └──────────┬───────────┘  └─────────────▲─────────────┘
//!            │ sample                     │ push / set_stop
//!            └──────────────→ Learner ────┘
//! ```
//!
//! A fatal error in any worker raises the stop flag so the others wind down,
//! then the first error is returned after every thread has been joined.

use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::thread::JoinHandle;

use super::agent::{Agent, AgentConfig, AgentStats};
use super::learner::{Learner, LearnerConfig, TrainedModels};
use crate::core::experience_store::{ExperienceStore, SharedExperienceStore, StoreConfig};
use crate::core::variable_channel::{SharedVariableChannel, VariableChannel};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::metrics::{training_metrics, SharedMetricsLogger, SharedTrainingMetrics};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration of a full run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedConfig {
    /// Number of agent threads.
    pub n_agents: usize,
    /// Experience store shape.
    pub store: StoreConfig,
    /// Learner settings.
    pub learner: LearnerConfig,
    /// Settings shared by every agent.
    pub agent: AgentConfig,
}

impl DistributedConfig {
    /// Create a config with 4 agents and default store and agent settings.
    pub fn new(learner: LearnerConfig) -> Self {
        Self {
            n_agents: 4,
            store: StoreConfig::default(),
            learner,
            agent: AgentConfig::default(),
        }
    }

    /// Builder pattern: set agent count.
    pub fn with_agents(mut self, n_agents: usize) -> Self {
        self.n_agents = n_agents;
        self
    }

    /// Builder pattern: set store config.
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Builder pattern: set agent config.
    pub fn with_agent(mut self, agent: AgentConfig) -> Self {
        self.agent = agent;
        self
    }

    /// Check every nested configuration.
    pub fn validate(&self) -> Result<()> {
        if self.n_agents == 0 {
            return Err(Error::InvalidConfig("n_agents must be positive".into()));
        }
        if self.store.min_size < self.learner.sac.batch_size {
            tracing::warn!(
                min_size = self.store.min_size,
                batch_size = self.learner.sac.batch_size,
                "store min_size below batch size, early batches repeat transitions"
            );
        }
        self.store.validate()?;
        self.learner.validate()?;
        self.agent.validate()
    }
}

/// Outcome of a run.
pub struct DistributedReport<B: AutodiffBackend> {
    /// Networks from the learner.
    pub trained: TrainedModels<B>,
    /// Per-agent counters, indexed by agent id.
    pub agents: Vec<AgentStats>,
    /// Environment steps summed over agents.
    pub env_steps: usize,
    /// Episodes summed over agents.
    pub episodes: usize,
}

// ============================================================================
// Runner
// ============================================================================

/// Owns the shared tables and spawns the workers.
pub struct DistributedSac {
    config: DistributedConfig,
    store: SharedExperienceStore,
    channel: SharedVariableChannel,
    metrics: SharedTrainingMetrics,
    logger: Option<SharedMetricsLogger>,
}

impl DistributedSac {
    /// Validate `config` and create the shared tables.
    pub fn new(config: DistributedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: ExperienceStore::shared(config.store.clone())?,
            channel: VariableChannel::shared(config.learner.warmup_steps),
            metrics: training_metrics(),
            logger: None,
            config,
        })
    }

    /// Attach a metrics sink shared by the learner and every agent.
    pub fn with_logger(mut self, logger: SharedMetricsLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Shared experience store.
    pub fn store(&self) -> &SharedExperienceStore {
        &self.store
    }

    /// Shared variable channel.
    pub fn channel(&self) -> &SharedVariableChannel {
        &self.channel
    }

    /// Shared counters.
    pub fn metrics(&self) -> &SharedTrainingMetrics {
        &self.metrics
    }

    /// Train until the learner reaches `max_steps`.
    ///
    /// `env_factory(agent_id)` builds each agent's environment on its own
    /// thread. Agents run inference on `B::InnerBackend`.
    pub fn run<B, Env, F>(&self, env_factory: F, device: &B::Device) -> Result<DistributedReport<B>>
    where
        B: AutodiffBackend,
        Env: Environment + 'static,
        F: Fn(usize) -> Result<Env> + Send + Sync + Clone + 'static,
    {
        tracing::info!(
            n_agents = self.config.n_agents,
            capacity = self.config.store.capacity,
            min_size = self.config.store.min_size,
            warmup_steps = self.config.learner.warmup_steps,
            max_steps = self.config.learner.max_steps,
            "starting distributed SAC"
        );

        let mut agent_handles = Vec::with_capacity(self.config.n_agents);
        for agent_id in 0..self.config.n_agents {
            let handle = self.spawn_agent::<B, Env, F>(agent_id, env_factory.clone(), device)?;
            agent_handles.push(handle);
        }

        let learner_handle = {
            let config = self.config.learner.clone();
            let store = self.store.clone();
            let channel = self.channel.clone();
            let metrics = self.metrics.clone();
            let logger = self.logger.clone();
            let device = device.clone();
            std::thread::Builder::new()
                .name("sac-learner".to_string())
                .spawn(move || {
                    let result = Learner::<B, _, _>::new(config, store, channel.clone(), &device)
                        .map(|learner| learner.with_metrics(metrics))
                        .map(|learner| match logger {
                            Some(logger) => learner.with_logger(logger),
                            None => learner,
                        })
                        .and_then(|learner| learner.run());
                    if result.is_err() {
                        channel.set_stop();
                    }
                    result
                })?
        };

        let mut first_error = None;
        let mut agents = Vec::with_capacity(agent_handles.len());
        for (agent_id, handle) in agent_handles.into_iter().enumerate() {
            match join(handle, &format!("agent-{agent_id}")) {
                Ok(stats) => agents.push(stats),
                Err(e) => {
                    tracing::error!(agent_id, error = %e, "agent failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        let trained = join(learner_handle, "learner");

        if let Some(e) = first_error {
            return Err(e);
        }
        let trained = trained?;

        let report = DistributedReport {
            trained,
            agents,
            env_steps: self.metrics.env_steps(),
            episodes: self.metrics.episodes(),
        };
        tracing::info!(
            env_steps = report.env_steps,
            episodes = report.episodes,
            train_step = report.trained.train_step,
            transitions = self.metrics.transitions(),
            weight_reloads = self.metrics.weight_reloads(),
            avg_reward = self.metrics.avg_reward(),
            "distributed SAC finished"
        );
        Ok(report)
    }

    fn spawn_agent<B, Env, F>(
        &self,
        agent_id: usize,
        env_factory: F,
        device: &B::Device,
    ) -> Result<JoinHandle<Result<AgentStats>>>
    where
        B: AutodiffBackend,
        Env: Environment + 'static,
        F: Fn(usize) -> Result<Env> + Send + 'static,
    {
        let config = self.config.agent.clone();
        let actor = self.config.learner.actor.clone();
        let store = self.store.clone();
        let channel = self.channel.clone();
        let metrics = self.metrics.clone();
        let logger = self.logger.clone();
        let device = device.clone();

        let handle = std::thread::Builder::new()
            .name(format!("sac-agent-{agent_id}"))
            .spawn(move || {
                let result = env_factory(agent_id)
                    .and_then(|env| {
                        Agent::<B::InnerBackend, _, _, _>::new(
                            agent_id,
                            config,
                            &actor,
                            env,
                            store,
                            channel.clone(),
                            &device,
                        )
                    })
                    .and_then(|agent| {
                        let mut agent = agent.with_metrics(metrics);
                        if let Some(logger) = logger {
                            agent = agent.with_logger(logger);
                        }
                        agent.run()
                    });
                if result.is_err() {
                    channel.set_stop();
                }
                result
            })?;
        Ok(handle)
    }
}

fn join<T>(handle: JoinHandle<Result<T>>, name: &str) -> Result<T> {
    handle
        .join()
        .map_err(|payload| {
            Error::WorkerPanicked(format!("{name}: {}", panic_message(payload.as_ref())))
        })?
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::sac::SacConfig;
    use crate::environment::Pendulum;
    use burn::backend::{Autodiff, NdArray};
    use std::time::Duration;

    type AB = Autodiff<NdArray<f32>>;

    fn small_config() -> DistributedConfig {
        let learner = LearnerConfig::new(3, 1)
            .with_hidden([16, 16], [16, 16])
            .with_sac(SacConfig::new().with_batch_size(16).with_ensemble(2, 5, 2))
            .with_steps(20, 30)
            .with_log_interval(5)
            .with_sample_poll(Duration::from_millis(1));
        DistributedConfig::new(learner)
            .with_agents(2)
            .with_store(StoreConfig::new(1_000, 32))
            .with_agent(
                AgentConfig::new()
                    .with_update_interval(8)
                    .with_max_episode_steps(25),
            )
    }

    #[test]
    fn test_short_run_completes() {
        let runner = DistributedSac::new(small_config()).unwrap();
        let report = runner
            .run::<AB, _, _>(|id| Ok(Pendulum::new(id as u64)), &Default::default())
            .unwrap();

        assert_eq!(report.agents.len(), 2);
        assert_eq!(report.trained.train_step, 29);
        assert!(report.trained.last_loss.unwrap().is_finite());
        assert!(runner.channel().is_stopped());
        for stats in &report.agents {
            assert!(stats.episodes >= 1);
            assert_eq!(stats.transitions, stats.total_steps);
        }
        let steps: u64 = report.agents.iter().map(|s| s.total_steps).sum();
        assert_eq!(report.env_steps as u64, steps);
        assert_eq!(runner.metrics().transitions(), steps);
        assert!(runner.store().len() >= 32);
    }

    #[test]
    fn test_env_factory_failure_is_fatal() {
        let runner = DistributedSac::new(small_config().with_agents(1)).unwrap();
        let result = runner.run::<AB, Pendulum, _>(
            |_| Err(Error::Environment("no display".into())),
            &Default::default(),
        );
        assert!(matches!(result, Err(Error::Environment(_))));
        assert!(runner.channel().is_stopped());
    }

    #[test]
    fn test_zero_agents_rejected() {
        let result = DistributedSac::new(small_config().with_agents(0));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
