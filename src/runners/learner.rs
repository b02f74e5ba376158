//! Learner process: samples the experience table, trains, publishes the actor.
//!
//! ```text
//! new():  build/load networks ─→ target = critic ─→ push(actor, 0)
//! run():  for step in warmup..max
//!           sample (poll until ready) ─→ update ─→ push(actor, step)
//!         set_stop ─→ final push ─→ save weights + store checkpoint
//! ```
//!
//! The learner is the only writer of the variables table and the only
//! component that ever sets the stop flag.

use burn::module::{AutodiffModule, Module};
use burn::tensor::backend::{AutodiffBackend, Backend};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::algorithms::sac::{
    Actor, ActorConfig, CriticConfig, MultiCritic, SacConfig, SacLossInfo, SacState,
};
use crate::checkpoint::{load_if_present, module_to_bytes, Checkpointer};
use crate::core::tables::{ExperienceTable, VariableTable};
use crate::core::transition::TransitionBatch;
use crate::error::{Error, Result};
use crate::metrics::{SharedMetricsLogger, SharedTrainingMetrics, TrainingSnapshot};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration of the learner process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Actor network shape.
    pub actor: ActorConfig,

    /// Widths of the critic branch and merge layers.
    pub critic_units: [usize; 2],

    /// Update hyperparameters and critic ensemble shape.
    pub sac: SacConfig,

    /// First training step. Agents act randomly for this many env steps.
    pub warmup_steps: u64,

    /// Training stops when the step counter reaches this value.
    pub max_steps: u64,

    /// Steps between progress reports.
    pub log_interval: u64,

    /// Delay between sample attempts while the store is below its minimum size.
    pub sample_poll: Duration,

    /// Pretrained actor weights. Missing means random init.
    pub actor_path: Option<PathBuf>,

    /// Pretrained critic weights. Missing means random init.
    pub critic_path: Option<PathBuf>,

    /// Directory for the final `actor.bin` / `critic.bin`.
    pub save_path: Option<PathBuf>,
}

impl LearnerConfig {
    /// Create a config for the given observation and action sizes.
    pub fn new(obs_dim: usize, action_dim: usize) -> Self {
        Self {
            actor: ActorConfig::new(obs_dim, action_dim),
            critic_units: [400, 300],
            sac: SacConfig::default(),
            warmup_steps: 10_000,
            max_steps: 1_000_000,
            log_interval: 1_000,
            sample_poll: Duration::from_millis(10),
            actor_path: None,
            critic_path: None,
            save_path: None,
        }
    }

    /// Builder pattern: set actor and critic hidden widths.
    pub fn with_hidden(mut self, actor: [usize; 2], critic: [usize; 2]) -> Self {
        self.actor = self.actor.with_hidden(actor);
        self.critic_units = critic;
        self
    }

    /// Builder pattern: set SAC hyperparameters.
    pub fn with_sac(mut self, sac: SacConfig) -> Self {
        self.sac = sac;
        self
    }

    /// Builder pattern: set warmup and total steps.
    pub fn with_steps(mut self, warmup_steps: u64, max_steps: u64) -> Self {
        self.warmup_steps = warmup_steps;
        self.max_steps = max_steps;
        self
    }

    /// Builder pattern: set log interval.
    pub fn with_log_interval(mut self, log_interval: u64) -> Self {
        self.log_interval = log_interval;
        self
    }

    /// Builder pattern: set sample poll delay.
    pub fn with_sample_poll(mut self, sample_poll: Duration) -> Self {
        self.sample_poll = sample_poll;
        self
    }

    /// Builder pattern: start from pretrained weights.
    pub fn with_pretrained(
        mut self,
        actor_path: Option<PathBuf>,
        critic_path: Option<PathBuf>,
    ) -> Self {
        self.actor_path = actor_path;
        self.critic_path = critic_path;
        self
    }

    /// Builder pattern: set output directory.
    pub fn with_save_path(mut self, save_path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(save_path.into());
        self
    }

    /// Critic ensemble shape implied by this config.
    pub fn critic_config(&self) -> CriticConfig {
        CriticConfig::new(self.actor.obs_dim, self.actor.action_dim)
            .with_units(self.critic_units)
            .with_ensemble(self.sac.n_critics, self.sac.n_quantiles)
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        self.sac.validate()?;
        self.actor.validate()?;
        if self.log_interval == 0 {
            return Err(Error::InvalidConfig("log_interval must be positive".into()));
        }
        if self.max_steps < self.warmup_steps {
            return Err(Error::InvalidConfig(format!(
                "max_steps ({}) is below warmup_steps ({})",
                self.max_steps, self.warmup_steps
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Learner
// ============================================================================

/// Networks returned when training finishes.
pub struct TrainedModels<B: AutodiffBackend> {
    /// Trained actor.
    pub actor: Actor<B>,
    /// Trained critic ensemble.
    pub critic: MultiCritic<B>,
    /// Last training step.
    pub train_step: u64,
    /// Losses of the last update, if any ran.
    pub last_loss: Option<SacLossInfo>,
}

/// Single learner driving the SAC update.
pub struct Learner<B, E, V>
where
    B: AutodiffBackend,
    E: ExperienceTable,
    V: VariableTable,
{
    config: LearnerConfig,
    state: SacState<B>,
    experience: E,
    variables: V,
    logger: Option<SharedMetricsLogger>,
    metrics: Option<SharedTrainingMetrics>,
}

impl<B, E, V> Learner<B, E, V>
where
    B: AutodiffBackend,
    E: ExperienceTable,
    V: VariableTable,
{
    /// Build the networks and publish the initial actor with `train_step = 0`.
    pub fn new(
        config: LearnerConfig,
        experience: E,
        variables: V,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;

        let actor = config.actor.init::<B>(device);
        let actor = load_if_present(actor, config.actor_path.as_deref(), device)?;
        let critic = config.critic_config().init::<B>(device);
        let critic = load_if_present(critic, config.critic_path.as_deref(), device)?;

        let state = SacState::new(actor, critic, config.sac.clone(), device)?;

        let learner = Self {
            config,
            state,
            experience,
            variables,
            logger: None,
            metrics: None,
        };
        learner.publish(0)?;

        tracing::info!(
            warmup_steps = learner.config.warmup_steps,
            max_steps = learner.config.max_steps,
            batch_size = learner.config.sac.batch_size,
            target_entropy = learner.state.target_entropy(),
            "learner initialized"
        );
        Ok(learner)
    }

    /// Report progress to `logger` every `log_interval` steps.
    pub fn with_logger(mut self, logger: SharedMetricsLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Count updates in `metrics` and read agent counters from it.
    pub fn with_metrics(mut self, metrics: SharedTrainingMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Training state.
    pub fn state(&self) -> &SacState<B> {
        &self.state
    }

    /// Run training to `max_steps`, then stop the agents and persist.
    pub fn run(mut self) -> Result<TrainedModels<B>> {
        let start = Instant::now();
        let mut train_step = self.config.warmup_steps;
        let mut last_loss = None;

        for step in self.config.warmup_steps..self.config.max_steps {
            let Some(batch) = self.next_batch()? else {
                tracing::warn!(train_step = step, "stop raised while waiting for experience");
                break;
            };
            train_step = step;

            let (state, info) = self.state.update(&batch)?;
            self.state = state;
            if !info.is_finite() {
                tracing::warn!(train_step = step, ?info, "non-finite SAC losses");
            }
            if let Some(metrics) = &self.metrics {
                metrics.increment_train_steps();
            }

            self.publish(step)?;

            if step % self.config.log_interval == 0 {
                self.report(step, &info, start.elapsed())?;
            }
            last_loss = Some(info);
        }

        self.variables.set_stop()?;
        self.publish(train_step)?;
        tracing::info!(
            train_step,
            elapsed_secs = start.elapsed().as_secs_f32(),
            "training finished, agents told to stop"
        );

        self.save()?;
        if let Some(logger) = &self.logger {
            logger.lock().flush();
        }

        let (actor, critic) = self.state.into_models();
        Ok(TrainedModels {
            actor,
            critic,
            train_step,
            last_loss,
        })
    }

    /// Write the weight files and the experience checkpoint.
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = &self.config.save_path {
            let checkpointer = Checkpointer::new(dir)?;
            checkpointer.save::<B::InnerBackend, _, _>(
                &self.state.actor().valid(),
                &self.state.critic().valid(),
            )?;
        }

        match self.experience.checkpoint()? {
            Some(path) => tracing::info!(path = %path.display(), "experience store checkpointed"),
            None => tracing::warn!("experience table has no checkpoint location, skipped"),
        }
        Ok(())
    }

    fn publish(&self, train_step: u64) -> Result<()> {
        let bytes = module_to_bytes::<B::InnerBackend, _>(&self.state.actor().valid())?;
        self.variables.push(bytes, train_step)
    }

    /// Poll until the store clears its minimum size. `None` when another
    /// party raised the stop flag in the meantime.
    fn next_batch(&self) -> Result<Option<TransitionBatch>> {
        let batch_size = self.config.sac.batch_size;
        let mut waited = false;
        loop {
            if let Some(transitions) = self.experience.sample(batch_size)? {
                if waited {
                    tracing::debug!(batch_size, "experience store ready");
                }
                return Ok(Some(TransitionBatch::from_transitions(&transitions)));
            }
            if self.variables.is_stopped()? {
                return Ok(None);
            }
            waited = true;
            std::thread::sleep(self.config.sample_poll);
        }
    }

    fn report(&self, train_step: u64, info: &SacLossInfo, elapsed: Duration) -> Result<()> {
        let store_len = self.experience.len()?;
        let mut snapshot = TrainingSnapshot {
            train_step,
            critic_loss: info.critic_loss,
            policy_loss: info.policy_loss,
            alpha_loss: info.alpha_loss,
            alpha: info.alpha,
            mean_q: info.mean_q,
            store_len,
            ..TrainingSnapshot::default()
        };
        if let Some(metrics) = &self.metrics {
            snapshot.env_steps = metrics.env_steps();
            snapshot.episodes = metrics.episodes();
            snapshot.avg_reward = metrics.avg_reward();
        }

        let done = train_step - self.config.warmup_steps + 1;
        tracing::info!(
            train_step,
            critic_loss = info.critic_loss,
            policy_loss = info.policy_loss,
            alpha = info.alpha,
            mean_q = info.mean_q,
            store_len,
            updates_per_sec = done as f32 / elapsed.as_secs_f32().max(1e-6),
            "learner progress"
        );

        if let Some(logger) = &self.logger {
            logger.lock().log_training(&snapshot);
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{module_from_bytes, save_module};
    use crate::core::experience_store::{ExperienceStore, StoreConfig, CHECKPOINT_FILE};
    use crate::core::transition::Transition;
    use crate::core::variable_channel::{Pull, VariableChannel};
    use crate::metrics::{shared_logger, training_metrics, EpisodeSnapshot, MetricsLogger};
    use burn::backend::{Autodiff, NdArray};
    use parking_lot::Mutex;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    type B = NdArray<f32>;
    type AB = Autodiff<NdArray<f32>>;

    fn small_config() -> LearnerConfig {
        LearnerConfig::new(3, 1)
            .with_hidden([16, 8], [16, 8])
            .with_sac(SacConfig::new().with_batch_size(8).with_ensemble(2, 5, 2))
            .with_steps(0, 4)
            .with_log_interval(2)
            .with_sample_poll(Duration::from_millis(1))
    }

    fn filled_store(dir: Option<&Path>, n: usize) -> Arc<ExperienceStore> {
        let mut config = StoreConfig::new(100, 8);
        if let Some(dir) = dir {
            config = config.with_checkpoint_dir(dir);
        }
        let store = ExperienceStore::shared(config).unwrap();
        for i in 0..n {
            let x = i as f32 * 0.1;
            let t = Transition::new(vec![x, -x, 0.5], vec![0.2], -x, vec![x, x, 0.0], i % 5 == 4);
            store.commit(t, 1.0).unwrap();
        }
        store
    }

    #[derive(Default)]
    struct Recording {
        training: Vec<u64>,
    }

    impl MetricsLogger for Arc<Mutex<Recording>> {
        fn log_training(&mut self, s: &TrainingSnapshot) {
            self.lock().training.push(s.train_step);
        }
        fn log_episode(&mut self, _: &EpisodeSnapshot) {}
        fn flush(&mut self) {}
    }

    #[test]
    fn test_new_publishes_initial_actor() {
        let device = Default::default();
        let config = small_config();
        let channel = VariableChannel::shared(0);
        let store = filled_store(None, 0);
        let _learner = Learner::<AB, _, _>::new(config.clone(), store, channel.clone(), &device)
            .unwrap();

        let Pull::Ready(snapshot) = channel.pull().unwrap() else {
            panic!("initial actor not published");
        };
        assert_eq!(snapshot.train_step, 0);
        assert!(!snapshot.stop_agents);

        let actor = module_from_bytes(config.actor.init::<B>(&device), snapshot.actor, &device);
        assert!(actor.is_ok());
    }

    #[test]
    fn test_run_trains_stops_and_saves() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = small_config().with_save_path(dir.path().join("models"));
        let store_dir = dir.path().join("store");
        let store = filled_store(Some(store_dir.as_path()), 20);
        let channel = VariableChannel::shared(0);
        let recording = Arc::new(Mutex::new(Recording::default()));
        let metrics = training_metrics();

        let learner = Learner::<AB, _, _>::new(config, store, channel.clone(), &device)
            .unwrap()
            .with_logger(shared_logger(recording.clone()))
            .with_metrics(metrics.clone());
        let trained = learner.run().unwrap();

        assert_eq!(trained.train_step, 3);
        assert!(trained.last_loss.unwrap().is_finite());
        assert_eq!(metrics.train_steps(), 4);
        assert_eq!(recording.lock().training, vec![0, 2]);

        assert!(channel.is_stopped().unwrap());
        assert_eq!(channel.train_step(), Some(3));

        assert!(dir.path().join("models/actor.bin").exists());
        assert!(dir.path().join("models/critic.bin").exists());
        assert!(store_dir.join(CHECKPOINT_FILE).exists());
    }

    #[test]
    fn test_run_without_checkpoint_dir_still_finishes() {
        let device = Default::default();
        let channel = VariableChannel::shared(0);
        let store = filled_store(None, 20);
        let learner =
            Learner::<AB, _, _>::new(small_config(), store, channel.clone(), &device).unwrap();
        assert!(learner.run().is_ok());
        assert!(channel.is_stopped().unwrap());
    }

    #[test]
    fn test_learner_waits_for_min_size() {
        let device = Default::default();
        let store = filled_store(None, 0);
        let channel = VariableChannel::shared(0);
        let learner = Learner::<AB, _, _>::new(
            small_config().with_steps(0, 1),
            store.clone(),
            channel.clone(),
            &device,
        )
        .unwrap();

        let handle = std::thread::spawn(move || learner.run().map(|t| t.train_step));
        std::thread::sleep(Duration::from_millis(30));
        assert!(!channel.is_stopped().unwrap());

        for i in 0..8 {
            let t = Transition::new(vec![0.0, 0.0, i as f32], vec![0.0], 0.0, vec![0.0; 3], false);
            store.commit(t, 1.0).unwrap();
        }
        assert_eq!(handle.join().unwrap().unwrap(), 0);
        assert!(channel.is_stopped().unwrap());
    }

    #[test]
    fn test_external_stop_aborts_waiting_learner() {
        let device = Default::default();
        let channel = VariableChannel::shared(0);
        let learner = Learner::<AB, _, _>::new(
            small_config().with_steps(0, 10),
            filled_store(None, 0),
            channel.clone(),
            &device,
        )
        .unwrap();
        channel.set_stop().unwrap();

        let trained = learner.run().unwrap();
        assert!(trained.last_loss.is_none());
        assert_eq!(trained.train_step, 0);
    }

    #[test]
    fn test_pretrained_shape_mismatch_is_fatal() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let wrong = ActorConfig::new(3, 1).with_hidden([4, 4]).init::<B>(&device);
        let path = save_module(&wrong, dir.path().join("actor")).unwrap();

        let config = small_config().with_pretrained(Some(path), None);
        let result = Learner::<AB, _, _>::new(
            config,
            filled_store(None, 0),
            VariableChannel::shared(0),
            &device,
        );
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_missing_pretrained_path_uses_random_init() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = small_config().with_pretrained(Some(dir.path().join("absent")), None);
        let result = Learner::<AB, _, _>::new(
            config,
            filled_store(None, 0),
            VariableChannel::shared(0),
            &device,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_steps() {
        let config = small_config().with_steps(10, 5);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
