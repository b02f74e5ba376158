//! Deterministic evaluation of a trained actor.
//!
//! The tester never writes to the experience table. It loads an actor weight
//! file (or keeps a random actor when no path is given), acts with the
//! distribution mode and resets the environment whenever an episode ends.

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::algorithms::sac::{Actor, ActorConfig};
use crate::checkpoint::load_if_present;
use crate::environment::Environment;
use crate::error::{Error, Result};

/// Configuration of an evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesterConfig {
    /// Actor network shape.
    pub actor: ActorConfig,
    /// Environment steps to run.
    pub max_steps: u64,
    /// Actor weights. `None` or a missing file evaluates a randomly
    /// initialized actor.
    pub model_path: Option<PathBuf>,
}

impl TesterConfig {
    /// Create a config with 1000 steps and no weight file.
    pub fn new(actor: ActorConfig) -> Self {
        Self {
            actor,
            max_steps: 1_000,
            model_path: None,
        }
    }

    /// Builder pattern: set step budget.
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Builder pattern: set weight file.
    pub fn with_model_path(mut self, model_path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(model_path.into());
        self
    }
}

/// Results of an evaluation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TesterStats {
    /// Episodes completed within the step budget.
    pub episodes: usize,
    /// Return of every completed episode.
    pub rewards: Vec<f32>,
    /// Environment steps taken.
    pub steps: u64,
}

impl TesterStats {
    /// Mean return over completed episodes, 0 if none completed.
    pub fn mean_reward(&self) -> f32 {
        if self.rewards.is_empty() {
            return 0.0;
        }
        self.rewards.iter().sum::<f32>() / self.rewards.len() as f32
    }
}

/// Read-only actor runner.
pub struct Tester<B: Backend, Env: Environment> {
    config: TesterConfig,
    actor: Actor<B>,
    env: Env,
}

impl<B: Backend, Env: Environment> Tester<B, Env> {
    /// Build the actor, loading `model_path` when set.
    pub fn new(config: TesterConfig, env: Env, device: &B::Device) -> Result<Self> {
        if env.observation_dim() != config.actor.obs_dim
            || env.action_dim() != config.actor.action_dim
        {
            return Err(Error::Environment(format!(
                "environment is {}->{}, actor expects {}->{}",
                env.observation_dim(),
                env.action_dim(),
                config.actor.obs_dim,
                config.actor.action_dim
            )));
        }

        let actor = config.actor.init::<B>(device);
        if config.model_path.is_none() {
            tracing::warn!("no model path given, evaluating a random actor");
        }
        let actor = load_if_present(actor, config.model_path.as_deref(), device)?;
        Ok(Self { config, actor, env })
    }

    /// Run `max_steps` deterministic steps.
    pub fn run(&mut self) -> Result<TesterStats> {
        let mut stats = TesterStats::default();
        let mut obs = self.env.reset();
        let mut episode_reward = 0.0f32;
        let mut episode_steps = 0usize;

        while stats.steps < self.config.max_steps {
            let action = self.actor.act(&obs, true)?;
            let step = self.env.step(&action)?;
            stats.steps += 1;
            episode_steps += 1;
            episode_reward += step.reward;

            if step.terminal {
                stats.episodes += 1;
                stats.rewards.push(episode_reward);
                tracing::info!(
                    episode = stats.episodes,
                    steps = episode_steps,
                    reward = episode_reward,
                    "evaluation episode"
                );
                obs = self.env.reset();
                episode_reward = 0.0;
                episode_steps = 0;
            } else {
                obs = step.observation;
            }
        }

        tracing::info!(
            episodes = stats.episodes,
            mean_reward = stats.mean_reward(),
            "evaluation finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::save_module;
    use crate::environment::Pendulum;
    use burn::backend::NdArray;
    use tempfile::tempdir;

    type B = NdArray<f32>;

    fn actor_config() -> ActorConfig {
        ActorConfig::new(3, 1).with_hidden([16, 8])
    }

    #[test]
    fn test_runs_full_episodes() {
        let config = TesterConfig::new(actor_config()).with_max_steps(450);
        let mut tester = Tester::<B, _>::new(config, Pendulum::new(0), &Default::default()).unwrap();

        let stats = tester.run().unwrap();
        assert_eq!(stats.steps, 450);
        assert_eq!(stats.episodes, 2);
        assert_eq!(stats.rewards.len(), 2);
        assert!(stats.rewards.iter().all(|r| *r <= 0.0));
    }

    #[test]
    fn test_saved_actor_is_deterministic() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let actor = actor_config().init::<B>(&device);
        let path = save_module(&actor, dir.path().join("actor")).unwrap();

        let run = |seed| {
            let config = TesterConfig::new(actor_config())
                .with_max_steps(200)
                .with_model_path(&path);
            Tester::<B, _>::new(config, Pendulum::new(seed), &device)
                .unwrap()
                .run()
                .unwrap()
        };
        assert_eq!(run(3), run(3));
    }

    #[test]
    fn test_missing_model_file_evaluates_random_actor() {
        let dir = tempdir().unwrap();
        let config = TesterConfig::new(actor_config())
            .with_max_steps(10)
            .with_model_path(dir.path().join("none"));
        let mut tester = Tester::<B, _>::new(config, Pendulum::new(0), &Default::default()).unwrap();
        assert_eq!(tester.run().unwrap().steps, 10);
    }

    #[test]
    fn test_model_file_of_other_shape_is_fatal() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let other = ActorConfig::new(3, 1).with_hidden([8, 8]).init::<B>(&device);
        let path = save_module(&other, dir.path().join("actor")).unwrap();

        let config = TesterConfig::new(actor_config()).with_model_path(path);
        let result = Tester::<B, _>::new(config, Pendulum::new(0), &device);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_mean_reward() {
        let stats = TesterStats {
            episodes: 2,
            rewards: vec![-2.0, -4.0],
            steps: 10,
        };
        assert_eq!(stats.mean_reward(), -3.0);
        assert_eq!(TesterStats::default().mean_reward(), 0.0);
    }
}
