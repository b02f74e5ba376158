//! One SAC gradient step over a replay batch.
//!
//! ```text
//! reset_noise ─→ alpha step ─→ critic step ─→ actor step ─→ soft update
//! ```
//!
//! Every quantity that must not carry gradient (the alpha-step log-probs, the
//! Bellman target) is computed on the inner backend through `valid()` and
//! re-entered with `Tensor::from_inner`, so it never joins the graph of the
//! module being stepped.

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

use super::actor::Actor;
use super::config::{target_entropy_continuous, SacConfig};
use super::critic::{truncated_quantile_mean, MultiCritic};
use super::entropy_tuning::Temperature;
use super::losses::{actor_loss, quantile_huber_loss, soft_td_target};
use crate::core::target_network::{hard_copy, soft_update};
use crate::core::transition::TransitionBatch;
use crate::error::{Error, Result};

// ============================================================================
// Loss Info
// ============================================================================

/// Scalars reported by one update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SacLossInfo {
    /// Huber loss of the critic ensemble.
    pub critic_loss: f32,
    /// Actor loss `mean(alpha * log_pi - q)`.
    pub policy_loss: f32,
    /// Temperature loss.
    pub alpha_loss: f32,
    /// Alpha used by this step.
    pub alpha: f32,
    /// Mean critic value of the policy actions.
    pub mean_q: f32,
}

impl SacLossInfo {
    /// Check that every reported value is finite.
    pub fn is_finite(&self) -> bool {
        [
            self.critic_loss,
            self.policy_loss,
            self.alpha_loss,
            self.alpha,
            self.mean_q,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

type ActorOptimizer<B> = OptimizerAdaptor<Adam, Actor<B>, B>;
type CriticOptimizer<B> = OptimizerAdaptor<Adam, MultiCritic<B>, B>;
type AlphaOptimizer<B> = OptimizerAdaptor<Adam, Temperature<B>, B>;

// ============================================================================
// SAC State
// ============================================================================

/// Networks, optimizers and temperature owned by the learner.
pub struct SacState<B: AutodiffBackend> {
    actor: Actor<B>,
    critic: MultiCritic<B>,
    target_critic: MultiCritic<B::InnerBackend>,
    temperature: Temperature<B>,
    actor_optimizer: ActorOptimizer<B>,
    critic_optimizer: CriticOptimizer<B>,
    alpha_optimizer: AlphaOptimizer<B>,
    target_entropy: f32,
    config: SacConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> SacState<B> {
    /// Assemble the training state. The target critic starts as an exact copy
    /// of `critic`.
    pub fn new(
        actor: Actor<B>,
        critic: MultiCritic<B>,
        config: SacConfig,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;
        if critic.n_critics() != config.n_critics || critic.n_quantiles() != config.n_quantiles {
            return Err(Error::InvalidConfig(format!(
                "critic ensemble is {}x{}, config expects {}x{}",
                critic.n_critics(),
                critic.n_quantiles(),
                config.n_critics,
                config.n_quantiles
            )));
        }

        let target_critic = hard_copy::<B::InnerBackend, _>(&critic.valid());
        let target_entropy = target_entropy_continuous(actor.action_dim());

        Ok(Self {
            temperature: Temperature::new(config.init_log_alpha, device),
            actor_optimizer: adam(config.actor_clip_norm).init(),
            critic_optimizer: adam(config.critic_clip_norm).init(),
            alpha_optimizer: adam(None).init(),
            actor,
            critic,
            target_critic,
            target_entropy,
            config,
            device: device.clone(),
        })
    }

    /// Run one update on `batch` and return the new state with its losses.
    pub fn update(mut self, batch: &TransitionBatch) -> Result<(Self, SacLossInfo)> {
        let device = self.device.clone();
        let n = batch.batch_size;
        let obs = Tensor::<B, 1>::from_floats(batch.observations.as_slice(), &device)
            .reshape([n, batch.obs_dim]);
        let actions = Tensor::<B, 1>::from_floats(batch.actions.as_slice(), &device)
            .reshape([n, batch.action_dim]);
        let next_obs = Tensor::<B, 1>::from_floats(batch.next_observations.as_slice(), &device)
            .reshape([n, batch.obs_dim]);
        let rewards = Tensor::<B::InnerBackend, 1>::from_floats(batch.rewards.as_slice(), &device)
            .reshape([n, 1]);
        let terminals =
            Tensor::<B::InnerBackend, 1>::from_floats(batch.terminals.as_slice(), &device)
                .reshape([n, 1]);

        self.actor.reset_noise();
        let frozen_actor = self.actor.valid();

        // ====================================================================
        // Temperature
        // ====================================================================
        let alpha = self.temperature.alpha();
        let (_, log_pi) = frozen_actor.sample(obs.clone().inner());
        let alpha_loss = self
            .temperature
            .loss(Tensor::from_inner(log_pi), self.target_entropy);
        let alpha_loss_value = alpha_loss.clone().into_scalar().elem::<f32>();
        let grads = GradientsParams::from_grads(alpha_loss.backward(), &self.temperature);
        self.temperature = self
            .alpha_optimizer
            .step(self.config.alpha_lr, self.temperature, grads);

        // ====================================================================
        // Critic
        // ====================================================================
        let (next_action, next_log_pi) = frozen_actor.sample(next_obs.clone().inner());
        let next_quantiles = self.target_critic.forward(next_obs.inner(), next_action);
        let next_q = truncated_quantile_mean(next_quantiles, self.config.top_quantiles_to_drop);
        let target = soft_td_target(
            rewards,
            terminals,
            next_q,
            next_log_pi,
            self.config.gamma,
            alpha,
        );

        let quantiles = self.critic.forward(obs.clone(), actions);
        let critic_loss = quantile_huber_loss(Tensor::from_inner(target), quantiles);
        let critic_loss_value = critic_loss.clone().into_scalar().elem::<f32>();
        let grads = GradientsParams::from_grads(critic_loss.backward(), &self.critic);
        self.critic = self
            .critic_optimizer
            .step(self.config.critic_lr, self.critic, grads);

        // ====================================================================
        // Actor
        // ====================================================================
        let (pi_action, log_pi) = self.actor.sample(obs.clone());
        let q = self.critic.mean_q(obs, pi_action);
        let mean_q = q.clone().mean().into_scalar().elem::<f32>();
        let policy_loss = actor_loss(log_pi, q, alpha);
        let policy_loss_value = policy_loss.clone().into_scalar().elem::<f32>();
        let grads = GradientsParams::from_grads(policy_loss.backward(), &self.actor);
        self.actor = self
            .actor_optimizer
            .step(self.config.actor_lr, self.actor, grads);

        // ====================================================================
        // Target
        // ====================================================================
        self.target_critic = soft_update::<B::InnerBackend, _>(
            &self.critic.valid(),
            self.target_critic,
            self.config.tau,
        )?;

        let info = SacLossInfo {
            critic_loss: critic_loss_value,
            policy_loss: policy_loss_value,
            alpha_loss: alpha_loss_value,
            alpha,
            mean_q,
        };
        Ok((self, info))
    }

    /// Live actor.
    pub fn actor(&self) -> &Actor<B> {
        &self.actor
    }

    /// Live critic ensemble.
    pub fn critic(&self) -> &MultiCritic<B> {
        &self.critic
    }

    /// Target critic ensemble.
    pub fn target_critic(&self) -> &MultiCritic<B::InnerBackend> {
        &self.target_critic
    }

    /// Entropy temperature.
    pub fn temperature(&self) -> &Temperature<B> {
        &self.temperature
    }

    /// `-action_dim`
    pub fn target_entropy(&self) -> f32 {
        self.target_entropy
    }

    /// Hyperparameters.
    pub fn config(&self) -> &SacConfig {
        &self.config
    }

    /// Consume the state, keeping the trained networks.
    pub fn into_models(self) -> (Actor<B>, MultiCritic<B>) {
        (self.actor, self.critic)
    }
}

fn adam(clip_norm: Option<f32>) -> AdamConfig {
    let config = AdamConfig::new().with_epsilon(1e-5);
    match clip_norm {
        Some(max_norm) => config.with_grad_clipping(Some(GradientClippingConfig::Norm(max_norm))),
        None => config,
    }
}
