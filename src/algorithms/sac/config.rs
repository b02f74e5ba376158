//! SAC hyperparameters.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// SAC Configuration
// ============================================================================

/// Configuration for the SAC update.
///
/// Defaults follow the continuous-control setup the learner was tuned for:
/// soft target updates with tau = 0.01, Adam at 3e-4 for all three
/// optimizers and `log_alpha` starting at 0 (alpha = 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SacConfig {
    // ========================================================================
    // Update Hyperparameters
    // ========================================================================
    /// Mini-batch size sampled from the experience store.
    pub batch_size: usize,

    /// Discount factor for future rewards.
    pub gamma: f32,

    /// Soft update coefficient for the target critic, in [0, 1].
    pub tau: f32,

    /// Actor learning rate.
    pub actor_lr: f64,

    /// Critic ensemble learning rate.
    pub critic_lr: f64,

    /// Temperature (log_alpha) learning rate.
    pub alpha_lr: f64,

    /// Initial value of the trainable `log_alpha`.
    pub init_log_alpha: f32,

    /// Global gradient norm clip for the actor. None = no clipping.
    pub actor_clip_norm: Option<f32>,

    /// Global gradient norm clip for the critic. None = no clipping.
    pub critic_clip_norm: Option<f32>,

    // ========================================================================
    // Critic Ensemble
    // ========================================================================
    /// Number of critics in the ensemble.
    pub n_critics: usize,

    /// Quantiles predicted by each critic.
    pub n_quantiles: usize,

    /// Quantiles dropped from the top of the flattened, sorted ensemble
    /// prediction when computing the target value.
    pub top_quantiles_to_drop: usize,
}

impl Default for SacConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            gamma: 0.99,
            tau: 0.01,
            actor_lr: 3e-4,
            critic_lr: 3e-4,
            alpha_lr: 3e-4,
            init_log_alpha: 0.0,
            actor_clip_norm: None,
            critic_clip_norm: None,
            n_critics: 2,
            n_quantiles: 25,
            top_quantiles_to_drop: 4,
        }
    }
}

impl SacConfig {
    /// Create config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder pattern: set discount factor.
    pub fn with_gamma(mut self, gamma: f32) -> Self {
        self.gamma = gamma;
        self
    }

    /// Builder pattern: set soft update coefficient.
    pub fn with_tau(mut self, tau: f32) -> Self {
        self.tau = tau;
        self
    }

    /// Builder pattern: set all three learning rates.
    pub fn with_learning_rates(mut self, actor_lr: f64, critic_lr: f64, alpha_lr: f64) -> Self {
        self.actor_lr = actor_lr;
        self.critic_lr = critic_lr;
        self.alpha_lr = alpha_lr;
        self
    }

    /// Builder pattern: set initial log_alpha.
    pub fn with_init_log_alpha(mut self, init_log_alpha: f32) -> Self {
        self.init_log_alpha = init_log_alpha;
        self
    }

    /// Builder pattern: set gradient norm clipping for actor and critic.
    pub fn with_clip_norm(mut self, actor: Option<f32>, critic: Option<f32>) -> Self {
        self.actor_clip_norm = actor;
        self.critic_clip_norm = critic;
        self
    }

    /// Builder pattern: set critic ensemble shape.
    pub fn with_ensemble(
        mut self,
        n_critics: usize,
        n_quantiles: usize,
        top_quantiles_to_drop: usize,
    ) -> Self {
        self.n_critics = n_critics;
        self.n_quantiles = n_quantiles;
        self.top_quantiles_to_drop = top_quantiles_to_drop;
        self
    }

    /// Total quantiles predicted by the ensemble.
    pub fn total_quantiles(&self) -> usize {
        self.n_critics * self.n_quantiles
    }

    /// Quantiles kept after truncation.
    pub fn kept_quantiles(&self) -> usize {
        self.total_quantiles().saturating_sub(self.top_quantiles_to_drop)
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.tau) {
            return Err(Error::InvalidConfig(format!(
                "tau must be in [0, 1], got {}",
                self.tau
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(Error::InvalidConfig(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        if self.n_critics == 0 || self.n_quantiles == 0 {
            return Err(Error::InvalidConfig(
                "critic ensemble needs at least one critic and one quantile".into(),
            ));
        }
        if self.top_quantiles_to_drop >= self.total_quantiles() {
            return Err(Error::InvalidConfig(format!(
                "cannot drop {} of {} quantiles",
                self.top_quantiles_to_drop,
                self.total_quantiles()
            )));
        }
        Ok(())
    }
}

/// Target entropy for a continuous action space: `-dim(A)`.
pub fn target_entropy_continuous(action_dim: usize) -> f32 {
    -(action_dim as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SacConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.total_quantiles(), 50);
        assert_eq!(config.kept_quantiles(), 46);
    }

    #[test]
    fn test_invalid_truncation() {
        let config = SacConfig::default().with_ensemble(2, 3, 6);
        assert!(config.validate().is_err());

        let config = SacConfig::default().with_ensemble(2, 3, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_tau() {
        assert!(SacConfig::default().with_tau(1.5).validate().is_err());
        assert!(SacConfig::default().with_tau(0.0).validate().is_ok());
        assert!(SacConfig::default().with_tau(1.0).validate().is_ok());
    }

    #[test]
    fn test_target_entropy() {
        assert_eq!(target_entropy_continuous(1), -1.0);
        assert_eq!(target_entropy_continuous(6), -6.0);
    }
}
