//! Distributional critic ensemble with truncated quantile aggregation.
//!
//! Each critic predicts `n_quantiles` return quantiles for a state-action pair
//! from two parallel branches:
//!
//! ```text
//! obs ─→ fc_s ─→ LN ─→ tanh ─→ fc_s2 ─┐
//!                                      + ─→ relu ─→ head ─→ [batch, n_quantiles]
//! act ─→ fc_a ─→ LN ─→ tanh ─→ fc_a2 ─┘
//! ```
//!
//! [`MultiCritic`] stacks `n_critics` of these into `[batch, n_critics, n_quantiles]`.
//! Bootstrapped targets use [`truncated_quantile_mean`], which pools every
//! quantile of the ensemble, drops the largest ones and averages the rest to
//! counter overestimation.

use burn::module::Module;
use burn::nn::{Initializer, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

/// Shape of one critic and of the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticConfig {
    /// Observation dimension.
    pub obs_dim: usize,
    /// Action dimension.
    pub action_dim: usize,
    /// Widths of the branch layers and the merge layer.
    pub units: [usize; 2],
    /// Quantiles predicted per critic.
    pub n_quantiles: usize,
    /// Members of the ensemble.
    pub n_critics: usize,
}

impl CriticConfig {
    /// Create a config with `[400, 300]` units, 25 quantiles and 2 critics.
    pub fn new(obs_dim: usize, action_dim: usize) -> Self {
        Self {
            obs_dim,
            action_dim,
            units: [400, 300],
            n_quantiles: 25,
            n_critics: 2,
        }
    }

    /// Builder pattern: set layer widths.
    pub fn with_units(mut self, units: [usize; 2]) -> Self {
        self.units = units;
        self
    }

    /// Builder pattern: set ensemble shape.
    pub fn with_ensemble(mut self, n_critics: usize, n_quantiles: usize) -> Self {
        self.n_critics = n_critics;
        self.n_quantiles = n_quantiles;
        self
    }

    /// Initialize a single critic.
    pub fn init_critic<B: Backend>(&self, device: &B::Device) -> Critic<B> {
        // U(-sqrt(1/fan_out), sqrt(1/fan_out))
        let init = Initializer::KaimingUniform {
            gain: 1.0 / 3f64.sqrt(),
            fan_out_only: true,
        };
        let linear = |d_in: usize, d_out: usize| -> Linear<B> {
            LinearConfig::new(d_in, d_out)
                .with_initializer(init.clone())
                .init(device)
        };
        let [u0, u1] = self.units;

        Critic {
            fc_s: linear(self.obs_dim, u0),
            norm_s: LayerNormConfig::new(u0).init(device),
            fc_a: linear(self.action_dim, u0),
            norm_a: LayerNormConfig::new(u0).init(device),
            fc_s2: linear(u0, u1),
            fc_a2: linear(u0, u1),
            head: linear(u1, self.n_quantiles),
        }
    }

    /// Initialize the ensemble.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MultiCritic<B> {
        MultiCritic {
            critics: (0..self.n_critics)
                .map(|_| self.init_critic(device))
                .collect(),
            n_quantiles: self.n_quantiles,
        }
    }
}

// ============================================================================
// Critic
// ============================================================================

/// One quantile critic.
#[derive(Module, Debug)]
pub struct Critic<B: Backend> {
    fc_s: Linear<B>,
    norm_s: LayerNorm<B>,
    fc_a: Linear<B>,
    norm_a: LayerNorm<B>,
    fc_s2: Linear<B>,
    fc_a2: Linear<B>,
    head: Linear<B>,
}

impl<B: Backend> Critic<B> {
    /// Predict quantiles `[batch, n_quantiles]`.
    pub fn forward(&self, obs: Tensor<B, 2>, action: Tensor<B, 2>) -> Tensor<B, 2> {
        let s = self.norm_s.forward(self.fc_s.forward(obs)).tanh();
        let a = self.norm_a.forward(self.fc_a.forward(action)).tanh();
        let x = relu(self.fc_s2.forward(s) + self.fc_a2.forward(a));
        self.head.forward(x)
    }
}

/// Ensemble of critics with a fixed member count.
#[derive(Module, Debug)]
pub struct MultiCritic<B: Backend> {
    critics: Vec<Critic<B>>,
    n_quantiles: usize,
}

impl<B: Backend> MultiCritic<B> {
    /// Predict quantiles for every member: `[batch, n_critics, n_quantiles]`.
    pub fn forward(&self, obs: Tensor<B, 2>, action: Tensor<B, 2>) -> Tensor<B, 3> {
        let outputs = self
            .critics
            .iter()
            .map(|critic| critic.forward(obs.clone(), action.clone()))
            .collect::<Vec<_>>();
        Tensor::stack(outputs, 1)
    }

    /// Mean over all critics and quantiles: `[batch, 1]`.
    pub fn mean_q(&self, obs: Tensor<B, 2>, action: Tensor<B, 2>) -> Tensor<B, 2> {
        let quantiles = self.forward(obs, action);
        let [batch, n, q] = quantiles.dims();
        quantiles.reshape([batch, n * q]).mean_dim(1)
    }

    /// Number of critics.
    pub fn n_critics(&self) -> usize {
        self.critics.len()
    }

    /// Quantiles per critic.
    pub fn n_quantiles(&self) -> usize {
        self.n_quantiles
    }
}

/// Pool all quantiles per sample, sort ascending, drop the top `drop` values
/// and average the remainder. Returns `[batch, 1]`.
///
/// `drop` is clamped so that at least one quantile survives.
pub fn truncated_quantile_mean<B: Backend>(quantiles: Tensor<B, 3>, drop: usize) -> Tensor<B, 2> {
    let [batch, n_critics, n_quantiles] = quantiles.dims();
    let total = n_critics * n_quantiles;
    let kept = total.saturating_sub(drop).max(1);

    quantiles
        .reshape([batch, total])
        .sort(1)
        .slice([0..batch, 0..kept])
        .mean_dim(1)
}
