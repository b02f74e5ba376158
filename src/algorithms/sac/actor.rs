//! Squashed-Gaussian policy with state-dependent exploration.
//!
//! ```text
//! obs ─→ fc1 ─→ relu ─→ latent ─→ relu ─┬─→ mean ─→ clip ─────┐
//!                                       │                      ├─→ u ─→ tanh ─→ action
//!                                       └─→ noise (h · E) ─────┘
//! ```
//!
//! The log-density of the squashed action is the Gaussian density of `u`
//! minus the log-Jacobian of `tanh`, summed over action dimensions.

use burn::module::Module;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;
use serde::{Deserialize, Serialize};

use super::noise::{StateDependentNoise, LOG_STD_INIT};
use crate::error::{Error, Result};

/// Default symmetric bound on the mean head output.
pub const MEAN_CLIP: f32 = 2.0;

const LN_2: f32 = std::f32::consts::LN_2;
const HALF_LN_2PI: f32 = 0.918_938_5;

// ============================================================================
// Configuration
// ============================================================================

/// Actor network shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Observation dimension.
    pub obs_dim: usize,
    /// Action dimension.
    pub action_dim: usize,
    /// Widths of the two hidden layers. The second is the gSDE latent.
    pub hidden: [usize; 2],
    /// Initial `log_std` of the exploration noise.
    pub log_std_init: f32,
    /// Lower bound of the pre-squash mean.
    pub mean_clip_min: f32,
    /// Upper bound of the pre-squash mean.
    pub mean_clip_max: f32,
}

impl ActorConfig {
    /// Create a config with the default `[400, 300]` hidden layers.
    pub fn new(obs_dim: usize, action_dim: usize) -> Self {
        Self {
            obs_dim,
            action_dim,
            hidden: [400, 300],
            log_std_init: LOG_STD_INIT,
            mean_clip_min: -MEAN_CLIP,
            mean_clip_max: MEAN_CLIP,
        }
    }

    /// Builder pattern: set hidden layer widths.
    pub fn with_hidden(mut self, hidden: [usize; 2]) -> Self {
        self.hidden = hidden;
        self
    }

    /// Builder pattern: set initial noise `log_std`.
    pub fn with_log_std_init(mut self, log_std_init: f32) -> Self {
        self.log_std_init = log_std_init;
        self
    }

    /// Builder pattern: set the mean bounds.
    pub fn with_mean_clip(mut self, min: f32, max: f32) -> Self {
        self.mean_clip_min = min;
        self.mean_clip_max = max;
        self
    }

    /// Check dimensions and mean bounds.
    pub fn validate(&self) -> Result<()> {
        if self.obs_dim == 0 || self.action_dim == 0 {
            return Err(Error::InvalidConfig(
                "observation and action dimensions must be positive".into(),
            ));
        }
        let (min, max) = (self.mean_clip_min, self.mean_clip_max);
        if min.is_nan() || max.is_nan() || min > max {
            return Err(Error::InvalidConfig(format!(
                "mean clip [{}, {}] is empty",
                self.mean_clip_min, self.mean_clip_max
            )));
        }
        Ok(())
    }

    /// Initialize the actor.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Actor<B> {
        let he = Initializer::KaimingUniform {
            gain: std::f64::consts::SQRT_2,
            fan_out_only: false,
        };
        let [h1, h2] = self.hidden;

        Actor {
            fc1: LinearConfig::new(self.obs_dim, h1)
                .with_initializer(he.clone())
                .init(device),
            latent: LinearConfig::new(h1, h2).with_initializer(he).init(device),
            mean: LinearConfig::new(h2, self.action_dim)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
            noise: StateDependentNoise::new(h2, self.action_dim, self.log_std_init, device),
            obs_dim: self.obs_dim,
            action_dim: self.action_dim,
            mean_clip_min: self.mean_clip_min,
            mean_clip_max: self.mean_clip_max,
        }
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Output of [`Actor::predict`].
#[derive(Debug, Clone)]
pub struct ActorOutput<B: Backend> {
    /// Squashed actions in `(-1, 1)`. Shape `[batch, action_dim]`.
    pub action: Tensor<B, 2>,
    /// Log-density of `action`, shape `[batch, 1]`. Only present when
    /// requested on a stochastic prediction.
    pub log_prob: Option<Tensor<B, 2>>,
}

/// Policy network.
#[derive(Module, Debug)]
pub struct Actor<B: Backend> {
    fc1: Linear<B>,
    latent: Linear<B>,
    mean: Linear<B>,
    noise: StateDependentNoise<B>,
    obs_dim: usize,
    action_dim: usize,
    mean_clip_min: f32,
    mean_clip_max: f32,
}

impl<B: Backend> Actor<B> {
    /// Run the policy on a batch of observations `[batch, obs_dim]`.
    pub fn predict(
        &self,
        obs: Tensor<B, 2>,
        deterministic: bool,
        with_log_prob: bool,
    ) -> ActorOutput<B> {
        let (latent, mean) = self.features(obs);

        if deterministic {
            return ActorOutput {
                action: mean.tanh(),
                log_prob: None,
            };
        }

        let pre_squash = mean.clone() + self.noise.forward(latent.clone());
        let log_prob = with_log_prob.then(|| {
            let std = self.noise.std(latent);
            squashed_gaussian_log_prob(pre_squash.clone(), mean, std)
        });

        ActorOutput {
            action: pre_squash.tanh(),
            log_prob,
        }
    }

    /// Stochastic action with its log-density, as used by the learner.
    ///
    /// Returns `(action [batch, action_dim], log_prob [batch, 1])`.
    pub fn sample(&self, obs: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let (latent, mean) = self.features(obs);

        let pre_squash = mean.clone() + self.noise.forward(latent.clone());
        let std = self.noise.std(latent);
        let log_prob = squashed_gaussian_log_prob(pre_squash.clone(), mean, std);
        (pre_squash.tanh(), log_prob)
    }

    /// Latent features and clipped mean.
    fn features(&self, obs: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let x = relu(self.fc1.forward(obs));
        let latent = relu(self.latent.forward(x));
        let mean = self
            .mean
            .forward(latent.clone())
            .clamp(self.mean_clip_min, self.mean_clip_max);
        (latent, mean)
    }

    /// Resample the exploration matrix.
    pub fn reset_noise(&mut self) {
        self.noise.sample();
    }

    /// Single-observation inference for rollout workers.
    pub fn act(&self, observation: &[f32], deterministic: bool) -> Result<Vec<f32>> {
        if observation.len() != self.obs_dim {
            return Err(Error::InvalidConfig(format!(
                "observation has {} values, actor expects {}",
                observation.len(),
                self.obs_dim
            )));
        }
        let device = self.devices().into_iter().next().unwrap_or_default();
        let obs = Tensor::<B, 1>::from_floats(observation, &device).reshape([1, self.obs_dim]);
        let output = self.predict(obs, deterministic, false);
        tensor_to_vec(output.action)
    }

    /// Observation dimension.
    pub fn obs_dim(&self) -> usize {
        self.obs_dim
    }

    /// Action dimension.
    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    /// Exploration noise generator.
    pub fn noise(&self) -> &StateDependentNoise<B> {
        &self.noise
    }
}

// ============================================================================
// Distribution Helpers
// ============================================================================

/// Diagonal Gaussian log-density of `u`, summed over the last dimension.
pub fn gaussian_log_prob<B: Backend>(
    u: Tensor<B, 2>,
    mean: Tensor<B, 2>,
    std: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let z = (u - mean) / std.clone();
    let per_dim = (z.powf_scalar(2.0).mul_scalar(-0.5) - std.log()).sub_scalar(HALF_LN_2PI);
    per_dim.sum_dim(1)
}

/// `log(1 - tanh²(u))` in a form that stays finite for large `|u|`:
/// `2 (ln 2 - u - softplus(-2u))`.
pub fn tanh_log_det_jacobian<B: Backend>(u: Tensor<B, 2>) -> Tensor<B, 2> {
    let softplus = stable_softplus(u.clone().mul_scalar(-2.0));
    (u.neg() - softplus).add_scalar(LN_2).mul_scalar(2.0)
}

/// Log-density of `tanh(u)` where `u ~ N(mean, std)`. Shape `[batch, 1]`.
pub fn squashed_gaussian_log_prob<B: Backend>(
    u: Tensor<B, 2>,
    mean: Tensor<B, 2>,
    std: Tensor<B, 2>,
) -> Tensor<B, 2> {
    gaussian_log_prob(u.clone(), mean, std) - tanh_log_det_jacobian(u).sum_dim(1)
}

/// `max(x, 0) + log1p(exp(-|x|))`
fn stable_softplus<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone().clamp_min(0.0) + x.abs().neg().exp().log1p()
}

/// Copy a tensor's values to the host.
pub(crate) fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| Error::TensorData(format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn small_actor() -> Actor<B> {
        ActorConfig::new(3, 2)
            .with_hidden([16, 8])
            .init::<B>(&Default::default())
    }

    #[test]
    fn test_predict_shapes() {
        let actor = small_actor();
        let obs = Tensor::<B, 2>::random([5, 3], burn::tensor::Distribution::Default, &Default::default());

        let out = actor.predict(obs.clone(), false, true);
        assert_eq!(out.action.dims(), [5, 2]);
        assert_eq!(out.log_prob.unwrap().dims(), [5, 1]);

        let out = actor.predict(obs.clone(), false, false);
        assert!(out.log_prob.is_none());

        let out = actor.predict(obs, true, true);
        assert!(out.log_prob.is_none());
    }

    #[test]
    fn test_actions_are_bounded() {
        let actor = small_actor();
        let obs = Tensor::<B, 2>::random(
            [32, 3],
            burn::tensor::Distribution::Uniform(-100.0, 100.0),
            &Default::default(),
        );
        let actions = tensor_to_vec(actor.predict(obs, false, false).action).unwrap();
        assert!(actions.iter().all(|a| (-1.0..=1.0).contains(a)));
    }

    #[test]
    fn test_custom_mean_clip_bounds_deterministic_actions() {
        let actor = ActorConfig::new(3, 2)
            .with_hidden([16, 8])
            .with_mean_clip(-0.1, 0.1)
            .init::<B>(&Default::default());
        let obs = Tensor::<B, 2>::random(
            [32, 3],
            burn::tensor::Distribution::Uniform(-100.0, 100.0),
            &Default::default(),
        );
        let actions = tensor_to_vec(actor.predict(obs, true, false).action).unwrap();
        let bound = 0.1f32.tanh() + 1e-6;
        assert!(actions.iter().all(|a| a.abs() <= bound));
    }

    #[test]
    fn test_degenerate_mean_clip_fixes_the_mean() {
        let actor = ActorConfig::new(3, 1)
            .with_hidden([16, 8])
            .with_mean_clip(0.5, 0.5)
            .init::<B>(&Default::default());
        let action = actor.act(&[3.0, -1.0, 0.2], true).unwrap();
        assert!((action[0] - 0.5f32.tanh()).abs() < 1e-6);
    }

    #[test]
    fn test_mean_clip_validation() {
        assert!(ActorConfig::new(3, 1).validate().is_ok());
        assert!(matches!(
            ActorConfig::new(3, 1).with_mean_clip(1.0, -1.0).validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(ActorConfig::new(0, 1).validate().is_err());
    }

    #[test]
    fn test_deterministic_is_repeatable() {
        let mut actor = small_actor();
        let obs = [0.1, -0.4, 0.7];

        let a = actor.act(&obs, true).unwrap();
        actor.reset_noise();
        let b = actor.act(&obs, true).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stochastic_fixed_until_reset() {
        let mut actor = ActorConfig::new(3, 2)
            .with_hidden([16, 8])
            .with_log_std_init(0.0)
            .init::<B>(&Default::default());
        let obs = [0.5, 0.5, 0.5];

        let a = actor.act(&obs, false).unwrap();
        let b = actor.act(&obs, false).unwrap();
        assert_eq!(a, b);

        actor.reset_noise();
        let c = actor.act(&obs, false).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_act_rejects_wrong_dimension() {
        let actor = small_actor();
        assert!(matches!(
            actor.act(&[1.0, 2.0], false),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_gaussian_log_prob_standard_normal() {
        let device = Default::default();
        let u = Tensor::<B, 2>::zeros([1, 1], &device);
        let mean = Tensor::<B, 2>::zeros([1, 1], &device);
        let std = Tensor::<B, 2>::ones([1, 1], &device);

        let lp = tensor_to_vec(gaussian_log_prob(u, mean, std)).unwrap()[0];
        assert!((lp + HALF_LN_2PI).abs() < 1e-5);
    }

    #[test]
    fn test_tanh_correction_matches_naive_form() {
        let device = Default::default();
        let values = [-3.0f32, -0.5, 0.0, 0.25, 2.0];
        let u = Tensor::<B, 1>::from_floats(values, &device).reshape([1, 5]);

        let stable = tensor_to_vec(tanh_log_det_jacobian(u)).unwrap();
        for (s, v) in stable.iter().zip(values) {
            let naive = (1.0 - v.tanh().powi(2)).ln();
            assert!((s - naive).abs() < 1e-4, "u={v}: {s} vs {naive}");
        }
    }

    #[test]
    fn test_tanh_correction_finite_for_large_inputs() {
        let device = Default::default();
        let u = Tensor::<B, 1>::from_floats([-60.0, 60.0], &device).reshape([1, 2]);
        let values = tensor_to_vec(tanh_log_det_jacobian(u)).unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }
}
