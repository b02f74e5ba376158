//! State-dependent exploration noise (gSDE).
//!
//! Instead of drawing independent Gaussian noise at every step, gSDE samples a
//! random linear map once per rollout segment and applies it to the policy's
//! latent features:
//!
//! ```text
//! E ~ N(0, exp(log_std)²)            [latent_dim, action_dim]
//! noise(h) = h · E
//! σ(h)     = sqrt((h²) · exp(log_std)² + 1e-6)
//! ```
//!
//! The same `E` is reused until `sample()` is called again, so exploration is
//! correlated across a whole segment. `log_std` is trained through the policy
//! log-density; `E` itself never receives gradients.

use burn::module::{Module, Param};
use burn::prelude::*;
use burn::tensor::Distribution;

/// Variance floor added before the square root.
pub const VARIANCE_FLOOR: f32 = 1e-6;

/// Default initial value of `log_std`.
pub const LOG_STD_INIT: f32 = -3.0;

/// Noise generator holding the trainable `log_std` and the sampled
/// exploration matrix.
#[derive(Module, Debug)]
pub struct StateDependentNoise<B: Backend> {
    /// Log standard deviation of the exploration matrix entries.
    pub log_std: Param<Tensor<B, 2>>,
    /// Current exploration matrix; detached in every forward pass.
    pub exploration: Param<Tensor<B, 2>>,
}

impl<B: Backend> StateDependentNoise<B> {
    /// Create a generator with `log_std` filled with `log_std_init` and a
    /// freshly sampled exploration matrix.
    pub fn new(latent_dim: usize, action_dim: usize, log_std_init: f32, device: &B::Device) -> Self {
        let log_std = Tensor::<B, 2>::full([latent_dim, action_dim], log_std_init, device);
        let exploration = Self::draw(log_std.clone());
        Self {
            log_std: Param::from_tensor(log_std),
            exploration: Param::from_tensor(exploration),
        }
    }

    /// Draw a new exploration matrix, replacing the previous one.
    pub fn sample(&mut self) {
        let fresh = Self::draw(self.log_std.val());
        self.exploration = Param::initialized(self.exploration.id.clone(), fresh);
    }

    /// Noise contribution for the given latent features: `h · E`.
    pub fn forward(&self, latent: Tensor<B, 2>) -> Tensor<B, 2> {
        latent.matmul(self.exploration.val().detach())
    }

    /// Per-dimension standard deviation of the action distribution.
    ///
    /// Gradients flow into both `latent` and `log_std`.
    pub fn std(&self, latent: Tensor<B, 2>) -> Tensor<B, 2> {
        let variance = latent
            .powf_scalar(2.0)
            .matmul(self.log_std.val().exp().powf_scalar(2.0));
        variance.add_scalar(VARIANCE_FLOOR).sqrt()
    }

    /// Elementwise standard deviation `exp(log_std)`.
    pub fn entry_std(&self) -> Tensor<B, 2> {
        self.log_std.val().exp()
    }

    /// `[latent_dim, action_dim]`
    pub fn dims(&self) -> [usize; 2] {
        self.log_std.val().dims()
    }

    fn draw(log_std: Tensor<B, 2>) -> Tensor<B, 2> {
        let std = log_std.detach().exp();
        let eps = Tensor::<B, 2>::random(std.dims(), Distribution::Normal(0.0, 1.0), &std.device());
        eps * std
    }
}
