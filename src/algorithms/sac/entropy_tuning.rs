//! Automatic entropy temperature tuning.
//!
//! The temperature is learned in log space so that `alpha = exp(log_alpha)`
//! stays strictly positive whatever the optimizer does:
//!
//! ```text
//! L(log_alpha) = -mean(log_alpha * (log_pi + H_target))
//! ```
//!
//! When the policy entropy drops below `H_target` (log_pi too high), the
//! gradient pushes `log_alpha` up and the entropy bonus grows.

use burn::module::{Module, Param};
use burn::prelude::*;
use burn::tensor::ElementConversion;

/// Trainable entropy temperature.
#[derive(Module, Debug)]
pub struct Temperature<B: Backend> {
    /// Unconstrained log of the temperature.
    pub log_alpha: Param<Tensor<B, 1>>,
}

impl<B: Backend> Temperature<B> {
    /// Create a temperature with `log_alpha = init_log_alpha`.
    pub fn new(init_log_alpha: f32, device: &B::Device) -> Self {
        Self {
            log_alpha: Param::from_tensor(Tensor::from_floats([init_log_alpha], device)),
        }
    }

    /// Current `alpha = exp(log_alpha)` as a host value.
    pub fn alpha(&self) -> f32 {
        self.log_alpha().exp()
    }

    /// Current `log_alpha` as a host value.
    pub fn log_alpha(&self) -> f32 {
        self.log_alpha.val().into_scalar().elem::<f32>()
    }

    /// Temperature loss for a batch of detached log-probabilities `[batch, 1]`.
    pub fn loss(&self, log_pi: Tensor<B, 2>, target_entropy: f32) -> Tensor<B, 1> {
        let log_alpha = self.log_alpha.val().unsqueeze_dim::<2>(0);
        (log_alpha * log_pi.add_scalar(target_entropy)).mean().neg()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::sac::actor::tensor_to_vec;
    use crate::algorithms::sac::config::target_entropy_continuous;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::{AdamConfig, GradientsParams, Optimizer};

    type B = NdArray<f32>;
    type AB = Autodiff<NdArray<f32>>;

    #[test]
    fn test_alpha_is_positive() {
        let device = Default::default();
        for log_alpha in [-20.0f32, -3.0, 0.0, 2.0, 10.0] {
            let temperature = Temperature::<B>::new(log_alpha, &device);
            let alpha = temperature.alpha();
            assert!(alpha > 0.0, "log_alpha={log_alpha} gave alpha={alpha}");
            assert!((alpha - log_alpha.exp()).abs() <= 1e-4 * log_alpha.exp().max(1.0));
        }
    }

    #[test]
    fn test_initial_alpha_is_one() {
        let temperature = Temperature::<B>::new(0.0, &Default::default());
        assert_eq!(temperature.alpha(), 1.0);
        assert_eq!(temperature.log_alpha(), 0.0);
    }

    #[test]
    fn test_loss_value() {
        let device = Default::default();
        let temperature = Temperature::<B>::new(0.5, &device);
        let log_pi = Tensor::<B, 1>::from_floats([1.0, 3.0], &device).reshape([2, 1]);

        // -mean(0.5 * (log_pi - 1)) = -mean(0.0, 1.0) = -0.5
        let loss = tensor_to_vec(temperature.loss(log_pi, -1.0)).unwrap()[0];
        assert!((loss + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_low_entropy_raises_alpha() {
        let device = Default::default();
        let mut temperature = Temperature::<AB>::new(0.0, &device);
        let mut optim = AdamConfig::new().init::<AB, Temperature<AB>>();

        // log_pi far above -H_target means the policy is too certain
        let log_pi = Tensor::<AB, 2>::full([4, 1], 5.0, &device);
        let loss = temperature.loss(log_pi, target_entropy_continuous(1));
        let grads = GradientsParams::from_grads(loss.backward(), &temperature);
        temperature = optim.step(1e-2, temperature, grads);

        assert!(temperature.alpha() > 1.0);
    }
}
