//! Loss terms of the SAC update.

use burn::prelude::*;

/// Huber threshold between the quadratic and linear regimes.
pub const HUBER_DELTA: f32 = 1.0;

/// Huber loss between a scalar target per sample `[batch, 1]` and every
/// predicted quantile `[batch, n_critics, n_quantiles]`, averaged over all
/// elements.
///
/// ```text
/// huber(d) = 0.5 d²            if |d| <= 1
///          = |d| - 0.5         otherwise
/// ```
pub fn quantile_huber_loss<B: Backend>(target: Tensor<B, 2>, quantiles: Tensor<B, 3>) -> Tensor<B, 1> {
    let target = target.unsqueeze_dim::<3>(2);
    let abs_error = (target - quantiles).abs();
    let quadratic = abs_error.clone().clamp_max(HUBER_DELTA);
    let linear = abs_error - quadratic.clone();
    (quadratic.powf_scalar(2.0).mul_scalar(0.5) + linear.mul_scalar(HUBER_DELTA)).mean()
}

/// Soft Bellman target
/// `y = r + (1 - terminal) * gamma * (next_q - alpha * next_log_pi)`.
///
/// All inputs are `[batch, 1]`. The caller computes them without gradient.
pub fn soft_td_target<B: Backend>(
    rewards: Tensor<B, 2>,
    terminals: Tensor<B, 2>,
    next_q: Tensor<B, 2>,
    next_log_pi: Tensor<B, 2>,
    gamma: f32,
    alpha: f32,
) -> Tensor<B, 2> {
    let next_value = next_q - next_log_pi.mul_scalar(alpha);
    let not_done = terminals.neg().add_scalar(1.0);
    rewards + not_done.mul_scalar(gamma) * next_value
}

/// Policy loss `mean(alpha * log_pi - q)`.
pub fn actor_loss<B: Backend>(log_pi: Tensor<B, 2>, q: Tensor<B, 2>, alpha: f32) -> Tensor<B, 1> {
    (log_pi.mul_scalar(alpha) - q).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::sac::actor::tensor_to_vec;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    fn column(values: &[f32]) -> Tensor<B, 2> {
        Tensor::<B, 1>::from_floats(values, &Default::default()).reshape([values.len(), 1])
    }

    fn scalar(t: Tensor<B, 1>) -> f32 {
        tensor_to_vec(t).unwrap()[0]
    }

    #[test]
    fn test_huber_quadratic_and_linear_regimes() {
        let device = Default::default();
        let target = column(&[0.0]);
        // errors 0.5 and 3.0 → 0.125 and 2.5
        let quantiles = Tensor::<B, 1>::from_floats([0.5, -3.0], &device).reshape([1, 1, 2]);
        let loss = scalar(quantile_huber_loss(target, quantiles));
        assert!((loss - (0.125 + 2.5) / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_huber_zero_at_target() {
        let device = Default::default();
        let target = column(&[2.0, -1.0]);
        let quantiles = Tensor::<B, 1>::from_floats([2.0, 2.0, 2.0, -1.0, -1.0, -1.0], &device)
            .reshape([2, 1, 3]);
        assert_eq!(scalar(quantile_huber_loss(target, quantiles)), 0.0);
    }

    #[test]
    fn test_huber_broadcasts_target_over_ensemble() {
        let device = Default::default();
        let target = column(&[1.0]);
        let quantiles = Tensor::<B, 3>::zeros([1, 2, 4], &device);
        // every error is 1.0 → 0.5
        assert!((scalar(quantile_huber_loss(target, quantiles)) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_td_target_values() {
        let y = soft_td_target(
            column(&[1.0, 1.0]),
            column(&[0.0, 1.0]),
            column(&[10.0, 10.0]),
            column(&[2.0, 2.0]),
            0.5,
            0.5,
        );
        // non-terminal: 1 + 0.5 * (10 - 1) = 5.5, terminal: 1
        assert_eq!(tensor_to_vec(y).unwrap(), vec![5.5, 1.0]);
    }

    #[test]
    fn test_actor_loss_value() {
        let loss = actor_loss(column(&[1.0, -1.0]), column(&[3.0, 1.0]), 2.0);
        // mean(2 - 3, -2 - 1) = -2
        assert!((scalar(loss) + 2.0).abs() < 1e-6);
    }
}
