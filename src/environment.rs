//! Environment abstraction for the agents and the tester.
//!
//! Agents drive one environment each. Actions are exchanged in the policy's
//! squashed range `[-1, 1]`; an environment rescales them to its own bounds.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

use crate::error::{Error, Result};

/// Result of one environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvStep {
    /// Observation after the step.
    pub observation: Vec<f32>,
    /// Reward for the step.
    pub reward: f32,
    /// Episode ended (goal, failure or time limit).
    pub terminal: bool,
}

/// Single continuous-control environment.
pub trait Environment: Send {
    /// Size of the observation vector.
    fn observation_dim(&self) -> usize;

    /// Size of the action vector.
    fn action_dim(&self) -> usize;

    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Vec<f32>;

    /// Apply `action` (each component in `[-1, 1]`).
    fn step(&mut self, action: &[f32]) -> Result<EnvStep>;

    /// Draw a uniformly random action in `[-1, 1]^action_dim`.
    fn sample_action(&mut self) -> Vec<f32>;
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn observation_dim(&self) -> usize {
        (**self).observation_dim()
    }

    fn action_dim(&self) -> usize {
        (**self).action_dim()
    }

    fn reset(&mut self) -> Vec<f32> {
        (**self).reset()
    }

    fn step(&mut self, action: &[f32]) -> Result<EnvStep> {
        (**self).step(action)
    }

    fn sample_action(&mut self) -> Vec<f32> {
        (**self).sample_action()
    }
}

// ============================================================================
// Pendulum
// ============================================================================

/// Classic pendulum swing-up.
///
/// Observation `[cos θ, sin θ, θ̇]`, one torque action scaled to `±2`, reward
/// `-(θ² + 0.1 θ̇² + 0.001 u²)`. Episodes end after [`Pendulum::MAX_STEPS`].
#[derive(Debug, Clone)]
pub struct Pendulum {
    theta: f32,
    theta_dot: f32,
    steps: usize,
    rng: StdRng,
}

impl Pendulum {
    /// Episode length.
    pub const MAX_STEPS: usize = 200;
    /// `[cos θ, sin θ, θ̇]`
    pub const OBS_DIM: usize = 3;
    /// Torque.
    pub const ACTION_DIM: usize = 1;
    const MAX_SPEED: f32 = 8.0;
    const MAX_TORQUE: f32 = 2.0;
    const DT: f32 = 0.05;
    const G: f32 = 10.0;
    const M: f32 = 1.0;
    const L: f32 = 1.0;

    /// Create a pendulum with a seeded random generator.
    pub fn new(seed: u64) -> Self {
        let mut env = Self {
            theta: 0.0,
            theta_dot: 0.0,
            steps: 0,
            rng: StdRng::seed_from_u64(seed),
        };
        env.reset();
        env
    }

    /// Current `(θ, θ̇)`.
    pub fn state(&self) -> (f32, f32) {
        (self.theta, self.theta_dot)
    }

    fn observation(&self) -> Vec<f32> {
        vec![self.theta.cos(), self.theta.sin(), self.theta_dot]
    }
}

/// Wrap an angle to `[-π, π)`.
fn angle_normalize(x: f32) -> f32 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

impl Environment for Pendulum {
    fn observation_dim(&self) -> usize {
        Self::OBS_DIM
    }

    fn action_dim(&self) -> usize {
        Self::ACTION_DIM
    }

    fn reset(&mut self) -> Vec<f32> {
        self.theta = self.rng.gen_range(-PI..PI);
        self.theta_dot = self.rng.gen_range(-1.0..1.0);
        self.steps = 0;
        self.observation()
    }

    fn step(&mut self, action: &[f32]) -> Result<EnvStep> {
        let [a] = action else {
            return Err(Error::Environment(format!(
                "pendulum expects 1 action, got {}",
                action.len()
            )));
        };
        if !a.is_finite() {
            return Err(Error::Environment(format!("non-finite action {a}")));
        }

        let u = (a * Self::MAX_TORQUE).clamp(-Self::MAX_TORQUE, Self::MAX_TORQUE);
        let th = self.theta;
        let cost = angle_normalize(th).powi(2) + 0.1 * self.theta_dot.powi(2) + 0.001 * u.powi(2);

        let accel = 3.0 * Self::G / (2.0 * Self::L) * th.sin()
            + 3.0 / (Self::M * Self::L.powi(2)) * u;
        self.theta_dot =
            (self.theta_dot + accel * Self::DT).clamp(-Self::MAX_SPEED, Self::MAX_SPEED);
        self.theta = th + self.theta_dot * Self::DT;
        self.steps += 1;

        Ok(EnvStep {
            observation: self.observation(),
            reward: -cost,
            terminal: self.steps >= Self::MAX_STEPS,
        })
    }

    fn sample_action(&mut self) -> Vec<f32> {
        vec![self.rng.gen_range(-1.0..=1.0)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_length() {
        let mut env = Pendulum::new(0);
        env.reset();
        for i in 1..=Pendulum::MAX_STEPS {
            let step = env.step(&[0.0]).unwrap();
            assert_eq!(step.terminal, i == Pendulum::MAX_STEPS);
        }
    }

    #[test]
    fn test_observation_shape_and_bounds() {
        let mut env = Pendulum::new(1);
        let obs = env.reset();
        assert_eq!(obs.len(), env.observation_dim());
        assert!((obs[0].powi(2) + obs[1].powi(2) - 1.0).abs() < 1e-5);

        for _ in 0..50 {
            let action = env.sample_action();
            assert!((-1.0..=1.0).contains(&action[0]));
            let step = env.step(&action).unwrap();
            assert!(step.reward <= 0.0);
            assert!(step.observation[2].abs() <= 8.0);
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let mut a = Pendulum::new(42);
        let mut b = Pendulum::new(42);
        assert_eq!(a.reset(), b.reset());
        assert_eq!(a.sample_action(), b.sample_action());
    }

    #[test]
    fn test_wrong_action_dim() {
        let mut env = Pendulum::new(0);
        assert!(matches!(env.step(&[0.0, 1.0]), Err(Error::Environment(_))));
        assert!(matches!(env.step(&[f32::NAN]), Err(Error::Environment(_))));
    }

    #[test]
    fn test_upright_at_rest_costs_nothing() {
        let mut env = Pendulum::new(0);
        env.theta = 0.0;
        env.theta_dot = 0.0;
        let step = env.step(&[0.0]).unwrap();
        assert_eq!(step.reward, 0.0);
    }

    #[test]
    fn test_angle_normalize() {
        assert!((angle_normalize(2.0 * PI + 0.5) - 0.5).abs() < 1e-5);
        assert!((angle_normalize(-0.5) + 0.5).abs() < 1e-6);
    }
}
