//! Soft Actor-Critic with a truncated quantile critic ensemble and
//! state-dependent exploration.
//!
//! # Architecture
//!
//! ```text
//! Actor (autodiff)                    MultiCritic (autodiff)
//! ├── fc1 → relu                      ├── Critic 0: state/action branches → quantiles
//! ├── latent → relu ──┐               ├── ...
//! ├── mean → clip     │               └── Critic n-1
//! └── gSDE noise ←────┘
//!                                     Target MultiCritic (inner backend)
//! Temperature (log_alpha)             └── Polyak average of the live ensemble
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use distributed_sac::algorithms::sac::{ActorConfig, CriticConfig, SacConfig, SacState};
//!
//! let config = SacConfig::default();
//! let actor = ActorConfig::new(3, 1).init::<B>(&device);
//! let critic = CriticConfig::new(3, 1).init::<B>(&device);
//! let mut state = SacState::new(actor, critic, config, &device)?;
//!
//! let (next, info) = state.update(&batch)?;
//! state = next;
//! ```

pub mod actor;
pub mod config;
pub mod critic;
pub mod entropy_tuning;
pub mod losses;
pub mod noise;
pub mod update;

pub use actor::{Actor, ActorConfig, ActorOutput, MEAN_CLIP};
pub use config::{target_entropy_continuous, SacConfig};
pub use critic::{truncated_quantile_mean, Critic, CriticConfig, MultiCritic};
pub use entropy_tuning::Temperature;
pub use losses::{actor_loss, quantile_huber_loss, soft_td_target};
pub use noise::{StateDependentNoise, LOG_STD_INIT, VARIANCE_FLOOR};
pub use update::{SacLossInfo, SacState};
