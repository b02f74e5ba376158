//! Learning algorithms.
//!
//! - `sac`: Soft Actor-Critic networks, losses and the learner update

pub mod sac;

pub use sac::{
    Actor, ActorConfig, CriticConfig, MultiCritic, SacConfig, SacLossInfo, SacState, Temperature,
};
