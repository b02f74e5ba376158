//! # Distributed SAC
//!
//! Soft Actor-Critic with many environment-stepping agents feeding one
//! learner through a shared replay table. The critic is an ensemble of
//! quantile networks with truncated targets, exploration uses
//! state-dependent noise (gSDE).
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Distributed SAC                             │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  Thread 1          Thread 2          Thread N                       │
//! │  ┌────────┐        ┌────────┐        ┌────────┐                     │
//! │  │Agent 0 │        │Agent 1 │        │Agent N │                     │
//! │  │ env    │        │ env    │        │ env    │                     │
//! │  │ actor  │        │ actor  │        │ actor  │                     │
//! │  └──┬──▲──┘        └──┬──▲──┘        └──┬──▲──┘                     │
//! │     │  │              │  │              │  │                        │
//! │     └──┼──────────────┼──┼──────────────┘  │  commit / pull         │
//! │        ▼              ▼  │                 │                        │
//! │  ┌─────────────────┐  ┌──┴─────────────────┴──┐                     │
//! │  │ ExperienceStore │  │   VariableChannel     │                     │
//! │  │ (FIFO, uniform) │  │ (actor bytes, stop)   │                     │
//! │  └────────┬────────┘  └──────────▲────────────┘                     │
//! │           │ sample               │ push                             │
//! │           ▼                      │                                  │
//! │  ┌────────────────────────────────┴──┐                              │
//! │  │ Learner (actor, MultiCritic, α)   │                              │
//! │  └───────────────────────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both tables are reachable over TCP through [`ReplayServer`] and
//! [`ReplayClient`], so agents can live in other processes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use burn::backend::{Autodiff, NdArray};
//! use distributed_sac::{DistributedConfig, DistributedSac, LearnerConfig, Pendulum, StoreConfig};
//!
//! type B = Autodiff<NdArray<f32>>;
//!
//! let learner = LearnerConfig::new(3, 1).with_steps(1_000, 20_000);
//! let config = DistributedConfig::new(learner)
//!     .with_agents(4)
//!     .with_store(StoreConfig::new(100_000, 1_000));
//!
//! let runner = DistributedSac::new(config)?;
//! let report = runner.run::<B, _, _>(|id| Ok(Pendulum::new(id as u64)), &Default::default())?;
//! ```

pub mod algorithms;
pub mod checkpoint;
pub mod core;
pub mod environment;
pub mod error;
pub mod metrics;
pub mod runners;
pub mod service;

pub use error::{Error, Result};

// Shared tables
pub use crate::core::experience_store::{ExperienceStore, SharedExperienceStore, StoreConfig};
pub use crate::core::tables::{ExperienceTable, VariableTable};
pub use crate::core::transition::{Transition, TransitionBatch};
pub use crate::core::variable_channel::{Pull, SharedVariableChannel, VariableChannel, VariableSnapshot};

// Networks and update
pub use algorithms::sac::{
    Actor, ActorConfig, CriticConfig, MultiCritic, SacConfig, SacLossInfo, SacState,
    StateDependentNoise, Temperature,
};

// Processes
pub use runners::{
    Agent, AgentConfig, AgentState, AgentStats, DistributedConfig, DistributedReport,
    DistributedSac, Learner, LearnerConfig, Tester, TesterConfig, TesterStats, TrainedModels,
};

// Remote tables
pub use service::{ReplayClient, ReplayServer, RetryPolicy, ServerHandle};

pub use environment::{EnvStep, Environment, Pendulum};

pub use metrics::{
    shared_logger, training_metrics, CsvLogger, MetricsLogger, MultiLogger, SharedMetricsLogger,
    SharedTrainingMetrics, TracingLogger, TrainingMetrics,
};

pub use checkpoint::{load_module, save_module, Checkpointer};
