//! Training processes.
//!
//! - [`Learner`]: samples the experience table, runs the SAC update and
//!   publishes the actor
//! - [`Agent`]: acts in one environment and commits transitions
//! - [`Tester`]: deterministic evaluation without any write path
//! - [`DistributedSac`]: N agent threads + 1 learner thread in one process
//!
//! The learner and the agents only see the [`ExperienceTable`] and
//! [`VariableTable`] traits, so the same code runs against the in-process
//! tables or against a [`ReplayClient`] in another process.
//!
//! [`ExperienceTable`]: crate::core::tables::ExperienceTable
//! [`VariableTable`]: crate::core::tables::VariableTable
//! [`ReplayClient`]: crate::service::ReplayClient

pub mod agent;
pub mod distributed;
pub mod learner;
pub mod tester;

pub use agent::{Agent, AgentConfig, AgentState, AgentStats, DEFAULT_PRIORITY};
pub use distributed::{DistributedConfig, DistributedReport, DistributedSac};
pub use learner::{Learner, LearnerConfig, TrainedModels};
pub use tester::{Tester, TesterConfig, TesterStats};
