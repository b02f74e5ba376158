//! Core data types and the two shared tables.

pub mod episode_history;
pub mod experience_store;
pub mod tables;
pub mod target_network;
pub mod transition;
pub mod variable_channel;

pub use episode_history::EpisodeHistory;
pub use experience_store::{ExperienceStore, SharedExperienceStore, StoreConfig};
pub use tables::{ExperienceTable, VariableTable, EXPERIENCE_TABLE, VARIABLES_TABLE};
pub use target_network::{hard_copy, soft_update};
pub use transition::{StepRecord, Transition, TransitionBatch};
pub use variable_channel::{
    Pull, SharedVariableChannel, VariableChannel, VariableSnapshot, VersionCounter,
};
