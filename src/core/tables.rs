//! Table traits through which agents and the learner reach the shared
//! mediators.
//!
//! Two tables make up the replay service:
//!
//! - **experience**: transitions committed by agents, sampled by the learner
//! - **variables**: a single slot holding the latest actor parameters
//!
//! Both are implemented by the in-process [`ExperienceStore`] /
//! [`VariableChannel`] and by the TCP [`ReplayClient`], so the same agent and
//! learner code runs on threads or in separate processes.
//!
//! [`ExperienceStore`]: crate::core::experience_store::ExperienceStore
//! [`VariableChannel`]: crate::core::variable_channel::VariableChannel
//! [`ReplayClient`]: crate::service::client::ReplayClient

use std::path::PathBuf;
use std::sync::Arc;

use crate::core::transition::Transition;
use crate::core::variable_channel::Pull;
use crate::error::Result;

/// Name of the transition table.
pub const EXPERIENCE_TABLE: &str = "experience";

/// Name of the single-slot parameter table.
pub const VARIABLES_TABLE: &str = "variables";

/// Write/sample access to the experience table.
pub trait ExperienceTable: Send + Sync {
    /// Append a transition. Overflow evicts the oldest entry.
    ///
    /// `priority` is stored with the entry but does not affect sampling.
    fn commit(&self, transition: Transition, priority: f64) -> Result<()>;

    /// Draw `batch_size` transitions uniformly with replacement.
    ///
    /// Returns `Ok(None)` while the table is below its minimum size.
    fn sample(&self, batch_size: usize) -> Result<Option<Vec<Transition>>>;

    /// Number of stored transitions.
    fn len(&self) -> Result<usize>;

    /// Persist the table. Returns `Ok(None)` when no checkpoint location is
    /// configured.
    fn checkpoint(&self) -> Result<Option<PathBuf>>;
}

/// Access to the single-slot parameter table.
pub trait VariableTable: Send + Sync {
    /// Overwrite the slot with new actor parameters.
    fn push(&self, actor: Vec<u8>, train_step: u64) -> Result<()>;

    /// Read the slot. `Pull::Unavailable` is a normal outcome.
    fn pull(&self) -> Result<Pull>;

    /// Latch the stop flag.
    fn set_stop(&self) -> Result<()>;

    /// Read the stop flag without fetching parameters.
    fn is_stopped(&self) -> Result<bool>;
}

impl<T: ExperienceTable + ?Sized> ExperienceTable for Arc<T> {
    fn commit(&self, transition: Transition, priority: f64) -> Result<()> {
        (**self).commit(transition, priority)
    }

    fn sample(&self, batch_size: usize) -> Result<Option<Vec<Transition>>> {
        (**self).sample(batch_size)
    }

    fn len(&self) -> Result<usize> {
        (**self).len()
    }

    fn checkpoint(&self) -> Result<Option<PathBuf>> {
        (**self).checkpoint()
    }
}

impl<T: VariableTable + ?Sized> VariableTable for Arc<T> {
    fn push(&self, actor: Vec<u8>, train_step: u64) -> Result<()> {
        (**self).push(actor, train_step)
    }

    fn pull(&self) -> Result<Pull> {
        (**self).pull()
    }

    fn set_stop(&self) -> Result<()> {
        (**self).set_stop()
    }

    fn is_stopped(&self) -> Result<bool> {
        (**self).is_stopped()
    }
}
