//! Model persistence.
//!
//! ```rust,ignore
//! use distributed_sac::checkpoint::{load_module, Checkpointer};
//!
//! let checkpointer = Checkpointer::new("./runs/pendulum")?;
//! checkpointer.save(&actor, &critic)?;
//!
//! let actor = load_module(ActorConfig::new(3, 1).init(&device), checkpointer.actor_path(), &device)?;
//! ```

pub mod checkpointer;

pub use checkpointer::{
    load_if_present, load_module, module_from_bytes, module_to_bytes, param_shapes, save_module,
    Checkpointer, ACTOR_FILE, CRITIC_FILE,
};
