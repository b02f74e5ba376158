//! Single-slot parameter table between the learner and the agents.
//!
//! The learner serializes its actor with `BinBytesRecorder` and pushes the
//! bytes together with the current training step. Agents pull every
//! `update_interval` steps and keep acting with their cached weights when the
//! slot is not readable.
//!
//! ```text
//! Learner                                   Agent
//! ┌──────────────────┐                      ┌──────────────────┐
//! │ into_record()    │                      │ load_record()    │
//! │       ↓          │                      │       ↑          │
//! │ recorder.record()│                      │ recorder.load()  │
//! │       ↓          │                      │       ↑          │
//! │ push(bytes, t) ─────VariableChannel─────→ pull() / Unavailable
//! └──────────────────┘                      └──────────────────┘
//! ```
//!
//! # Consistency
//!
//! - Writers replace an `Arc<VariableSnapshot>` under a write lock, so a
//!   reader receives either the old or the new snapshot, never a mix.
//! - Readers use `try_read`: an uninitialized slot and a read racing a push
//!   both yield [`Pull::Unavailable`].
//! - `train_step` never decreases; the stop flag is a one-way latch.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::tables::VariableTable;
use crate::error::{Error, Result};

// ============================================================================
// Version Counter
// ============================================================================

/// Monotonically increasing push counter.
#[derive(Debug, Default)]
pub struct VersionCounter {
    version: AtomicU64,
}

impl VersionCounter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the new version.
    pub fn increment(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current version.
    pub fn current(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Contents of the parameter slot as seen by a reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSnapshot {
    /// Serialized actor record (full precision).
    pub actor: Vec<u8>,
    /// Learner step at which the actor was published.
    pub train_step: u64,
    /// Number of environment steps agents act randomly before using the policy.
    pub warmup_steps: u64,
    /// Agents must wind down once this is set.
    pub stop_agents: bool,
    /// Channel version of this snapshot.
    pub version: u64,
}

/// Outcome of a pull.
#[derive(Debug, Clone, PartialEq)]
pub enum Pull {
    /// A complete snapshot.
    Ready(VariableSnapshot),
    /// Slot not initialized yet, or a push is in progress. Retry next cycle.
    Unavailable,
}

impl Pull {
    /// Convert into an option, discarding the unavailable case.
    pub fn ready(self) -> Option<VariableSnapshot> {
        match self {
            Pull::Ready(snapshot) => Some(snapshot),
            Pull::Unavailable => None,
        }
    }

    /// Check if this pull produced a snapshot.
    pub fn is_ready(&self) -> bool {
        matches!(self, Pull::Ready(_))
    }
}

/// Slot payload written by the learner.
#[derive(Debug)]
struct Slot {
    actor: Vec<u8>,
    train_step: u64,
    version: u64,
}

// ============================================================================
// Variable Channel
// ============================================================================

/// Thread-safe single-slot parameter cache.
///
/// Single writer (the learner), many readers (the agents).
pub struct VariableChannel {
    slot: RwLock<Option<Arc<Slot>>>,
    warmup_steps: u64,
    stop: AtomicBool,
    version: VersionCounter,
}

impl VariableChannel {
    /// Create an empty channel.
    pub fn new(warmup_steps: u64) -> Self {
        Self {
            slot: RwLock::new(None),
            warmup_steps,
            stop: AtomicBool::new(false),
            version: VersionCounter::new(),
        }
    }

    /// Create a new shared channel.
    pub fn shared(warmup_steps: u64) -> SharedVariableChannel {
        Arc::new(Self::new(warmup_steps))
    }

    /// Overwrite the slot.
    ///
    /// Fails with [`Error::StaleTrainStep`] if `train_step` is lower than the
    /// step already published.
    pub fn push(&self, actor: Vec<u8>, train_step: u64) -> Result<()> {
        let mut guard = self.slot.write();
        if let Some(current) = guard.as_ref() {
            if train_step < current.train_step {
                return Err(Error::StaleTrainStep {
                    current: current.train_step,
                    attempted: train_step,
                });
            }
        }
        let version = self.version.increment();
        *guard = Some(Arc::new(Slot {
            actor,
            train_step,
            version,
        }));
        Ok(())
    }

    /// Best-effort read of the slot.
    pub fn pull(&self) -> Pull {
        let slot = match self.slot.try_read() {
            Some(guard) => guard.clone(),
            None => return Pull::Unavailable,
        };

        match slot {
            Some(slot) => Pull::Ready(VariableSnapshot {
                actor: slot.actor.clone(),
                train_step: slot.train_step,
                warmup_steps: self.warmup_steps,
                stop_agents: self.stop.load(Ordering::Acquire),
                version: slot.version,
            }),
            None => Pull::Unavailable,
        }
    }

    /// Latch the stop flag. There is no way to clear it.
    pub fn set_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Check the stop flag.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Number of pushes so far.
    pub fn version(&self) -> u64 {
        self.version.current()
    }

    /// Warmup length advertised to agents.
    pub fn warmup_steps(&self) -> u64 {
        self.warmup_steps
    }

    /// Last published train step, if any.
    pub fn train_step(&self) -> Option<u64> {
        self.slot.read().as_ref().map(|slot| slot.train_step)
    }
}

/// Thread-safe shared variable channel.
pub type SharedVariableChannel = Arc<VariableChannel>;

impl VariableTable for VariableChannel {
    fn push(&self, actor: Vec<u8>, train_step: u64) -> Result<()> {
        VariableChannel::push(self, actor, train_step)
    }

    fn pull(&self) -> Result<Pull> {
        Ok(VariableChannel::pull(self))
    }

    fn set_stop(&self) -> Result<()> {
        VariableChannel::set_stop(self);
        Ok(())
    }

    fn is_stopped(&self) -> Result<bool> {
        Ok(VariableChannel::is_stopped(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_unavailable_before_first_push() {
        let channel = VariableChannel::new(100);
        assert_eq!(channel.pull(), Pull::Unavailable);
        assert_eq!(channel.version(), 0);
        assert!(channel.train_step().is_none());
    }

    #[test]
    fn test_push_then_pull() {
        let channel = VariableChannel::new(100);
        channel.push(vec![1, 2, 3], 5).unwrap();

        let snapshot = channel.pull().ready().unwrap();
        assert_eq!(snapshot.actor, vec![1, 2, 3]);
        assert_eq!(snapshot.train_step, 5);
        assert_eq!(snapshot.warmup_steps, 100);
        assert!(!snapshot.stop_agents);
        assert_eq!(snapshot.version, 1);
    }

    #[test]
    fn test_push_overwrites() {
        let channel = VariableChannel::new(0);
        channel.push(vec![1], 1).unwrap();
        channel.push(vec![2], 2).unwrap();

        let snapshot = channel.pull().ready().unwrap();
        assert_eq!(snapshot.actor, vec![2]);
        assert_eq!(snapshot.train_step, 2);
        assert_eq!(channel.version(), 2);
    }

    #[test]
    fn test_train_step_never_decreases() {
        let channel = VariableChannel::new(0);
        channel.push(vec![1], 10).unwrap();

        let err = channel.push(vec![2], 9).unwrap_err();
        assert!(matches!(
            err,
            Error::StaleTrainStep {
                current: 10,
                attempted: 9
            }
        ));

        // Equal step is accepted (final push after stop)
        channel.push(vec![3], 10).unwrap();
        assert_eq!(channel.pull().ready().unwrap().actor, vec![3]);
    }

    #[test]
    fn test_stop_latch() {
        let channel = VariableChannel::new(0);
        channel.push(vec![0], 0).unwrap();
        assert!(!channel.is_stopped());

        channel.set_stop();
        channel.push(vec![1], 1).unwrap();

        assert!(channel.is_stopped());
        assert!(channel.pull().ready().unwrap().stop_agents);
    }

    #[test]
    fn test_pull_during_write_is_unavailable() {
        let channel = VariableChannel::new(0);
        channel.push(vec![0], 0).unwrap();

        let guard = channel.slot.write();
        assert_eq!(channel.pull(), Pull::Unavailable);
        drop(guard);

        assert!(channel.pull().is_ready());
    }

    #[test]
    fn test_concurrent_push_pull_no_torn_reads() {
        const PAYLOAD: usize = 4096;
        let channel = VariableChannel::new(0);

        thread::scope(|scope| {
            let channel = &channel;
            scope.spawn(move || {
                for step in 0..500u64 {
                    let byte = (step % 251) as u8;
                    channel.push(vec![byte; PAYLOAD], step).unwrap();
                }
            });

            for _ in 0..4 {
                scope.spawn(move || {
                    let mut last_step = 0u64;
                    for _ in 0..2000 {
                        if let Pull::Ready(snapshot) = channel.pull() {
                            let first = snapshot.actor[0];
                            assert!(snapshot.actor.iter().all(|&b| b == first));
                            assert_eq!(first, (snapshot.train_step % 251) as u8);
                            assert!(snapshot.train_step >= last_step);
                            last_step = snapshot.train_step;
                        }
                    }
                });
            }
        });
    }
}
