//! Experience store: the shared transition table of the replay service.
//!
//! - **Uniform random sampling** with replacement
//! - **Ring buffer** storage, FIFO eviction once capacity is reached
//! - **Minimum-size gate**: nothing is sampled until `min_size` entries exist
//! - **Checkpoint/restore** of the full table, including the write cursor
//!
//! Agents push through a lock-free injection queue; pending entries are moved
//! into the ring under a write lock before every read, so commits never wait
//! on the learner.

use crossbeam_queue::SegQueue;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use super::tables::ExperienceTable;
use super::transition::Transition;
use crate::error::{Error, Result};

/// File name used for store checkpoints inside the checkpoint directory.
pub const CHECKPOINT_FILE: &str = "experience.ckpt";

// ============================================================================
// Store Configuration
// ============================================================================

/// Configuration for the experience store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of transitions to keep.
    pub capacity: usize,
    /// Minimum number of stored transitions before sampling is allowed.
    /// Equal to the warmup length of the training run.
    pub min_size: usize,
    /// Directory receiving checkpoints. `None` disables `checkpoint()`.
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000_000,
            min_size: 10_000,
            checkpoint_dir: None,
        }
    }
}

impl StoreConfig {
    /// Create a new store config.
    pub fn new(capacity: usize, min_size: usize) -> Self {
        Self {
            capacity,
            min_size,
            checkpoint_dir: None,
        }
    }

    /// Builder pattern: set capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builder pattern: set minimum size.
    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Builder pattern: set checkpoint directory.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidConfig("store capacity must be positive".into()));
        }
        if self.min_size > self.capacity {
            return Err(Error::InvalidConfig(format!(
                "store min_size ({}) exceeds capacity ({})",
                self.min_size, self.capacity
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Ring Buffer (Internal)
// ============================================================================

/// A stored transition with its (currently unused) priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    transition: Transition,
    priority: f64,
}

/// Ring buffer with O(1) insert and random access.
///
/// Overwrites the oldest element when capacity is reached. Once full,
/// `write_pos` always points at the oldest surviving entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RingBuffer<T> {
    buffer: Vec<T>,
    capacity: usize,
    write_pos: usize,
}

impl<T: Clone> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity.min(1 << 20)),
            capacity,
            write_pos: 0,
        }
    }

    fn push(&mut self, item: T) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(item);
        } else {
            self.buffer[self.write_pos] = item;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    #[inline]
    fn get(&self, idx: usize) -> &T {
        &self.buffer[idx]
    }

    #[inline]
    fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Items from oldest to newest.
    fn iter_oldest_first(&self) -> impl Iterator<Item = &T> {
        let split = if self.buffer.len() < self.capacity {
            0
        } else {
            self.write_pos
        };
        self.buffer[split..].iter().chain(self.buffer[..split].iter())
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.write_pos = 0;
    }

    /// Check that the cursor agrees with the contents.
    fn is_consistent(&self) -> bool {
        if self.capacity == 0 || self.buffer.len() > self.capacity {
            return false;
        }
        if self.buffer.len() < self.capacity {
            self.write_pos == self.buffer.len() % self.capacity
        } else {
            self.write_pos < self.capacity
        }
    }
}

/// On-disk form of a store checkpoint.
#[derive(Serialize, Deserialize)]
struct StoreCheckpoint {
    storage: RingBuffer<Entry>,
    total_committed: u64,
}

// ============================================================================
// Experience Store
// ============================================================================

/// Thread-safe uniform replay table.
///
/// # Key Properties
/// - **Lock-free commit**: agents push concurrently without blocking
/// - **Uniform sampling**: every stored transition is equally likely
/// - **FIFO eviction**: `len() == min(total_committed(), capacity())`
/// - **Rate limiting**: `sample` refuses until `min_size` entries exist
pub struct ExperienceStore {
    config: StoreConfig,
    /// Lock-free MPMC queue for agent commits.
    pending: SegQueue<Entry>,
    /// Consolidated ring storage.
    storage: RwLock<RingBuffer<Entry>>,
    /// Consolidated size (atomic for fast reads).
    size: AtomicUsize,
    /// Commits accepted since creation (or since the restored checkpoint).
    total_committed: AtomicU64,
}

impl ExperienceStore {
    /// Create a new, empty store.
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pending: SegQueue::new(),
            storage: RwLock::new(RingBuffer::new(config.capacity)),
            size: AtomicUsize::new(0),
            total_committed: AtomicU64::new(0),
            config,
        })
    }

    /// Rebuild a store from a checkpoint file.
    ///
    /// Capacity and contents come from the file; `min_size` and the checkpoint
    /// directory come from `config`.
    pub fn restore(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let checkpoint: StoreCheckpoint =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;

        if !checkpoint.storage.is_consistent() {
            return Err(Error::InvalidConfig(format!(
                "corrupt store checkpoint at {}",
                path.display()
            )));
        }

        if checkpoint.storage.capacity != config.capacity {
            tracing::warn!(
                file_capacity = checkpoint.storage.capacity,
                config_capacity = config.capacity,
                "restored store keeps the capacity recorded in the checkpoint"
            );
        }

        let config = StoreConfig {
            capacity: checkpoint.storage.capacity,
            ..config
        };
        config.validate()?;

        let len = checkpoint.storage.len();
        tracing::info!(path = %path.display(), entries = len, "restored experience store");

        Ok(Self {
            pending: SegQueue::new(),
            size: AtomicUsize::new(len),
            total_committed: AtomicU64::new(checkpoint.total_committed),
            storage: RwLock::new(checkpoint.storage),
            config,
        })
    }

    /// Create a new shared store.
    pub fn shared(config: StoreConfig) -> Result<SharedExperienceStore> {
        Ok(Arc::new(Self::new(config)?))
    }

    /// Commit a transition (lock-free).
    pub fn commit(&self, transition: Transition, priority: f64) {
        self.pending.push(Entry {
            transition,
            priority,
        });
        self.total_committed.fetch_add(1, Ordering::AcqRel);
    }

    /// Sample a uniform random batch with replacement.
    ///
    /// Returns `None` while the store holds fewer than `min_size` entries.
    pub fn sample(&self, batch_size: usize) -> Option<Vec<Transition>> {
        self.do_consolidate();

        let storage = self.storage.read();
        let len = storage.len();
        if len < self.config.min_size || len == 0 {
            return None;
        }

        let mut samples = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let idx = fastrand::usize(..len);
            samples.push(storage.get(idx).transition.clone());
        }

        Some(samples)
    }

    /// Check if the minimum-size gate is cleared.
    pub fn is_ready(&self) -> bool {
        self.do_consolidate();
        self.size.load(Ordering::Acquire) >= self.config.min_size
    }

    /// Current number of stored transitions.
    pub fn len(&self) -> usize {
        self.do_consolidate();
        self.size.load(Ordering::Acquire)
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of stored transitions.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Store utilization (0.0 to 1.0).
    pub fn utilization(&self) -> f32 {
        self.len() as f32 / self.config.capacity as f32
    }

    /// Number of commits accepted, including evicted ones.
    pub fn total_committed(&self) -> u64 {
        self.total_committed.load(Ordering::Acquire)
    }

    /// Surviving transitions from oldest to newest.
    pub fn entries_in_order(&self) -> Vec<Transition> {
        self.do_consolidate();
        self.storage
            .read()
            .iter_oldest_first()
            .map(|e| e.transition.clone())
            .collect()
    }

    /// Priorities of the surviving entries from oldest to newest.
    pub fn priorities_in_order(&self) -> Vec<f64> {
        self.do_consolidate();
        self.storage
            .read()
            .iter_oldest_first()
            .map(|e| e.priority)
            .collect()
    }

    /// Drop all stored and pending transitions.
    pub fn clear(&self) {
        while self.pending.pop().is_some() {}
        let mut storage = self.storage.write();
        storage.clear();
        self.size.store(0, Ordering::Release);
    }

    /// Get the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Persist the table into the configured checkpoint directory.
    ///
    /// Returns `Ok(None)` when no directory is configured.
    pub fn checkpoint(&self) -> Result<Option<PathBuf>> {
        match &self.config.checkpoint_dir {
            Some(dir) => self.checkpoint_to(dir).map(Some),
            None => Ok(None),
        }
    }

    /// Persist the table into `dir`.
    ///
    /// Writes to a temporary file first and renames it, so an interrupted
    /// checkpoint never replaces a good one.
    pub fn checkpoint_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(CHECKPOINT_FILE);
        let tmp_path = dir.join(format!("{CHECKPOINT_FILE}.tmp"));

        self.do_consolidate();
        let checkpoint = StoreCheckpoint {
            storage: self.storage.read().clone(),
            total_committed: self.total_committed(),
        };

        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            bincode::serde::encode_into_std_write(
                &checkpoint,
                &mut writer,
                bincode::config::standard(),
            )?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, &path)?;

        tracing::info!(
            path = %path.display(),
            entries = checkpoint.storage.len(),
            "checkpointed experience store"
        );
        Ok(path)
    }

    /// Move pending commits into the ring.
    fn do_consolidate(&self) {
        if self.pending.is_empty() {
            return;
        }

        let mut storage = self.storage.write();
        let mut count = 0usize;
        while let Some(entry) = self.pending.pop() {
            storage.push(entry);
            count += 1;
        }

        if count > 0 {
            self.size.store(storage.len(), Ordering::Release);
        }
    }
}

/// Thread-safe shared experience store.
pub type SharedExperienceStore = Arc<ExperienceStore>;

impl ExperienceTable for ExperienceStore {
    fn commit(&self, transition: Transition, priority: f64) -> Result<()> {
        ExperienceStore::commit(self, transition, priority);
        Ok(())
    }

    fn sample(&self, batch_size: usize) -> Result<Option<Vec<Transition>>> {
        Ok(ExperienceStore::sample(self, batch_size))
    }

    fn len(&self) -> Result<usize> {
        Ok(ExperienceStore::len(self))
    }

    fn checkpoint(&self) -> Result<Option<PathBuf>> {
        ExperienceStore::checkpoint(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn make_transition(state_val: f32) -> Transition {
        Transition::new(
            vec![state_val],
            vec![0.0],
            1.0,
            vec![state_val + 1.0],
            false,
        )
    }

    fn store(capacity: usize, min_size: usize) -> ExperienceStore {
        ExperienceStore::new(StoreConfig::new(capacity, min_size)).unwrap()
    }

    #[test]
    fn test_ring_buffer_overflow() {
        let mut rb: RingBuffer<i32> = RingBuffer::new(3);

        rb.push(1);
        rb.push(2);
        rb.push(3);
        rb.push(4); // Overwrites 1

        assert_eq!(rb.len(), 3);
        assert_eq!(*rb.get(0), 4);
        assert_eq!(rb.iter_oldest_first().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert!(rb.is_consistent());
    }

    #[test]
    fn test_invalid_config() {
        assert!(ExperienceStore::new(StoreConfig::new(0, 0)).is_err());
        assert!(ExperienceStore::new(StoreConfig::new(10, 11)).is_err());
        assert!(ExperienceStore::new(StoreConfig::new(10, 10)).is_ok());
    }

    #[test]
    fn test_capacity_invariant() {
        let capacity = 7;
        let store = store(capacity, 1);

        for i in 0..25 {
            store.commit(make_transition(i as f32), 1.0);
            assert_eq!(store.len(), (i + 1).min(capacity));
        }
        assert_eq!(store.total_committed(), 25);
    }

    #[test]
    fn test_fifo_eviction_keeps_most_recent() {
        let store = store(5, 1);
        for i in 0..12 {
            store.commit(make_transition(i as f32), 1.0);
        }

        let survivors: Vec<f32> = store
            .entries_in_order()
            .iter()
            .map(|t| t.observation[0])
            .collect();
        assert_eq!(survivors, vec![7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_sampling_gate() {
        let store = store(100, 10);

        for i in 0..9 {
            store.commit(make_transition(i as f32), 1.0);
        }
        assert!(!store.is_ready());
        assert!(store.sample(4).is_none());

        store.commit(make_transition(9.0), 1.0);
        assert!(store.is_ready());
        let batch = store.sample(4).expect("gate cleared at exactly min_size");
        assert_eq!(batch.len(), 4);
    }

    #[test]
    fn test_sample_with_replacement() {
        let store = store(100, 1);
        assert!(store.sample(1).is_none());

        store.commit(make_transition(3.0), 1.0);
        store.commit(make_transition(4.0), 1.0);

        // Batch larger than the table: entries repeat
        let batch = store.sample(16).unwrap();
        assert_eq!(batch.len(), 16);
        for t in batch {
            assert!(t.observation[0] == 3.0 || t.observation[0] == 4.0);
        }
    }

    #[test]
    fn test_priority_is_stored_but_ignored() {
        let store = store(10, 1);
        store.commit(make_transition(0.0), 100.0);
        store.commit(make_transition(1.0), 0.0);

        assert_eq!(store.priorities_in_order(), vec![100.0, 0.0]);

        let mut seen_low = false;
        for _ in 0..200 {
            let batch = store.sample(2).unwrap();
            if batch.iter().any(|t| t.observation[0] == 1.0) {
                seen_low = true;
                break;
            }
        }
        assert!(seen_low, "zero-priority entry must still be sampled");
    }

    #[test]
    fn test_concurrent_commits() {
        let store = store(10_000, 1);
        thread::scope(|scope| {
            for agent in 0..4 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..250 {
                        store.commit(make_transition((agent * 1000 + i) as f32), 1.0);
                    }
                });
            }
        });

        assert_eq!(store.len(), 1000);
        assert_eq!(store.total_committed(), 1000);
    }

    #[test]
    fn test_clear() {
        let store = store(10, 2);
        for i in 0..5 {
            store.commit(make_transition(i as f32), 1.0);
        }
        store.clear();
        assert!(store.is_empty());
        assert!(!store.is_ready());
    }

    #[test]
    fn test_checkpoint_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(4, 2).with_checkpoint_dir(dir.path());
        let store = ExperienceStore::new(config.clone()).unwrap();
        for i in 0..6 {
            store.commit(make_transition(i as f32), 1.0);
        }

        let path = store.checkpoint().unwrap().expect("directory configured");
        assert!(path.exists());

        let restored = ExperienceStore::restore(&path, config).unwrap();
        assert_eq!(restored.len(), 4);
        assert_eq!(restored.total_committed(), 6);
        assert_eq!(restored.entries_in_order(), store.entries_in_order());

        // The write cursor survives: the next commit evicts the oldest entry
        restored.commit(make_transition(6.0), 1.0);
        let survivors: Vec<f32> = restored
            .entries_in_order()
            .iter()
            .map(|t| t.observation[0])
            .collect();
        assert_eq!(survivors, vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_checkpoint_without_directory() {
        let store = store(4, 1);
        assert!(store.checkpoint().unwrap().is_none());
    }

    #[test]
    fn test_restore_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILE);
        fs::write(&path, [0xFFu8, 0x01, 0x02]).unwrap();

        assert!(ExperienceStore::restore(&path, StoreConfig::new(4, 1)).is_err());
    }
}
