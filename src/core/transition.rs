//! Transition types exchanged between agents, the experience store and the
//! learner.
//!
//! - `StepRecord`: raw record an agent produces for one environment step
//! - `Transition`: finalized `(s, a, r, s', terminal)` tuple, the unit of replay

use serde::{Deserialize, Serialize};

/// One `(s, a, r, s', terminal)` tuple.
///
/// `reward` and `terminal` are stored as `f32` so a batch can be copied into
/// tensors without conversion. `terminal` is always `0.0` or `1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Observation the action was taken in
    pub observation: Vec<f32>,
    /// Continuous action vector
    pub action: Vec<f32>,
    /// Reward received
    pub reward: f32,
    /// Observation after the step
    pub next_observation: Vec<f32>,
    /// 1.0 if the episode ended in an absorbing state, 0.0 otherwise
    pub terminal: f32,
}

impl Transition {
    /// Create a new transition.
    pub fn new(
        observation: Vec<f32>,
        action: Vec<f32>,
        reward: f32,
        next_observation: Vec<f32>,
        terminal: bool,
    ) -> Self {
        Self {
            observation,
            action,
            reward,
            next_observation,
            terminal: if terminal { 1.0 } else { 0.0 },
        }
    }

    /// Whether this transition ends an episode.
    pub fn is_terminal(&self) -> bool {
        self.terminal > 0.5
    }

    /// Observation dimensionality.
    pub fn obs_dim(&self) -> usize {
        self.observation.len()
    }

    /// Action dimensionality.
    pub fn action_dim(&self) -> usize {
        self.action.len()
    }
}

/// Raw per-step record produced by an agent before the next observation is
/// known.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    /// Observation the action was taken in
    pub observation: Vec<f32>,
    /// Action taken
    pub action: Vec<f32>,
    /// Reward received
    pub reward: f32,
    /// Episode ended in an absorbing state
    pub terminal: bool,
}

impl StepRecord {
    /// Create a new step record.
    pub fn new(observation: Vec<f32>, action: Vec<f32>, reward: f32, terminal: bool) -> Self {
        Self {
            observation,
            action,
            reward,
            terminal,
        }
    }

    /// Finalize this record into a transition once the following observation
    /// is available.
    pub fn into_transition(self, next_observation: Vec<f32>) -> Transition {
        Transition::new(
            self.observation,
            self.action,
            self.reward,
            next_observation,
            self.terminal,
        )
    }
}

/// Column-major view of a sampled batch, ready to be turned into tensors.
#[derive(Debug, Clone, Default)]
pub struct TransitionBatch {
    /// Flattened observations [batch * obs_dim]
    pub observations: Vec<f32>,
    /// Flattened actions [batch * action_dim]
    pub actions: Vec<f32>,
    /// Rewards [batch]
    pub rewards: Vec<f32>,
    /// Flattened next observations [batch * obs_dim]
    pub next_observations: Vec<f32>,
    /// Terminal flags as 0.0 / 1.0 [batch]
    pub terminals: Vec<f32>,
    /// Number of transitions
    pub batch_size: usize,
    /// Observation dimensionality
    pub obs_dim: usize,
    /// Action dimensionality
    pub action_dim: usize,
}

impl TransitionBatch {
    /// Flatten a slice of transitions.
    ///
    /// Dimensions are taken from the first transition. An empty slice yields an
    /// empty batch.
    pub fn from_transitions(transitions: &[Transition]) -> Self {
        let Some(first) = transitions.first() else {
            return Self::default();
        };
        let batch_size = transitions.len();
        let obs_dim = first.obs_dim();
        let action_dim = first.action_dim();

        let mut batch = Self {
            observations: Vec::with_capacity(batch_size * obs_dim),
            actions: Vec::with_capacity(batch_size * action_dim),
            rewards: Vec::with_capacity(batch_size),
            next_observations: Vec::with_capacity(batch_size * obs_dim),
            terminals: Vec::with_capacity(batch_size),
            batch_size,
            obs_dim,
            action_dim,
        };

        for t in transitions {
            batch.observations.extend_from_slice(&t.observation);
            batch.actions.extend_from_slice(&t.action);
            batch.rewards.push(t.reward);
            batch.next_observations.extend_from_slice(&t.next_observation);
            batch.terminals.push(t.terminal);
        }

        batch
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.batch_size == 0
    }
}
