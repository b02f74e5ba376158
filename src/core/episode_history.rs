//! Two-record history used by agents to build transitions.
//!
//! A transition for step `t` needs the observation of step `t + 1`, so each
//! raw record is held back until the next one (or the final observation of
//! the episode) arrives.
//!
//! ```text
//! record(S0,A0,R0) -> None
//! record(S1,A1,R1) -> Some(S0,A0,R0,S1)
//! record(S2,A2,R2) -> Some(S1,A1,R1,S2)
//! finish(S3)       -> Some(S2,A2,R2,S3)   history cleared
//! ```

use super::transition::{StepRecord, Transition};

/// Per-agent history holding at most the previous raw step record.
#[derive(Debug, Default)]
pub struct EpisodeHistory {
    previous: Option<StepRecord>,
    steps: usize,
}

impl EpisodeHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the record of the step that was just taken.
    ///
    /// Returns the transition completed by this step's observation, if any.
    pub fn record(&mut self, record: StepRecord) -> Option<Transition> {
        self.steps += 1;
        let next_observation = record.observation.clone();
        self.previous
            .replace(record)
            .map(|prev| prev.into_transition(next_observation))
    }

    /// Close the episode with the observation returned by its last step.
    ///
    /// Returns the final transition and clears the history.
    pub fn finish(&mut self, final_observation: Vec<f32>) -> Option<Transition> {
        self.steps = 0;
        self.previous
            .take()
            .map(|prev| prev.into_transition(final_observation))
    }

    /// Drop any pending record without producing a transition.
    pub fn clear(&mut self) {
        self.previous = None;
        self.steps = 0;
    }

    /// Number of records appended in the current episode.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Whether a record is waiting for its next observation.
    pub fn has_pending(&self) -> bool {
        self.previous.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(obs: f32, terminal: bool) -> StepRecord {
        StepRecord::new(vec![obs], vec![obs * 0.1], obs * 10.0, terminal)
    }

    #[test]
    fn test_first_record_produces_nothing() {
        let mut history = EpisodeHistory::new();
        assert!(history.record(step(0.0, false)).is_none());
        assert!(history.has_pending());
        assert_eq!(history.steps(), 1);
    }

    #[test]
    fn test_three_step_episode() {
        let mut history = EpisodeHistory::new();
        let mut committed = Vec::new();

        committed.extend(history.record(step(0.0, false)));
        committed.extend(history.record(step(1.0, false)));
        committed.extend(history.record(step(2.0, true)));
        committed.extend(history.finish(vec![3.0]));

        assert_eq!(committed.len(), 3);

        assert_eq!(committed[0].observation, vec![0.0]);
        assert_eq!(committed[0].next_observation, vec![1.0]);
        assert_eq!(committed[0].reward, 0.0);
        assert!(!committed[0].is_terminal());

        assert_eq!(committed[1].observation, vec![1.0]);
        assert_eq!(committed[1].next_observation, vec![2.0]);

        let last = &committed[2];
        assert_eq!(last.observation, vec![2.0]);
        assert_eq!(last.action, vec![0.2]);
        assert_eq!(last.reward, 20.0);
        assert_eq!(last.next_observation, vec![3.0]);
        assert_eq!(last.terminal, 1.0);

        assert!(!history.has_pending());
        assert_eq!(history.steps(), 0);
    }

    #[test]
    fn test_single_step_episode() {
        let mut history = EpisodeHistory::new();
        assert!(history.record(step(5.0, true)).is_none());

        let t = history.finish(vec![6.0]).unwrap();
        assert_eq!(t.observation, vec![5.0]);
        assert_eq!(t.next_observation, vec![6.0]);
        assert!(t.is_terminal());
    }

    #[test]
    fn test_finish_on_empty_history() {
        let mut history = EpisodeHistory::new();
        assert!(history.finish(vec![0.0]).is_none());
    }

    #[test]
    fn test_episodes_do_not_leak() {
        let mut history = EpisodeHistory::new();
        history.record(step(0.0, true));
        history.finish(vec![1.0]);

        // The next episode's first record must not pair with the previous one
        assert!(history.record(step(10.0, false)).is_none());
    }
}
