use crate::derivation::derive;
use orchestration_types::{ParticipantState, ParticipantStatus, SystemState};
use std::collections::{BTreeMap, BTreeSet};

/// Last known status of every participant plus the derived system state
///
/// Every stored status and every system state change gets a sequence number
/// so notifications sent after the lock is released can be ordered.
#[derive(Debug, Default)]
pub struct StatusRegistry {
    statuses: BTreeMap<String, ParticipantStatus>,
    sequences: BTreeMap<String, u64>,
    next_sequence: u64,
    required: BTreeSet<String>,
    system_state: SystemState,
    system_state_generation: u64,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system_state(&self) -> SystemState {
        self.system_state
    }

    /// Bumped on every system state change, 0 while still `Invalid`
    pub fn system_state_generation(&self) -> u64 {
        self.system_state_generation
    }

    pub fn get(&self, name: &str) -> Option<&ParticipantStatus> {
        self.statuses.get(name)
    }

    /// State of `name`, inserting an `Invalid` placeholder for unknown names
    pub fn state_or_insert(&mut self, name: &str) -> ParticipantState {
        self.statuses
            .entry(name.to_string())
            .or_insert_with(|| ParticipantStatus::unknown(name))
            .state
    }

    /// Store `status` and return its sequence number
    pub fn store(&mut self, status: ParticipantStatus) -> u64 {
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        self.sequences.insert(status.participant_name.clone(), sequence);
        self.statuses.insert(status.participant_name.clone(), status);
        sequence
    }

    pub fn remove(&mut self, name: &str) -> Option<ParticipantStatus> {
        self.sequences.remove(name);
        self.statuses.remove(name)
    }

    pub fn statuses(&self) -> impl Iterator<Item = &ParticipantStatus> {
        self.statuses.values()
    }

    /// Stored statuses with the sequence number they were stored under.
    /// Placeholders that were never stored carry 0.
    pub fn sequenced_statuses(&self) -> impl Iterator<Item = (&ParticipantStatus, u64)> {
        self.statuses.iter().map(move |(name, status)| {
            (status, self.sequences.get(name).copied().unwrap_or_default())
        })
    }

    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains(name)
    }

    pub fn set_required(&mut self, required: BTreeSet<String>) {
        self.required = required;
    }

    pub fn all_required_known(&self) -> bool {
        self.required.iter().all(|name| self.statuses.contains_key(name))
    }

    /// Re-derive the system state after `name` entered `state`. Non-required
    /// participants never affect it.
    pub fn update_system_state(&mut self, name: &str, state: ParticipantState) {
        if !self.is_required(name) {
            return;
        }

        let required_states =
            self.required.iter().map(|name| self.statuses.get(name).map(|status| status.state));
        if let Some(system_state) = derive(state, required_states) {
            if system_state != self.system_state {
                self.system_state = system_state;
                self.system_state_generation += 1;
            }
        }
    }
}
