use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::ParticipantState;

/// Status report a participant emits on every lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantStatus {
    pub participant_name: String,
    pub state: ParticipantState,
    pub enter_reason: String,
    pub enter_time: DateTime<Utc>,
    pub refresh_time: DateTime<Utc>,
}

impl ParticipantStatus {
    /// Placeholder entry for a participant nothing has been heard from yet
    pub fn unknown(participant_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            participant_name: participant_name.into(),
            state: ParticipantState::Invalid,
            enter_reason: String::new(),
            enter_time: now,
            refresh_time: now,
        }
    }

    /// Status entering `state` right now
    pub fn entered(
        participant_name: impl Into<String>,
        state: ParticipantState,
        reason: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            participant_name: participant_name.into(),
            state,
            enter_reason: reason.into(),
            enter_time: now,
            refresh_time: now,
        }
    }

    /// Move to a new state, stamping enter and refresh time
    pub fn transition(&mut self, state: ParticipantState, reason: impl Into<String>) {
        let now = Utc::now();
        self.state = state;
        self.enter_reason = reason.into();
        self.enter_time = now;
        self.refresh_time = now;
    }

    pub fn refresh(&mut self) {
        self.refresh_time = Utc::now();
    }
}
