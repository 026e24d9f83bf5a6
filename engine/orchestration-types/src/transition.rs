//! Legality table for participant state transitions
//!
//! Each state lists only its immediate canonical predecessors. A report that
//! skips an intermediate state is flagged even when the end result is
//! consistent; callers decide whether to reject or merely record it.

use thiserror::Error;

use crate::state::ParticipantState;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid transition from {from} to {to}")]
pub struct TransitionViolation {
    pub from: ParticipantState,
    pub to: ParticipantState,
}

/// Canonical predecessors of `state`
pub fn legal_predecessors(state: ParticipantState) -> &'static [ParticipantState] {
    use ParticipantState::*;
    match state {
        Invalid => &[],
        ServicesCreated => &[Invalid],
        CommunicationInitializing => &[ServicesCreated, Stopped, Error],
        CommunicationInitialized => &[CommunicationInitializing],
        ReadyToRun => &[CommunicationInitialized],
        Running => &[ReadyToRun, Paused],
        Paused => &[Running],
        Stopping => &[Running, Paused],
        Stopped => &[Stopping],
        ShuttingDown => &[Stopped, Error],
        Shutdown => &[ShuttingDown],
        Error | Aborting => &ParticipantState::ALL,
    }
}

/// Check a reported `from -> to` transition. Re-reporting the same state is a
/// status refresh and always valid.
pub fn validate_transition(
    from: ParticipantState,
    to: ParticipantState,
) -> Result<(), TransitionViolation> {
    if to == ParticipantState::Invalid {
        return Err(TransitionViolation { from, to });
    }
    if from == to || legal_predecessors(to).contains(&from) {
        return Ok(());
    }
    Err(TransitionViolation { from, to })
}

pub fn is_valid_transition(from: ParticipantState, to: ParticipantState) -> bool {
    validate_transition(from, to).is_ok()
}
