use orchestration_types::{ParticipantState as P, SystemState as S};

type Ladder = &'static [(S, &'static [P])];

/// How a required participant entering a state affects the system state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// Leaves the system state untouched
    Ignore,
    /// Sets the system state regardless of the other participants
    Unconditional(S),
    /// First candidate whose accepted set covers every required participant
    Ladder(Ladder),
}

const SERVICES_CREATED: Ladder = &[(
    S::ServicesCreated,
    &[
        P::ServicesCreated,
        P::CommunicationInitializing,
        P::CommunicationInitialized,
        P::ReadyToRun,
        P::Running,
    ],
)];

const COMMUNICATION_INITIALIZING: Ladder = &[(
    S::CommunicationInitializing,
    &[P::CommunicationInitializing, P::CommunicationInitialized, P::ReadyToRun, P::Running],
)];

const COMMUNICATION_INITIALIZED: Ladder = &[(
    S::CommunicationInitialized,
    &[P::CommunicationInitialized, P::ReadyToRun, P::Running],
)];

const READY_TO_RUN: Ladder = &[(S::ReadyToRun, &[P::ReadyToRun, P::Running])];

const RUNNING: Ladder = &[
    (S::Running, &[P::Running]),
    (S::Stopping, &[P::Running, P::Stopping]),
    (S::Stopped, &[P::Running, P::Stopping, P::Stopped]),
    (S::ShuttingDown, &[P::Running, P::Stopping, P::Stopped, P::ShuttingDown]),
    (S::Shutdown, &[P::Running, P::Stopping, P::Stopped, P::ShuttingDown, P::Shutdown]),
];

const PAUSED: Ladder = &[
    (S::Paused, &[P::Paused, P::Running]),
    (S::Stopping, &[P::Paused, P::Running, P::Stopping]),
    (S::Stopped, &[P::Paused, P::Running, P::Stopping, P::Stopped]),
    (S::ShuttingDown, &[P::Paused, P::Running, P::Stopping, P::Stopped, P::ShuttingDown]),
    (
        S::Shutdown,
        &[P::Paused, P::Running, P::Stopping, P::Stopped, P::ShuttingDown, P::Shutdown],
    ),
];

const STOPPING: Ladder = &[(
    S::Stopping,
    &[P::Stopping, P::Stopped, P::ShuttingDown, P::Shutdown, P::Paused, P::Running],
)];

const STOPPED: Ladder = &[(S::Stopped, &[P::Stopped, P::ShuttingDown, P::Shutdown])];

const SHUTTING_DOWN: Ladder = &[(
    S::ShuttingDown,
    &[P::ShuttingDown, P::Shutdown, P::Stopped, P::Error, P::ServicesCreated, P::ReadyToRun],
)];

const SHUTDOWN: Ladder = &[(S::Shutdown, &[P::Shutdown])];

/// Derivation rule triggered by a required participant entering `trigger`
pub fn derivation_for(trigger: P) -> Derivation {
    match trigger {
        P::Invalid => Derivation::Ignore,
        P::ServicesCreated => Derivation::Ladder(SERVICES_CREATED),
        P::CommunicationInitializing => Derivation::Ladder(COMMUNICATION_INITIALIZING),
        P::CommunicationInitialized => Derivation::Ladder(COMMUNICATION_INITIALIZED),
        P::ReadyToRun => Derivation::Ladder(READY_TO_RUN),
        P::Running => Derivation::Ladder(RUNNING),
        P::Paused => Derivation::Ladder(PAUSED),
        P::Stopping => Derivation::Ladder(STOPPING),
        P::Stopped => Derivation::Ladder(STOPPED),
        P::ShuttingDown => Derivation::Ladder(SHUTTING_DOWN),
        P::Shutdown => Derivation::Ladder(SHUTDOWN),
        P::Error => Derivation::Unconditional(S::Error),
        P::Aborting => Derivation::Unconditional(S::Aborting),
    }
}

/// Evaluate the rule for `trigger` given the states of all required
/// participants. `None` for a participant means no status is known.
pub fn derive<I>(trigger: P, required_states: I) -> Option<S>
where
    I: IntoIterator<Item = Option<P>> + Clone,
{
    match derivation_for(trigger) {
        Derivation::Ignore => None,
        Derivation::Unconditional(state) => Some(state),
        Derivation::Ladder(ladder) => ladder
            .iter()
            .find(|(_, accepted)| {
                required_states
                    .clone()
                    .into_iter()
                    .all(|state| state.is_some_and(|state| accepted.contains(&state)))
            })
            .map(|(system_state, _)| *system_state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derive_from(trigger: P, states: &[P]) -> Option<S> {
        derive(trigger, states.iter().copied().map(Some))
    }

    #[test]
    fn test_every_trigger_has_a_rule() {
        for state in P::ALL {
            let _ = derivation_for(state);
        }
        assert_eq!(derivation_for(P::Invalid), Derivation::Ignore);
        assert_eq!(derivation_for(P::Error), Derivation::Unconditional(S::Error));
        assert_eq!(derivation_for(P::Aborting), Derivation::Unconditional(S::Aborting));
    }

    #[test]
    fn test_system_follows_slowest_participant_during_startup() {
        assert_eq!(
            derive_from(P::ServicesCreated, &[P::ServicesCreated, P::ReadyToRun]),
            Some(S::ServicesCreated)
        );
        assert_eq!(derive_from(P::ReadyToRun, &[P::ReadyToRun, P::ServicesCreated]), None);
        assert_eq!(derive_from(P::ReadyToRun, &[P::ReadyToRun, P::ReadyToRun]), Some(S::ReadyToRun));
    }

    #[test]
    fn test_running_ladder_widens() {
        assert_eq!(derive_from(P::Running, &[P::Running, P::Running]), Some(S::Running));
        assert_eq!(derive_from(P::Running, &[P::Running, P::Stopping]), Some(S::Stopping));
        assert_eq!(derive_from(P::Running, &[P::Running, P::Stopped]), Some(S::Stopped));
        assert_eq!(derive_from(P::Running, &[P::Running, P::Shutdown]), Some(S::Shutdown));
        assert_eq!(derive_from(P::Running, &[P::Running, P::ReadyToRun]), None);
    }

    #[test]
    fn test_paused_ladder() {
        assert_eq!(derive_from(P::Paused, &[P::Paused, P::Running]), Some(S::Paused));
        assert_eq!(derive_from(P::Paused, &[P::Paused, P::Stopping]), Some(S::Stopping));
    }

    #[test]
    fn test_shutting_down_accepts_error() {
        assert_eq!(
            derive_from(P::ShuttingDown, &[P::ShuttingDown, P::Error]),
            Some(S::ShuttingDown)
        );
        assert_eq!(derive_from(P::Shutdown, &[P::Shutdown, P::ShuttingDown]), None);
        assert_eq!(derive_from(P::Shutdown, &[P::Shutdown, P::Shutdown]), Some(S::Shutdown));
    }

    #[test]
    fn test_unknown_required_participant_blocks_ladders() {
        let states = [Some(P::Running), None];
        assert_eq!(derive(P::Running, states), None);
        assert_eq!(derive(P::Error, states), Some(S::Error));
    }
}
