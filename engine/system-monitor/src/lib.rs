// SystemMonitor - aggregates participant statuses into the global system state

mod derivation;
mod handlers;
mod monitor;
mod registry;
mod types;


pub use derivation::{Derivation, derivation_for};
pub use monitor::SystemMonitor;
pub use types::{
    HandlerId, MonitorError, ParticipantConnectionHandler, ParticipantStatusHandler,
    SystemStateHandler,
};

#[cfg(test)]
mod tests {
    use super::*;
    use orchestration_types::{ParticipantState, ParticipantStatus, SystemState};

    #[test]
    fn test_monitor_creation() {
        let monitor = SystemMonitor::new();
        assert_eq!(monitor.system_state(), SystemState::Invalid);
        assert!(monitor.required_participants().is_empty());
        assert!(monitor.connected_participants().is_empty());
        assert_eq!(monitor.invalid_transition_count(), 0);
    }

    #[test]
    fn test_unknown_participant_status() {
        let monitor = SystemMonitor::new();
        assert_eq!(
            monitor.participant_status("Ghost"),
            Err(MonitorError::UnknownParticipant("Ghost".to_string()))
        );
    }

    #[test]
    fn test_status_is_recorded() {
        let monitor = SystemMonitor::new();
        monitor.receive_status(&ParticipantStatus::entered(
            "A",
            ParticipantState::ServicesCreated,
            "run() was called",
        ));

        let status = monitor.participant_status("A").unwrap();
        assert_eq!(status.state, ParticipantState::ServicesCreated);
        assert_eq!(status.enter_reason, "run() was called");
    }
}
