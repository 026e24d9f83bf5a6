// Lifecycle commands issued by the coordinator

use crate::error::ControllerError;
use orchestration_types::{
    ParticipantCommand, ParticipantCommandKind, SyncMessage, SystemCommand, SystemCommandKind,
    WorkflowConfiguration,
};
use std::sync::Arc;
use sync_transport::{Target, Transport};

/// Issues participant and system commands over the coordinator's transport
pub struct SystemController {
    transport: Arc<dyn Transport>,
}

impl SystemController {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Ask `participant` to run its init sequence
    pub fn initialize(&self, participant: &str) -> Result<(), ControllerError> {
        self.send_participant_command(participant, ParticipantCommandKind::Initialize)
    }

    /// Ask a stopped or failed `participant` to run its init sequence again
    pub fn reinitialize(&self, participant: &str) -> Result<(), ControllerError> {
        self.send_participant_command(participant, ParticipantCommandKind::Reinitialize)
    }

    pub fn run(&self) -> Result<(), ControllerError> {
        self.send_system_command(SystemCommandKind::Run)
    }

    pub fn stop(&self) -> Result<(), ControllerError> {
        self.send_system_command(SystemCommandKind::Stop)
    }

    pub fn shutdown(&self) -> Result<(), ControllerError> {
        self.send_system_command(SystemCommandKind::Shutdown)
    }

    pub fn abort_simulation(&self) -> Result<(), ControllerError> {
        self.send_system_command(SystemCommandKind::AbortSimulation)
    }

    /// Broadcast the set of required participants. The configuration is
    /// returned so monitors in the coordinator's own process can apply it.
    pub fn set_workflow_configuration<I, S>(
        &self,
        required_participants: I,
    ) -> Result<WorkflowConfiguration, ControllerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let workflow = WorkflowConfiguration::new(required_participants);
        tracing::info!(
            required = ?workflow.required_participant_names,
            "Broadcasting workflow configuration"
        );
        self.transport
            .send(Target::Broadcast, SyncMessage::WorkflowConfiguration(workflow.clone()))?;
        Ok(workflow)
    }

    fn send_participant_command(
        &self,
        participant: &str,
        kind: ParticipantCommandKind,
    ) -> Result<(), ControllerError> {
        tracing::info!(%participant, command = %kind, "Sending participant command");
        let command = ParticipantCommand::new(participant, kind);
        self.transport.send(
            Target::Participant(participant.to_string()),
            SyncMessage::ParticipantCommand(command),
        )?;
        Ok(())
    }

    fn send_system_command(&self, kind: SystemCommandKind) -> Result<(), ControllerError> {
        tracing::info!(command = %kind, "Sending system command");
        self.transport.send(Target::Broadcast, SyncMessage::SystemCommand(SystemCommand::new(kind)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_transport::{BusConfig, InMemoryBus, TransportError};

    #[test]
    fn test_initialize_is_unicast() {
        let bus = InMemoryBus::new(BusConfig::default());
        let (endpoint, _controller_inbox) = bus.attach("Controller").unwrap();
        let (_a, a_inbox) = bus.attach("A").unwrap();
        let (_b, b_inbox) = bus.attach("B").unwrap();

        let controller = SystemController::new(Arc::new(endpoint));
        controller.initialize("A").unwrap();

        let envelope = a_inbox.try_recv().unwrap();
        assert_eq!(
            envelope.message,
            SyncMessage::ParticipantCommand(ParticipantCommand::new(
                "A",
                ParticipantCommandKind::Initialize
            ))
        );
        assert!(b_inbox.try_recv().is_err());
    }

    #[test]
    fn test_system_commands_are_broadcast() {
        let bus = InMemoryBus::new(BusConfig::default());
        let (endpoint, _controller_inbox) = bus.attach("Controller").unwrap();
        let (_a, a_inbox) = bus.attach("A").unwrap();

        let controller = SystemController::new(Arc::new(endpoint));
        controller.run().unwrap();
        controller.stop().unwrap();
        controller.shutdown().unwrap();
        controller.abort_simulation().unwrap();

        let kinds: Vec<SystemCommandKind> = a_inbox
            .try_iter()
            .filter_map(|envelope| match envelope.message {
                SyncMessage::SystemCommand(command) => Some(command.kind),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                SystemCommandKind::Run,
                SystemCommandKind::Stop,
                SystemCommandKind::Shutdown,
                SystemCommandKind::AbortSimulation
            ]
        );
    }

    #[test]
    fn test_unknown_participant_is_reported() {
        let bus = InMemoryBus::new(BusConfig::default());
        let (endpoint, _inbox) = bus.attach("Controller").unwrap();
        let controller = SystemController::new(Arc::new(endpoint));

        let result = controller.reinitialize("Nobody");
        assert!(matches!(
            result,
            Err(ControllerError::Transport(TransportError::UnknownParticipant(_)))
        ));
    }

    #[test]
    fn test_workflow_configuration_is_returned() {
        let bus = InMemoryBus::new(BusConfig::default());
        let (endpoint, _inbox) = bus.attach("Controller").unwrap();
        let (_a, a_inbox) = bus.attach("A").unwrap();
        let controller = SystemController::new(Arc::new(endpoint));

        let workflow = controller.set_workflow_configuration(["A", "B"]).unwrap();
        assert_eq!(workflow.required_participant_names.len(), 2);
        assert_eq!(
            a_inbox.try_recv().unwrap().message,
            SyncMessage::WorkflowConfiguration(workflow)
        );
    }
}
