// Coordinator policy: which commands follow a system state change

use orchestration_types::SystemState;

/// Next step the coordinator takes for an observed system state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorAction {
    /// Send `Initialize` to every required participant
    InitializeAll,
    /// Broadcast `Run` and start time stepping
    Run,
    /// Broadcast `Stop`
    Stop,
    /// Broadcast `Shutdown`
    Shutdown,
    /// Broadcast `Stop` followed by `Shutdown`
    StopAndShutdown,
    /// Simulation is over
    Finish,
}

/// Maps system states to coordinator actions, acting once per state
#[derive(Debug, Default)]
pub struct CoordinatorPolicy {
    initialized: bool,
    running: bool,
    stop_requested: bool,
    shutting_down: bool,
    finished: bool,
}

impl CoordinatorPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_system_state(&mut self, state: SystemState) -> Option<CoordinatorAction> {
        let action = match state {
            SystemState::ServicesCreated if !self.initialized => {
                self.initialized = true;
                CoordinatorAction::InitializeAll
            }
            SystemState::ReadyToRun if !self.running => {
                self.running = true;
                CoordinatorAction::Run
            }
            SystemState::Stopped if !self.shutting_down => {
                self.shutting_down = true;
                CoordinatorAction::Shutdown
            }
            SystemState::Error if !self.shutting_down => {
                self.shutting_down = true;
                CoordinatorAction::StopAndShutdown
            }
            SystemState::Shutdown | SystemState::Aborting if !self.finished => {
                self.finished = true;
                CoordinatorAction::Finish
            }
            _ => return None,
        };
        tracing::debug!(%state, ?action, "Coordinator policy decision");
        Some(action)
    }

    /// Request a stop once time stepping is done
    pub fn on_stepping_finished(&mut self) -> Option<CoordinatorAction> {
        if !self.running || self.stop_requested || self.shutting_down {
            return None;
        }
        self.stop_requested = true;
        Some(CoordinatorAction::Stop)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
