// SystemController - coordinator side of a simulation: lifecycle commands, tick barrier and quantum arbitration

mod arbiter;
mod config;
mod controller;
mod error;
mod policy;
mod tick_master;

#[cfg(test)]
mod integration_test;

pub use arbiter::QuantumArbiter;
pub use config::{ArbiterConfig, CoordinatorConfig, TickMasterConfig};
pub use controller::SystemController;
pub use error::ControllerError;
pub use policy::{CoordinatorAction, CoordinatorPolicy};
pub use tick_master::TickMaster;

use orchestration_types::{Envelope, SystemState, WorkflowConfiguration};
use std::sync::Arc;
use sync_transport::Transport;

/// Coordinator - drives a simulation from system state changes
///
/// Owns the command side ([`SystemController`]), time advancement for
/// tick-driven participants ([`TickMaster`]) and quantum-driven participants
/// ([`QuantumArbiter`]), and the [`CoordinatorPolicy`] that ties them to the
/// system state reported by a monitor. Single-threaded: the embedding loop
/// feeds envelopes and system state changes in delivery order.
pub struct Coordinator {
    config: CoordinatorConfig,
    controller: SystemController,
    tick_master: TickMaster,
    arbiter: QuantumArbiter,
    policy: CoordinatorPolicy,
    tick_participants: usize,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, transport: Arc<dyn Transport>) -> Result<Self, ControllerError> {
        config.validate()?;
        Ok(Self {
            controller: SystemController::new(Arc::clone(&transport)),
            tick_master: TickMaster::new(&config.tick_master, Arc::clone(&transport)),
            arbiter: QuantumArbiter::new(&config.arbiter, transport),
            policy: CoordinatorPolicy::new(),
            tick_participants: 0,
            config,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn controller(&self) -> &SystemController {
        &self.controller
    }

    pub fn tick_master(&self) -> &TickMaster {
        &self.tick_master
    }

    pub fn arbiter(&self) -> &QuantumArbiter {
        &self.arbiter
    }

    /// Include `name` in the tick barrier
    pub fn add_tick_participant(&mut self, name: impl Into<String>) {
        self.tick_master.add_participant(name);
        self.tick_participants += 1;
    }

    /// Drop a disconnected participant from the tick barrier
    pub fn remove_participant(&mut self, name: &str) -> Result<(), ControllerError> {
        self.tick_master.remove_participant(name)
    }

    /// Announce the required participants. Returns the configuration so a
    /// monitor in the same process can apply it directly.
    pub fn announce_workflow(&self) -> Result<WorkflowConfiguration, ControllerError> {
        self.controller
            .set_workflow_configuration(self.config.required_participants.iter().cloned())
    }

    /// Route time-sync traffic. Returns true if the envelope was consumed.
    pub fn handle_envelope(&mut self, envelope: &Envelope) -> Result<bool, ControllerError> {
        if self.tick_master.handle_envelope(envelope)? {
            self.check_stepping_finished()?;
            return Ok(true);
        }
        if self.arbiter.handle_envelope(envelope)? {
            self.check_stepping_finished()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// React to a system state change reported by the monitor
    pub fn on_system_state(&mut self, state: SystemState) -> Result<(), ControllerError> {
        match self.policy.on_system_state(state) {
            Some(action) => self.apply(action),
            None => Ok(()),
        }
    }

    /// True once the system reached `Shutdown` or `Aborting`
    pub fn is_finished(&self) -> bool {
        self.policy.is_finished()
    }

    fn check_stepping_finished(&mut self) -> Result<(), ControllerError> {
        let finished = if self.tick_participants > 0 {
            self.tick_master.is_finished()
        } else {
            self.arbiter.rejected() > 0
        };
        if !finished {
            return Ok(());
        }
        match self.policy.on_stepping_finished() {
            Some(action) => self.apply(action),
            None => Ok(()),
        }
    }

    fn apply(&mut self, action: CoordinatorAction) -> Result<(), ControllerError> {
        tracing::info!(?action, "Coordinator applying action");
        match action {
            CoordinatorAction::InitializeAll => {
                for name in &self.config.required_participants {
                    self.controller.initialize(name)?;
                }
            }
            CoordinatorAction::Run => {
                self.controller.run()?;
                if self.tick_participants > 0 {
                    self.tick_master.start()?;
                }
            }
            CoordinatorAction::Stop => {
                self.halt_stepping();
                self.controller.stop()?;
            }
            CoordinatorAction::Shutdown => {
                self.controller.shutdown()?;
            }
            CoordinatorAction::StopAndShutdown => {
                self.halt_stepping();
                self.controller.stop()?;
                self.controller.shutdown()?;
            }
            CoordinatorAction::Finish => {
                tracing::info!(
                    ticks_sent = self.tick_master.ticks_sent(),
                    quanta_granted = self.arbiter.granted(),
                    "Simulation finished"
                );
            }
        }
        Ok(())
    }

    fn halt_stepping(&mut self) {
        self.tick_master.halt();
        self.arbiter.halt();
    }
}
