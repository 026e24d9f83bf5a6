//! Core ParticipantController implementation

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use crossbeam::channel::Receiver;
use tokio::sync::oneshot;

use orchestration_types::{
    Envelope, ParticipantCommand, ParticipantCommandKind, ParticipantState, ParticipantStatus,
    QuantumGrant, QuantumRequest, QuantumRequestStatus, SyncMessage, SystemCommand,
    SystemCommandKind, Tick, TickDone,
};
use sync_transport::{Target, Transport};

use crate::config::{ParticipantConfig, SyncPolicy};
use crate::error::ParticipantError;
use crate::handlers::{
    invoke_guarded, HandlerError, HandlerOutcome, InitHandler, ShutdownHandler, SimulationStep,
    StopHandler,
};
use crate::metrics::{PerformanceStats, StepPerformance};
use crate::strategy::TimeStepStrategy;

/// Resolves with the terminal state once the participant reaches `Shutdown`
/// or `Aborting`.
///
/// Await it from async code or call [`FinalState::wait`] from a plain thread.
pub struct FinalState {
    rx: oneshot::Receiver<ParticipantState>,
}

impl FinalState {
    /// Block the current thread until the terminal state is known.
    /// Must not be called from within an async runtime.
    pub fn wait(self) -> Result<ParticipantState, ParticipantError> {
        self.rx.blocking_recv().map_err(|_| ParticipantError::FinalStateDropped)
    }

    /// Terminal state if it has already been reached
    pub fn try_get(&mut self) -> Option<ParticipantState> {
        self.rx.try_recv().ok()
    }
}

impl Future for FinalState {
    type Output = Result<ParticipantState, ParticipantError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let result = futures::ready!(Pin::new(&mut this.rx).poll(cx));
        Poll::Ready(result.map_err(|_| ParticipantError::FinalStateDropped))
    }
}

/// Lifecycle state machine of a single participant
pub struct ParticipantController {
    config: ParticipantConfig,
    transport: Arc<dyn Transport>,
    status: ParticipantStatus,

    // Simulation time
    now: Duration,
    duration: Duration,
    period: Duration,
    requested_duration: Option<Duration>,

    // Set once run() or run_async() was called
    strategy: Option<TimeStepStrategy>,

    // User callbacks
    simulation_step: Option<SimulationStep>,
    init_handler: Option<InitHandler>,
    stop_handler: Option<StopHandler>,
    shutdown_handler: Option<ShutdownHandler>,

    // Pause bookkeeping
    deferred_completion: Option<SyncMessage>,
    steps_while_paused: u32,

    final_state_tx: Option<oneshot::Sender<ParticipantState>>,
    performance: StepPerformance,
}

impl ParticipantController {
    /// Create a new ParticipantController
    pub fn new(
        config: ParticipantConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ParticipantError> {
        config.validate()?;

        tracing::info!(
            participant = %config.name,
            time_step = %config.time_step,
            sync_policy = ?config.sync_policy,
            "Creating ParticipantController"
        );

        Ok(Self {
            status: ParticipantStatus::unknown(config.name.clone()),
            now: Duration::ZERO,
            duration: Duration::ZERO,
            period: config.period(),
            requested_duration: None,
            strategy: None,
            simulation_step: None,
            init_handler: None,
            stop_handler: None,
            shutdown_handler: None,
            deferred_completion: None,
            steps_while_paused: 0,
            final_state_tx: None,
            performance: StepPerformance::new(config.exec_time_limit_soft()),
            config,
            transport,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ParticipantConfig {
        &self.config
    }

    pub fn state(&self) -> ParticipantState {
        self.status.state
    }

    pub fn status(&self) -> &ParticipantStatus {
        &self.status
    }

    /// Current simulation time
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn performance(&self) -> PerformanceStats {
        self.performance.stats()
    }

    pub fn set_init_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&ParticipantCommand) -> Result<(), HandlerError> + Send + 'static,
    {
        self.init_handler = Some(Box::new(handler));
    }

    pub fn set_stop_handler<F>(&mut self, handler: F)
    where
        F: FnMut() -> Result<(), HandlerError> + Send + 'static,
    {
        self.stop_handler = Some(Box::new(handler));
    }

    pub fn set_shutdown_handler<F>(&mut self, handler: F)
    where
        F: FnMut() -> Result<(), HandlerError> + Send + 'static,
    {
        self.shutdown_handler = Some(Box::new(handler));
    }

    /// Set the callback executed once per granted step with `(now, duration)`
    pub fn set_simulation_step<F>(&mut self, step: F)
    where
        F: FnMut(Duration, Duration) + Send + 'static,
    {
        self.simulation_step = Some(Box::new(step));
    }

    /// Set the quantum length requested per cycle
    pub fn set_period(&mut self, period: Duration) {
        if !self.config.time_step.requests_steps() {
            tracing::warn!(
                participant = %self.config.name,
                time_step = %self.config.time_step,
                "set_period() has no effect for participants that do not request quanta"
            );
        }
        self.period = period;
    }

    /// Start the participant and process `inbox` until a terminal state is
    /// reached (blocks the calling thread)
    pub fn run(&mut self, inbox: &Receiver<Envelope>) -> Result<ParticipantState, ParticipantError> {
        let _final_state = self.run_async()?;

        while !self.state().is_terminal() {
            let envelope = inbox.recv().map_err(|_| ParticipantError::InboxClosed)?;
            self.handle_envelope(&envelope);
        }

        tracing::info!(participant = %self.config.name, state = %self.state(), "Participant finished");
        Ok(self.state())
    }

    /// Start the participant without blocking. Inbound messages must then be
    /// fed through [`ParticipantController::handle_envelope`] or the
    /// `receive_*` entry points.
    pub fn run_async(&mut self) -> Result<FinalState, ParticipantError> {
        if self.strategy.is_some() {
            return Err(ParticipantError::AlreadyStarted { participant: self.config.name.clone() });
        }

        if self.simulation_step.is_none() {
            let reason = "run() was called without having set a simulation step";
            tracing::error!(participant = %self.config.name, "{}", reason);
            self.report_error(reason);
            return Err(ParticipantError::MissingSimulationStep {
                participant: self.config.name.clone(),
            });
        }

        let (tx, rx) = oneshot::channel();
        self.final_state_tx = Some(tx);
        self.strategy = Some(self.config.time_step);
        self.change_state(ParticipantState::ServicesCreated, "run() was called");

        Ok(FinalState { rx })
    }

    /// Dispatch one inbound message
    pub fn handle_envelope(&mut self, envelope: &Envelope) {
        match &envelope.message {
            SyncMessage::SystemCommand(command) => self.receive_system_command(command),
            SyncMessage::ParticipantCommand(command) => self.receive_participant_command(command),
            SyncMessage::Tick(tick) => self.receive_tick(tick),
            SyncMessage::QuantumGrant(grant) => self.receive_quantum_grant(grant),
            other => {
                tracing::trace!(
                    participant = %self.config.name,
                    from = %envelope.from,
                    kind = other.kind_name(),
                    "Ignoring message"
                );
            }
        }
    }

    pub fn receive_participant_command(&mut self, command: &ParticipantCommand) {
        if command.participant != self.config.name {
            return;
        }

        let state = self.state();
        if state.is_terminal() {
            tracing::debug!(participant = %self.config.name, %state, command = %command.kind, "Ignoring command in terminal state");
            return;
        }

        if self.strategy.is_none() {
            self.report_error(format!(
                "Received {} before run() or run_async() was called",
                command.kind
            ));
            return;
        }

        match (command.kind, state) {
            (ParticipantCommandKind::Initialize, ParticipantState::ServicesCreated)
            | (
                ParticipantCommandKind::Reinitialize,
                ParticipantState::Stopped | ParticipantState::Error,
            ) => {
                self.initialize(command);
            }
            _ => {
                self.report_error(format!("Received {} while in {}", command.kind, state));
            }
        }
    }

    pub fn receive_system_command(&mut self, command: &SystemCommand) {
        let state = self.state();
        if state.is_terminal() {
            tracing::debug!(participant = %self.config.name, %state, command = %command.kind, "Ignoring command in terminal state");
            return;
        }

        if self.strategy.is_none() {
            self.report_error(format!(
                "Received {} before run() or run_async() was called",
                command.kind
            ));
            return;
        }

        let reason = format!("Received {}", command.kind);
        match (command.kind, state) {
            (SystemCommandKind::Run, ParticipantState::ReadyToRun) => {
                self.change_state(ParticipantState::Running, reason);
                self.start_time_stepping();
            }
            (SystemCommandKind::Stop, ParticipantState::Running | ParticipantState::Paused) => {
                self.stop(reason);
            }
            (SystemCommandKind::Stop, ParticipantState::Stopped) => {
                tracing::warn!(
                    participant = %self.config.name,
                    "Received SystemCommand::Stop, but participant is already stopped"
                );
            }
            (SystemCommandKind::Shutdown, ParticipantState::Stopped | ParticipantState::Error) => {
                self.shutdown(reason);
            }
            (SystemCommandKind::AbortSimulation, _) => {
                self.deferred_completion = None;
                self.change_state(ParticipantState::Aborting, reason);
            }
            _ => {
                self.report_error(format!("Received {} while in {}", command.kind, state));
            }
        }
    }

    pub fn receive_tick(&mut self, tick: &Tick) {
        if !self.config.time_step.accepts_ticks() {
            return;
        }

        if self.strategy.is_none() {
            self.report_error("Received Tick before run() or run_async() was called");
            return;
        }

        if self.accepts_time_advance("Tick") {
            self.now = tick.now;
            self.duration = tick.duration;
            self.execute_step();
        }
    }

    pub fn receive_quantum_grant(&mut self, grant: &QuantumGrant) {
        if !self.config.time_step.accepts_grants() {
            return;
        }
        if grant.grantee != *self.transport.local_address() {
            return;
        }

        if self.strategy.is_none() {
            self.report_error("Received QuantumGrant before run() or run_async() was called");
            return;
        }

        if !self.accepts_time_advance("QuantumGrant") {
            return;
        }

        match grant.status {
            QuantumRequestStatus::Granted => {
                let requested = self.requested_duration.take().unwrap_or(self.period);
                if grant.duration != requested {
                    self.report_error(format!(
                        "Granted quantum duration {:?} does not match requested duration {:?}",
                        grant.duration, requested
                    ));
                    return;
                }
                self.now = grant.now;
                self.duration = grant.duration;
                self.execute_step();
            }
            QuantumRequestStatus::Rejected => {
                tracing::debug!(participant = %self.config.name, now = ?grant.now, "Quantum request rejected");
                self.requested_duration = None;
                self.now = grant.now;
                self.duration = Duration::ZERO;
            }
            QuantumRequestStatus::Invalid => {
                self.report_error("Received QuantumGrant with status Invalid");
            }
        }
    }

    /// Suspend scheduling of further steps
    pub fn pause(&mut self, reason: impl Into<String>) -> Result<(), ParticipantError> {
        let state = self.state();
        if state != ParticipantState::Running {
            let message = format!("pause() was called in state {}", state);
            tracing::error!(participant = %self.config.name, "{}", message);
            self.report_error(message);
            return Err(ParticipantError::InvalidPause { state });
        }

        self.steps_while_paused = 0;
        self.change_state(ParticipantState::Paused, reason);
        Ok(())
    }

    /// Resume after [`ParticipantController::pause`]
    pub fn continue_simulation(&mut self) -> Result<(), ParticipantError> {
        let state = self.state();
        if state != ParticipantState::Paused {
            let message = format!("continue_simulation() was called in state {}", state);
            tracing::error!(participant = %self.config.name, "{}", message);
            self.report_error(message);
            return Err(ParticipantError::InvalidContinue { state });
        }

        self.change_state(ParticipantState::Running, "Pause finished");
        if let Some(message) = self.deferred_completion.take() {
            self.send_step_message(message);
        }
        Ok(())
    }

    /// Force the participant into `Error`
    pub fn report_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.state().is_terminal() {
            tracing::warn!(
                participant = %self.config.name,
                state = %self.state(),
                error = %message,
                "Ignoring error report in terminal state"
            );
            return;
        }

        tracing::error!(participant = %self.config.name, error = %message, "Participant reported an error");
        self.change_state(ParticipantState::Error, message);
    }

    /// Re-send the current status with a fresh refresh time
    pub fn refresh_status(&mut self) {
        self.status.refresh();
        self.publish_status();
    }

    pub fn log_performance_stats(&self) {
        let stats = self.performance.stats();
        if stats.total_steps == 0 {
            tracing::info!(participant = %self.config.name, "No simulation steps executed yet");
            return;
        }

        let ms = |ns: u64| ns as f64 / 1_000_000.0;
        tracing::info!(
            participant = %self.config.name,
            steps = stats.total_steps,
            "Step execution time: avg {:.3}ms, min {:.3}ms, max {:.3}ms, p99 {:.3}ms",
            ms(stats.exec_avg_ns),
            ms(stats.exec_min_ns),
            ms(stats.exec_max_ns),
            ms(stats.exec_p99_ns),
        );
        tracing::info!(
            participant = %self.config.name,
            "Wait time between steps: avg {:.3}ms, min {:.3}ms, max {:.3}ms",
            ms(stats.wait_avg_ns),
            ms(stats.wait_min_ns),
            ms(stats.wait_max_ns),
        );
        if stats.soft_limit_violations > 0 {
            tracing::warn!(
                participant = %self.config.name,
                violations = stats.soft_limit_violations,
                "Steps exceeded the soft execution time limit"
            );
        }
    }

    fn initialize(&mut self, command: &ParticipantCommand) {
        let mut reason = format!("Received {}", command.kind);
        self.change_state(ParticipantState::CommunicationInitializing, reason.clone());

        let outcome = self.init_handler.as_mut().map(|handler| invoke_guarded(|| handler(command)));
        match outcome {
            Some(HandlerOutcome::Completed) => {
                reason.push_str(" and InitHandler completed without error");
            }
            Some(HandlerOutcome::Failed(e)) => {
                self.report_error(format!("InitHandler failed: {}", e));
                return;
            }
            Some(HandlerOutcome::Panicked(e)) => {
                self.report_error(format!("InitHandler panicked: {}", e));
                return;
            }
            None => reason.push_str(" and no InitHandler was registered"),
        }

        self.now = Duration::ZERO;
        self.duration = Duration::ZERO;
        self.requested_duration = None;
        self.deferred_completion = None;

        self.change_state(ParticipantState::CommunicationInitialized, reason.clone());
        self.change_state(ParticipantState::ReadyToRun, reason);
    }

    fn stop(&mut self, reason: String) {
        self.deferred_completion = None;
        self.change_state(ParticipantState::Stopping, reason.clone());

        let outcome = self.stop_handler.as_mut().map(|handler| invoke_guarded(|| handler()));
        match outcome {
            Some(HandlerOutcome::Completed) => self.change_state(
                ParticipantState::Stopped,
                format!("{} and StopHandler completed successfully", reason),
            ),
            Some(HandlerOutcome::Failed(e)) => {
                self.report_error(format!("{} and StopHandler failed: {}", reason, e));
            }
            Some(HandlerOutcome::Panicked(e)) => self.change_state(
                ParticipantState::Stopped,
                format!("{} and StopHandler panicked: {}", reason, e),
            ),
            None => self.change_state(
                ParticipantState::Stopped,
                format!("{} and no StopHandler was registered", reason),
            ),
        }
    }

    fn shutdown(&mut self, reason: String) {
        self.change_state(ParticipantState::ShuttingDown, reason.clone());

        let outcome = self.shutdown_handler.as_mut().map(|handler| invoke_guarded(|| handler()));
        let reason = match outcome {
            Some(HandlerOutcome::Completed) => {
                format!("{} and ShutdownHandler completed successfully", reason)
            }
            Some(HandlerOutcome::Failed(e)) => {
                tracing::warn!(participant = %self.config.name, error = %e, "ShutdownHandler failed");
                format!("{} and ShutdownHandler failed: {}", reason, e)
            }
            Some(HandlerOutcome::Panicked(e)) => {
                tracing::warn!(participant = %self.config.name, error = %e, "ShutdownHandler panicked");
                format!("{} and ShutdownHandler panicked: {}", reason, e)
            }
            None => format!("{} and no ShutdownHandler was registered", reason),
        };
        self.change_state(ParticipantState::Shutdown, reason);
    }

    fn start_time_stepping(&mut self) {
        self.performance.begin_wait();
        if self.config.time_step.requests_steps() {
            let request = self.quantum_request();
            self.send_step_message(request);
        }
    }

    /// Whether a time-advancing message may be processed in the current state
    fn accepts_time_advance(&mut self, message: &str) -> bool {
        let state = self.state();
        match state {
            ParticipantState::Running => true,
            ParticipantState::Paused => {
                self.steps_while_paused += 1;
                if self.steps_while_paused > 1 {
                    tracing::warn!(
                        participant = %self.config.name,
                        steps = self.steps_while_paused,
                        "Received {} while paused; executing another step",
                        message
                    );
                }
                true
            }
            ParticipantState::Stopping
            | ParticipantState::Stopped
            | ParticipantState::Error
            | ParticipantState::ShuttingDown
            | ParticipantState::Shutdown
            | ParticipantState::Aborting => {
                tracing::trace!(participant = %self.config.name, %state, "Ignoring {}", message);
                false
            }
            ParticipantState::Invalid
            | ParticipantState::ServicesCreated
            | ParticipantState::CommunicationInitializing
            | ParticipantState::CommunicationInitialized
            | ParticipantState::ReadyToRun => {
                self.report_error(format!("Received {} in state {}", message, state));
                false
            }
        }
    }

    fn execute_step(&mut self) {
        let Some(step) = self.simulation_step.as_mut() else {
            self.report_error("No simulation step available");
            return;
        };

        self.performance.begin_step();
        step(self.now, self.duration);
        let (elapsed, exceeded) = self.performance.end_step();

        tracing::debug!(participant = %self.config.name, now = ?self.now, elapsed = ?elapsed, "Simulation step finished");
        if exceeded {
            tracing::warn!(
                participant = %self.config.name,
                now = ?self.now,
                elapsed = ?elapsed,
                limit = ?self.performance.soft_limit(),
                "Simulation step exceeded the soft execution time limit"
            );
        }

        let interval = self.config.performance.log_interval_steps;
        if interval > 0 && self.performance.total_steps() % interval == 0 {
            self.log_performance_stats();
        }

        self.complete_step();
    }

    fn complete_step(&mut self) {
        let completion = match self.config.time_step {
            TimeStepStrategy::TickDriven => Some(SyncMessage::TickDone(TickDone {
                finished_tick: Tick { now: self.now, duration: self.duration },
            })),
            TimeStepStrategy::QuantumDriven => {
                self.now += self.period;
                Some(self.quantum_request())
            }
            TimeStepStrategy::QuantumPassive => None,
        };

        let Some(message) = completion else {
            return;
        };

        if self.state() == ParticipantState::Paused {
            tracing::debug!(
                participant = %self.config.name,
                kind = message.kind_name(),
                "Deferring step completion until the pause ends"
            );
            self.deferred_completion = Some(message);
        } else {
            self.send_step_message(message);
        }
    }

    fn quantum_request(&mut self) -> SyncMessage {
        self.requested_duration = Some(self.period);
        SyncMessage::QuantumRequest(QuantumRequest { now: self.now, duration: self.period })
    }

    fn send_step_message(&self, message: SyncMessage) {
        match self.config.sync_policy {
            SyncPolicy::Loose => self.send(message),
            SyncPolicy::Strict => {
                let transport = Arc::clone(&self.transport);
                let participant = self.config.name.clone();
                self.transport.on_all_messages_delivered(Box::new(move || {
                    let kind = message.kind_name();
                    if let Err(e) = transport.send(Target::Broadcast, message) {
                        tracing::error!(%participant, kind, error = %e, "Failed to send step completion");
                    }
                }));
            }
        }
    }

    fn send(&self, message: SyncMessage) {
        let kind = message.kind_name();
        if let Err(e) = self.transport.send(Target::Broadcast, message) {
            tracing::error!(participant = %self.config.name, kind, error = %e, "Failed to send message");
        }
    }

    fn change_state(&mut self, new_state: ParticipantState, reason: impl Into<String>) {
        let old_state = self.state();
        if old_state.is_terminal() {
            tracing::debug!(
                participant = %self.config.name,
                state = %old_state,
                requested = %new_state,
                "Ignoring state change in terminal state"
            );
            return;
        }

        self.status.transition(new_state, reason);
        tracing::info!(
            participant = %self.config.name,
            from = %old_state,
            to = %new_state,
            reason = %self.status.enter_reason,
            "Participant state changed"
        );
        self.publish_status();

        if new_state.is_terminal() {
            if let Some(tx) = self.final_state_tx.take() {
                // Receiver may already be gone when run() drives the loop
                let _ = tx.send(new_state);
            }
        }
    }

    fn publish_status(&self) {
        self.send(SyncMessage::ParticipantStatus(self.status.clone()));
    }
}
