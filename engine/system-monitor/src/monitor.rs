use crate::handlers::{HandlerRegistry, Sequenced, in_sequence};
use crate::registry::StatusRegistry;
use crate::types::{HandlerId, MonitorError};
use orchestration_types::{
    Envelope, ParticipantConnectionInformation, ParticipantState, ParticipantStatus, SyncMessage,
    SystemState, validate_transition,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use sync_transport::ConnectionEvents;

/// Global view of all participants and the system state derived from them
///
/// Shared across delivery threads. Handlers run after every internal lock
/// is released, so a handler may call back into the monitor. State and
/// status handlers are ordered by sequence number: under concurrent reports
/// a handler may skip an intermediate value but never sees one older than a
/// value it was already given.
pub struct SystemMonitor {
    registry: Mutex<StatusRegistry>,
    connected: RwLock<BTreeMap<String, ParticipantConnectionInformation>>,

    system_state_handlers: HandlerRegistry<Sequenced<SystemState>>,
    participant_status_handlers: HandlerRegistry<Sequenced<ParticipantStatus>>,
    connected_handlers: HandlerRegistry<ParticipantConnectionInformation>,
    disconnected_handlers: HandlerRegistry<ParticipantConnectionInformation>,

    invalid_transitions: AtomicU64,
}

impl SystemMonitor {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(StatusRegistry::new()),
            connected: RwLock::new(BTreeMap::new()),
            system_state_handlers: HandlerRegistry::new(),
            participant_status_handlers: HandlerRegistry::new(),
            connected_handlers: HandlerRegistry::new(),
            disconnected_handlers: HandlerRegistry::new(),
            invalid_transitions: AtomicU64::new(0),
        }
    }

    /// Forward connect and disconnect notifications of `events` to this monitor
    pub fn watch_connections(self: &Arc<Self>, events: &dyn ConnectionEvents) {
        let weak: Weak<Self> = Arc::downgrade(self);
        events.on_participant_connected(Arc::new(move |info: &ParticipantConnectionInformation| {
            if let Some(monitor) = weak.upgrade() {
                monitor.on_participant_connected(info);
            }
        }));

        let weak: Weak<Self> = Arc::downgrade(self);
        events.on_participant_disconnected(Arc::new(move |info: &ParticipantConnectionInformation| {
            if let Some(monitor) = weak.upgrade() {
                monitor.on_participant_disconnected(info);
            }
        }));
    }

    /// Route an inbound message. Returns true if the monitor consumed it.
    pub fn handle_envelope(&self, envelope: &Envelope) -> bool {
        match &envelope.message {
            SyncMessage::ParticipantStatus(status) => {
                self.receive_status(status);
                true
            }
            SyncMessage::WorkflowConfiguration(workflow) => {
                self.update_required_participants(workflow.required_participant_names.iter().cloned());
                true
            }
            _ => false,
        }
    }

    /// Record a participant status and re-derive the system state
    pub fn receive_status(&self, status: &ParticipantStatus) {
        let name = status.participant_name.as_str();

        let (sequence, system_state_change) = {
            let mut registry = self.registry.lock();
            let old_state = registry.state_or_insert(name);

            if let Err(violation) = validate_transition(old_state, status.state) {
                self.record_invalid_transition(status, &violation.to_string());
            }

            if old_state == ParticipantState::Shutdown {
                tracing::debug!(
                    participant = %name,
                    state = %status.state,
                    "Ignoring status update, participant is already in terminal state ParticipantState::Shutdown"
                );
                return;
            }

            let sequence = registry.store(status.clone());

            if old_state == status.state {
                return;
            }

            let old_system_state = registry.system_state();
            registry.update_system_state(name, status.state);
            (sequence, derived_change(&registry, old_system_state))
        };

        self.participant_status_handlers
            .invoke_all(&Sequenced { value: status.clone(), sequence });

        if let Some((old_system_state, new_system_state)) = system_state_change {
            self.notify_system_state(old_system_state, new_system_state);
        }
    }

    /// Replace the set of participants whose states gate the system state
    pub fn update_required_participants<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let required: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        tracing::info!(required = ?required, "Updating required participants");

        let system_state_change = {
            let mut registry = self.registry.lock();
            registry.set_required(required.clone());

            if !registry.all_required_known() {
                None
            } else {
                let old_system_state = registry.system_state();
                for name in &required {
                    let state = registry.get(name).map(|status| status.state);
                    if let Some(state) = state {
                        registry.update_system_state(name, state);
                    }
                }
                derived_change(&registry, old_system_state)
            }
        };

        if let Some((old_system_state, new_system_state)) = system_state_change {
            self.notify_system_state(old_system_state, new_system_state);
        }
    }

    /// Register a system-state handler. It is called right away with the
    /// current state unless that is still `Invalid`. A change that lands
    /// while the current state is being replayed is delivered after it.
    pub fn add_system_state_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(SystemState) + Send + Sync + 'static,
    {
        let handler = in_sequence(|_: &SystemState| (), move |state: &SystemState| handler(*state));

        let (current, id) = {
            let registry = self.registry.lock();
            let current = Sequenced {
                value: registry.system_state(),
                sequence: registry.system_state_generation(),
            };
            (current, self.system_state_handlers.add(handler.clone()))
        };

        if current.value != SystemState::Invalid {
            handler(&current);
        }
        id
    }

    pub fn remove_system_state_handler(&self, id: HandlerId) {
        if !self.system_state_handlers.remove(id) {
            tracing::warn!(handler = %id, "remove_system_state_handler failed: unknown HandlerId");
        }
    }

    /// Register a participant-status handler. Every known status other than
    /// `Invalid` is replayed to it first. A replayed status is dropped if a
    /// newer one for the same participant already reached the handler.
    pub fn add_participant_status_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&ParticipantStatus) + Send + Sync + 'static,
    {
        let handler = in_sequence(
            |status: &ParticipantStatus| status.participant_name.clone(),
            move |status: &ParticipantStatus| handler(status),
        );

        let (known, id) = {
            let registry = self.registry.lock();
            let known: Vec<Sequenced<ParticipantStatus>> = registry
                .sequenced_statuses()
                .filter(|(status, _)| status.state != ParticipantState::Invalid)
                .map(|(status, sequence)| Sequenced { value: status.clone(), sequence })
                .collect();
            (known, self.participant_status_handlers.add(handler.clone()))
        };

        for status in &known {
            handler(status);
        }
        id
    }

    pub fn remove_participant_status_handler(&self, id: HandlerId) {
        if !self.participant_status_handlers.remove(id) {
            tracing::warn!(handler = %id, "remove_participant_status_handler failed: unknown HandlerId");
        }
    }

    pub fn add_participant_connected_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&ParticipantConnectionInformation) + Send + Sync + 'static,
    {
        self.connected_handlers
            .add(Arc::new(move |info: &ParticipantConnectionInformation| handler(info)))
    }

    pub fn add_participant_disconnected_handler<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&ParticipantConnectionInformation) + Send + Sync + 'static,
    {
        self.disconnected_handlers
            .add(Arc::new(move |info: &ParticipantConnectionInformation| handler(info)))
    }

    pub fn remove_participant_connected_handler(&self, id: HandlerId) -> bool {
        self.connected_handlers.remove(id)
    }

    pub fn remove_participant_disconnected_handler(&self, id: HandlerId) -> bool {
        self.disconnected_handlers.remove(id)
    }

    pub fn on_participant_connected(&self, info: &ParticipantConnectionInformation) {
        self.connected.write().insert(info.participant_name.clone(), info.clone());
        tracing::info!(participant = %info.participant_name, address = %info.address, "Participant connected");

        self.connected_handlers.invoke_all(info);
    }

    /// Forget the participant's connection and status. A disconnected
    /// required participant blocks every further system state derivation
    /// until it reports again.
    pub fn on_participant_disconnected(&self, info: &ParticipantConnectionInformation) {
        let name = info.participant_name.as_str();
        self.connected.write().remove(name);

        let (removed, required) = {
            let mut registry = self.registry.lock();
            (registry.remove(name), registry.is_required(name))
        };

        if required {
            tracing::warn!(
                participant = %name,
                last_state = ?removed.map(|status| status.state),
                "Required participant disconnected, system state is frozen"
            );
        } else {
            tracing::info!(participant = %name, "Participant disconnected");
        }

        self.disconnected_handlers.invoke_all(info);
    }

    pub fn system_state(&self) -> SystemState {
        self.registry.lock().system_state()
    }

    pub fn participant_status(&self, name: &str) -> Result<ParticipantStatus, MonitorError> {
        self.registry
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| MonitorError::UnknownParticipant(name.to_string()))
    }

    /// Snapshot of every known status
    pub fn participant_statuses(&self) -> Vec<ParticipantStatus> {
        self.registry.lock().statuses().cloned().collect()
    }

    pub fn is_participant_connected(&self, name: &str) -> bool {
        self.connected.read().contains_key(name)
    }

    pub fn connected_participants(&self) -> Vec<String> {
        self.connected.read().keys().cloned().collect()
    }

    pub fn required_participants(&self) -> BTreeSet<String> {
        self.registry.lock().required().clone()
    }

    /// Number of status updates that skipped or reversed a lifecycle step
    pub fn invalid_transition_count(&self) -> u64 {
        self.invalid_transitions.load(Ordering::Relaxed)
    }

    fn record_invalid_transition(&self, status: &ParticipantStatus, violation: &str) {
        tracing::error!(
            participant = %status.participant_name,
            enter_time = %status.enter_time.format("%Y-%m-%dT%H:%M:%S"),
            enter_reason = %status.enter_reason,
            "SystemMonitor detected {}",
            violation
        );
        self.invalid_transitions.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("system_monitor_invalid_transitions_total");
    }

    fn notify_system_state(&self, old_state: SystemState, new_state: Sequenced<SystemState>) {
        tracing::info!(from = %old_state, to = %new_state.value, "System state changed");
        metrics::increment_counter!(
            "system_monitor_system_state_changes_total",
            "state" => new_state.value.as_str()
        );
        self.system_state_handlers.invoke_all(&new_state);
    }
}

/// Old and new system state, the new one tagged with its generation, if
/// re-deriving moved away from `old_system_state`
fn derived_change(
    registry: &StatusRegistry,
    old_system_state: SystemState,
) -> Option<(SystemState, Sequenced<SystemState>)> {
    let new_system_state = registry.system_state();
    (new_system_state != old_system_state).then(|| {
        (
            old_system_state,
            Sequenced { value: new_system_state, sequence: registry.system_state_generation() },
        )
    })
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}
