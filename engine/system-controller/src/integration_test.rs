// End-to-end tests: participants, monitor and coordinator over one in-memory bus
// Everything runs on the test thread; the pump drains mailboxes until the bus is quiet

use crate::{ArbiterConfig, Coordinator, CoordinatorConfig, TickMasterConfig};
use crossbeam::channel::Receiver;
use orchestration_types::{Envelope, ParticipantState, SyncMessage, SystemState};
use participant_controller::{ParticipantConfig, ParticipantController, SyncPolicy, TimeStepStrategy};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_transport::{BusConfig, DeliveryMode, InMemoryBus, JournalEvent};
use system_monitor::SystemMonitor;

const COORDINATOR: &str = "Coordinator";

struct Participant {
    controller: ParticipantController,
    inbox: Receiver<Envelope>,
}

struct Simulation {
    bus: InMemoryBus,
    coordinator: Coordinator,
    coordinator_inbox: Receiver<Envelope>,
    monitor: Arc<SystemMonitor>,
    state_changes: Arc<Mutex<VecDeque<SystemState>>>,
    observed: Vec<SystemState>,
    participants: Vec<Participant>,
    steps: Arc<Mutex<Vec<(String, Duration)>>>,
}

impl Simulation {
    fn new(bus_config: BusConfig, config: CoordinatorConfig) -> Self {
        let bus = InMemoryBus::new(bus_config);
        let monitor = Arc::new(SystemMonitor::new());
        monitor.watch_connections(&bus);

        let state_changes = Arc::new(Mutex::new(VecDeque::new()));
        let queue = state_changes.clone();
        monitor.add_system_state_handler(move |state| queue.lock().unwrap().push_back(state));

        let (endpoint, coordinator_inbox) = bus.attach(COORDINATOR).unwrap();
        let coordinator = Coordinator::new(config, Arc::new(endpoint)).unwrap();

        Self {
            bus,
            coordinator,
            coordinator_inbox,
            monitor,
            state_changes,
            observed: Vec::new(),
            participants: Vec::new(),
            steps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn add_participant(&mut self, config: ParticipantConfig) {
        let name = config.name.clone();
        if config.time_step == TimeStepStrategy::TickDriven {
            self.coordinator.add_tick_participant(name.clone());
        }

        let (endpoint, inbox) = self.bus.attach(name.clone()).unwrap();
        let mut controller = ParticipantController::new(config, Arc::new(endpoint)).unwrap();
        let steps = self.steps.clone();
        controller.set_simulation_step(move |now, _duration| {
            steps.lock().unwrap().push((name.clone(), now));
        });
        self.participants.push(Participant { controller, inbox });
    }

    fn start(&mut self) {
        let workflow = self.coordinator.announce_workflow().unwrap();
        self.monitor
            .update_required_participants(workflow.required_participant_names.iter().cloned());
        for participant in &mut self.participants {
            participant.controller.run_async().unwrap();
        }
        self.pump();
    }

    fn pump(&mut self) {
        for _ in 0..100_000 {
            let mut progressed = false;

            for participant in &mut self.participants {
                while let Ok(envelope) = participant.inbox.try_recv() {
                    participant.controller.handle_envelope(&envelope);
                    progressed = true;
                }
            }

            while let Ok(envelope) = self.coordinator_inbox.try_recv() {
                progressed = true;
                if !self.monitor.handle_envelope(&envelope) {
                    self.coordinator.handle_envelope(&envelope).unwrap();
                }
                self.apply_state_changes();
            }

            if progressed {
                continue;
            }
            if self.bus.config().delivery_mode == DeliveryMode::Deferred && self.has_outstanding() {
                self.bus.confirm_all_deliveries();
                continue;
            }
            return;
        }
        panic!("simulation did not settle");
    }

    fn apply_state_changes(&mut self) {
        loop {
            let Some(state) = self.state_changes.lock().unwrap().pop_front() else {
                return;
            };
            self.observed.push(state);
            self.coordinator.on_system_state(state).unwrap();
        }
    }

    fn has_outstanding(&self) -> bool {
        self.bus.attached_participants().iter().any(|name| self.bus.outstanding(name) > 0)
    }

    fn steps_of(&self, name: &str) -> Vec<Duration> {
        self.steps
            .lock()
            .unwrap()
            .iter()
            .filter(|(participant, _)| participant == name)
            .map(|(_, now)| *now)
            .collect()
    }

    fn final_states(&self) -> Vec<ParticipantState> {
        self.participants.iter().map(|participant| participant.controller.state()).collect()
    }
}

fn tick_config(tick_limit: u64) -> CoordinatorConfig {
    CoordinatorConfig {
        required_participants: vec!["A".to_string(), "B".to_string()],
        tick_master: TickMasterConfig { tick_limit: Some(tick_limit), period: Duration::from_millis(1) },
        arbiter: ArbiterConfig::default(),
    }
}

fn millis(values: impl IntoIterator<Item = u64>) -> Vec<Duration> {
    values.into_iter().map(Duration::from_millis).collect()
}

#[test]
fn test_tick_driven_run_stop_shutdown() {
    let mut sim = Simulation::new(BusConfig::default(), tick_config(10));
    sim.add_participant(ParticipantConfig::new("A", TimeStepStrategy::TickDriven));
    sim.add_participant(ParticipantConfig::new("B", TimeStepStrategy::TickDriven));
    sim.start();

    assert_eq!(sim.monitor.system_state(), SystemState::Shutdown);
    assert!(sim.coordinator.is_finished());
    assert_eq!(sim.final_states(), vec![ParticipantState::Shutdown; 2]);
    assert_eq!(
        sim.observed,
        vec![
            SystemState::ServicesCreated,
            SystemState::CommunicationInitializing,
            SystemState::CommunicationInitialized,
            SystemState::ReadyToRun,
            SystemState::Running,
            SystemState::Stopping,
            SystemState::Stopped,
            SystemState::ShuttingDown,
            SystemState::Shutdown,
        ]
    );

    assert_eq!(sim.steps_of("A"), millis(0..10));
    assert_eq!(sim.steps_of("B"), millis(0..10));
    assert_eq!(sim.coordinator.tick_master().ticks_sent(), 10);
    assert_eq!(sim.monitor.invalid_transition_count(), 0);
}

#[test]
fn test_strict_delivery_orders_tick_done_after_confirmation() {
    let mut sim = Simulation::new(BusConfig::deferred(), tick_config(5));
    for name in ["A", "B"] {
        sim.add_participant(
            ParticipantConfig::new(name, TimeStepStrategy::TickDriven).with_sync_policy(SyncPolicy::Strict),
        );
    }
    sim.start();

    assert_eq!(sim.monitor.system_state(), SystemState::Shutdown);
    assert_eq!(sim.steps_of("A"), millis(0..5));

    // Among a participant's journal events, each TickDone directly follows a delivery confirmation
    let journal = sim.bus.journal();
    for name in ["A", "B"] {
        let own_events: Vec<&JournalEvent> = journal
            .iter()
            .filter(|event| match event {
                JournalEvent::Sent { from, .. } => from.participant == name,
                JournalEvent::DeliveryConfirmed { participant, .. } => participant == name,
            })
            .collect();

        let mut tick_dones = 0;
        for (index, event) in own_events.iter().enumerate() {
            if matches!(event, JournalEvent::Sent { message: SyncMessage::TickDone(_), .. }) {
                tick_dones += 1;
                assert!(index > 0);
                assert!(
                    matches!(own_events[index - 1], JournalEvent::DeliveryConfirmed { .. }),
                    "TickDone of {name} sent before prior messages were delivered"
                );
            }
        }
        assert_eq!(tick_dones, 5);
    }
}

#[test]
fn test_quantum_driven_until_horizon() {
    let config = CoordinatorConfig {
        required_participants: vec!["A".to_string(), "B".to_string()],
        tick_master: TickMasterConfig::default(),
        arbiter: ArbiterConfig { horizon: Some(Duration::from_millis(10)) },
    };
    let mut sim = Simulation::new(BusConfig::default(), config);
    for name in ["A", "B"] {
        sim.add_participant(
            ParticipantConfig::new(name, TimeStepStrategy::QuantumDriven).with_period(Duration::from_millis(2)),
        );
    }
    sim.start();

    assert_eq!(sim.monitor.system_state(), SystemState::Shutdown);
    assert_eq!(sim.steps_of("A"), millis([0, 2, 4, 6, 8]));
    assert_eq!(sim.steps_of("B"), millis([0, 2, 4, 6, 8]));
    assert_eq!(sim.coordinator.arbiter().granted(), 10);
    assert!(sim.coordinator.arbiter().rejected() >= 1);
    assert_eq!(sim.coordinator.tick_master().ticks_sent(), 0);
}

#[test]
fn test_non_required_participant_does_not_gate_the_run() {
    let mut sim = Simulation::new(BusConfig::default(), tick_config(3));
    sim.add_participant(ParticipantConfig::new("A", TimeStepStrategy::TickDriven));
    sim.add_participant(ParticipantConfig::new("B", TimeStepStrategy::TickDriven));
    sim.add_participant(ParticipantConfig::new("Observer", TimeStepStrategy::QuantumPassive));
    sim.start();

    assert_eq!(sim.monitor.system_state(), SystemState::Shutdown);
    assert!(!sim.observed.contains(&SystemState::Error));
    assert!(sim.steps_of("Observer").is_empty());

    // Only required participants are initialized, so Run found the observer uninitialized
    let observer = sim.monitor.participant_status("Observer").unwrap();
    assert_eq!(observer.state, ParticipantState::Shutdown);
}

#[test]
fn test_participant_error_leads_to_shutdown() {
    let mut sim = Simulation::new(BusConfig::default(), tick_config(100));
    sim.add_participant(ParticipantConfig::new("A", TimeStepStrategy::TickDriven));
    sim.add_participant(ParticipantConfig::new("B", TimeStepStrategy::TickDriven));
    sim.participants[1]
        .controller
        .set_init_handler(|_| Err(participant_controller::HandlerError::new("device missing")));
    sim.start();

    assert!(sim.observed.contains(&SystemState::Error));
    assert!(sim.coordinator.is_finished());
    assert_eq!(sim.final_states(), vec![ParticipantState::Shutdown; 2]);
    assert!(sim.steps_of("A").is_empty());
}

#[test]
fn test_removed_participant_releases_tick_barrier() {
    let mut config = tick_config(4);
    config.required_participants = vec!["A".to_string()];
    let mut sim = Simulation::new(BusConfig::default(), config);
    sim.add_participant(ParticipantConfig::new("A", TimeStepStrategy::TickDriven));
    sim.coordinator.add_tick_participant("Gone");
    sim.start();

    // Stalled on the first tick, waiting for a participant that never answers
    assert_eq!(sim.steps_of("A"), millis([0]));
    assert_eq!(sim.monitor.system_state(), SystemState::Running);

    sim.coordinator.remove_participant("Gone").unwrap();
    sim.pump();

    assert_eq!(sim.steps_of("A"), millis(0..4));
    assert_eq!(sim.monitor.system_state(), SystemState::Shutdown);
}
