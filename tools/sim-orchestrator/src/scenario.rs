use anyhow::{bail, Context, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use orchestration_types::{Envelope, ParticipantState, SystemState};
use participant_controller::{
    ParticipantConfig, ParticipantController, PerformanceStats, SyncPolicy, TimeStepStrategy,
};
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use sync_transport::{BusConfig, InMemoryBus};
use system_controller::{Coordinator, CoordinatorConfig};
use system_monitor::SystemMonitor;

const COORDINATOR: &str = "SystemController";

/// Everything needed to run one simulation
#[derive(Debug, Clone)]
pub struct Scenario {
    pub coordinator: CoordinatorConfig,
    pub strategy: TimeStepStrategy,
    pub sync_policy: SyncPolicy,
    /// Upper bound of the simulated work per step
    pub step_jitter: Duration,
    pub exec_time_limit_soft_ms: Option<u64>,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
pub struct ParticipantReport {
    pub name: String,
    pub final_state: String,
    pub steps: u64,
    pub sim_time_ns: u128,
    pub performance: PerformanceStats,
}

#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub system_state: String,
    pub system_states: Vec<String>,
    pub ticks_sent: u64,
    pub quanta_granted: u64,
    pub quanta_rejected: u64,
    pub invalid_transitions: u64,
    pub wall_time_ms: u128,
    pub finished_at: String,
    pub participants: Vec<ParticipantReport>,
}

struct ParticipantRun {
    name: String,
    handle: JoinHandle<Result<(ParticipantState, Duration, PerformanceStats)>>,
    steps: Arc<AtomicU64>,
}

/// Run a full Run/Stop/Shutdown lifecycle with one thread per participant
/// and the coordinator on the calling thread
pub fn run(scenario: &Scenario) -> Result<ScenarioReport> {
    scenario.coordinator.validate().context("invalid coordinator configuration")?;
    if scenario.coordinator.required_participants.is_empty() {
        bail!("at least one required participant is needed");
    }

    let started = Instant::now();
    let bus = scenario_bus();
    let monitor = Arc::new(SystemMonitor::new());
    monitor.watch_connections(&bus);

    let (state_tx, state_rx) = channel::unbounded();
    monitor.add_system_state_handler(move |state| {
        // The receiver outlives every state change the coordinator cares about
        let _ = state_tx.send(state);
    });

    let (endpoint, coordinator_inbox) = bus.attach(COORDINATOR)?;
    let mut coordinator = Coordinator::new(scenario.coordinator.clone(), Arc::new(endpoint))?;

    let workflow = coordinator.announce_workflow()?;
    monitor.update_required_participants(workflow.required_participant_names.iter().cloned());

    let mut runs = Vec::new();
    for name in &scenario.coordinator.required_participants {
        if scenario.strategy == TimeStepStrategy::TickDriven {
            coordinator.add_tick_participant(name.clone());
        }
        runs.push(spawn_participant(&bus, scenario, name)?);
    }

    let outcome = drive(&mut coordinator, &monitor, &coordinator_inbox, &state_rx, scenario.timeout);
    if outcome.is_err() {
        tracing::error!("Scenario did not finish, aborting simulation");
        coordinator.controller().abort_simulation()?;
    }

    let mut participants = Vec::new();
    for run in runs {
        let steps = run.steps.load(Ordering::Relaxed);
        let (state, now, performance) = run
            .handle
            .join()
            .map_err(|_| anyhow::anyhow!("participant thread {} panicked", run.name))??;
        bus.detach(&run.name);
        participants.push(ParticipantReport {
            name: run.name,
            final_state: state.to_string(),
            steps,
            sim_time_ns: now.as_nanos(),
            performance,
        });
    }
    let system_states = outcome?;

    Ok(ScenarioReport {
        system_state: monitor.system_state().to_string(),
        system_states: system_states.iter().map(ToString::to_string).collect(),
        ticks_sent: coordinator.tick_master().ticks_sent(),
        quanta_granted: coordinator.arbiter().granted(),
        quanta_rejected: coordinator.arbiter().rejected(),
        invalid_transitions: monitor.invalid_transition_count(),
        wall_time_ms: started.elapsed().as_millis(),
        finished_at: chrono::Utc::now().to_rfc3339(),
        participants,
    })
}

/// Bus for a live run: immediate delivery and no journal, so long runs keep
/// a flat memory profile
fn scenario_bus() -> InMemoryBus {
    InMemoryBus::new(BusConfig::default())
}

fn spawn_participant(
    bus: &InMemoryBus,
    scenario: &Scenario,
    name: &str,
) -> Result<ParticipantRun> {
    let mut config = ParticipantConfig::new(name, scenario.strategy)
        .with_sync_policy(scenario.sync_policy)
        .with_period(scenario.coordinator.tick_master.period);
    config.performance.exec_time_limit_soft_ms = scenario.exec_time_limit_soft_ms;

    let (endpoint, inbox) = bus.attach(name)?;
    let steps = Arc::new(AtomicU64::new(0));
    let step_counter = steps.clone();
    let jitter = scenario.step_jitter;

    let handle = thread::Builder::new()
        .name(format!("participant-{name}"))
        .spawn(move || {
            let mut controller = ParticipantController::new(config, Arc::new(endpoint))?;
            controller.set_simulation_step(move |now, duration| {
                step_counter.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(now = ?now, duration = ?duration, "Simulation step");
                if !jitter.is_zero() {
                    let work = rand::thread_rng().gen_range(Duration::ZERO..=jitter);
                    thread::sleep(work);
                }
            });
            let state = controller.run(&inbox)?;
            controller.log_performance_stats();
            Ok((state, controller.now(), controller.performance()))
        })?;

    Ok(ParticipantRun { name: name.to_string(), handle, steps })
}

/// Feed time-sync traffic and system state changes to the coordinator until
/// the simulation finished. Returns the observed system states.
fn drive(
    coordinator: &mut Coordinator,
    monitor: &SystemMonitor,
    inbox: &Receiver<Envelope>,
    state_changes: &Receiver<SystemState>,
    timeout: Duration,
) -> Result<Vec<SystemState>> {
    let deadline = Instant::now() + timeout;
    let mut observed = Vec::new();

    while !coordinator.is_finished() {
        while let Ok(state) = state_changes.try_recv() {
            observed.push(state);
            coordinator.on_system_state(state)?;
        }
        if coordinator.is_finished() {
            break;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match inbox.recv_timeout(remaining.min(Duration::from_millis(100))) {
            Ok(envelope) => {
                if !monitor.handle_envelope(&envelope) {
                    coordinator.handle_envelope(&envelope)?;
                }
            }
            Err(RecvTimeoutError::Timeout) if remaining.is_zero() => {
                bail!("simulation did not finish within {:?} (system state {})", timeout, monitor.system_state());
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => bail!("coordinator inbox closed"),
        }
    }

    Ok(observed)
}
