mod scenario;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use participant_controller::{SyncPolicy, TimeStepStrategy};
use scenario::{Scenario, ScenarioReport};
use std::path::PathBuf;
use std::time::Duration;
use system_controller::CoordinatorConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sim-orchestrator")]
#[command(about = "Run a simulation lifecycle over the in-memory bus")]
#[command(version = "0.1.0")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Tick,
    Quantum,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a complete Run/Stop/Shutdown lifecycle
    Run {
        /// Required participants, comma separated
        #[arg(short, long, value_delimiter = ',', default_value = "A,B")]
        participants: Vec<String>,

        /// How participants advance simulation time
        #[arg(short, long, value_enum, default_value = "tick")]
        strategy: Strategy,

        /// Number of ticks before the run is stopped
        #[arg(short, long, default_value = "10")]
        ticks: u64,

        /// Simulation time per tick or quantum in microseconds
        #[arg(long, default_value = "1000")]
        period_us: u64,

        /// Reject quanta ending after this simulation time (quantum strategy)
        #[arg(long, default_value = "10")]
        horizon_ms: u64,

        /// Send step completions only after earlier messages were delivered
        #[arg(long)]
        strict: bool,

        /// Upper bound of random simulated work per step in microseconds
        #[arg(long, default_value = "0")]
        jitter_us: u64,

        /// Warn about steps running longer than this
        #[arg(long)]
        soft_limit_ms: Option<u64>,

        /// Abort the simulation after this many seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,

        /// Coordinator configuration file; overrides participants, ticks, period and horizon
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default coordinator configuration
    InitConfig {
        #[arg(short, long, default_value = "coordinator.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_thread_names(true).init();

    match cli.command {
        Commands::Run {
            participants,
            strategy,
            ticks,
            period_us,
            horizon_ms,
            strict,
            jitter_us,
            soft_limit_ms,
            timeout_secs,
            config,
            json,
        } => {
            let coordinator = match config {
                Some(path) => CoordinatorConfig::from_file(&path)?,
                None => {
                    let mut coordinator = CoordinatorConfig {
                        required_participants: participants,
                        ..CoordinatorConfig::default()
                    };
                    coordinator.tick_master.tick_limit = Some(ticks);
                    coordinator.tick_master.period = Duration::from_micros(period_us);
                    coordinator.arbiter.horizon = Some(Duration::from_millis(horizon_ms));
                    coordinator
                }
            };

            let strategy = match strategy {
                Strategy::Tick => TimeStepStrategy::TickDriven,
                Strategy::Quantum => TimeStepStrategy::QuantumDriven,
            };
            if strategy == TimeStepStrategy::QuantumDriven && coordinator.arbiter.horizon.is_none() {
                bail!("the quantum strategy needs an arbiter horizon to end the run");
            }

            let scenario = Scenario {
                coordinator,
                strategy,
                sync_policy: if strict { SyncPolicy::Strict } else { SyncPolicy::Loose },
                step_jitter: Duration::from_micros(jitter_us),
                exec_time_limit_soft_ms: soft_limit_ms,
                timeout: Duration::from_secs(timeout_secs),
            };

            println!("{}", "Starting simulation".cyan().bold());
            println!("  Participants: {}", scenario.coordinator.required_participants.join(", "));
            println!("  Strategy: {}", scenario.strategy);
            println!("  Period: {:?}", scenario.coordinator.tick_master.period);
            println!();

            let report = scenario::run(&scenario)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::InitConfig { output } => {
            let config = CoordinatorConfig {
                required_participants: vec!["A".to_string(), "B".to_string()],
                ..CoordinatorConfig::default()
            };
            config.to_file(&output)?;
            println!("{} {}", "Wrote".green(), output.display());
        }
    }

    Ok(())
}

fn print_report(report: &ScenarioReport) {
    let state = if report.system_state.ends_with("Shutdown") {
        report.system_state.green().bold()
    } else {
        report.system_state.red().bold()
    };
    println!("{} {}", "System state:".bold(), state);
    println!("  Path: {}", report.system_states.join(" -> ").dimmed());
    println!(
        "  Ticks: {}  Quanta granted: {}  rejected: {}",
        report.ticks_sent, report.quanta_granted, report.quanta_rejected
    );
    if report.invalid_transitions > 0 {
        println!("  {} {}", "Invalid transitions:".yellow(), report.invalid_transitions);
    }
    println!("  Wall time: {}ms (finished {})", report.wall_time_ms, report.finished_at);
    println!();

    println!("    {}", "Participant | State | Steps | Sim time | Avg step".dimmed());
    for participant in &report.participants {
        println!(
            "    {} | {} | {} | {:?} | {}ns",
            participant.name.yellow(),
            participant.final_state,
            participant.steps,
            Duration::from_nanos(participant.sim_time_ns as u64),
            participant.performance.exec_avg_ns
        );
    }
}
