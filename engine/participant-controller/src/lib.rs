//! # ParticipantController
//!
//! Lifecycle engine for a single simulation participant.
//!
//! The controller owns the participant's state machine, reacts to system and
//! participant commands, and paces the user's simulation step against either
//! broadcast ticks or individually granted time quanta. Every transition is
//! published as a [`ParticipantStatus`] over the participant's transport.

pub mod config;
pub mod controller;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod strategy;

#[cfg(test)]
mod tests;


pub use config::{ParticipantConfig, PerformanceConfig, SyncPolicy};
pub use controller::{FinalState, ParticipantController};
pub use error::{ConfigError, ParticipantError};
pub use handlers::{HandlerError, InitHandler, ShutdownHandler, SimulationStep, StopHandler};
pub use metrics::{PerformanceStats, StepPerformance};
pub use strategy::TimeStepStrategy;

/// Re-export commonly used types
pub use orchestration_types::{ParticipantCommand, ParticipantState, ParticipantStatus};

/// Current version of the ParticipantController
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default step period (1ms)
pub const DEFAULT_PERIOD_NS: u64 = 1_000_000;

/// Default number of steps between performance log lines (0 disables)
pub const DEFAULT_PERFORMANCE_LOG_INTERVAL_STEPS: u64 = 0;
