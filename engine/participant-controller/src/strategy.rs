//! Time-stepping strategies

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a participant advances simulation time.
///
/// Selected once from configuration when the controller starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeStepStrategy {
    /// Steps on every broadcast tick and acknowledges with `TickDone`
    #[default]
    TickDriven,
    /// Requests its own quanta and steps on each grant addressed to it
    QuantumDriven,
    /// Steps on every broadcast tick without acknowledging it
    QuantumPassive,
}

impl TimeStepStrategy {
    /// Whether broadcast ticks advance this participant
    pub fn accepts_ticks(&self) -> bool {
        matches!(self, TimeStepStrategy::TickDriven | TimeStepStrategy::QuantumPassive)
    }

    /// Whether quantum grants advance this participant
    pub fn accepts_grants(&self) -> bool {
        matches!(self, TimeStepStrategy::QuantumDriven)
    }

    pub fn requests_steps(&self) -> bool {
        matches!(self, TimeStepStrategy::QuantumDriven)
    }
}

impl fmt::Display for TimeStepStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeStepStrategy::TickDriven => "TickDriven",
            TimeStepStrategy::QuantumDriven => "QuantumDriven",
            TimeStepStrategy::QuantumPassive => "QuantumPassive",
        };
        f.write_str(name)
    }
}
