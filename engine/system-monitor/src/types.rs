use orchestration_types::{ParticipantConnectionInformation, ParticipantStatus, SystemState};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Identifies a registered handler for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(pub(crate) u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerId({})", self.0)
    }
}

pub type SystemStateHandler = Arc<dyn Fn(&SystemState) + Send + Sync>;

pub type ParticipantStatusHandler = Arc<dyn Fn(&ParticipantStatus) + Send + Sync>;

pub type ParticipantConnectionHandler = Arc<dyn Fn(&ParticipantConnectionInformation) + Send + Sync>;

/// Error types from SystemMonitor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Unknown participant {0}")]
    UnknownParticipant(String),
}
