use core::fmt;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single participant
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum ParticipantState {
    #[default]
    Invalid = 0,
    ServicesCreated = 10,
    CommunicationInitializing = 20,
    CommunicationInitialized = 30,
    ReadyToRun = 40,
    Running = 50,
    Paused = 60,
    Stopping = 70,
    Stopped = 80,
    Error = 90,
    ShuttingDown = 100,
    Shutdown = 110,
    Aborting = 120,
}

impl ParticipantState {
    pub const ALL: [ParticipantState; 13] = [
        ParticipantState::Invalid,
        ParticipantState::ServicesCreated,
        ParticipantState::CommunicationInitializing,
        ParticipantState::CommunicationInitialized,
        ParticipantState::ReadyToRun,
        ParticipantState::Running,
        ParticipantState::Paused,
        ParticipantState::Stopping,
        ParticipantState::Stopped,
        ParticipantState::Error,
        ParticipantState::ShuttingDown,
        ParticipantState::Shutdown,
        ParticipantState::Aborting,
    ];

    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ParticipantState::Shutdown | ParticipantState::Aborting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantState::Invalid => "Invalid",
            ParticipantState::ServicesCreated => "ServicesCreated",
            ParticipantState::CommunicationInitializing => "CommunicationInitializing",
            ParticipantState::CommunicationInitialized => "CommunicationInitialized",
            ParticipantState::ReadyToRun => "ReadyToRun",
            ParticipantState::Running => "Running",
            ParticipantState::Paused => "Paused",
            ParticipantState::Stopping => "Stopping",
            ParticipantState::Stopped => "Stopped",
            ParticipantState::Error => "Error",
            ParticipantState::ShuttingDown => "ShuttingDown",
            ParticipantState::Shutdown => "Shutdown",
            ParticipantState::Aborting => "Aborting",
        }
    }
}

impl fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParticipantState::{}", self.as_str())
    }
}

/// Global state derived from the states of all required participants
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum SystemState {
    #[default]
    Invalid = 0,
    ServicesCreated = 10,
    CommunicationInitializing = 20,
    CommunicationInitialized = 30,
    ReadyToRun = 40,
    Running = 50,
    Paused = 60,
    Stopping = 70,
    Stopped = 80,
    Error = 90,
    ShuttingDown = 100,
    Shutdown = 110,
    Aborting = 120,
}

impl SystemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemState::Invalid => "Invalid",
            SystemState::ServicesCreated => "ServicesCreated",
            SystemState::CommunicationInitializing => "CommunicationInitializing",
            SystemState::CommunicationInitialized => "CommunicationInitialized",
            SystemState::ReadyToRun => "ReadyToRun",
            SystemState::Running => "Running",
            SystemState::Paused => "Paused",
            SystemState::Stopping => "Stopping",
            SystemState::Stopped => "Stopped",
            SystemState::Error => "Error",
            SystemState::ShuttingDown => "ShuttingDown",
            SystemState::Shutdown => "Shutdown",
            SystemState::Aborting => "Aborting",
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SystemState::{}", self.as_str())
    }
}
