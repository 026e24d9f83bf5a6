//! Error types for the ParticipantController

use orchestration_types::ParticipantState;
use thiserror::Error;

/// Errors returned to callers of the ParticipantController.
///
/// Protocol violations caused by inbound messages are never returned; they
/// move the participant into `Error` instead.
#[derive(Error, Debug)]
pub enum ParticipantError {
    #[error("Cannot start participant {participant}: no simulation step was set")]
    MissingSimulationStep { participant: String },

    #[error("Participant {participant} was already started")]
    AlreadyStarted { participant: String },

    #[error("pause() was called in state {state}")]
    InvalidPause { state: ParticipantState },

    #[error("continue_simulation() was called in state {state}")]
    InvalidContinue { state: ParticipantState },

    #[error("Inbox closed before participant reached a terminal state")]
    InboxClosed,

    #[error("Final state sender dropped before a terminal state was reached")]
    FinalStateDropped,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors loading, saving or validating a participant configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
