//! Error types for the transport boundary

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Unknown participant {0}")]
    UnknownParticipant(String),

    #[error("Participant {0} is already attached")]
    AlreadyAttached(String),

    #[error("Endpoint of participant {0} has been detached")]
    Detached(String),
}
