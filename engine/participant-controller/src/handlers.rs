//! User callbacks and the boundary that contains their failures

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use orchestration_types::ParticipantCommand;
use thiserror::Error;

/// Failure reported by a user callback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Called with the current simulation time and step duration
pub type SimulationStep = Box<dyn FnMut(Duration, Duration) + Send>;

pub type InitHandler = Box<dyn FnMut(&ParticipantCommand) -> Result<(), HandlerError> + Send>;

pub type StopHandler = Box<dyn FnMut() -> Result<(), HandlerError> + Send>;

pub type ShutdownHandler = Box<dyn FnMut() -> Result<(), HandlerError> + Send>;

/// Result of running a callback inside the panic boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HandlerOutcome {
    Completed,
    Failed(String),
    Panicked(String),
}

pub(crate) fn invoke_guarded<F>(handler: F) -> HandlerOutcome
where
    F: FnOnce() -> Result<(), HandlerError>,
{
    match catch_unwind(AssertUnwindSafe(handler)) {
        Ok(Ok(())) => HandlerOutcome::Completed,
        Ok(Err(e)) => HandlerOutcome::Failed(e.to_string()),
        Err(payload) => HandlerOutcome::Panicked(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_handler() {
        assert_eq!(invoke_guarded(|| Ok(())), HandlerOutcome::Completed);
    }

    #[test]
    fn failed_handler_keeps_message() {
        let outcome = invoke_guarded(|| Err(HandlerError::new("disk full")));
        assert_eq!(outcome, HandlerOutcome::Failed("disk full".to_string()));
    }

    #[test]
    fn panicking_handler_is_contained() {
        let outcome = invoke_guarded(|| panic!("boom"));
        assert_eq!(outcome, HandlerOutcome::Panicked("boom".to_string()));

        let code = 7;
        let outcome = invoke_guarded(|| panic!("failed with code {code}"));
        assert_eq!(outcome, HandlerOutcome::Panicked("failed with code 7".to_string()));
    }
}
