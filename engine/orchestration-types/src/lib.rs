// Orchestration types - lifecycle states, status reports and time-sync messages

mod messages;
mod state;
mod status;
pub mod transition;

pub use messages::{
    EndpointAddress, EndpointId, Envelope, ParticipantCommand, ParticipantCommandKind,
    ParticipantConnectionInformation, QuantumGrant, QuantumRequest, QuantumRequestStatus,
    SyncMessage, SystemCommand, SystemCommandKind, Tick, TickDone, WorkflowConfiguration,
};
pub use state::{ParticipantState, SystemState};
pub use status::ParticipantStatus;
pub use transition::{is_valid_transition, validate_transition, TransitionViolation};
