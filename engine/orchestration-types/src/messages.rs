use core::fmt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::status::ParticipantStatus;

pub type EndpointId = u64;

/// Global address of a communication endpoint
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct EndpointAddress {
    pub participant: String,
    pub endpoint: EndpointId,
}

impl EndpointAddress {
    pub fn new(participant: impl Into<String>, endpoint: EndpointId) -> Self {
        Self { participant: participant.into(), endpoint }
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.participant, self.endpoint)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SystemCommandKind {
    Invalid,
    Run,
    Stop,
    Shutdown,
    AbortSimulation,
}

impl fmt::Display for SystemCommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SystemCommandKind::Invalid => "Invalid",
            SystemCommandKind::Run => "Run",
            SystemCommandKind::Stop => "Stop",
            SystemCommandKind::Shutdown => "Shutdown",
            SystemCommandKind::AbortSimulation => "AbortSimulation",
        };
        write!(f, "SystemCommand::{name}")
    }
}

/// Control-plane command broadcast by the coordinator to every participant
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SystemCommand {
    pub kind: SystemCommandKind,
}

impl SystemCommand {
    pub fn new(kind: SystemCommandKind) -> Self {
        Self { kind }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ParticipantCommandKind {
    Invalid,
    Initialize,
    Reinitialize,
}

impl fmt::Display for ParticipantCommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParticipantCommandKind::Invalid => "Invalid",
            ParticipantCommandKind::Initialize => "Initialize",
            ParticipantCommandKind::Reinitialize => "Reinitialize",
        };
        write!(f, "ParticipantCommand::{name}")
    }
}

/// Command addressed to a single participant
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParticipantCommand {
    pub participant: String,
    pub kind: ParticipantCommandKind,
}

impl ParticipantCommand {
    pub fn new(participant: impl Into<String>, kind: ParticipantCommandKind) -> Self {
        Self { participant: participant.into(), kind }
    }
}

/// Discrete-time barrier step issued by the time master
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub now: Duration,
    pub duration: Duration,
}

/// Acknowledges completion of the wrapped tick
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TickDone {
    pub finished_tick: Tick,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QuantumRequest {
    pub now: Duration,
    pub duration: Duration,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum QuantumRequestStatus {
    Invalid,
    Granted,
    Rejected,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QuantumGrant {
    pub grantee: EndpointAddress,
    pub now: Duration,
    pub duration: Duration,
    pub status: QuantumRequestStatus,
}

/// Set of participants whose states gate the global system state
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfiguration {
    pub required_participant_names: BTreeSet<String>,
}

impl WorkflowConfiguration {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { required_participant_names: names.into_iter().map(Into::into).collect() }
    }
}

/// Connection-level identity of a participant known to the transport
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParticipantConnectionInformation {
    pub participant_name: String,
    pub address: EndpointAddress,
}

/// Every message that crosses the orchestration boundary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SyncMessage {
    SystemCommand(SystemCommand),
    ParticipantCommand(ParticipantCommand),
    ParticipantStatus(ParticipantStatus),
    Tick(Tick),
    TickDone(TickDone),
    QuantumRequest(QuantumRequest),
    QuantumGrant(QuantumGrant),
    WorkflowConfiguration(WorkflowConfiguration),
}

impl SyncMessage {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SyncMessage::SystemCommand(_) => "SystemCommand",
            SyncMessage::ParticipantCommand(_) => "ParticipantCommand",
            SyncMessage::ParticipantStatus(_) => "ParticipantStatus",
            SyncMessage::Tick(_) => "Tick",
            SyncMessage::TickDone(_) => "TickDone",
            SyncMessage::QuantumRequest(_) => "QuantumRequest",
            SyncMessage::QuantumGrant(_) => "QuantumGrant",
            SyncMessage::WorkflowConfiguration(_) => "WorkflowConfiguration",
        }
    }
}

/// A message together with the address it was sent from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: EndpointAddress,
    pub message: SyncMessage,
}

impl Envelope {
    pub fn new(from: EndpointAddress, message: SyncMessage) -> Self {
        Self { from, message }
    }
}
