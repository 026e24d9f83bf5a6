//! Abstraction over message delivery between participants and the coordinator.

use std::sync::Arc;

use orchestration_types::{EndpointAddress, ParticipantConnectionInformation, SyncMessage};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// One-shot callback run once every outstanding send of an endpoint is delivered
pub type DeliveryContinuation = Box<dyn FnOnce() + Send + 'static>;

pub type ConnectionHandler = Arc<dyn Fn(&ParticipantConnectionInformation) + Send + Sync>;

/// Addressing of an outbound message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// Every attached participant except the sender
    Broadcast,
    Participant(String),
}

/// Message delivery as seen by a single endpoint.
///
/// # Implementations
///
/// - **In-process**: [`crate::BusEndpoint`], mailbox per participant
/// - **Networked**: provided by the embedding application
///
/// # Delivery completion
///
/// ```text
/// endpoint                     transport
///   |-- send(m1) ------------------>|
///   |-- on_all_messages_delivered ->|  (continuation parked)
///   |                               |-- m1 acknowledged
///   |<-- continuation() ------------|
/// ```
pub trait Transport: Send + Sync {
    /// Address messages from this endpoint carry
    fn local_address(&self) -> &EndpointAddress;

    /// Queue `message` for delivery. Success means queued, not delivered.
    fn send(&self, target: Target, message: SyncMessage) -> Result<(), TransportError>;

    /// Run `continuation` once all messages sent so far by this endpoint are
    /// delivered. Runs immediately when nothing is outstanding. Implementations
    /// must not hold internal locks while running it.
    fn on_all_messages_delivered(&self, continuation: DeliveryContinuation);
}

/// Source of transport-level connect and disconnect notifications
pub trait ConnectionEvents {
    fn on_participant_connected(&self, handler: ConnectionHandler);
    fn on_participant_disconnected(&self, handler: ConnectionHandler);
}
