//! In-process bus: one crossbeam mailbox per attached participant.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use orchestration_types::{
    EndpointAddress, EndpointId, Envelope, ParticipantConnectionInformation, SyncMessage,
};
use parking_lot::Mutex;

use crate::config::{BusConfig, DeliveryMode};
use crate::error::TransportError;
use crate::transport::{ConnectionEvents, ConnectionHandler, DeliveryContinuation, Target, Transport};

/// Entry in the bus journal
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEvent {
    Sent { seq: u64, from: EndpointAddress, target: Target, message: SyncMessage },
    DeliveryConfirmed { seq: u64, participant: String },
}

impl JournalEvent {
    pub fn seq(&self) -> u64 {
        match self {
            JournalEvent::Sent { seq, .. } | JournalEvent::DeliveryConfirmed { seq, .. } => *seq,
        }
    }
}

struct Mailbox {
    address: EndpointAddress,
    sender: Sender<Envelope>,
}

#[derive(Default)]
struct BusState {
    mailboxes: BTreeMap<String, Mailbox>,
    outstanding: HashMap<String, usize>,
    waiting: HashMap<String, Vec<DeliveryContinuation>>,
    journal: Vec<JournalEvent>,
    next_seq: u64,
    next_endpoint: EndpointId,
}

impl BusState {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

struct BusShared {
    config: BusConfig,
    state: Mutex<BusState>,
    connected_handlers: Mutex<Vec<ConnectionHandler>>,
    disconnected_handlers: Mutex<Vec<ConnectionHandler>>,
}

/// In-memory message bus shared by every participant of a process
#[derive(Clone)]
pub struct InMemoryBus {
    shared: Arc<BusShared>,
}

impl InMemoryBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            shared: Arc::new(BusShared {
                config,
                state: Mutex::new(BusState::default()),
                connected_handlers: Mutex::new(Vec::new()),
                disconnected_handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.shared.config
    }

    /// Create a mailbox for `name` and announce the connection
    pub fn attach(
        &self,
        name: impl Into<String>,
    ) -> Result<(BusEndpoint, Receiver<Envelope>), TransportError> {
        let name = name.into();
        let (tx, rx) = channel::unbounded();

        let address = {
            let mut state = self.shared.state.lock();
            if state.mailboxes.contains_key(&name) {
                return Err(TransportError::AlreadyAttached(name));
            }
            let address = EndpointAddress::new(name.clone(), state.next_endpoint);
            state.next_endpoint += 1;
            state.mailboxes.insert(name.clone(), Mailbox { address: address.clone(), sender: tx });
            address
        };

        tracing::debug!(participant = %name, address = %address, "Participant attached to bus");

        let info = ParticipantConnectionInformation { participant_name: name, address: address.clone() };
        let handlers = self.shared.connected_handlers.lock().clone();
        for handler in handlers {
            handler(&info);
        }

        Ok((BusEndpoint { shared: self.shared.clone(), address }, rx))
    }

    /// Drop the mailbox of `name` and announce the disconnect. Pending
    /// delivery continuations of that endpoint are discarded.
    pub fn detach(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.shared.state.lock();
            let removed = state.mailboxes.remove(name);
            state.outstanding.remove(name);
            if let Some(dropped) = state.waiting.remove(name) {
                if !dropped.is_empty() {
                    tracing::warn!(
                        participant = name,
                        "Discarding {} pending delivery continuations on detach",
                        dropped.len()
                    );
                }
            }
            removed
        };

        let Some(mailbox) = removed else {
            return false;
        };

        tracing::debug!(participant = name, "Participant detached from bus");

        let info = ParticipantConnectionInformation {
            participant_name: name.to_string(),
            address: mailbox.address,
        };
        let handlers = self.shared.disconnected_handlers.lock().clone();
        for handler in handlers {
            handler(&info);
        }
        true
    }

    pub fn is_attached(&self, name: &str) -> bool {
        self.shared.state.lock().mailboxes.contains_key(name)
    }

    pub fn attached_participants(&self) -> Vec<String> {
        self.shared.state.lock().mailboxes.keys().cloned().collect()
    }

    /// Number of unconfirmed sends from `name`
    pub fn outstanding(&self, name: &str) -> usize {
        self.shared.state.lock().outstanding.get(name).copied().unwrap_or(0)
    }

    /// Mark every send from `name` as delivered and run its continuations
    pub fn confirm_deliveries(&self, name: &str) {
        self.shared.confirm(name);
    }

    pub fn confirm_all_deliveries(&self) {
        let names: BTreeSet<String> = {
            let state = self.shared.state.lock();
            state.outstanding.keys().chain(state.waiting.keys()).cloned().collect()
        };
        for name in names {
            self.shared.confirm(&name);
        }
    }

    pub fn journal(&self) -> Vec<JournalEvent> {
        self.shared.state.lock().journal.clone()
    }

    /// Journaled sends only, in send order
    pub fn sent_messages(&self) -> Vec<(EndpointAddress, SyncMessage)> {
        self.shared
            .state
            .lock()
            .journal
            .iter()
            .filter_map(|event| match event {
                JournalEvent::Sent { from, message, .. } => Some((from.clone(), message.clone())),
                JournalEvent::DeliveryConfirmed { .. } => None,
            })
            .collect()
    }

    pub fn clear_journal(&self) {
        self.shared.state.lock().journal.clear();
    }
}

impl ConnectionEvents for InMemoryBus {
    fn on_participant_connected(&self, handler: ConnectionHandler) {
        self.shared.connected_handlers.lock().push(handler);
    }

    fn on_participant_disconnected(&self, handler: ConnectionHandler) {
        self.shared.disconnected_handlers.lock().push(handler);
    }
}

impl BusShared {
    fn send(
        &self,
        from: &EndpointAddress,
        target: Target,
        message: SyncMessage,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.mailboxes.contains_key(&from.participant) {
            return Err(TransportError::Detached(from.participant.clone()));
        }

        let recipients: Vec<Sender<Envelope>> = match &target {
            Target::Broadcast => state
                .mailboxes
                .iter()
                .filter(|(name, _)| **name != from.participant)
                .map(|(_, mailbox)| mailbox.sender.clone())
                .collect(),
            Target::Participant(name) => match state.mailboxes.get(name) {
                Some(mailbox) => vec![mailbox.sender.clone()],
                None => return Err(TransportError::UnknownParticipant(name.clone())),
            },
        };

        tracing::trace!(
            from = %from,
            kind = message.kind_name(),
            recipients = recipients.len(),
            "Sending message"
        );

        if self.config.journal_enabled {
            let seq = state.next_seq();
            state.journal.push(JournalEvent::Sent {
                seq,
                from: from.clone(),
                target,
                message: message.clone(),
            });
        }

        let envelope = Envelope::new(from.clone(), message);
        for recipient in recipients {
            // A dropped receiver belongs to a participant that already finished
            let _ = recipient.send(envelope.clone());
        }

        if self.config.delivery_mode == DeliveryMode::Deferred {
            *state.outstanding.entry(from.participant.clone()).or_insert(0) += 1;
        }
        Ok(())
    }

    fn park(&self, from: &EndpointAddress, continuation: DeliveryContinuation) {
        let run_now = {
            let mut state = self.state.lock();
            let outstanding = state.outstanding.get(&from.participant).copied().unwrap_or(0);
            if outstanding == 0 {
                Some(continuation)
            } else {
                state.waiting.entry(from.participant.clone()).or_default().push(continuation);
                None
            }
        };

        if let Some(continuation) = run_now {
            continuation();
        }
    }

    fn confirm(&self, name: &str) {
        let continuations = {
            let mut state = self.state.lock();
            state.outstanding.remove(name);
            if self.config.journal_enabled {
                let seq = state.next_seq();
                state
                    .journal
                    .push(JournalEvent::DeliveryConfirmed { seq, participant: name.to_string() });
            }
            state.waiting.remove(name).unwrap_or_default()
        };

        for continuation in continuations {
            continuation();
        }
    }
}

/// A participant's handle on the bus
#[derive(Clone)]
pub struct BusEndpoint {
    shared: Arc<BusShared>,
    address: EndpointAddress,
}

impl Transport for BusEndpoint {
    fn local_address(&self) -> &EndpointAddress {
        &self.address
    }

    fn send(&self, target: Target, message: SyncMessage) -> Result<(), TransportError> {
        self.shared.send(&self.address, target, message)
    }

    fn on_all_messages_delivered(&self, continuation: DeliveryContinuation) {
        self.shared.park(&self.address, continuation);
    }
}
