// Tick barrier for tick-driven participants

use crate::config::TickMasterConfig;
use crate::error::ControllerError;
use orchestration_types::{Envelope, SyncMessage, Tick, TickDone};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use sync_transport::{Target, Transport};

/// Broadcasts ticks and advances simulation time once every registered
/// participant has acknowledged the current one
pub struct TickMaster {
    transport: Arc<dyn Transport>,
    period: Duration,
    tick_limit: Option<u64>,

    participants: BTreeSet<String>,
    pending: BTreeSet<String>,
    current: Option<Tick>,
    ticks_sent: u64,
    halted: bool,
}

impl TickMaster {
    pub fn new(config: &TickMasterConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            period: config.period,
            tick_limit: config.tick_limit,
            participants: BTreeSet::new(),
            pending: BTreeSet::new(),
            current: None,
            ticks_sent: 0,
            halted: false,
        }
    }

    /// Expect a TickDone from `name` for every tick from the next one on
    pub fn add_participant(&mut self, name: impl Into<String>) {
        let name = name.into();
        tracing::debug!(participant = %name, "Participant joined tick barrier");
        self.participants.insert(name);
    }

    /// Stop waiting for `name`. Completes the current tick if it was the
    /// last one outstanding.
    pub fn remove_participant(&mut self, name: &str) -> Result<(), ControllerError> {
        if !self.participants.remove(name) {
            return Ok(());
        }
        tracing::debug!(participant = %name, "Participant left tick barrier");
        if self.pending.remove(name) && self.pending.is_empty() {
            self.advance()?;
        }
        Ok(())
    }

    /// Broadcast the first tick at time zero
    pub fn start(&mut self) -> Result<(), ControllerError> {
        if self.current.is_some() {
            tracing::warn!(now = ?self.now(), "TickMaster already started");
            return Ok(());
        }
        if self.participants.is_empty() {
            tracing::warn!("Starting TickMaster without participants; only one tick will be sent");
        }
        self.send_tick(Duration::ZERO)
    }

    /// Route an inbound message. Returns true if it was a TickDone.
    pub fn handle_envelope(&mut self, envelope: &Envelope) -> Result<bool, ControllerError> {
        match &envelope.message {
            SyncMessage::TickDone(done) => {
                self.receive_tick_done(&envelope.from.participant, done)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn receive_tick_done(&mut self, from: &str, done: &TickDone) -> Result<(), ControllerError> {
        let Some(current) = self.current else {
            tracing::warn!(participant = %from, "Ignoring TickDone before the first tick");
            return Ok(());
        };

        if done.finished_tick != current {
            tracing::warn!(
                participant = %from,
                finished = ?done.finished_tick.now,
                current = ?current.now,
                "Ignoring TickDone for a stale tick"
            );
            return Ok(());
        }

        if !self.pending.remove(from) {
            tracing::warn!(participant = %from, now = ?current.now, "Ignoring unexpected TickDone");
            return Ok(());
        }

        if self.pending.is_empty() {
            self.advance()?;
        }
        Ok(())
    }

    /// Stop issuing ticks. Outstanding acknowledgements are still accepted.
    pub fn halt(&mut self) {
        if !self.halted {
            tracing::info!(ticks_sent = self.ticks_sent, "TickMaster halted");
        }
        self.halted = true;
    }

    /// True once no further tick will be sent and none is outstanding
    pub fn is_finished(&self) -> bool {
        self.pending.is_empty() && (self.halted || self.limit_reached())
    }

    /// Start time of the most recently issued tick
    pub fn now(&self) -> Duration {
        self.current.map(|tick| tick.now).unwrap_or_default()
    }

    pub fn ticks_sent(&self) -> u64 {
        self.ticks_sent
    }

    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    fn advance(&mut self) -> Result<(), ControllerError> {
        if self.halted {
            return Ok(());
        }
        if self.limit_reached() {
            tracing::info!(ticks_sent = self.ticks_sent, now = ?self.now(), "Tick limit reached");
            return Ok(());
        }
        let Some(next) = self.now().checked_add(self.period) else {
            tracing::warn!(now = ?self.now(), "Simulation time exhausted, halting TickMaster");
            self.halted = true;
            return Ok(());
        };
        self.send_tick(next)
    }

    fn limit_reached(&self) -> bool {
        self.tick_limit.is_some_and(|limit| self.ticks_sent >= limit)
    }

    fn send_tick(&mut self, now: Duration) -> Result<(), ControllerError> {
        let tick = Tick { now, duration: self.period };
        self.current = Some(tick);
        self.pending = self.participants.clone();
        self.ticks_sent += 1;

        tracing::trace!(now = ?now, waiting_for = self.pending.len(), "Broadcasting tick");
        self.transport.send(Target::Broadcast, SyncMessage::Tick(tick))?;
        Ok(())
    }
}
