//! Configuration for the in-memory bus

use serde::{Deserialize, Serialize};

/// When sends count as delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// A send is delivered as soon as it reaches the mailbox
    #[default]
    Immediate,
    /// Sends stay outstanding until explicitly confirmed
    Deferred,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    pub delivery_mode: DeliveryMode,

    /// Record every send and delivery confirmation
    pub journal_enabled: bool,
}

impl BusConfig {
    pub fn deferred() -> Self {
        Self { delivery_mode: DeliveryMode::Deferred, journal_enabled: true }
    }

    pub fn journaled() -> Self {
        Self { delivery_mode: DeliveryMode::Immediate, journal_enabled: true }
    }
}
