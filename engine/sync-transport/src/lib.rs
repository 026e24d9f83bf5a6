//! # SyncTransport
//!
//! Delivery boundary between participants and the coordinator. The
//! [`Transport`] trait is what the lifecycle engine and the coordinator code
//! against; [`InMemoryBus`] is an in-process implementation with controllable
//! delivery confirmation and a send journal for ordering checks.

pub mod bus;
pub mod config;
pub mod error;
pub mod transport;

pub use bus::{BusEndpoint, InMemoryBus, JournalEvent};
pub use config::{BusConfig, DeliveryMode};
pub use error::TransportError;
pub use transport::{ConnectionEvents, ConnectionHandler, DeliveryContinuation, Target, Transport};
