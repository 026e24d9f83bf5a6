// Quantum arbitration for quantum-driven participants

use crate::config::ArbiterConfig;
use crate::error::ControllerError;
use orchestration_types::{
    EndpointAddress, Envelope, QuantumGrant, QuantumRequest, QuantumRequestStatus, SyncMessage,
};
use std::sync::Arc;
use std::time::Duration;
use sync_transport::{Target, Transport};

/// Answers every QuantumRequest with a grant addressed to its sender
pub struct QuantumArbiter {
    transport: Arc<dyn Transport>,
    horizon: Option<Duration>,
    halted: bool,
    granted: u64,
    rejected: u64,
}

impl QuantumArbiter {
    pub fn new(config: &ArbiterConfig, transport: Arc<dyn Transport>) -> Self {
        Self { transport, horizon: config.horizon, halted: false, granted: 0, rejected: 0 }
    }

    /// Route an inbound message. Returns true if it was a QuantumRequest.
    pub fn handle_envelope(&mut self, envelope: &Envelope) -> Result<bool, ControllerError> {
        match &envelope.message {
            SyncMessage::QuantumRequest(request) => {
                self.receive_request(&envelope.from, request)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn receive_request(
        &mut self,
        from: &EndpointAddress,
        request: &QuantumRequest,
    ) -> Result<QuantumRequestStatus, ControllerError> {
        // A quantum whose end is not representable lies beyond any horizon
        let beyond_horizon = match request.now.checked_add(request.duration) {
            Some(end) => self.horizon.is_some_and(|horizon| end > horizon),
            None => true,
        };
        let status = if self.halted || beyond_horizon {
            self.rejected += 1;
            QuantumRequestStatus::Rejected
        } else {
            self.granted += 1;
            QuantumRequestStatus::Granted
        };

        tracing::trace!(grantee = %from, now = ?request.now, duration = ?request.duration, ?status, "Answering quantum request");

        let grant = QuantumGrant {
            grantee: from.clone(),
            now: request.now,
            duration: request.duration,
            status,
        };
        self.transport
            .send(Target::Participant(from.participant.clone()), SyncMessage::QuantumGrant(grant))?;
        Ok(status)
    }

    /// Reject every further request
    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn granted(&self) -> u64 {
        self.granted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_transport::{BusConfig, InMemoryBus};

    const QUANTUM: Duration = Duration::from_millis(2);

    fn request(now_ms: u64) -> QuantumRequest {
        QuantumRequest { now: Duration::from_millis(now_ms), duration: QUANTUM }
    }

    #[test]
    fn test_grant_is_unicast_to_requester() {
        let bus = InMemoryBus::new(BusConfig::default());
        let (endpoint, _inbox) = bus.attach("Arbiter").unwrap();
        let (a, a_inbox) = bus.attach("A").unwrap();
        let (_b, b_inbox) = bus.attach("B").unwrap();
        let mut arbiter = QuantumArbiter::new(&ArbiterConfig::default(), Arc::new(endpoint));

        let a_address = sync_transport::Transport::local_address(&a).clone();
        let status = arbiter.receive_request(&a_address, &request(4)).unwrap();
        assert_eq!(status, QuantumRequestStatus::Granted);

        let SyncMessage::QuantumGrant(grant) = a_inbox.try_recv().unwrap().message else {
            panic!("expected a QuantumGrant");
        };
        assert_eq!(grant.grantee, a_address);
        assert_eq!(grant.now, Duration::from_millis(4));
        assert_eq!(grant.duration, QUANTUM);
        assert!(b_inbox.try_recv().is_err());
    }

    #[test]
    fn test_horizon_rejects_overlong_quantum() {
        let bus = InMemoryBus::new(BusConfig::default());
        let (endpoint, _inbox) = bus.attach("Arbiter").unwrap();
        let (_a, _a_inbox) = bus.attach("A").unwrap();
        let config = ArbiterConfig { horizon: Some(Duration::from_millis(10)) };
        let mut arbiter = QuantumArbiter::new(&config, Arc::new(endpoint));
        let from = EndpointAddress::new("A", 1);

        assert_eq!(arbiter.receive_request(&from, &request(8)).unwrap(), QuantumRequestStatus::Granted);
        assert_eq!(arbiter.receive_request(&from, &request(9)).unwrap(), QuantumRequestStatus::Rejected);
        assert_eq!((arbiter.granted(), arbiter.rejected()), (1, 1));
    }

    #[test]
    fn test_overflowing_quantum_is_rejected() {
        let bus = InMemoryBus::new(BusConfig::default());
        let (endpoint, _inbox) = bus.attach("Arbiter").unwrap();
        let (_a, a_inbox) = bus.attach("A").unwrap();
        let mut arbiter = QuantumArbiter::new(&ArbiterConfig::default(), Arc::new(endpoint));
        let from = EndpointAddress::new("A", 1);

        let request = QuantumRequest { now: Duration::MAX, duration: QUANTUM };
        assert_eq!(arbiter.receive_request(&from, &request).unwrap(), QuantumRequestStatus::Rejected);

        let SyncMessage::QuantumGrant(grant) = a_inbox.try_recv().unwrap().message else {
            panic!("expected a QuantumGrant");
        };
        assert_eq!(grant.status, QuantumRequestStatus::Rejected);
        assert_eq!(grant.now, Duration::MAX);
    }

    #[test]
    fn test_halted_arbiter_rejects() {
        let bus = InMemoryBus::new(BusConfig::default());
        let (endpoint, _inbox) = bus.attach("Arbiter").unwrap();
        let (_a, _a_inbox) = bus.attach("A").unwrap();
        let mut arbiter = QuantumArbiter::new(&ArbiterConfig::default(), Arc::new(endpoint));

        arbiter.halt();
        let envelope = Envelope::new(EndpointAddress::new("A", 1), SyncMessage::QuantumRequest(request(0)));
        assert!(arbiter.handle_envelope(&envelope).unwrap());
        assert_eq!(arbiter.rejected(), 1);
    }
}
