use crate::types::HandlerId;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ordered set of callbacks keyed by monotonically increasing ids
pub struct HandlerRegistry<A: ?Sized> {
    inner: Mutex<RegistryInner<A>>,
}

struct RegistryInner<A: ?Sized> {
    next_id: u64,
    handlers: Vec<(HandlerId, Arc<dyn Fn(&A) + Send + Sync>)>,
}

impl<A: ?Sized> HandlerRegistry<A> {
    pub fn new() -> Self {
        Self { inner: Mutex::new(RegistryInner { next_id: 0, handlers: Vec::new() }) }
    }

    pub fn add(&self, handler: Arc<dyn Fn(&A) + Send + Sync>) -> HandlerId {
        let mut inner = self.inner.lock();
        let id = HandlerId(inner.next_id);
        inner.next_id += 1;
        inner.handlers.push((id, handler));
        id
    }

    /// Returns false if `id` is not registered
    pub fn remove(&self, id: HandlerId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.handlers.len();
        inner.handlers.retain(|(handler_id, _)| *handler_id != id);
        inner.handlers.len() != before
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    /// Call every handler in registration order. The registry lock is not
    /// held while handlers run.
    pub fn invoke_all(&self, argument: &A) {
        let handlers: Vec<_> =
            self.inner.lock().handlers.iter().map(|(_, handler)| handler.clone()).collect();
        for handler in handlers {
            handler(argument);
        }
    }
}

impl<A: ?Sized> Default for HandlerRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Notification tagged with the sequence number it was recorded under
#[derive(Debug, Clone)]
pub(crate) struct Sequenced<T> {
    pub value: T,
    pub sequence: u64,
}

struct SequenceGate<K, T> {
    newest: BTreeMap<K, u64>,
    pending: BTreeMap<u64, T>,
    delivering: bool,
}

/// Wrap `handler` so that, per `key`, it never sees a value older than one
/// it has already been given.
///
/// Calls are serialized without holding a lock across `handler`. An update
/// arriving while another call is running is queued and delivered by the
/// running thread, in sequence order, once that call returns.
pub(crate) fn in_sequence<T, K, F>(
    key: fn(&T) -> K,
    handler: F,
) -> Arc<dyn Fn(&Sequenced<T>) + Send + Sync>
where
    T: Clone + Send + 'static,
    K: Ord + Send + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    let gate = Mutex::new(SequenceGate {
        newest: BTreeMap::new(),
        pending: BTreeMap::new(),
        delivering: false,
    });

    Arc::new(move |update: &Sequenced<T>| {
        let mut gate = gate.lock();
        let newest = gate.newest.entry(key(&update.value)).or_insert(0);
        if update.sequence <= *newest {
            return;
        }
        *newest = update.sequence;
        gate.pending.insert(update.sequence, update.value.clone());

        if gate.delivering {
            return;
        }
        gate.delivering = true;
        while let Some((_, value)) = gate.pending.pop_first() {
            MutexGuard::unlocked(&mut gate, || handler(&value));
        }
        gate.delivering = false;
    })
}
