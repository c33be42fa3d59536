//! Per-event-type listener registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rivulet_types::MessageEvent;

type Handler = dyn Fn(&MessageEvent) + Send + Sync;

/// A cloneable handle to an event callback.
///
/// Equality is identity: two `Listener`s are equal only if they are clones of
/// the same handle. Keep a clone around to remove the listener later.
#[derive(Clone)]
pub struct Listener(Arc<Handler>);

impl Listener {
    pub fn new(handler: impl Fn(&MessageEvent) + Send + Sync + 'static) -> Self {
        Self(Arc::new(handler))
    }

    pub fn call(&self, event: &MessageEvent) {
        (self.0)(event)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Mapping from event type to the listeners subscribed to it.
///
/// Listeners for a type are kept in registration order, each at most once.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: HashMap<String, Vec<Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to `event_type`. Returns `false` if it was already
    /// subscribed.
    pub fn add(&mut self, event_type: &str, listener: Listener) -> bool {
        let set = self.listeners.entry(event_type.to_string()).or_default();
        if set.contains(&listener) {
            return false;
        }
        set.push(listener);
        true
    }

    /// Unsubscribe `listener` from `event_type`. Returns `false` if it was not
    /// subscribed.
    pub fn remove(&mut self, event_type: &str, listener: &Listener) -> bool {
        let Some(set) = self.listeners.get_mut(event_type) else {
            return false;
        };
        let before = set.len();
        set.retain(|l| l != listener);
        let removed = set.len() != before;
        if set.is_empty() {
            self.listeners.remove(event_type);
        }
        removed
    }

    /// Snapshot of the listeners for `event_type`, in registration order.
    ///
    /// Dispatch iterates the snapshot, so listeners added or removed while a
    /// dispatch is running only affect later dispatches.
    pub fn snapshot(&self, event_type: &str) -> Vec<Listener> {
        self.listeners.get(event_type).cloned().unwrap_or_default()
    }

    pub fn len(&self, event_type: &str) -> usize {
        self.listeners.get(event_type).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
