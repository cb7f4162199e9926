//! Controller listeners and the ordered subscriber set.
//!
//! [`ControllerListener`] is the callback side of the backend contract: backends
//! call it when they detect a device change, and the registry calls it on its own
//! subscribers after every synchronization cycle.
//!
//! [`ListenerSet`] keeps subscribers in subscription order and isolates them from
//! each other: a listener that panics is logged and skipped, the remaining
//! listeners still receive the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::controller::ControllerRef;
use crate::error::panic_message;
use crate::event::ControllerEvent;

/// Receives attach/detach notifications.
///
/// Listeners may be called from backend-owned threads, hence `Send + Sync`.
pub trait ControllerListener: Send + Sync {
    fn controller_added(&self, controller: &ControllerRef);
    fn controller_removed(&self, controller: &ControllerRef);
}

/// Handle returned by [`ListenerSet::add`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ListenerEntry {
    id: ListenerId,
    listener: Arc<dyn ControllerListener>,
}

/// Subscribers in subscription order.
#[derive(Default)]
pub struct ListenerSet {
    next_id: u64,
    entries: Vec<ListenerEntry>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns its id.
    pub fn add(&mut self, listener: Arc<dyn ControllerListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push(ListenerEntry { id, listener });
        id
    }

    /// Unregisters a listener by id. Returns `false` if it was not registered.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Unregisters every entry that is the same allocation as `listener`.
    ///
    /// Backends get the listener itself rather than an id, so this is what their
    /// `unsubscribe` usually delegates to.
    pub fn remove_ptr(&mut self, listener: &Arc<dyn ControllerListener>) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| !Arc::ptr_eq(&e.listener, listener));
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clones the current listeners so they can be called without holding a lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn ControllerListener>> {
        self.entries.iter().map(|e| e.listener.clone()).collect()
    }

    /// Delivers one event to every listener in order. Returns the number of
    /// listeners that panicked.
    pub fn emit(&self, event: &ControllerEvent) -> usize {
        emit_to(&self.snapshot(), event)
    }
}

/// Delivers `event` to each listener, isolating panics. Returns the failure count.
pub(crate) fn emit_to(
    listeners: &[Arc<dyn ControllerListener>],
    event: &ControllerEvent,
) -> usize {
    let mut failures = 0;
    for listener in listeners {
        let delivered = catch_unwind(AssertUnwindSafe(|| match event {
            ControllerEvent::Added(c) => listener.controller_added(c),
            ControllerEvent::Removed(c) => listener.controller_removed(c),
        }));
        if let Err(panic) = delivered {
            failures += 1;
            tracing::error!(
                target: "stickenv::listener",
                kind = ?event.kind(),
                controller = %event.instance_id(),
                "listener panicked: {}",
                panic_message(panic.as_ref())
            );
        }
    }
    failures
}
