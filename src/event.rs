//! Attach/detach events.
//!
//! The registry republishes every applied delta as a [`ControllerEvent`] to its
//! subscribers. Within one synchronization cycle every `Removed` event is emitted
//! before any `Added` event, and each category keeps the order in which the
//! backends reported it.

use crate::controller::{ControllerRef, InstanceId};

/// Category of a controller event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControllerEventKind {
    Added,
    Removed,
}

/// A controller was attached or detached.
#[derive(Clone, Debug)]
pub enum ControllerEvent {
    Added(ControllerRef),
    Removed(ControllerRef),
}

impl ControllerEvent {
    pub fn kind(&self) -> ControllerEventKind {
        match self {
            ControllerEvent::Added(_) => ControllerEventKind::Added,
            ControllerEvent::Removed(_) => ControllerEventKind::Removed,
        }
    }

    pub fn controller(&self) -> &ControllerRef {
        match self {
            ControllerEvent::Added(c) | ControllerEvent::Removed(c) => c,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.controller().instance_id()
    }
}
