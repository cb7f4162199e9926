//! In-process virtual backend.
//!
//! [`VirtualEnvironment`] reports controllers that the host application (or a
//! test) creates itself. It is useful for demos, for headless CI, and for
//! applications that synthesise controllers from another input source.
//!
//! Controllers are attached and detached through a cloneable [`VirtualHandle`]:
//! - [`VirtualHandle::attach`] / [`VirtualHandle::detach`] queue a change that is
//!   reported on the next `initialize`/`refresh`, like a polled device bus.
//! - [`VirtualHandle::attach_now`] / [`VirtualHandle::detach_now`] notify
//!   subscribers immediately from the calling thread, like a hotplug callback.
//!
//! # Manifest options
//! ```toml
//! backend = "virtual"
//!
//! [options]
//! supported = true
//! controllers = [{ id = 1, name = "Virtual Pad" }]
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::backends::{BackendOptions, VIRTUAL};
use crate::controller::{Controller, ControllerRef, InstanceId};
use crate::environment::ControllerEnvironment;
use crate::error::{Error, Result};
use crate::listener::{ControllerListener, ListenerSet};
use crate::metadata::ControllerMeta;

#[derive(Clone, Debug, Deserialize)]
pub struct VirtualController {
    id: InstanceId,
    name: String,
    #[serde(default)]
    meta: ControllerMeta,
}

impl VirtualController {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id: InstanceId(id),
            name: name.to_string(),
            meta: ControllerMeta {
                bus: Some("virtual".to_string()),
                product_string: Some(name.to_string()),
                ..Default::default()
            },
        }
    }

    pub fn with_meta(mut self, meta: ControllerMeta) -> Self {
        self.meta = meta;
        self
    }
}

impl Controller for VirtualController {
    fn instance_id(&self) -> InstanceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn meta(&self) -> ControllerMeta {
        self.meta.clone()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct VirtualOptions {
    supported: bool,
    controllers: Vec<VirtualController>,
}

impl Default for VirtualOptions {
    fn default() -> Self {
        Self {
            supported: true,
            controllers: Vec::new(),
        }
    }
}

enum Change {
    Attach(ControllerRef),
    Detach(InstanceId),
}

#[derive(Default)]
struct Shared {
    listeners: ListenerSet,
    attached: BTreeMap<InstanceId, ControllerRef>,
    queued: Vec<Change>,
}

/// Cloneable handle used to plug and unplug virtual controllers.
#[derive(Clone, Default)]
pub struct VirtualHandle {
    shared: Arc<Mutex<Shared>>,
}

impl VirtualHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend instance that reports this handle's controllers.
    pub fn environment(&self) -> VirtualEnvironment {
        VirtualEnvironment {
            handle: self.clone(),
            supported: true,
            initial: Vec::new(),
        }
    }

    /// Queues an attach, reported on the next refresh.
    pub fn attach(&self, controller: VirtualController) -> ControllerRef {
        let controller: ControllerRef = Arc::new(controller);
        self.shared.lock().queued.push(Change::Attach(controller.clone()));
        controller
    }

    /// Queues a detach, reported on the next refresh.
    pub fn detach(&self, id: InstanceId) {
        self.shared.lock().queued.push(Change::Detach(id));
    }

    /// Attaches and notifies subscribers right away.
    pub fn attach_now(&self, controller: VirtualController) -> ControllerRef {
        let controller: ControllerRef = Arc::new(controller);
        let listeners = {
            let mut shared = self.shared.lock();
            shared
                .attached
                .insert(controller.instance_id(), controller.clone());
            shared.listeners.snapshot()
        };
        for listener in &listeners {
            listener.controller_added(&controller);
        }
        controller
    }

    /// Detaches and notifies subscribers right away. Unknown ids are ignored.
    pub fn detach_now(&self, id: InstanceId) {
        let (removed, listeners) = {
            let mut shared = self.shared.lock();
            (shared.attached.remove(&id), shared.listeners.snapshot())
        };
        if let Some(controller) = removed {
            for listener in &listeners {
                listener.controller_removed(&controller);
            }
        }
    }

    /// Controllers this backend currently reports as attached.
    pub fn attached(&self) -> Vec<ControllerRef> {
        self.shared.lock().attached.values().cloned().collect()
    }

    /// Applies queued changes and notifies subscribers of the ones that changed state.
    fn apply_queued(&self) {
        let (added, removed, listeners) = {
            let mut shared = self.shared.lock();
            let mut added = Vec::new();
            let mut removed = Vec::new();
            for change in std::mem::take(&mut shared.queued) {
                match change {
                    Change::Attach(controller) => {
                        shared
                            .attached
                            .insert(controller.instance_id(), controller.clone());
                        added.push(controller);
                    }
                    Change::Detach(id) => {
                        if let Some(controller) = shared.attached.remove(&id) {
                            removed.push(controller);
                        }
                    }
                }
            }
            (added, removed, shared.listeners.snapshot())
        };

        for controller in &removed {
            for listener in &listeners {
                listener.controller_removed(controller);
            }
        }
        for controller in &added {
            for listener in &listeners {
                listener.controller_added(controller);
            }
        }
    }
}

/// Backend that reports the controllers of a [`VirtualHandle`].
pub struct VirtualEnvironment {
    handle: VirtualHandle,
    supported: bool,
    initial: Vec<VirtualController>,
}

impl VirtualEnvironment {
    pub fn new() -> Self {
        VirtualHandle::new().environment()
    }

    /// Builds the backend from a manifest's `[options]` table.
    pub fn from_options(options: &BackendOptions) -> Result<Self> {
        let options: VirtualOptions = toml::Value::Table(options.clone())
            .try_into()
            .map_err(|e: toml::de::Error| Error::backend(VIRTUAL, e.to_string()))?;
        let mut env = Self::new();
        env.supported = options.supported;
        env.initial = options.controllers;
        Ok(env)
    }

    pub fn handle(&self) -> VirtualHandle {
        self.handle.clone()
    }
}

impl Default for VirtualEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerEnvironment for VirtualEnvironment {
    fn id(&self) -> &str {
        VIRTUAL
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn initialize(&mut self) -> Result<()> {
        for controller in self.initial.drain(..) {
            self.handle.attach(controller);
        }
        self.handle.apply_queued();
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        let mut shared = self.handle.shared.lock();
        shared.queued.clear();
        Ok(())
    }

    fn refresh(&mut self) -> Result<()> {
        self.handle.apply_queued();
        Ok(())
    }

    fn subscribe(&mut self, listener: Arc<dyn ControllerListener>) {
        self.handle.shared.lock().listeners.add(listener);
    }

    fn unsubscribe(&mut self, listener: &Arc<dyn ControllerListener>) {
        self.handle.shared.lock().listeners.remove_ptr(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl ControllerListener for Log {
        fn controller_added(&self, c: &ControllerRef) {
            self.0.lock().push(format!("+{}", c.instance_id().0));
        }
        fn controller_removed(&self, c: &ControllerRef) {
            self.0.lock().push(format!("-{}", c.instance_id().0));
        }
    }

    #[test]
    fn options_seed_initial_controllers() {
        let options: BackendOptions = toml::from_str(
            r#"
            supported = true
            controllers = [{ id = 3, name = "Pad A" }, { id = 4, name = "Pad B" }]
            "#,
        )
        .expect("parse options");
        let mut env = VirtualEnvironment::from_options(&options).expect("build");
        let log = Arc::new(Log::default());
        env.subscribe(log.clone());

        env.initialize().expect("initialize");

        assert_eq!(*log.0.lock(), vec!["+3", "+4"]);
        assert_eq!(env.handle().attached().len(), 2);
    }

    #[test]
    fn queued_changes_wait_for_refresh() {
        let mut env = VirtualEnvironment::new();
        let handle = env.handle();
        let log = Arc::new(Log::default());
        env.subscribe(log.clone());
        env.initialize().expect("initialize");

        handle.attach(VirtualController::new(1, "one"));
        assert!(log.0.lock().is_empty());

        env.refresh().expect("refresh");
        handle.detach(InstanceId(1));
        handle.detach(InstanceId(99));
        env.refresh().expect("refresh");

        assert_eq!(*log.0.lock(), vec!["+1", "-1"]);
    }

    #[test]
    fn unsubscribed_listener_hears_nothing() {
        let mut env = VirtualEnvironment::new();
        let handle = env.handle();
        let log = Arc::new(Log::default());
        let listener: Arc<dyn ControllerListener> = log.clone();
        env.subscribe(listener.clone());
        env.unsubscribe(&listener);

        handle.attach_now(VirtualController::new(5, "five"));

        assert!(log.0.lock().is_empty());
    }

    #[test]
    fn unsupported_via_options() {
        let options: BackendOptions = toml::from_str("supported = false").expect("parse");
        let env = VirtualEnvironment::from_options(&options).expect("build");
        assert!(!env.is_supported());
    }
}
