//! The environment registry.
//!
//! [`EnvironmentRegistry`] aggregates every loaded backend into one canonical map of
//! attached controllers and republishes their attach/detach notifications to its
//! own subscribers.
//!
//! # Lifecycle
//! `Uninitialized → Ready → Destroyed`
//!
//! - [`initialize`](EnvironmentRegistry::initialize) discovers backends from the
//!   configured search roots, constructs the platform default and any configured
//!   overrides, subscribes to and initializes each, then runs one synchronization cycle.
//! - [`update_controllers`](EnvironmentRegistry::update_controllers) refreshes every
//!   backend in load order, then runs one synchronization cycle. Calling it in any
//!   state other than `Ready` is a caller bug and returns [`Error::InvalidState`].
//! - [`destroy`](EnvironmentRegistry::destroy) unsubscribes from and destroys every
//!   backend. The canonical map is left as it was.
//!
//! # Synchronization cycle
//! Backends report changes into a delta queue that any thread may push to. A cycle
//! drains the queue, applies every removal and then every addition to the map under
//! one lock (last write wins for repeated ids; removing an absent id is a no-op),
//! releases the lock, and only then notifies subscribers: all `removed` events first,
//! then all `added` events, each in the order the backends reported them. A
//! subscriber that panics is logged and skipped; the cycle always completes.
//!
//! Backend failures, returned errors and panics alike, are logged and never abort
//! the registry. The worst case is a registry with no backends that reports zero
//! controllers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backends::{BackendCatalog, BackendOptions};
use crate::config::EnvironmentConfig;
use crate::controller::{ControllerRef, InstanceId};
use crate::discovery::{PluginDiscoverer, Rejection};
use crate::environment::{check_support, guarded, ControllerEnvironment};
use crate::error::{Error, Result};
use crate::event::ControllerEvent;
use crate::listener::{emit_to, ControllerListener, ListenerId, ListenerSet};
use crate::selector;
use crate::snapshot::Snapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryState {
    Uninitialized,
    Ready,
    Destroyed,
}

impl fmt::Display for RegistryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegistryState::Uninitialized => "uninitialized",
            RegistryState::Ready => "ready",
            RegistryState::Destroyed => "destroyed",
        })
    }
}

/// A backend candidate that did not make it into the loaded set.
#[derive(Debug)]
pub struct Skipped {
    /// Manifest path for discovered candidates, identifier for selected ones.
    pub candidate: String,
    pub reason: Rejection,
}

/// A loaded backend whose `initialize` failed. It stays loaded and is still destroyed.
#[derive(Debug)]
pub struct InitFailure {
    pub backend: String,
    pub error: Error,
}

/// What [`EnvironmentRegistry::initialize`] did. Nothing in here is fatal.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Backend identifiers in load order.
    pub loaded: Vec<String>,
    pub skipped: Vec<Skipped>,
    pub init_failures: Vec<InitFailure>,
    /// The cycle run at the end of initialization.
    pub cycle: CycleReport,
}

/// Outcome of one synchronization cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub added: usize,
    pub removed: usize,
    /// Removals whose id was not in the map.
    pub stale_removals: usize,
    /// Subscriber callbacks that panicked.
    pub listener_failures: usize,
    /// Backends whose `refresh` failed or panicked before this cycle.
    pub refresh_failures: usize,
}

impl CycleReport {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

enum Delta {
    Added(ControllerRef),
    Removed(ControllerRef),
}

/// The listener every backend is subscribed with. Pure enqueue, no dedup.
struct DeltaSink {
    tx: Sender<Delta>,
}

impl ControllerListener for DeltaSink {
    fn controller_added(&self, controller: &ControllerRef) {
        // The receiver lives as long as the registry; a send can only fail after it is gone.
        let _ = self.tx.send(Delta::Added(controller.clone()));
    }

    fn controller_removed(&self, controller: &ControllerRef) {
        let _ = self.tx.send(Delta::Removed(controller.clone()));
    }
}

/// Shared handle to the canonical map.
///
/// Every read takes the same lock the registry writes under, so clones of this
/// handle can be queried from other threads while the registry is being updated.
#[derive(Clone, Default)]
pub struct ControllerMap {
    inner: Arc<Mutex<HashMap<InstanceId, ControllerRef>>>,
}

impl ControllerMap {
    pub fn get(&self, id: InstanceId) -> Option<ControllerRef> {
        self.inner.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.inner.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Attached controllers ordered by instance id.
    pub fn to_vec(&self) -> Vec<ControllerRef> {
        let mut controllers: Vec<ControllerRef> = self.inner.lock().values().cloned().collect();
        controllers.sort_by_key(|c| c.instance_id());
        controllers
    }

    /// Owned view of the map. Controller names and metadata are read after the
    /// lock is released.
    pub fn snapshot(&self) -> Snapshot {
        let controllers: Vec<ControllerRef> = self.inner.lock().values().cloned().collect();
        controllers.iter().collect()
    }
}

pub struct EnvironmentRegistry {
    config: EnvironmentConfig,
    catalog: BackendCatalog,
    state: RegistryState,
    backends: Vec<Box<dyn ControllerEnvironment>>,
    controllers: ControllerMap,
    subscribers: Mutex<ListenerSet>,
    sink: Arc<dyn ControllerListener>,
    deltas: Receiver<Delta>,
}

impl EnvironmentRegistry {
    pub fn new(config: EnvironmentConfig, catalog: BackendCatalog) -> Self {
        let (tx, deltas) = crossbeam_channel::unbounded();
        Self {
            config,
            catalog,
            state: RegistryState::Uninitialized,
            backends: Vec::new(),
            controllers: ControllerMap::default(),
            subscribers: Mutex::new(ListenerSet::new()),
            sink: Arc::new(DeltaSink { tx }),
            deltas,
        }
    }

    pub fn state(&self) -> RegistryState {
        self.state
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Backend catalog; register native backends here before `initialize`.
    pub fn catalog_mut(&mut self) -> &mut BackendCatalog {
        &mut self.catalog
    }

    /// Identifiers of the loaded backends, in load order.
    pub fn loaded_backends(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.id()).collect()
    }

    pub fn subscribe(&self, listener: Arc<dyn ControllerListener>) -> ListenerId {
        self.subscribers.lock().add(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.subscribers.lock().remove(id)
    }

    /// Currently attached controllers, ordered by instance id.
    pub fn controllers(&self) -> Vec<ControllerRef> {
        self.controllers.to_vec()
    }

    pub fn controller(&self, id: InstanceId) -> Option<ControllerRef> {
        self.controllers.get(id)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.controllers.snapshot()
    }

    /// A cloneable, thread-safe handle to the canonical map.
    pub fn controller_map(&self) -> ControllerMap {
        self.controllers.clone()
    }

    /// Loads, subscribes to and initializes every backend, then runs one cycle.
    pub fn initialize(&mut self) -> Result<LoadReport> {
        self.require(RegistryState::Uninitialized, "initialize")?;
        let mut report = LoadReport::default();

        let discoverer = PluginDiscoverer::new(&self.catalog);
        for root in self.config.search_roots() {
            let found = discoverer.discover_detailed(&root);
            report.skipped.extend(found.rejected.into_iter().map(|r| Skipped {
                candidate: r.manifest.display().to_string(),
                reason: r.reason,
            }));
            self.backends.extend(found.backends);
        }

        self.load_selected(&mut report);

        for backend in &mut self.backends {
            let id = backend.id().to_string();
            let started = guarded(&id, "subscribe", || {
                backend.subscribe(self.sink.clone());
                Ok(())
            })
            .and_then(|()| guarded(&id, "initialize", || backend.initialize()));
            if let Err(error) = started {
                warn!(target: "stickenv::registry", backend = %id, "initialize failed: {error}");
                report.init_failures.push(InitFailure { backend: id, error });
            }
        }

        report.loaded = self.backends.iter().map(|b| b.id().to_string()).collect();
        report.cycle = self.synchronize();
        self.state = RegistryState::Ready;
        info!(
            target: "stickenv::registry",
            backends = ?report.loaded,
            controllers = self.controllers.len(),
            "controller environment ready"
        );
        Ok(report)
    }

    /// Constructs the platform default and configured overrides that are not loaded yet.
    fn load_selected(&mut self, report: &mut LoadReport) {
        let platform = self.config.platform();
        let loaded: Vec<String> = self.backends.iter().map(|b| b.id().to_string()).collect();
        let ids = selector::resolve(
            &platform,
            &self.config.override_lists(),
            self.config.defaults_enabled(),
            &loaded,
        );

        for id in ids {
            if self.backends.iter().any(|b| b.id() == id) {
                debug!(target: "stickenv::registry", backend = %id, "already loaded, skipping");
                continue;
            }
            debug!(target: "stickenv::registry", backend = %id, "loading");
            let built = self
                .catalog
                .construct(&id, &BackendOptions::new())
                .and_then(check_support);
            match built {
                Ok((backend, true)) => self.backends.push(backend),
                Ok((backend, false)) => {
                    info!(target: "stickenv::registry", backend = %id, "backend is not supported");
                    report.skipped.push(Skipped {
                        candidate: id,
                        reason: Rejection::Unsupported {
                            backend: backend.id().to_string(),
                        },
                    });
                }
                Err(error) => {
                    warn!(target: "stickenv::registry", backend = %id, "skip backend: {error}");
                    report.skipped.push(Skipped {
                        candidate: id,
                        reason: Rejection::Failed(error),
                    });
                }
            }
        }
    }

    /// Refreshes every backend in load order, then runs exactly one cycle.
    ///
    /// Only valid once [`initialize`](Self::initialize) has succeeded and before
    /// [`destroy`](Self::destroy); otherwise returns [`Error::InvalidState`].
    pub fn update_controllers(&mut self) -> Result<CycleReport> {
        self.require(RegistryState::Ready, "update_controllers")?;
        let mut refresh_failures = 0;
        for backend in &mut self.backends {
            let id = backend.id().to_string();
            if let Err(error) = guarded(&id, "refresh", || backend.refresh()) {
                warn!(target: "stickenv::registry", backend = %id, "refresh failed: {error}");
                refresh_failures += 1;
            }
        }
        Ok(CycleReport {
            refresh_failures,
            ..self.synchronize()
        })
    }

    /// Unsubscribes from and destroys every backend, in load order.
    ///
    /// Attached controllers stay in the map. May be called once, from either
    /// `Uninitialized` or `Ready`. A backend that fails or panics while being torn
    /// down is logged; the rest are still torn down.
    pub fn destroy(&mut self) -> Result<()> {
        if self.state == RegistryState::Destroyed {
            return Err(Error::InvalidState {
                operation: "destroy",
                state: self.state,
            });
        }
        for mut backend in std::mem::take(&mut self.backends) {
            let id = backend.id().to_string();
            let unsubscribed = guarded(&id, "unsubscribe", || {
                backend.unsubscribe(&self.sink);
                Ok(())
            });
            if let Err(error) = unsubscribed {
                warn!(target: "stickenv::registry", backend = %id, "unsubscribe failed: {error}");
            }
            if let Err(error) = guarded(&id, "destroy", || backend.destroy()) {
                warn!(target: "stickenv::registry", backend = %id, "destroy failed: {error}");
            }
        }
        self.state = RegistryState::Destroyed;
        Ok(())
    }

    /// Applies pending deltas to the map and notifies subscribers.
    ///
    /// Only deltas queued when the cycle starts are applied; anything pushed
    /// after that waits for the next cycle.
    fn synchronize(&self) -> CycleReport {
        let pending = self.deltas.len();
        let mut added = Vec::new();
        let mut removed = Vec::new();
        for delta in self.deltas.try_iter().take(pending) {
            match delta {
                Delta::Added(c) => added.push(c),
                Delta::Removed(c) => removed.push(c),
            }
        }

        let mut report = CycleReport {
            added: added.len(),
            removed: removed.len(),
            ..Default::default()
        };
        if report.is_empty() {
            return report;
        }

        {
            let mut map = self.controllers.inner.lock();
            for controller in &removed {
                if map.remove(&controller.instance_id()).is_none() {
                    report.stale_removals += 1;
                }
            }
            for controller in &added {
                map.insert(controller.instance_id(), controller.clone());
            }
        }

        let listeners = self.subscribers.lock().snapshot();
        for controller in removed {
            report.listener_failures += emit_to(&listeners, &ControllerEvent::Removed(controller));
        }
        for controller in added {
            report.listener_failures += emit_to(&listeners, &ControllerEvent::Added(controller));
        }

        debug!(
            target: "stickenv::registry",
            added = report.added,
            removed = report.removed,
            stale = report.stale_removals,
            failures = report.listener_failures,
            "synchronized controllers"
        );
        report
    }

    fn require(&self, expected: RegistryState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

impl Default for EnvironmentRegistry {
    /// Configuration from `STICKENV_*` variables and the built-in backends.
    fn default() -> Self {
        Self::new(EnvironmentConfig::from_env(), BackendCatalog::with_builtins())
    }
}

impl fmt::Debug for EnvironmentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentRegistry")
            .field("state", &self.state)
            .field("backends", &self.loaded_backends())
            .field("controllers", &self.controllers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Controller;

    struct Pad {
        id: u64,
        name: &'static str,
    }

    impl Controller for Pad {
        fn instance_id(&self) -> InstanceId {
            InstanceId(self.id)
        }
        fn name(&self) -> &str {
            self.name
        }
    }

    fn pad(id: u64) -> ControllerRef {
        Arc::new(Pad { id, name: "pad" })
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ControllerListener for Recorder {
        fn controller_added(&self, c: &ControllerRef) {
            self.0.lock().push(format!("+{}", c.instance_id().0));
        }
        fn controller_removed(&self, c: &ControllerRef) {
            self.0.lock().push(format!("-{}", c.instance_id().0));
        }
    }

    fn empty_registry() -> EnvironmentRegistry {
        EnvironmentRegistry::new(EnvironmentConfig::default(), BackendCatalog::new())
    }

    fn ids(registry: &EnvironmentRegistry) -> Vec<u64> {
        registry.controllers().iter().map(|c| c.instance_id().0).collect()
    }

    #[test]
    fn removals_are_emitted_before_additions() {
        let registry = empty_registry();
        let recorder = Arc::new(Recorder::default());
        registry.subscribe(recorder.clone());

        registry.sink.controller_added(&pad(1));
        registry.sink.controller_added(&pad(2));
        registry.synchronize();

        registry.sink.controller_added(&pad(3));
        registry.sink.controller_removed(&pad(1));
        registry.sink.controller_added(&pad(4));
        registry.sink.controller_removed(&pad(2));
        registry.synchronize();

        assert_eq!(*recorder.0.lock(), vec!["+1", "+2", "-1", "-2", "+3", "+4"]);
        assert_eq!(ids(&registry), vec![3, 4]);
    }

    #[test]
    fn last_write_wins_within_a_cycle() {
        let registry = empty_registry();
        let first: ControllerRef = Arc::new(Pad { id: 9, name: "first" });
        let second: ControllerRef = Arc::new(Pad { id: 9, name: "second" });
        registry.sink.controller_added(&first);
        registry.sink.controller_added(&second);

        let report = registry.synchronize();

        assert_eq!(report.added, 2);
        assert_eq!(registry.controllers().len(), 1);
        assert_eq!(
            registry.controller(InstanceId(9)).map(|c| c.name().to_string()),
            Some("second".to_string())
        );
    }

    #[test]
    fn removal_then_re_add_in_one_cycle_keeps_the_controller() {
        let registry = empty_registry();
        registry.sink.controller_added(&pad(5));
        registry.synchronize();

        registry.sink.controller_added(&pad(5));
        registry.sink.controller_removed(&pad(5));
        registry.synchronize();

        assert_eq!(ids(&registry), vec![5]);
    }

    #[test]
    fn stale_removal_is_a_no_op() {
        let registry = empty_registry();
        registry.sink.controller_added(&pad(1));
        registry.synchronize();

        registry.sink.controller_removed(&pad(7));
        let report = registry.synchronize();

        assert_eq!(report.stale_removals, 1);
        assert_eq!(ids(&registry), vec![1]);
    }

    #[test]
    fn empty_cycle_changes_nothing() {
        let registry = empty_registry();
        let recorder = Arc::new(Recorder::default());
        registry.subscribe(recorder.clone());
        registry.sink.controller_added(&pad(1));
        registry.synchronize();
        let before = recorder.0.lock().len();

        let report = registry.synchronize();

        assert!(report.is_empty());
        assert_eq!(recorder.0.lock().len(), before);
        assert_eq!(ids(&registry), vec![1]);
    }

    #[test]
    fn map_tracks_adds_minus_removes_across_cycles() {
        let registry = empty_registry();
        let cycles: &[(&[u64], &[u64])] = &[
            (&[1, 2, 3], &[]),
            (&[4], &[2]),
            (&[2], &[1, 9]),
            (&[], &[3, 4]),
        ];
        let mut expected = std::collections::BTreeSet::new();
        for (adds, removes) in cycles {
            for id in *adds {
                registry.sink.controller_added(&pad(*id));
            }
            for id in *removes {
                registry.sink.controller_removed(&pad(*id));
            }
            registry.synchronize();

            for id in *removes {
                expected.remove(id);
            }
            expected.extend(adds.iter().copied());
            assert_eq!(ids(&registry), expected.iter().copied().collect::<Vec<_>>());
        }
        assert_eq!(ids(&registry), vec![2]);
    }

    /// Re-reports one controller from inside a subscriber callback.
    struct Echo {
        sink: Arc<dyn ControllerListener>,
        echo: u64,
    }

    impl ControllerListener for Echo {
        fn controller_added(&self, c: &ControllerRef) {
            if c.instance_id().0 != self.echo {
                self.sink.controller_added(&pad(self.echo));
            }
        }
        fn controller_removed(&self, _: &ControllerRef) {}
    }

    #[test]
    fn deltas_queued_during_emission_wait_for_the_next_cycle() {
        let registry = empty_registry();
        registry.subscribe(Arc::new(Echo {
            sink: registry.sink.clone(),
            echo: 2,
        }));
        registry.sink.controller_added(&pad(1));

        let first = registry.synchronize();
        assert_eq!(first.added, 1);
        assert_eq!(ids(&registry), vec![1]);

        let second = registry.synchronize();
        assert_eq!(second.added, 1);
        assert_eq!(ids(&registry), vec![1, 2]);
        assert!(registry.synchronize().is_empty());
    }

    /// Reads the registry map from inside `meta`.
    struct Nosy {
        map: ControllerMap,
    }

    impl Controller for Nosy {
        fn instance_id(&self) -> InstanceId {
            InstanceId(3)
        }
        fn name(&self) -> &str {
            "nosy"
        }
        fn meta(&self) -> crate::metadata::ControllerMeta {
            crate::metadata::ControllerMeta {
                product_string: Some(format!("{} attached", self.map.len())),
                ..Default::default()
            }
        }
    }

    #[test]
    fn snapshot_reads_controllers_outside_the_map_lock() {
        let registry = empty_registry();
        let nosy: ControllerRef = Arc::new(Nosy {
            map: registry.controller_map(),
        });
        registry.sink.controller_added(&nosy);
        registry.synchronize();

        let snapshot = registry.snapshot();

        let info = snapshot.get(InstanceId(3)).expect("nosy in snapshot");
        assert_eq!(info.meta.product_string.as_deref(), Some("1 attached"));
    }

    #[test]
    fn lifecycle_misuse_is_reported() {
        let mut registry = empty_registry();
        assert!(matches!(
            registry.update_controllers(),
            Err(Error::InvalidState {
                state: RegistryState::Uninitialized,
                ..
            })
        ));

        registry.destroy().expect("destroy from uninitialized");
        assert!(matches!(registry.initialize(), Err(Error::InvalidState { .. })));
        assert!(matches!(registry.destroy(), Err(Error::InvalidState { .. })));
    }
}
