//! StickEnv — one registry for every controller backend.
//!
//! Platform backends (evdev, IOKit, DirectInput/Raw Input, virtual devices, …)
//! each discover joysticks and gamepads on their own. [`EnvironmentRegistry`]
//! loads the ones that apply to the current host, merges their attach/detach
//! notifications into a single thread-safe map of attached controllers, and
//! republishes those changes to subscribers in a deterministic order.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stickenv::{EnvironmentRegistry, LoggingListener};
//!
//! let mut registry = EnvironmentRegistry::default();
//! registry.subscribe(Arc::new(LoggingListener::new()));
//! registry.initialize().expect("initialize");
//! loop {
//!     registry.update_controllers().expect("registry is ready");
//!     std::thread::sleep(std::time::Duration::from_millis(250));
//! }
//! ```

pub mod backends;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod environment;
pub mod error;
pub mod event;
pub mod listener;
pub mod logger;
pub mod metadata;
pub mod registry;
pub mod selector;
pub mod snapshot;

pub use backends::{BackendCatalog, BackendOptions};
pub use config::EnvironmentConfig;
pub use controller::{Controller, ControllerRef, InstanceId};
pub use environment::ControllerEnvironment;
pub use error::{Error, Result};
pub use event::{ControllerEvent, ControllerEventKind};
pub use listener::{ControllerListener, ListenerId, ListenerSet};
pub use logger::LoggingListener;
pub use metadata::ControllerMeta;
pub use registry::{ControllerMap, CycleReport, EnvironmentRegistry, LoadReport, RegistryState};
pub use snapshot::{ControllerInfo, Snapshot};
