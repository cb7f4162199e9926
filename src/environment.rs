//! The backend capability contract.
//!
//! Every platform backend (evdev on Linux, IOKit on macOS, DirectInput/Raw Input
//! on Windows, the in-process [`VirtualEnvironment`](crate::backends::virtual_input::VirtualEnvironment), …)
//! is a self-contained [`ControllerEnvironment`]. The
//! [`EnvironmentRegistry`](crate::registry::EnvironmentRegistry) owns one boxed
//! instance per loaded backend and drives it through this lifecycle:
//!
//! 1. [`is_supported`](ControllerEnvironment::is_supported) once, at load time
//! 2. [`subscribe`](ControllerEnvironment::subscribe) with the registry's delta sink
//! 3. [`initialize`](ControllerEnvironment::initialize)
//! 4. any number of [`refresh`](ControllerEnvironment::refresh) calls
//! 5. [`unsubscribe`](ControllerEnvironment::unsubscribe) then [`destroy`](ControllerEnvironment::destroy)
//!
//! Backends report attached/detached devices by calling the subscribed
//! [`ControllerListener`]s, either from `initialize`/`refresh` or from their own
//! threads.
//!
//! Errors returned from `initialize`, `refresh` and `destroy` are logged by the
//! registry and never stop it from driving the remaining backends. A panic in
//! backend code is caught and treated the same way, as [`Error::Panicked`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::listener::ControllerListener;

pub trait ControllerEnvironment: Send {
    /// Backend identifier, e.g. `"linux"` or `"virtual"`. Used to avoid loading
    /// the same backend twice.
    fn id(&self) -> &str;

    /// Whether this backend can run on the current host.
    fn is_supported(&self) -> bool;

    fn initialize(&mut self) -> Result<()>;

    /// Releases backend resources. Need not be idempotent.
    fn destroy(&mut self) -> Result<()>;

    /// Re-evaluates attached devices and notifies listeners of any changes.
    fn refresh(&mut self) -> Result<()>;

    fn subscribe(&mut self, listener: Arc<dyn ControllerListener>);

    /// Removes a listener previously passed to `subscribe` (compared by pointer).
    fn unsubscribe(&mut self, listener: &Arc<dyn ControllerListener>);
}

/// Runs one call into backend code, turning a panic into [`Error::Panicked`].
pub(crate) fn guarded<T>(
    backend: &str,
    operation: &'static str,
    call: impl FnOnce() -> Result<T>,
) -> Result<T> {
    catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|panic| Err(Error::panicked(backend, operation, panic.as_ref())))
}

/// Pairs a freshly built backend with the outcome of its support check.
pub(crate) fn check_support(
    backend: Box<dyn ControllerEnvironment>,
) -> Result<(Box<dyn ControllerEnvironment>, bool)> {
    let supported = guarded(backend.id(), "is_supported", || Ok(backend.is_supported()))?;
    Ok((backend, supported))
}
