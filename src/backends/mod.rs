//! Backend catalog for `stickenv`.
//!
//! Backends are compiled in and looked up by identifier rather than loaded from
//! shared libraries at runtime. The [`BackendCatalog`] maps each identifier to a
//! constructor; both the [`PluginDiscoverer`](crate::discovery::PluginDiscoverer)
//! (identifiers read from manifests on disk) and the backend selector (platform
//! defaults and configured overrides) build backends through it.
//!
//! # Platform defaults
//! The selector names one default per platform family:
//! - [`LINUX`] on Linux
//! - [`OSX`] on macOS
//! - [`DIRECT_AND_RAW_INPUT`] on Windows XP and later
//! - [`DIRECT_INPUT`] on Windows 98/2000
//!
//! Native implementations live outside this crate. Host applications register
//! them under these identifiers; an identifier without a constructor is logged
//! and skipped when the registry initializes.
//!
//! # Feature flags
//! - **`virtual`** — registers the in-process [`virtual_input`] backend under [`VIRTUAL`].

use std::collections::BTreeMap;
use std::fmt;

use crate::environment::{guarded, ControllerEnvironment};
use crate::error::{Error, Result};

#[cfg(feature = "virtual")]
#[cfg_attr(docsrs, doc(cfg(feature = "virtual")))]
pub mod virtual_input;

pub const LINUX: &str = "linux";
pub const OSX: &str = "osx";
pub const DIRECT_AND_RAW_INPUT: &str = "direct-and-raw-input";
pub const DIRECT_INPUT: &str = "direct-input";
pub const VIRTUAL: &str = "virtual";

/// Free-form backend options, taken from the `[options]` table of a manifest.
///
/// Backends resolved by identifier (defaults and overrides) get an empty table.
pub type BackendOptions = toml::Table;

type Constructor =
    Box<dyn Fn(&BackendOptions) -> Result<Box<dyn ControllerEnvironment>> + Send + Sync>;

/// Identifier → constructor table.
#[derive(Default)]
pub struct BackendCatalog {
    constructors: BTreeMap<String, Constructor>,
}

impl BackendCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog with the backends shipped in this crate.
    pub fn with_builtins() -> Self {
        #[allow(unused_mut)]
        let mut catalog = Self::new();

        #[cfg(feature = "virtual")]
        catalog.register(VIRTUAL, |options| {
            let env = virtual_input::VirtualEnvironment::from_options(options)?;
            Ok(Box::new(env) as Box<dyn ControllerEnvironment>)
        });

        catalog
    }

    /// Registers (or replaces) the constructor for `id`.
    pub fn register<F>(&mut self, id: impl Into<String>, constructor: F)
    where
        F: Fn(&BackendOptions) -> Result<Box<dyn ControllerEnvironment>> + Send + Sync + 'static,
    {
        self.constructors.insert(id.into(), Box::new(constructor));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Builds the backend registered under `id`.
    ///
    /// The returned backend has not been support-checked, subscribed or initialized.
    /// A constructor that panics yields [`Error::Panicked`].
    pub fn construct(
        &self,
        id: &str,
        options: &BackendOptions,
    ) -> Result<Box<dyn ControllerEnvironment>> {
        let constructor = self
            .constructors
            .get(id)
            .ok_or_else(|| Error::unknown_backend(id))?;
        guarded(id, "construct", || constructor(options))
    }
}

impl fmt::Debug for BackendCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.constructors.keys()).finish()
    }
}
