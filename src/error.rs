//! Error type shared by the registry, discovery and backends.
//!
//! Nothing in the controller environment is fatal to the host process: most of
//! these errors are logged and the offending backend or candidate is skipped.
//! They are surfaced as values so callers (and [`LoadReport`](crate::registry::LoadReport))
//! can see what went wrong.

use std::any::Any;
use std::path::PathBuf;

use thiserror::Error;

use crate::registry::RegistryState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A registry operation was called in a state that does not allow it.
    #[error("`{operation}` is not valid while the registry is {state}")]
    InvalidState {
        operation: &'static str,
        state: RegistryState,
    },

    /// No constructor is registered for this backend identifier.
    #[error("unknown backend `{id}`")]
    UnknownBackend { id: String },

    /// A backend failed one of its lifecycle operations.
    #[error("backend `{backend}`: {message}")]
    Backend { backend: String, message: String },

    /// Backend code panicked during `operation`.
    #[error("backend `{backend}` panicked in {operation}: {message}")]
    Panicked {
        backend: String,
        operation: &'static str,
        message: String,
    },

    #[error("invalid backend manifest `{path}`: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {source}")]
    Config {
        #[source]
        source: toml::de::Error,
    },

    #[error("io failed at `{path}`: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn unknown_backend(id: impl Into<String>) -> Self {
        Self::UnknownBackend { id: id.into() }
    }

    pub(crate) fn panicked(
        backend: impl Into<String>,
        operation: &'static str,
        panic: &(dyn Any + Send),
    ) -> Self {
        Self::Panicked {
            backend: backend.into(),
            operation,
            message: panic_message(panic).to_string(),
        }
    }

    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoAt {
            path: path.into(),
            source,
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
