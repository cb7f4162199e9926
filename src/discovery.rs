//! Backend discovery from manifests on disk.
//!
//! A search root is a directory of backend manifests: small TOML files naming a
//! compiled-in backend and, optionally, options for it.
//!
//! ```toml
//! backend = "virtual"
//!
//! [options]
//! controllers = [{ id = 1, name = "Bench Pad" }]
//! ```
//!
//! [`PluginDiscoverer::discover`] walks a root (two levels deep, in path order),
//! builds a backend for every manifest through the [`BackendCatalog`], and keeps
//! the ones that report themselves supported. Every failure is per candidate:
//! it is logged and the walk moves on. A root that does not exist yields nothing.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::backends::{BackendCatalog, BackendOptions};
use crate::environment::{check_support, ControllerEnvironment};
use crate::error::{Error, Result};

const MANIFEST_EXTENSION: &str = "toml";
const MAX_DEPTH: usize = 2;

#[derive(Clone, Debug, Deserialize)]
pub struct BackendManifest {
    /// Identifier registered in the catalog.
    pub backend: String,
    #[serde(default)]
    pub options: BackendOptions,
}

impl BackendManifest {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
        toml::from_str(&text).map_err(|source| Error::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// A candidate that was not kept, and why.
#[derive(Debug)]
pub struct Rejected {
    pub manifest: PathBuf,
    pub reason: Rejection,
}

#[derive(Debug)]
pub enum Rejection {
    /// The manifest could not be read or the backend could not be built.
    Failed(Error),
    /// The backend was built but reported itself unsupported.
    Unsupported { backend: String },
}

/// Backends kept from one search root, plus the candidates that were dropped.
#[derive(Default)]
pub struct Discovered {
    pub backends: Vec<Box<dyn ControllerEnvironment>>,
    pub rejected: Vec<Rejected>,
}

pub struct PluginDiscoverer<'a> {
    catalog: &'a BackendCatalog,
}

impl<'a> PluginDiscoverer<'a> {
    pub fn new(catalog: &'a BackendCatalog) -> Self {
        Self { catalog }
    }

    /// Supported backends found under `root`. Not subscribed or initialized.
    pub fn discover(&self, root: impl AsRef<Path>) -> Vec<Box<dyn ControllerEnvironment>> {
        self.discover_detailed(root).backends
    }

    /// Like [`discover`](Self::discover), also reporting dropped candidates.
    pub fn discover_detailed(&self, root: impl AsRef<Path>) -> Discovered {
        let root = root.as_ref();
        let mut out = Discovered::default();
        if !root.exists() {
            return out;
        }

        for manifest in manifest_paths(root) {
            match self.instantiate(&manifest).and_then(check_support) {
                Ok((env, true)) => {
                    debug!(
                        target: "stickenv::discovery",
                        backend = env.id(),
                        manifest = %manifest.display(),
                        "discovered backend"
                    );
                    out.backends.push(env);
                }
                Ok((env, false)) => {
                    info!(
                        target: "stickenv::discovery",
                        backend = env.id(),
                        manifest = %manifest.display(),
                        "backend is not supported"
                    );
                    out.rejected.push(Rejected {
                        manifest,
                        reason: Rejection::Unsupported {
                            backend: env.id().to_string(),
                        },
                    });
                }
                Err(e) => {
                    warn!(
                        target: "stickenv::discovery",
                        manifest = %manifest.display(),
                        "skip backend candidate: {e}"
                    );
                    out.rejected.push(Rejected {
                        manifest,
                        reason: Rejection::Failed(e),
                    });
                }
            }
        }
        out
    }

    fn instantiate(&self, manifest: &Path) -> Result<Box<dyn ControllerEnvironment>> {
        let manifest = BackendManifest::read(manifest)?;
        self.catalog.construct(&manifest.backend, &manifest.options)
    }
}

/// Manifest files under `root`, sorted so discovery order is stable.
fn manifest_paths(root: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .follow_links(true)
        .max_depth(MAX_DEPTH)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(
                    target: "stickenv::discovery",
                    root = %root.display(),
                    "skip unreadable entry: {e}"
                );
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(MANIFEST_EXTENSION))
        })
        .collect();
    paths.sort();
    paths
}
