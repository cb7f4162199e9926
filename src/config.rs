//! Startup configuration.
//!
//! [`EnvironmentConfig`] is read once, when the registry initializes. It can be
//! built in code, parsed from TOML, and overlaid with environment variables:
//!
//! ```toml
//! plugin_path = "controller"
//! backends = "virtual"
//! use_default_backend = "true"
//! platform = "Linux"
//! ```
//!
//! `backends`/`plugins` and `use_default_backend`/`use_default_plugin` are
//! equivalent pairs; the second key of each pair is the legacy name.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::selector::flag_enables_defaults;

pub const DEFAULT_PLUGIN_PATH: &str = "controller";

const ENV_PLUGIN_PATH: &str = "STICKENV_PLUGIN_PATH";
const ENV_BACKENDS: &str = "STICKENV_BACKENDS";
const ENV_PLUGINS: &str = "STICKENV_PLUGINS";
const ENV_USE_DEFAULT_BACKEND: &str = "STICKENV_USE_DEFAULT_BACKEND";
const ENV_USE_DEFAULT_PLUGIN: &str = "STICKENV_USE_DEFAULT_PLUGIN";
const ENV_PLATFORM: &str = "STICKENV_PLATFORM";
const ENV_INSTALL_ROOT: &str = "STICKENV_INSTALL_ROOT";

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Subdirectory scanned for backend manifests. Defaults to `"controller"`.
    pub plugin_path: Option<String>,
    /// Extra backend identifiers.
    pub backends: Option<String>,
    /// Extra backend identifiers (legacy key).
    pub plugins: Option<String>,
    /// `"false"` (any case) disables the platform default backend.
    pub use_default_backend: Option<String>,
    /// Legacy spelling of `use_default_backend`.
    pub use_default_plugin: Option<String>,
    /// Platform string used to pick the default backend. Detected when unset.
    pub platform: Option<String>,
    /// Installation root; `<install_root>/lib/<plugin_path>` is searched.
    /// Defaults to the directory of the running executable.
    pub install_root: Option<PathBuf>,
    /// `<working_dir>/<plugin_path>` is searched. Defaults to the current directory.
    pub working_dir: Option<PathBuf>,
}

impl EnvironmentConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|source| Error::Config { source })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Reads only the `STICKENV_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Replaces fields with any `STICKENV_*` environment variables that are set.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = var(ENV_PLUGIN_PATH) {
            self.plugin_path = Some(v);
        }
        if let Some(v) = var(ENV_BACKENDS) {
            self.backends = Some(v);
        }
        if let Some(v) = var(ENV_PLUGINS) {
            self.plugins = Some(v);
        }
        if let Some(v) = var(ENV_USE_DEFAULT_BACKEND) {
            self.use_default_backend = Some(v);
        }
        if let Some(v) = var(ENV_USE_DEFAULT_PLUGIN) {
            self.use_default_plugin = Some(v);
        }
        if let Some(v) = var(ENV_PLATFORM) {
            self.platform = Some(v);
        }
        if let Some(v) = var(ENV_INSTALL_ROOT) {
            self.install_root = Some(PathBuf::from(v));
        }
        self
    }

    pub fn plugin_path(&self) -> &str {
        self.plugin_path.as_deref().unwrap_or(DEFAULT_PLUGIN_PATH)
    }

    /// Both override lists, current key first.
    pub fn override_lists(&self) -> Vec<&str> {
        [self.backends.as_deref(), self.plugins.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }

    /// False if either default flag is `"false"`.
    pub fn defaults_enabled(&self) -> bool {
        flag_enables_defaults(self.use_default_backend.as_deref())
            && flag_enables_defaults(self.use_default_plugin.as_deref())
    }

    pub fn platform(&self) -> String {
        self.platform.clone().unwrap_or_else(host_platform)
    }

    /// The two discovery roots: under the installation root, then under the working directory.
    pub fn search_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::with_capacity(2);
        if let Some(install) = self.install_root.clone().or_else(executable_dir) {
            roots.push(install.join("lib").join(self.plugin_path()));
        }
        if let Some(cwd) = self
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
        {
            roots.push(cwd.join(self.plugin_path()));
        }
        roots
    }
}

/// Platform string for the running host, in the form the default table expects.
pub fn host_platform() -> String {
    match std::env::consts::OS {
        "linux" => "Linux".to_string(),
        "macos" => "Mac OS X".to_string(),
        "windows" => "Windows".to_string(),
        other => other.to_string(),
    }
}

fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn toml_keys_map_to_fields() {
        let config = EnvironmentConfig::from_toml_str(
            r#"
            plugin_path = "pads"
            backends = "virtual"
            plugins = "legacy-one"
            use_default_plugin = "False"
            platform = "Linux"
            "#,
        )
        .expect("parse");
        assert_eq!(config.plugin_path(), "pads");
        assert_eq!(config.override_lists(), vec!["virtual", "legacy-one"]);
        assert!(!config.defaults_enabled());
        assert_eq!(config.platform(), "Linux");
    }

    #[test]
    fn defaults_when_empty() {
        let config = EnvironmentConfig::default();
        assert_eq!(config.plugin_path(), DEFAULT_PLUGIN_PATH);
        assert!(config.override_lists().is_empty());
        assert!(config.defaults_enabled());
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let err = EnvironmentConfig::from_toml_str("plugin_path = 3").expect_err("type error");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn env_vars_override_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_BACKENDS, "a b"),
            (ENV_USE_DEFAULT_BACKEND, "FALSE"),
            (ENV_INSTALL_ROOT, "/opt/app"),
        ]);
        let config = EnvironmentConfig {
            backends: Some("from-file".into()),
            ..Default::default()
        }
        .with_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.backends.as_deref(), Some("a b"));
        assert!(!config.defaults_enabled());
        assert_eq!(
            config.search_roots()[0],
            PathBuf::from("/opt/app").join("lib").join("controller")
        );
    }

    #[test]
    fn search_roots_use_subpath() {
        let config = EnvironmentConfig {
            plugin_path: Some("pads".into()),
            install_root: Some(PathBuf::from("/install")),
            working_dir: Some(PathBuf::from("/work")),
            ..Default::default()
        };
        assert_eq!(
            config.search_roots(),
            vec![
                PathBuf::from("/install").join("lib").join("pads"),
                PathBuf::from("/work").join("pads"),
            ]
        );
    }
}
