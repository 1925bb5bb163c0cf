//! Settings for the BSL Language Server launcher.
//!
//! Settings come from an optional JSON file and may be overridden on the
//! command line. Recognized keys:
//!
//! ```json
//! {
//!   "memory": "8G",
//!   "jvm_options": "-Xmx4G -XX:+UseG1GC",
//!   "version": "0.28.0"
//! }
//! ```
//!
//! Diagnostics language and other analyzer options are configured through a
//! `.bsl-language-server.json` file in the project root, which is passed to
//! the server when present.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Default JVM heap cap when neither `memory` nor `-Xmx` is configured.
pub const DEFAULT_MEMORY: &str = "4G";

/// Project-local configuration file understood by BSL Language Server.
pub const BSL_CONFIG_FILENAME: &str = ".bsl-language-server.json";

const XMX_PREFIX: &str = "-Xmx";

/// User settings for the BSL Language Server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BslSettings {
    /// Explicit JVM heap cap (e.g. `8G`). Takes priority over `-Xmx` in
    /// `jvm_options`.
    pub memory: Option<String>,
    /// Additional JVM flags, whitespace separated.
    pub jvm_options: Option<String>,
    /// Pinned server version. Disables automatic updates when set.
    pub version: Option<String>,
}

impl BslSettings {
    /// Loads settings from a JSON file.
    ///
    /// ## Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded BSL settings");
        Ok(settings)
    }

    /// Replaces each field for which `overrides` has a value.
    #[must_use]
    pub fn merge(mut self, overrides: BslSettings) -> Self {
        if overrides.memory.is_some() {
            self.memory = overrides.memory;
        }
        if overrides.jvm_options.is_some() {
            self.jvm_options = overrides.jvm_options;
        }
        if overrides.version.is_some() {
            self.version = overrides.version;
        }
        self
    }

    /// Returns the pinned version, ignoring blank values.
    pub fn pinned_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Resolves the JVM heap cap.
    ///
    /// Priority: explicit `memory`, then the last `-Xmx` flag found in
    /// `jvm_options`, then [`DEFAULT_MEMORY`].
    pub fn resolve_memory(&self) -> String {
        if let Some(memory) = self.memory.as_deref().map(str::trim)
            && !memory.is_empty()
        {
            return memory.to_string();
        }

        self.jvm_options
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .filter_map(|flag| flag.strip_prefix(XMX_PREFIX))
            .filter(|value| !value.is_empty())
            .last()
            .map_or_else(|| DEFAULT_MEMORY.to_string(), str::to_string)
    }

    /// Returns `jvm_options` split into flags with any `-Xmx` removed, since
    /// the heap cap is emitted separately from [`Self::resolve_memory`].
    pub fn extra_jvm_options(&self) -> Vec<String> {
        self.jvm_options
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .filter(|flag| !flag.starts_with(XMX_PREFIX))
            .map(str::to_string)
            .collect()
    }
}

/// Looks for [`BSL_CONFIG_FILENAME`] directly inside `root`.
///
/// Returns `None` if it does not exist or is not a regular file.
pub fn find_project_config(root: &Path) -> Option<PathBuf> {
    let candidate = root.join(BSL_CONFIG_FILENAME);
    candidate.is_file().then_some(candidate)
}

/// Default root for downloaded runtime dependencies.
///
/// ## Errors
/// Returns [`ConfigError::NoCacheDir`] if the platform data directory is unknown.
pub fn default_cache_root() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|dir| dir.join("bsl-launcher"))
        .ok_or(ConfigError::NoCacheDir)
}
