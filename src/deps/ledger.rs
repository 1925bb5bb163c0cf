//! Persistent record of the managed artifact's version state.
//!
//! The ledger is a small JSON document (`version.json`) shared by every
//! process that resolves the same cache directory. It is re-read on every
//! resolution pass and written best-effort: a failed write is logged and
//! never aborts resolution.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// File name of the ledger inside the dependency directory.
pub const VERSION_FILENAME: &str = "version.json";

/// Version state of the managed artifact.
///
/// All fields serialize as explicit `null` when absent. Unknown keys are
/// ignored when reading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionInfo {
    /// Version of the active artifact.
    pub current: Option<String>,
    /// Version downloaded into the staging area but not yet activated.
    pub staged: Option<String>,
    /// RFC 3339 timestamp of the last remote update query.
    pub last_check: Option<String>,
    /// User-pinned version; disables automatic updates.
    pub pinned: Option<String>,
}

/// Handle to the on-disk ledger.
#[derive(Debug, Clone)]
pub struct VersionLedger {
    path: PathBuf,
}

impl VersionLedger {
    /// Creates a ledger handle for `<dir>/version.json`. Nothing is read or
    /// created until [`Self::read`] or [`Self::write`] is called.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(VERSION_FILENAME),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the ledger, falling back to defaults if it is missing or invalid.
    pub fn read(&self) -> VersionInfo {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no version ledger yet");
                return VersionInfo::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read version ledger");
                return VersionInfo::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "version ledger is malformed, using defaults");
            VersionInfo::default()
        })
    }

    /// Writes the ledger. Errors are logged, not returned.
    pub fn write(&self, info: &VersionInfo) {
        if let Err(e) = self.try_write(info) {
            warn!(path = %self.path.display(), error = %e, "failed to write version ledger");
        }
    }

    /// Clears a stale `staged` entry when the staging area has no artifact.
    ///
    /// The filesystem is authoritative; returns the reconciled state.
    pub fn reconcile(&self, staged_artifact_present: bool) -> VersionInfo {
        let mut info = self.read();
        if !staged_artifact_present && info.staged.is_some() {
            debug!(staged = ?info.staged, "clearing stale staged version");
            info.staged = None;
            self.write(&info);
        }
        info
    }

    // Write atomically (temp file + rename)
    fn try_write(&self, info: &VersionInfo) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(info).map_err(std::io::Error::other)?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)
    }
}
