//! Runtime dependency management for BSL Language Server.
//!
//! The server ships as an executable JAR published on GitHub and runs on a
//! Java runtime taken from the VS Code Java extension. This module keeps both
//! in a local cache and keeps the JAR up to date across launches:
//!
//! 1. a staged update downloaded by a previous launch is promoted first
//!    ([`activator`]),
//! 2. otherwise the cached JAR is used as is,
//! 3. otherwise a release is resolved ([`release`]) and downloaded
//!    ([`fetch`]),
//! 4. finally, unless a version is pinned, a background task looks for a
//!    newer release and stages it for the next launch ([`stager`]).
//!
//! The ledger ([`ledger`]) and the staging directory are shared by every
//! process using the same cache, so changes to both are made under the
//! cross-process [`lock`].
//!
//! # Layout
//!
//! ```text
//! <root>/bsl_language_server/
//! ├── version.json            ledger
//! ├── java/                   extracted Java runtime
//! └── bsl-ls/
//!     ├── .bsl-ls.lock
//!     ├── bsl-language-server-X.Y.Z-exec.jar
//!     └── staged/
//!         └── bsl-language-server-X.Y.Z-exec.jar
//! ```

pub mod activator;
pub mod fetch;
pub mod ledger;
pub mod lock;
pub mod platform;
pub mod release;
pub mod resolver;
pub mod stager;
pub mod version;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

pub use activator::StageActivator;
pub use fetch::{ArtifactFetcher, ArtifactKind, HttpFetcher};
pub use ledger::{VersionInfo, VersionLedger};
pub use lock::CacheLock;
pub use platform::PlatformId;
pub use release::{ReleaseResolver, ResolvedRelease};
pub use resolver::{DependencyResolver, RuntimeDependencies};
pub use stager::{StageOutcome, UpdateStager};

/// Directory under the cache root owned by this crate.
pub const DEPS_DIR_NAME: &str = "bsl_language_server";

/// Directory holding the active JAR and the lock file.
pub const ARTIFACT_DIR_NAME: &str = "bsl-ls";

/// Subdirectory of the artifact directory holding a staged JAR.
pub const STAGED_DIR_NAME: &str = "staged";

/// Directory holding the extracted Java runtime.
pub const JAVA_DIR_NAME: &str = "java";

/// Extension of partially downloaded files.
pub const TEMP_EXTENSION: &str = "tmp";

/// Filesystem locations of the dependency cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    deps_dir: PathBuf,
    artifact_dir: PathBuf,
}

impl CacheLayout {
    /// Lays out the cache under `root`.
    pub fn new(root: &Path) -> Self {
        let deps_dir = root.join(DEPS_DIR_NAME);
        let artifact_dir = deps_dir.join(ARTIFACT_DIR_NAME);
        Self::from_dirs(deps_dir, artifact_dir)
    }

    /// Uses explicit directories for the ledger and the artifact.
    pub fn from_dirs(deps_dir: PathBuf, artifact_dir: PathBuf) -> Self {
        Self {
            deps_dir,
            artifact_dir,
        }
    }

    /// Directory holding the ledger.
    pub fn deps_dir(&self) -> &Path {
        &self.deps_dir
    }

    /// Directory holding the active JAR and the lock file.
    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Directory holding a staged JAR.
    pub fn staged_dir(&self) -> PathBuf {
        self.artifact_dir.join(STAGED_DIR_NAME)
    }

    /// Directory holding the Java runtime.
    pub fn java_dir(&self) -> PathBuf {
        self.deps_dir.join(JAVA_DIR_NAME)
    }

    /// Ledger handle for this cache.
    pub fn ledger(&self) -> VersionLedger {
        VersionLedger::new(&self.deps_dir)
    }
}

/// Lists executable JARs directly inside `dir`, sorted by name.
///
/// A missing or unreadable directory yields an empty list.
pub fn find_exec_jars(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut jars: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(version::is_exec_jar)
        })
        .collect();
    jars.sort();
    jars
}

/// Removes `*.tmp` files directly inside `dir`, except those whose name ends
/// with `keep_suffix`.
///
/// Callers hold the cache lock. Failures are logged.
pub(crate) async fn purge_partial_downloads(dir: &Path, keep_suffix: Option<&str>) {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
            continue;
        }
        if keep_suffix.is_some_and(|suffix| file_name_str(&path).ends_with(suffix)) {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(file = file_name_str(&path), "removed partial download"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial download"),
        }
    }
}

/// File name of `path` as UTF-8, or an empty string.
pub(crate) fn file_name_str(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}
