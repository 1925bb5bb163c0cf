//! Promotion of a staged JAR into the active slot.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::lock::CacheLock;
use super::version::version_from_jar_name;
use super::{CacheLayout, file_name_str, find_exec_jars};

/// Moves a previously staged JAR into the artifact directory.
#[derive(Debug, Clone)]
pub struct StageActivator {
    layout: CacheLayout,
}

impl StageActivator {
    /// Creates an activator for `layout`.
    pub fn new(layout: CacheLayout) -> Self {
        Self { layout }
    }

    /// Activates the staged JAR, if any.
    ///
    /// Returns the new active path, or `None` when nothing is staged, when
    /// another process holds the cache lock, or when promotion fails. The
    /// active directory is untouched in every `None` case except a failure
    /// halfway through promotion.
    pub fn activate(&self) -> Option<PathBuf> {
        let staged_dir = self.layout.staged_dir();
        if !staged_dir.is_dir() {
            self.clear_stale_staged();
            return None;
        }
        if find_exec_jars(&staged_dir).is_empty() {
            debug!(dir = %staged_dir.display(), "staging directory holds no JAR");
            self.clear_stale_staged();
            return None;
        }

        let lock = CacheLock::open(self.layout.artifact_dir())
            .inspect_err(|e| warn!(error = %e, "failed to open cache lock"))
            .ok()?;
        let Some(_guard) = lock.try_lock() else {
            debug!("cache is locked by another process, skipping staged activation");
            return None;
        };

        // Another process may have promoted it while we waited for the lock.
        let staged_jar = find_exec_jars(&staged_dir).into_iter().next()?;
        let name = file_name_str(&staged_jar).to_string();

        for old in find_exec_jars(self.layout.artifact_dir()) {
            if let Err(e) = fs::remove_file(&old) {
                warn!(path = %old.display(), error = %e, "failed to remove previous JAR");
                return None;
            }
            debug!(path = %old.display(), "removed previous JAR");
        }

        let target = self.layout.artifact_dir().join(&name);
        if let Err(e) = fs::rename(&staged_jar, &target) {
            warn!(from = %staged_jar.display(), to = %target.display(), error = %e, "failed to activate staged JAR");
            return None;
        }

        let ledger = self.layout.ledger();
        let mut info = ledger.read();
        let staged_version = info.staged.take();
        info.current = version_from_jar_name(&name).or(staged_version);
        ledger.write(&info);

        if let Err(e) = fs::remove_dir_all(&staged_dir) {
            warn!(dir = %staged_dir.display(), error = %e, "failed to remove staging directory");
        }

        info!(version = ?info.current, path = %target.display(), "activated staged BSL Language Server");
        Some(target)
    }

    fn clear_stale_staged(&self) {
        let ledger = self.layout.ledger();
        if ledger.read().staged.is_none() {
            return;
        }
        let Ok(lock) = CacheLock::open(self.layout.artifact_dir()) else {
            return;
        };
        if let Some(_guard) = lock.try_lock() {
            ledger.reconcile(!find_exec_jars(&self.layout.staged_dir()).is_empty());
        }
    }
}
