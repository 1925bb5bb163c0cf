//! Resolution of everything needed to launch the server.
//!
//! [`DependencyResolver::resolve`] guarantees that a Java runtime and an
//! active server JAR exist before returning. Only two outcomes are fatal: an
//! unsupported platform and a JAR that can neither be found locally nor
//! downloaded. Everything else degrades with a log entry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::DepsError;

use super::activator::StageActivator;
use super::fetch::{ArtifactFetcher, ArtifactKind};
use super::ledger::VersionLedger;
use super::lock::CacheLock;
use super::platform::PlatformId;
use super::release::{ReleaseResolver, ResolvedRelease};
use super::stager::UpdateStager;
use super::version::{normalize_version, should_check_for_updates, version_from_jar_name};
use super::{
    CacheLayout, TEMP_EXTENSION, file_name_str, find_exec_jars, purge_partial_downloads,
};

/// Paths handed to the process launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDependencies {
    /// The `java` executable.
    pub java_path: PathBuf,
    /// Value for `JAVA_HOME`.
    pub java_home: PathBuf,
    /// The active server JAR.
    pub jar_path: PathBuf,
    /// Version of the active JAR, if it could be determined.
    pub version: Option<String>,
}

/// The active server JAR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedJar {
    /// Path of the JAR.
    pub path: PathBuf,
    /// Version parsed from the file name or taken from the release.
    pub version: Option<String>,
}

/// Ensures runtime dependencies exist, applying the version-pin policy.
#[derive(Clone)]
pub struct DependencyResolver {
    layout: CacheLayout,
    releases: ReleaseResolver,
    fetcher: Arc<dyn ArtifactFetcher>,
    pinned: Option<String>,
    background_updates: bool,
}

impl DependencyResolver {
    /// Creates a resolver for `layout`.
    pub fn new(
        layout: CacheLayout,
        releases: ReleaseResolver,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Self {
        Self {
            layout,
            releases,
            fetcher,
            pinned: None,
            background_updates: true,
        }
    }

    /// Pins the server version; `None` removes a previous pin.
    #[must_use]
    pub fn pinned_version(mut self, version: Option<impl Into<String>>) -> Self {
        self.pinned = version.map(Into::into);
        self
    }

    /// Enables or disables the background update check.
    #[must_use]
    pub fn background_updates(mut self, enabled: bool) -> Self {
        self.background_updates = enabled;
        self
    }

    /// Cache layout in use.
    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Resolves the Java runtime and server JAR for the host platform.
    ///
    /// ## Errors
    /// [`DepsError::UnsupportedPlatform`] before any IO on unknown hosts,
    /// [`DepsError::NoArtifact`] when the runtime or JAR cannot be obtained.
    pub async fn resolve(&self) -> Result<RuntimeDependencies, DepsError> {
        let platform = PlatformId::current()?;
        self.resolve_for(platform).await
    }

    /// Like [`Self::resolve`] for an explicit platform.
    ///
    /// ## Errors
    /// See [`Self::resolve`].
    pub async fn resolve_for(&self, platform: PlatformId) -> Result<RuntimeDependencies, DepsError> {
        let (java_path, java_home) = self.ensure_java(platform).await?;
        let jar = self.resolve_jar().await?;
        Ok(RuntimeDependencies {
            java_path,
            java_home,
            jar_path: jar.path,
            version: jar.version,
        })
    }

    /// Downloads and unpacks the Java runtime if missing.
    async fn ensure_java(&self, platform: PlatformId) -> Result<(PathBuf, PathBuf), DepsError> {
        let spec = platform.java_runtime();
        let java_dir = self.layout.java_dir();
        let java_path = spec.java_executable_in(&java_dir);
        let java_home = spec.java_home_in(&java_dir);

        if !java_path.exists() {
            info!(%platform, "downloading Java runtime");
            self.fetcher
                .fetch(spec.url, &java_dir, ArtifactKind::Zip)
                .await
                .map_err(|e| DepsError::NoArtifact(format!("Java runtime download failed: {e}")))?;
            if !platform.is_windows() {
                make_executable(&java_path)?;
            }
        }

        if !java_path.exists() {
            return Err(DepsError::NoArtifact(format!(
                "Java executable not found at {}",
                java_path.display()
            )));
        }
        Ok((java_path, java_home))
    }

    /// Settles the active server JAR and schedules an update check.
    ///
    /// ## Errors
    /// [`DepsError::NoArtifact`] if nothing is cached and nothing can be downloaded.
    pub async fn resolve_jar(&self) -> Result<ResolvedJar, DepsError> {
        let ledger = self.layout.ledger();
        self.sync_pin(&ledger);

        let jar = if let Some(path) = StageActivator::new(self.layout.clone()).activate() {
            let version =
                version_from_jar_name(file_name_str(&path)).or_else(|| ledger.read().current);
            ResolvedJar { path, version }
        } else if let Some(path) = self.existing_jar().await {
            info!(path = %path.display(), "using existing BSL Language Server JAR");
            let mut info = ledger.read();
            let version = match version_from_jar_name(file_name_str(&path)) {
                Some(version) => {
                    if info.current.is_none() {
                        info.current = Some(version.clone());
                        ledger.write(&info);
                    }
                    Some(version)
                }
                None => info.current,
            };
            ResolvedJar { path, version }
        } else {
            self.download_initial(&ledger).await?
        };

        self.schedule_update_check(&ledger, jar.version.clone());
        Ok(jar)
    }

    /// Purges partial downloads left by interrupted launches, then returns
    /// the cached JAR if there is one.
    async fn existing_jar(&self) -> Option<PathBuf> {
        let dir = self.layout.artifact_dir();
        if dir.is_dir() {
            match CacheLock::open(dir) {
                Ok(lock) => {
                    if let Some(_guard) = lock.try_lock() {
                        purge_partial_downloads(dir, Some(&own_temp_suffix())).await;
                    }
                }
                Err(e) => warn!(error = %e, "failed to open cache lock"),
            }
        }
        find_exec_jars(dir).into_iter().next()
    }

    fn sync_pin(&self, ledger: &VersionLedger) {
        let desired = self.pinned.as_deref().map(normalize_version);
        let mut info = ledger.read();
        if info.pinned != desired {
            debug!(from = ?info.pinned, to = ?desired, "updating pinned version");
            info.pinned = desired;
            ledger.write(&info);
        }
    }

    async fn download_initial(&self, ledger: &VersionLedger) -> Result<ResolvedJar, DepsError> {
        let release = self.target_release().await?;
        let dir = self.layout.artifact_dir();
        tokio::fs::create_dir_all(dir).await?;

        let target = dir.join(&release.asset_name);
        let temp = dir.join(format!("{}{}", release.asset_name, own_temp_suffix()));

        info!(version = %release.version, "downloading BSL Language Server");
        if let Err(e) = self
            .fetcher
            .fetch(&release.download_url, &temp, ArtifactKind::Binary)
            .await
        {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(DepsError::NoArtifact(format!(
                "download of {} failed: {e}",
                release.version
            )));
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            // A concurrent launch that finished first may have purged our temp file.
            let _ = tokio::fs::remove_file(&temp).await;
            let Some(path) = find_exec_jars(dir).into_iter().next() else {
                return Err(e.into());
            };
            warn!(error = %e, path = %path.display(), "using JAR installed by another launch");
            let version = version_from_jar_name(file_name_str(&path));
            return Ok(ResolvedJar { path, version });
        }

        let mut info = ledger.read();
        info.current = Some(release.version.clone());
        ledger.write(&info);

        Ok(ResolvedJar {
            path: target,
            version: Some(release.version),
        })
    }

    async fn target_release(&self) -> Result<ResolvedRelease, DepsError> {
        if let Some(pin) = self.pinned.as_deref() {
            match self.releases.for_version(pin).await {
                Ok(Some(release)) => return Ok(release),
                Ok(None) => warn!(pin, "pinned version not found, falling back to latest"),
                Err(e) => warn!(pin, error = %e, "failed to look up pinned version, falling back to latest"),
            }
        }

        self.releases
            .latest()
            .await
            .map_err(|e| DepsError::NoArtifact(e.to_string()))
    }

    fn schedule_update_check(&self, ledger: &VersionLedger, current: Option<String>) {
        if !self.background_updates {
            return;
        }
        let info = ledger.read();
        if !should_check_for_updates(&info, Utc::now()) {
            debug!(pinned = ?info.pinned, last_check = ?info.last_check, "skipping update check");
            return;
        }

        let stager = UpdateStager::new(
            self.layout.clone(),
            self.releases.clone(),
            Arc::clone(&self.fetcher),
        );
        debug!("spawning background update check");
        tokio::spawn(async move {
            stager.check_and_stage(current.as_deref()).await;
        });
    }
}

/// Suffix of this process's first-install temp files: `.<pid>.tmp`.
fn own_temp_suffix() -> String {
    format!(".{}.{TEMP_EXTENSION}", std::process::id())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), DepsError> {
    use std::os::unix::fs::PermissionsExt;

    if path.exists() {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), DepsError> {
    Ok(())
}
