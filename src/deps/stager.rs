//! Background download of newer releases into the staging area.
//!
//! Staging never touches the active JAR. A staged JAR only becomes active on
//! a later launch through [`super::StageActivator`], so a slow or broken
//! download cannot disturb a session that is already running.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::DepsError;

use super::fetch::{ArtifactFetcher, ArtifactKind};
use super::lock::CacheLock;
use super::release::ReleaseResolver;
use super::version::normalize_version;
use super::{CacheLayout, TEMP_EXTENSION, find_exec_jars, purge_partial_downloads};

/// Smallest JAR size accepted as a complete download.
///
/// Real server JARs are tens of megabytes; anything below this is an error
/// page or a truncated transfer.
pub const MIN_JAR_SIZE_BYTES: u64 = 1024 * 1024;

/// Result of one staging attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The active version is already the newest.
    UpToDate,
    /// The newest version is already staged.
    AlreadyStaged(String),
    /// A new version was downloaded and recorded as staged.
    Staged(String),
    /// The download failed the size check and was discarded.
    Rejected,
    /// Another process holds the cache lock.
    LockBusy,
}

/// Checks for newer releases and stages them for the next launch.
#[derive(Clone)]
pub struct UpdateStager {
    layout: CacheLayout,
    releases: ReleaseResolver,
    fetcher: Arc<dyn ArtifactFetcher>,
    min_size: u64,
}

impl UpdateStager {
    /// Creates a stager for `layout`.
    pub fn new(
        layout: CacheLayout,
        releases: ReleaseResolver,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Self {
        Self {
            layout,
            releases,
            fetcher,
            min_size: MIN_JAR_SIZE_BYTES,
        }
    }

    /// Overrides the minimum accepted JAR size.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    /// Stages the newest release if it differs from `current`.
    ///
    /// Every failure is logged and swallowed.
    pub async fn check_and_stage(&self, current: Option<&str>) {
        match self.try_check_and_stage(current).await {
            Ok(outcome) => debug!(?outcome, "update check finished"),
            Err(e) => warn!(error = %e, "background update check failed"),
        }
    }

    /// Fallible body of [`Self::check_and_stage`].
    ///
    /// ## Errors
    /// Returns network, resolution and IO errors encountered while staging.
    pub async fn try_check_and_stage(&self, current: Option<&str>) -> Result<StageOutcome, DepsError> {
        let latest = self.releases.latest().await?;
        let latest_version = normalize_version(&latest.version);
        let ledger = self.layout.ledger();

        if current.map(normalize_version).as_deref() == Some(latest_version.as_str()) {
            let mut info = ledger.read();
            info.last_check = Some(Utc::now().to_rfc3339());
            ledger.write(&info);
            debug!(version = %latest_version, "BSL Language Server is up to date");
            return Ok(StageOutcome::UpToDate);
        }

        let lock = CacheLock::open(self.layout.artifact_dir())?;
        let Some(_guard) = lock.try_lock() else {
            debug!("cache is locked by another process, skipping update staging");
            return Ok(StageOutcome::LockBusy);
        };

        let mut info = ledger.read();
        info.last_check = Some(Utc::now().to_rfc3339());
        ledger.write(&info);

        let staged_dir = self.layout.staged_dir();
        tokio::fs::create_dir_all(&staged_dir).await?;
        purge_partial_downloads(&staged_dir, None).await;

        let final_path = staged_dir.join(&latest.asset_name);
        if info.staged.as_deref().map(normalize_version).as_deref() == Some(latest_version.as_str())
            && final_path.is_file()
        {
            debug!(version = %latest_version, "newest release is already staged");
            return Ok(StageOutcome::AlreadyStaged(latest.version));
        }

        info!(from = ?current, to = %latest.version, "staging BSL Language Server update");
        let temp_path = staged_dir.join(format!("{}.{TEMP_EXTENSION}", latest.asset_name));
        if let Err(e) = self
            .fetcher
            .fetch(&latest.download_url, &temp_path, ArtifactKind::Binary)
            .await
        {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }

        let size = tokio::fs::metadata(&temp_path).await?.len();
        if size <= self.min_size {
            let rejected = DepsError::InvalidArtifact {
                path: temp_path.clone(),
                size,
            };
            warn!(error = %rejected, min = self.min_size, "discarding staged download");
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Ok(StageOutcome::Rejected);
        }

        // At most one staged artifact.
        for old in find_exec_jars(&staged_dir) {
            tokio::fs::remove_file(&old).await?;
        }
        tokio::fs::rename(&temp_path, &final_path).await?;

        // Reread: other launches may have written the ledger during the download.
        let mut info = ledger.read();
        info.staged = Some(latest.version.clone());
        ledger.write(&info);

        info!(version = %latest.version, path = %final_path.display(), "staged BSL Language Server update for next launch");
        Ok(StageOutcome::Staged(latest.version))
    }
}
