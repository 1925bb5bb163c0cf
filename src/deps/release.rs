//! Release lookup against the GitHub releases API.
//!
//! [`ReleaseResolver`] turns a release listing into the download URL of the
//! server's executable JAR. The listing itself comes from a [`ReleaseIndex`],
//! which is GitHub in production and an in-memory list in tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::DepsError;

use super::version::{is_exec_jar, normalize_version};

const GITHUB_API_URL: &str = "https://api.github.com";

/// Repository publishing BSL Language Server releases.
pub const BSL_LS_REPO: &str = "1c-syntax/bsl-language-server";

/// Upper bound for a single release index query.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Releases requested per listing page; the GitHub API maximum.
pub const RELEASES_PER_PAGE: usize = 100;

/// Stop walking the listing after this many pages.
pub const MAX_RELEASE_PAGES: u32 = 50;

/// A published release.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GithubRelease {
    /// Release tag, e.g. `v0.28.0`.
    pub tag_name: String,
    /// Downloadable files attached to the release.
    #[serde(default)]
    pub assets: Vec<GithubReleaseAsset>,
}

/// A downloadable file attached to a release.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GithubReleaseAsset {
    /// File name of the asset.
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: String,
}

impl GithubRelease {
    /// Returns the single executable JAR asset, if the release has one.
    pub fn exec_jar(&self) -> Option<&GithubReleaseAsset> {
        self.assets.iter().find(|asset| is_exec_jar(&asset.name))
    }
}

/// Download coordinates for one artifact version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelease {
    /// URL of the executable JAR.
    pub download_url: String,
    /// Release tag.
    pub version: String,
    /// File name of the asset; used as the on-disk name.
    pub asset_name: String,
}

impl ResolvedRelease {
    fn from_release(release: &GithubRelease) -> Option<Self> {
        release.exec_jar().map(|asset| Self {
            download_url: asset.browser_download_url.clone(),
            version: release.tag_name.clone(),
            asset_name: asset.name.clone(),
        })
    }
}

/// Source of release listings.
#[async_trait]
pub trait ReleaseIndex: Send + Sync {
    /// Returns the newest published release.
    async fn latest_release(&self) -> Result<GithubRelease, DepsError>;

    /// Returns one page of the release listing, newest first.
    ///
    /// Pages are numbered from 1. A page shorter than `per_page` is the last.
    async fn release_page(&self, page: u32, per_page: usize) -> Result<Vec<GithubRelease>, DepsError>;

    /// Returns all published releases, newest first.
    async fn all_releases(&self) -> Result<Vec<GithubRelease>, DepsError> {
        let mut releases = Vec::new();
        for page in 1..=MAX_RELEASE_PAGES {
            let batch = self.release_page(page, RELEASES_PER_PAGE).await?;
            let last = batch.len() < RELEASES_PER_PAGE;
            releases.extend(batch);
            if last {
                break;
            }
        }
        Ok(releases)
    }
}

/// [`ReleaseIndex`] backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubReleaseIndex {
    client: reqwest::Client,
    repo: String,
}

impl GithubReleaseIndex {
    /// Creates an index for `repo` (`owner/name`).
    pub fn new(client: reqwest::Client, repo: impl Into<String>) -> Self {
        Self {
            client,
            repo: repo.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, DepsError> {
        let mut request = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", concat!("bsl-launcher/", env!("CARGO_PKG_VERSION")));

        // Use GITHUB_TOKEN if available (avoids rate limiting)
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DepsError::Network(format!(
                "GitHub API error for '{}': {status}",
                self.repo
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DepsError::Network(format!("failed to parse GitHub response: {e}")))
    }
}

#[async_trait]
impl ReleaseIndex for GithubReleaseIndex {
    async fn latest_release(&self) -> Result<GithubRelease, DepsError> {
        debug!(repo = %self.repo, "fetching latest release");
        self.get_json(&format!("{GITHUB_API_URL}/repos/{}/releases/latest", self.repo))
            .await
    }

    async fn release_page(&self, page: u32, per_page: usize) -> Result<Vec<GithubRelease>, DepsError> {
        debug!(repo = %self.repo, page, "fetching release list page");
        let releases: Vec<GithubRelease> = self
            .get_json(&format!(
                "{GITHUB_API_URL}/repos/{}/releases?per_page={per_page}&page={page}",
                self.repo
            ))
            .await?;
        debug!(repo = %self.repo, page, count = releases.len(), "fetched releases");
        Ok(releases)
    }
}

/// Resolves download URLs for the server JAR.
///
/// Cheap to clone; clones share the underlying index.
#[derive(Clone)]
pub struct ReleaseResolver {
    index: Arc<dyn ReleaseIndex>,
}

impl ReleaseResolver {
    /// Creates a resolver over `index`.
    pub fn new(index: impl ReleaseIndex + 'static) -> Self {
        Self {
            index: Arc::new(index),
        }
    }

    /// Creates a resolver querying GitHub for [`BSL_LS_REPO`].
    pub fn github(client: reqwest::Client) -> Self {
        Self::new(GithubReleaseIndex::new(client, BSL_LS_REPO))
    }

    /// Resolves the newest release.
    ///
    /// ## Errors
    /// [`DepsError::Network`] if the index cannot be queried,
    /// [`DepsError::Resolution`] if the release has no executable JAR.
    pub async fn latest(&self) -> Result<ResolvedRelease, DepsError> {
        let release = self.index.latest_release().await?;
        let resolved = ResolvedRelease::from_release(&release).ok_or_else(|| {
            DepsError::Resolution(format!(
                "release {} has no executable JAR asset",
                release.tag_name
            ))
        })?;
        info!(version = %resolved.version, asset = %resolved.asset_name, "found latest BSL Language Server release");
        Ok(resolved)
    }

    /// Resolves a specific version, accepting both `0.28.0` and `v0.28.0`.
    ///
    /// Returns `Ok(None)` if the version or its JAR is not published.
    ///
    /// ## Errors
    /// [`DepsError::Network`] if the index cannot be queried.
    pub async fn for_version(&self, requested: &str) -> Result<Option<ResolvedRelease>, DepsError> {
        for page in 1..=MAX_RELEASE_PAGES {
            let releases = self.index.release_page(page, RELEASES_PER_PAGE).await?;
            if let Some(release) = select_release(&releases, requested) {
                let resolved = ResolvedRelease::from_release(release);
                match &resolved {
                    Some(r) => info!(version = %r.version, page, "found pinned BSL Language Server release"),
                    None => debug!(requested, "pinned release has no executable JAR"),
                }
                return Ok(resolved);
            }
            if releases.len() < RELEASES_PER_PAGE {
                break;
            }
        }
        debug!(requested, "pinned release not found");
        Ok(None)
    }
}

/// Finds the release whose tag equals `requested` or its `v`-prefixed form.
pub fn select_release<'a>(releases: &'a [GithubRelease], requested: &str) -> Option<&'a GithubRelease> {
    let normalized = normalize_version(requested);
    releases
        .iter()
        .find(|r| r.tag_name == requested || r.tag_name == normalized)
}
