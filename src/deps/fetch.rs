//! Downloading and unpacking of runtime artifacts.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::DepsError;

/// Upper bound for a complete artifact download.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// How a downloaded payload is placed at its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A zip archive extracted into the destination directory.
    Zip,
    /// A single file written verbatim to the destination path.
    Binary,
}

/// Capability to download an artifact to a local path.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Downloads `url` to `dest`.
    ///
    /// For [`ArtifactKind::Zip`] `dest` is a directory; for
    /// [`ArtifactKind::Binary`] it is the target file path.
    async fn fetch(&self, url: &str, dest: &Path, kind: ArtifactKind) -> Result<(), DepsError>;
}

/// [`ArtifactFetcher`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher sharing `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DepsError> {
        let response = self
            .client
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .header("User-Agent", concat!("bsl-launcher/", env!("CARGO_PKG_VERSION")))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DepsError::Network(format!(
                "download of {url} failed: {}",
                response.status()
            )));
        }
        Ok(response)
    }

    async fn fetch_binary(&self, url: &str, dest: &Path) -> Result<(), DepsError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut response = self.get(url).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(url, dest = %dest.display(), bytes = written, "download complete");
        Ok(())
    }

    async fn fetch_zip(&self, url: &str, dest: &Path) -> Result<(), DepsError> {
        let bytes = self.get(url).await?.bytes().await?;
        tokio::fs::create_dir_all(dest).await?;

        let dest: PathBuf = dest.to_path_buf();
        tokio::task::spawn_blocking(move || extract_zip(&bytes, &dest))
            .await
            .map_err(|e| DepsError::Archive(format!("extraction task failed: {e}")))?
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path, kind: ArtifactKind) -> Result<(), DepsError> {
        info!(url, dest = %dest.display(), ?kind, "downloading artifact");
        match kind {
            ArtifactKind::Binary => self.fetch_binary(url, dest).await,
            ArtifactKind::Zip => self.fetch_zip(url, dest).await,
        }
    }
}

/// Extracts a zip archive held in memory into `dest`.
///
/// ## Errors
/// Returns [`DepsError::Archive`] if the archive is invalid or cannot be written.
pub fn extract_zip(bytes: &[u8], dest: &Path) -> Result<(), DepsError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DepsError::Archive(format!("failed to open zip archive: {e}")))?;
    archive
        .extract(dest)
        .map_err(|e| DepsError::Archive(format!("failed to extract zip archive: {e}")))
}
