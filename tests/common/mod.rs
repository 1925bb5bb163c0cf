//! Common test helpers: an in-memory release index, a file-writing fetcher
//! and a throwaway cache directory.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bsl_launcher::deps::fetch::extract_zip;
use bsl_launcher::deps::release::{GithubRelease, GithubReleaseAsset, ReleaseIndex};
use bsl_launcher::deps::{ArtifactFetcher, ArtifactKind, CacheLayout, ReleaseResolver};
use bsl_launcher::error::DepsError;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Size written for JAR downloads; above the stager's plausibility floor.
pub const JAR_SIZE: usize = 2 * 1024 * 1024;

/// Helper to get the fixture project path
pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/bsl_project")
}

/// Builds a release with the usual assets: a zip, the executable JAR and a checksum file.
pub fn release(tag: &str) -> GithubRelease {
    let version = tag.trim_start_matches('v');
    let asset = |name: String| GithubReleaseAsset {
        browser_download_url: format!("https://downloads.test/{tag}/{name}"),
        name,
    };
    GithubRelease {
        tag_name: tag.to_string(),
        assets: vec![
            asset(format!("bsl-language-server-{version}.zip")),
            asset(format!("bsl-language-server-{version}-exec.jar")),
            asset("checksums.txt".to_string()),
        ],
    }
}

/// Release listing that can be changed or taken offline mid-test. Clones
/// share state.
#[derive(Clone, Default)]
pub struct FakeReleaseIndex {
    releases: Arc<Mutex<Vec<GithubRelease>>>,
    offline: Arc<AtomicBool>,
}

impl FakeReleaseIndex {
    /// Index publishing `tags`, newest first.
    pub fn with_tags(tags: &[&str]) -> Self {
        let index = Self::default();
        index.publish(tags);
        index
    }

    /// Replaces the published releases.
    pub fn publish(&self, tags: &[&str]) {
        *self.releases.lock().unwrap() = tags.iter().map(|tag| release(tag)).collect();
    }

    /// Makes every query fail with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), DepsError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DepsError::Network("api.github.com unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReleaseIndex for FakeReleaseIndex {
    async fn latest_release(&self) -> Result<GithubRelease, DepsError> {
        self.check_online()?;
        self.releases
            .lock()
            .unwrap()
            .first()
            .cloned()
            .ok_or_else(|| DepsError::Network("404 Not Found".into()))
    }

    async fn release_page(&self, page: u32, per_page: usize) -> Result<Vec<GithubRelease>, DepsError> {
        self.check_online()?;
        let start = (page as usize - 1) * per_page;
        Ok(self
            .releases
            .lock()
            .unwrap()
            .iter()
            .skip(start)
            .take(per_page)
            .cloned()
            .collect())
    }
}

/// Fetcher that writes `jar_size` bytes for binaries and extracts a zip
/// containing `archive_entries` for archives.
pub struct FileFetcher {
    pub jar_size: usize,
    pub archive_entries: Vec<String>,
    pub offline: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl FileFetcher {
    pub fn new(archive_entries: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            jar_size: JAR_SIZE,
            archive_entries: archive_entries.iter().map(ToString::to_string).collect(),
            offline: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn archive(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            for entry in &self.archive_entries {
                writer.start_file(entry.as_str(), SimpleFileOptions::default()).unwrap();
                writer.write_all(b"#!/bin/sh\n").unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }
}

#[async_trait]
impl ArtifactFetcher for FileFetcher {
    async fn fetch(&self, url: &str, dest: &Path, kind: ArtifactKind) -> Result<(), DepsError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.offline.load(Ordering::SeqCst) {
            return Err(DepsError::Network(format!("failed to download {url}")));
        }
        match kind {
            ArtifactKind::Binary => {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(dest, vec![0u8; self.jar_size])?;
                Ok(())
            }
            ArtifactKind::Zip => extract_zip(&self.archive(), dest),
        }
    }
}

/// A temporary cache root with helpers to inspect it.
pub struct TestCache {
    pub root: TempDir,
    pub layout: CacheLayout,
}

impl TestCache {
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temp dir");
        let layout = CacheLayout::new(root.path());
        Self { root, layout }
    }

    /// Release resolver over `index`.
    pub fn releases(index: &FakeReleaseIndex) -> ReleaseResolver {
        ReleaseResolver::new(index.clone())
    }

    /// Puts a JAR into the active slot.
    pub fn install_active(&self, version: &str) -> PathBuf {
        let path = self.active_jar_path(version);
        std::fs::create_dir_all(self.layout.artifact_dir()).unwrap();
        std::fs::write(&path, format!("active {version}")).unwrap();
        path
    }

    pub fn active_jar_path(&self, version: &str) -> PathBuf {
        self.layout
            .artifact_dir()
            .join(format!("bsl-language-server-{version}-exec.jar"))
    }

    pub fn staged_jar_path(&self, version: &str) -> PathBuf {
        self.layout
            .staged_dir()
            .join(format!("bsl-language-server-{version}-exec.jar"))
    }

    /// File names of the JARs in the active slot.
    pub fn active_jars(&self) -> Vec<String> {
        bsl_launcher::deps::find_exec_jars(self.layout.artifact_dir())
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .collect()
    }
}
