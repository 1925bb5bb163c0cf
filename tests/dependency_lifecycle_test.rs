//! Dependency cache behaviour across repeated launches.
//!
//! Each "launch" is a fresh [`DependencyResolver`] over the same cache
//! directory, the way separate processes would see it. Releases and downloads
//! are served by in-memory fakes.
//!
//! To run these tests:
//! ```bash
//! cargo test --test dependency_lifecycle_test
//! RUST_LOG=debug cargo test --test dependency_lifecycle_test -- --nocapture
//! ```
mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bsl_launcher::deps::{
    CacheLock, DependencyResolver, PlatformId, StageActivator, StageOutcome, UpdateStager,
    VersionInfo,
};
use bsl_launcher::error::DepsError;
use common::{FakeReleaseIndex, FileFetcher, JAR_SIZE, TestCache};
use serial_test::serial;

fn launch(cache: &TestCache, index: &FakeReleaseIndex, fetcher: &Arc<FileFetcher>) -> DependencyResolver {
    DependencyResolver::new(
        cache.layout.clone(),
        TestCache::releases(index),
        fetcher.clone(),
    )
    .background_updates(false)
}

fn stager(cache: &TestCache, index: &FakeReleaseIndex, fetcher: &Arc<FileFetcher>) -> UpdateStager {
    UpdateStager::new(cache.layout.clone(), TestCache::releases(index), fetcher.clone())
}

#[tokio::test]
async fn test_first_launch_installs_java_and_server() {
    let cache = TestCache::new();
    let java = PlatformId::LinuxX64.java_runtime();
    let index = FakeReleaseIndex::with_tags(&["v0.28.0", "v0.27.0"]);
    let fetcher = FileFetcher::new(&[java.java_executable]);

    let deps = launch(&cache, &index, &fetcher)
        .resolve_for(PlatformId::LinuxX64)
        .await
        .expect("first launch should succeed");

    assert_eq!(deps.java_path, java.java_executable_in(&cache.layout.java_dir()));
    assert_eq!(deps.java_home, java.java_home_in(&cache.layout.java_dir()));
    assert!(deps.java_path.is_file());
    assert_eq!(deps.jar_path, cache.active_jar_path("0.28.0"));
    assert_eq!(deps.version.as_deref(), Some("v0.28.0"));
    assert_eq!(
        std::fs::metadata(&deps.jar_path).unwrap().len(),
        JAR_SIZE as u64
    );
    assert_eq!(fetcher.calls()[0], java.url);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&deps.java_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    let info = cache.layout.ledger().read();
    assert_eq!(info.current.as_deref(), Some("v0.28.0"));
    assert_eq!(info.staged, None);
    assert_eq!(info.pinned, None);
}

#[tokio::test]
async fn test_second_launch_reuses_cache() {
    let cache = TestCache::new();
    let java = PlatformId::LinuxX64.java_runtime();
    let index = FakeReleaseIndex::with_tags(&["v0.28.0"]);
    let fetcher = FileFetcher::new(&[java.java_executable]);

    launch(&cache, &index, &fetcher)
        .resolve_for(PlatformId::LinuxX64)
        .await
        .unwrap();
    let downloads = fetcher.calls().len();

    index.set_offline(true);
    fetcher.offline.store(true, Ordering::SeqCst);
    let deps = launch(&cache, &index, &fetcher)
        .resolve_for(PlatformId::LinuxX64)
        .await
        .expect("cached dependencies should work offline");

    assert_eq!(deps.jar_path, cache.active_jar_path("0.28.0"));
    assert_eq!(fetcher.calls().len(), downloads);
}

#[tokio::test]
async fn test_staged_update_is_activated_on_next_launch() {
    let cache = TestCache::new();
    let index = FakeReleaseIndex::with_tags(&["v0.28.0"]);
    let fetcher = FileFetcher::new(&[]);

    let first = launch(&cache, &index, &fetcher).resolve_jar().await.unwrap();
    assert_eq!(first.version.as_deref(), Some("v0.28.0"));

    index.publish(&["v0.29.0", "v0.28.0"]);
    let outcome = stager(&cache, &index, &fetcher)
        .try_check_and_stage(first.version.as_deref())
        .await
        .unwrap();
    assert_eq!(outcome, StageOutcome::Staged("v0.29.0".into()));

    // The running session keeps its JAR until the next launch.
    assert!(first.path.exists());
    assert!(cache.staged_jar_path("0.29.0").exists());
    assert_eq!(cache.layout.ledger().read().staged.as_deref(), Some("v0.29.0"));

    let second = launch(&cache, &index, &fetcher).resolve_jar().await.unwrap();

    assert_eq!(second.path, cache.active_jar_path("0.29.0"));
    assert_eq!(cache.active_jars(), vec!["bsl-language-server-0.29.0-exec.jar"]);
    assert!(!cache.layout.staged_dir().exists());
    let info = cache.layout.ledger().read();
    assert_eq!(info.current.as_deref(), Some("v0.29.0"));
    assert_eq!(info.staged, None);
    assert!(info.last_check.is_some());
}

#[tokio::test]
async fn test_pinned_version_is_installed_instead_of_latest() {
    let cache = TestCache::new();
    let index = FakeReleaseIndex::with_tags(&["v0.28.0", "v0.27.0", "v0.26.0"]);
    let fetcher = FileFetcher::new(&[]);

    let jar = launch(&cache, &index, &fetcher)
        .pinned_version(Some("0.27.0"))
        .resolve_jar()
        .await
        .unwrap();

    assert_eq!(jar.path, cache.active_jar_path("0.27.0"));
    assert_eq!(
        fetcher.calls(),
        vec!["https://downloads.test/v0.27.0/bsl-language-server-0.27.0-exec.jar"]
    );
    let info = cache.layout.ledger().read();
    assert_eq!(info.pinned.as_deref(), Some("v0.27.0"));
    assert_eq!(info.current.as_deref(), Some("v0.27.0"));
}

#[tokio::test]
async fn test_old_pinned_version_past_first_listing_page() {
    let cache = TestCache::new();
    let tags: Vec<String> = (0..=140).rev().map(|minor| format!("v0.{minor}.0")).collect();
    let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
    let index = FakeReleaseIndex::with_tags(&tags);
    let fetcher = FileFetcher::new(&[]);

    let jar = launch(&cache, &index, &fetcher)
        .pinned_version(Some("0.20.0"))
        .resolve_jar()
        .await
        .unwrap();

    assert_eq!(jar.version.as_deref(), Some("v0.20.0"));
    assert_eq!(jar.path, cache.active_jar_path("0.20.0"));
    assert_eq!(
        fetcher.calls(),
        vec!["https://downloads.test/v0.20.0/bsl-language-server-0.20.0-exec.jar"]
    );
}

#[tokio::test]
async fn test_interrupted_first_install_is_cleaned_up() {
    let cache = TestCache::new();
    let index = FakeReleaseIndex::with_tags(&["v0.28.0"]);
    let fetcher = FileFetcher::new(&[]);
    std::fs::create_dir_all(cache.layout.artifact_dir()).unwrap();
    let remnant = cache
        .layout
        .artifact_dir()
        .join("bsl-language-server-0.28.0-exec.jar.99999.tmp");
    std::fs::write(&remnant, "partial").unwrap();

    launch(&cache, &index, &fetcher).resolve_jar().await.unwrap();
    launch(&cache, &index, &fetcher).resolve_jar().await.unwrap();

    assert!(!remnant.exists());
    assert_eq!(cache.active_jars(), vec!["bsl-language-server-0.28.0-exec.jar"]);
    assert_eq!(fetcher.calls().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_pinned_launch_never_checks_for_updates() {
    let cache = TestCache::new();
    cache.install_active("0.27.0");
    let index = FakeReleaseIndex::with_tags(&["v0.29.0"]);
    let fetcher = FileFetcher::new(&[]);

    launch(&cache, &index, &fetcher)
        .pinned_version(Some("v0.27.0"))
        .background_updates(true)
        .resolve_jar()
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(fetcher.calls().is_empty());
    assert!(!cache.layout.staged_dir().exists());
    assert_eq!(cache.layout.ledger().read().last_check, None);
}

#[tokio::test]
#[serial]
async fn test_background_check_stages_newer_release() {
    let cache = TestCache::new();
    cache.install_active("0.28.0");
    let index = FakeReleaseIndex::with_tags(&["v0.29.0", "v0.28.0"]);
    let fetcher = FileFetcher::new(&[]);

    let jar = launch(&cache, &index, &fetcher)
        .background_updates(true)
        .resolve_jar()
        .await
        .unwrap();
    assert_eq!(jar.path, cache.active_jar_path("0.28.0"));

    let staged = cache.staged_jar_path("0.29.0");
    let appeared = tokio::time::timeout(Duration::from_secs(5), async {
        while cache.layout.ledger().read().staged.is_none() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    assert!(appeared.is_ok(), "background check did not stage the update");
    assert!(staged.exists());
    assert!(jar.path.exists());
}

#[tokio::test]
async fn test_recent_check_is_not_repeated() {
    let cache = TestCache::new();
    cache.install_active("0.28.0");
    cache.layout.ledger().write(&VersionInfo {
        current: Some("v0.28.0".into()),
        last_check: Some(chrono::Utc::now().to_rfc3339()),
        ..Default::default()
    });
    let index = FakeReleaseIndex::with_tags(&["v0.29.0"]);
    let fetcher = FileFetcher::new(&[]);

    launch(&cache, &index, &fetcher)
        .background_updates(true)
        .resolve_jar()
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(fetcher.calls().is_empty());
    assert!(!cache.layout.staged_dir().exists());
}

#[tokio::test]
async fn test_offline_fresh_cache_fails() {
    let cache = TestCache::new();
    let index = FakeReleaseIndex::with_tags(&["v0.28.0"]);
    index.set_offline(true);
    let fetcher = FileFetcher::new(&[]);

    let err = launch(&cache, &index, &fetcher).resolve_jar().await.unwrap_err();

    assert!(matches!(err, DepsError::NoArtifact(_)), "unexpected error: {err}");
    assert!(cache.active_jars().is_empty());
}

#[tokio::test]
async fn test_failed_download_leaves_no_partial_jar() {
    let cache = TestCache::new();
    let index = FakeReleaseIndex::with_tags(&["v0.28.0"]);
    let fetcher = FileFetcher::new(&[]);
    fetcher.offline.store(true, Ordering::SeqCst);

    let err = launch(&cache, &index, &fetcher).resolve_jar().await.unwrap_err();

    assert!(matches!(err, DepsError::NoArtifact(_)));
    assert!(cache.active_jars().is_empty());
    let leftovers: Vec<_> = std::fs::read_dir(cache.layout.artifact_dir())
        .map(|entries| entries.filter_map(Result::ok).collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty(), "leftover files: {leftovers:?}");
}

#[tokio::test]
async fn test_update_check_offline_keeps_active_jar() {
    let cache = TestCache::new();
    let active = cache.install_active("0.28.0");
    let index = FakeReleaseIndex::with_tags(&["v0.29.0"]);
    index.set_offline(true);
    let fetcher = FileFetcher::new(&[]);

    stager(&cache, &index, &fetcher)
        .check_and_stage(Some("v0.28.0"))
        .await;

    assert!(active.exists());
    assert!(!cache.layout.staged_dir().exists());
    assert_eq!(cache.layout.ledger().read().staged, None);
}

#[tokio::test]
async fn test_lock_holder_blocks_staging_and_activation() {
    let cache = TestCache::new();
    cache.install_active("0.28.0");
    let index = FakeReleaseIndex::with_tags(&["v0.29.0"]);
    let fetcher = FileFetcher::new(&[]);

    let other_process = CacheLock::open(cache.layout.artifact_dir()).unwrap();
    let guard = other_process.try_lock().expect("lock should be free");

    let outcome = stager(&cache, &index, &fetcher)
        .try_check_and_stage(Some("v0.28.0"))
        .await
        .unwrap();
    assert_eq!(outcome, StageOutcome::LockBusy);
    assert!(fetcher.calls().is_empty());

    drop(guard);
    let outcome = stager(&cache, &index, &fetcher)
        .try_check_and_stage(Some("v0.28.0"))
        .await
        .unwrap();
    assert_eq!(outcome, StageOutcome::Staged("v0.29.0".into()));

    let guard = other_process.try_lock().unwrap();
    assert_eq!(StageActivator::new(cache.layout.clone()).activate(), None);
    assert!(cache.staged_jar_path("0.29.0").exists());
    drop(guard);

    assert_eq!(
        StageActivator::new(cache.layout.clone()).activate(),
        Some(cache.active_jar_path("0.29.0"))
    );
}

#[tokio::test]
async fn test_corrupt_ledger_does_not_block_launch() {
    let cache = TestCache::new();
    cache.install_active("0.28.0");
    std::fs::create_dir_all(cache.layout.deps_dir()).unwrap();
    std::fs::write(cache.layout.ledger().path(), "{ not json").unwrap();
    let index = FakeReleaseIndex::with_tags(&["v0.28.0"]);
    let fetcher = FileFetcher::new(&[]);

    let jar = launch(&cache, &index, &fetcher).resolve_jar().await.unwrap();

    assert_eq!(jar.path, cache.active_jar_path("0.28.0"));
    assert_eq!(cache.layout.ledger().read().current.as_deref(), Some("v0.28.0"));
}
