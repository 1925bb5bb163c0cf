//! Advisory cross-process lock over the shared cache directory.
//!
//! Every section that mutates the ledger together with the staging area runs
//! while holding a [`LockGuard`]. Acquisition never blocks: when another
//! process holds the lock the caller skips its work instead of waiting.
//!
//! The OS primitive is chosen at build time through [`PlatformLock`]; call
//! sites only ever see [`CacheLock`] and [`LockGuard`].

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::debug;

/// File name of the lock file inside the artifact directory.
pub const LOCK_FILENAME: &str = ".bsl-ls.lock";

/// A non-blocking, exclusive, whole-file locking primitive.
pub trait LockBackend {
    /// Attempts to take an exclusive lock on `file`.
    ///
    /// Returns `false` immediately if another handle already holds it.
    fn try_acquire(file: &File) -> bool;

    /// Releases a lock taken by [`Self::try_acquire`].
    ///
    /// Safe to call when the lock is not held.
    fn release(file: &File);
}

/// `flock(2)` based lock.
#[cfg(unix)]
#[derive(Debug)]
pub struct FlockBackend;

#[cfg(unix)]
impl LockBackend for FlockBackend {
    fn try_acquire(file: &File) -> bool {
        use std::os::unix::io::AsRawFd;

        // SAFETY: the descriptor is owned by `file`, which outlives the call.
        unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) == 0 }
    }

    fn release(file: &File) {
        use std::os::unix::io::AsRawFd;

        // SAFETY: as above; unlocking an unlocked descriptor is a no-op.
        unsafe {
            libc::flock(file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

/// `LockFileEx` based lock.
#[cfg(windows)]
#[derive(Debug)]
pub struct WindowsBackend;

#[cfg(windows)]
impl LockBackend for WindowsBackend {
    fn try_acquire(file: &File) -> bool {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::Storage::FileSystem::{
            LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx,
        };
        use windows_sys::Win32::System::IO::OVERLAPPED;

        // SAFETY: the handle is owned by `file`; OVERLAPPED is plain data.
        unsafe {
            let mut overlapped: OVERLAPPED = std::mem::zeroed();
            LockFileEx(
                file.as_raw_handle() as _,
                LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
                0,
                1,
                0,
                &raw mut overlapped,
            ) != 0
        }
    }

    fn release(file: &File) {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::Storage::FileSystem::UnlockFileEx;
        use windows_sys::Win32::System::IO::OVERLAPPED;

        // SAFETY: as above; failure to unlock an unlocked region is ignored.
        unsafe {
            let mut overlapped: OVERLAPPED = std::mem::zeroed();
            UnlockFileEx(file.as_raw_handle() as _, 0, 1, 0, &raw mut overlapped);
        }
    }
}

/// Lock primitive for the current target.
#[cfg(unix)]
pub type PlatformLock = FlockBackend;

/// Lock primitive for the current target.
#[cfg(windows)]
pub type PlatformLock = WindowsBackend;

/// Open handle to the lock file of one cache directory.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Opens (creating if needed) the lock file inside `dir`.
    ///
    /// ## Errors
    /// Returns an IO error if the directory or the lock file cannot be created.
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILENAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;
        Ok(Self { file, path })
    }

    /// Attempts to take the lock without blocking.
    ///
    /// Returns `None` if another process (or another handle) holds it.
    pub fn try_lock(&self) -> Option<LockGuard<'_>> {
        if PlatformLock::try_acquire(&self.file) {
            debug!(path = %self.path.display(), "acquired cache lock");
            Some(LockGuard { lock: self })
        } else {
            debug!(path = %self.path.display(), "cache lock is held elsewhere");
            None
        }
    }
}

/// Scoped lock ownership; the lock is released when the guard drops.
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a CacheLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        PlatformLock::release(&self.lock.file);
        debug!(path = %self.lock.path.display(), "released cache lock");
    }
}
