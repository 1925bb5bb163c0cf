//! Error types for bsl-launcher.
//!
//! This module defines all error types used throughout the crate,
//! organized by subsystem: runtime dependencies, LSP, and configuration.
//!
//! Only two dependency conditions are meant to stop server startup:
//! [`DepsError::NoArtifact`] and [`DepsError::UnsupportedPlatform`]. The
//! rest are absorbed close to where they happen and only logged.

use std::path::PathBuf;

use thiserror::Error;

/// Errors related to runtime dependency management.
#[derive(Debug, Error)]
pub enum DepsError {
    /// The host OS/architecture has no Java runtime download.
    #[error("platform {0} is not supported for BSL Language Server")]
    UnsupportedPlatform(String),

    /// A release was found but carries no usable executable asset.
    #[error("release resolution failed: {0}")]
    Resolution(String),

    /// The release index or a download could not be reached or parsed.
    #[error("network error: {0}")]
    Network(String),

    /// No artifact is cached and none could be resolved remotely.
    #[error("no BSL Language Server artifact could be resolved: {0}")]
    NoArtifact(String),

    /// A downloaded artifact failed the plausibility check.
    #[error("downloaded artifact {path} is too small ({size} bytes)")]
    InvalidArtifact {
        /// Path of the rejected file.
        path: PathBuf,
        /// Size that was observed on disk.
        size: u64,
    },

    /// Archive extraction failed.
    #[error("archive error: {0}")]
    Archive(String),

    /// Filesystem error while preparing dependencies.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for DepsError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Errors related to LSP client operations.
#[derive(Debug, Error)]
pub enum LspError {
    /// The language server process failed to start.
    #[error("failed to start language server: {0}")]
    ServerStartFailed(String),

    /// Failed to initialize the language server.
    #[error("language server initialization failed: {0}")]
    InitializationFailed(String),

    /// A request to the language server timed out.
    #[error("language server request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Failed to send a request to the language server.
    #[error("failed to send request to language server: {0}")]
    RequestFailed(String),

    /// Document not found or not open.
    #[error("document not found: {0}")]
    DocumentNotFound(String),
}

/// Errors related to settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Read {
        /// Settings file path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The settings file is not valid JSON for [`crate::config::BslSettings`].
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        /// Settings file path.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// No cache directory was given and none could be derived.
    #[error("could not determine a cache directory")]
    NoCacheDir,
}

/// A unified error type for the entire crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Dependency-related error.
    #[error("dependency error: {0}")]
    Deps(#[from] DepsError),

    /// LSP-related error.
    #[error("LSP error: {0}")]
    Lsp(#[from] LspError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Generic IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for bsl-launcher operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsp_error_display() {
        let err = LspError::ServerStartFailed("java not found".to_string());
        assert_eq!(
            err.to_string(),
            "failed to start language server: java not found"
        );
    }

    #[test]
    fn test_error_conversion() {
        let deps_err = DepsError::NoArtifact("offline".to_string());
        let err: Error = deps_err.into();
        assert!(matches!(err, Error::Deps(DepsError::NoArtifact(_))));
    }

    #[test]
    fn test_unsupported_platform_display() {
        let err = DepsError::UnsupportedPlatform("freebsd-x64".to_string());
        assert_eq!(
            err.to_string(),
            "platform freebsd-x64 is not supported for BSL Language Server"
        );
    }
}
