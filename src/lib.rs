//! BSL Language Server launcher
//!
//! Keeps a self-updating local installation of
//! [BSL Language Server](https://github.com/1c-syntax/bsl-language-server)
//! and a Java runtime for it, then starts the server and drives the LSP
//! handshake.
//!
//! # Architecture
//!
//! ```text
//!                ┌────────────────────┐
//!                │ DependencyResolver │
//!                └─────────┬──────────┘
//!      ┌──────────────┬────┴─────────┬───────────────┐
//! ┌────▼─────┐ ┌──────▼───────┐ ┌────▼────┐ ┌────────▼─────┐
//! │ Activator│ │ReleaseResolver│ │ Fetcher │ │ UpdateStager │ (background)
//! └────┬─────┘ └──────────────┘ └─────────┘ └────────┬─────┘
//!      └─────────── VersionLedger + CacheLock ───────┘
//!                          │
//!                 ┌────────▼────────┐
//!                 │ LaunchSpec      │ java -Xmx.. -jar bsl-ls.jar
//!                 │ BslClient (LSP) │
//!                 └─────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`deps`] - Runtime dependency cache, versioning and updates
//! - [`lsp`] - Launch command and LSP client
//! - [`config`] - User settings
//! - [`error`] - Error types for the entire crate
//!
//! # Example
//!
//! ```ignore
//! use bsl_launcher::deps::{CacheLayout, DependencyResolver, HttpFetcher, ReleaseResolver};
//! use bsl_launcher::lsp::{BslClient, LaunchSpec};
//!
//! let client = reqwest::Client::new();
//! let resolver = DependencyResolver::new(
//!     CacheLayout::new(&cache_root),
//!     ReleaseResolver::github(client.clone()),
//!     Arc::new(HttpFetcher::new(client)),
//! )
//! .pinned_version(settings.pinned_version());
//!
//! let deps = resolver.resolve().await?;
//! let server = BslClient::builder(LaunchSpec::new(&deps, &settings, &workspace))
//!     .build()
//!     .await?;
//! ```

// Enforce documentation and other quality attributes
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are too strict
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod deps;
pub mod error;
pub mod lsp;

// Re-export commonly used types at the crate root
pub use error::{Error, Result};
