//! Process adapter for BSL Language Server.
//!
//! - [`launch`] turns resolved runtime dependencies and user settings into a
//!   `java ... -jar` command line.
//! - [`client`] spawns that command and drives the LSP session over stdio.
//! - [`types`] holds path and symbol conversions.

pub mod client;
pub mod launch;
pub mod types;

use crate::error::LspError;

pub use client::{BslClient, BslClientBuilder};
pub use launch::LaunchSpec;

/// Result type for LSP operations.
pub type LspResult<T> = std::result::Result<T, LspError>;
