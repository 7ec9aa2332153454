//! Library interface for the Nerd Fonts installer (nfi)
//!
//! Catalog loading, release resolution, archive handling and font
//! installation are exposed here for the binary and for testing.

pub mod api;
pub mod asset;
pub mod cache;
pub mod catalog;
pub mod colors;
pub mod commands;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod formats;
pub mod install;
pub mod locate;
pub mod pipeline;
pub mod platform;
pub mod registry;
pub mod retry;

// Re-export commonly used types
pub use api::FontsApi;
pub use catalog::FontCatalogEntry;
pub use config::{Config, InstallOptions};
pub use error::{FontError, Result};
pub use pipeline::{FontInstaller, RunSummary, StagingRoot};
