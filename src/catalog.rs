//! Font catalog: the list of installable font products.
//!
//! The catalog is the Nerd Fonts `fonts.json` list, decorated with the
//! release endpoint it is published under, plus a handful of built-in entries
//! for the Microsoft Cascadia family (which ships from its own repository).
//! The merged list is sorted by short name and cached on disk for
//! [`CATALOG_CACHE_TTL`](crate::config::CATALOG_CACHE_TTL).
//!
//! # Examples
//!
//! ```no_run
//! use nerdfont_installer::{Config, FontsApi, catalog};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let api = FontsApi::new(&config)?;
//!     let fonts = catalog::load_catalog(&api, &config).await?;
//!     println!("{} fonts available", fonts.len());
//!     Ok(())
//! }
//! ```

use crate::api::FontsApi;
use crate::config::Config;
use crate::error::{FontError, Result};
use crate::cache;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Where an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    /// Nerd Fonts catalog; one release ships every font as `<folderName>.<ext>`.
    #[default]
    Remote,
    /// Built into this tool; the font has its own upstream repository.
    Builtin,
}

/// One installable font product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontCatalogEntry {
    pub unpatched_name: String,
    #[serde(default)]
    pub license_id: String,
    #[serde(rename = "RFN", default)]
    pub rfn: bool,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub patched_name: String,
    pub folder_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub image_preview_font: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub link_preview_font: Option<String>,
    pub cask_name: String,
    #[serde(default)]
    pub repo_release: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub release_url: String,
    #[serde(default)]
    pub source: EntrySource,
}

impl FontCatalogEntry {
    /// Name shown to users.
    pub fn display_name(&self) -> &str {
        if self.patched_name.is_empty() {
            &self.unpatched_name
        } else {
            &self.patched_name
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.source == EntrySource::Builtin
    }
}

/// Accept strings, numbers and booleans; `false`, `null` and `""` mean absent.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(true) => Some("true".to_string()),
        _ => None,
    })
}

/// Remote `fonts.json` is either `{"fonts": [...]}` or a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum CatalogDocument {
    Wrapped { fonts: Vec<FontCatalogEntry> },
    Bare(Vec<FontCatalogEntry>),
}

impl CatalogDocument {
    pub(crate) fn into_entries(self) -> Vec<FontCatalogEntry> {
        match self {
            CatalogDocument::Wrapped { fonts } => fonts,
            CatalogDocument::Bare(fonts) => fonts,
        }
    }
}

const CASCADIA_RELEASES: &str = "https://api.github.com/repos/microsoft/cascadia-code/releases";
const CASCADIA_VERSION: &str = "2407.24";

/// Assets are named after the version, so the release is pinned to its tag.
fn cascadia_release_url() -> String {
    format!("{}/tags/v{}", CASCADIA_RELEASES, CASCADIA_VERSION)
}

fn cascadia(name: &str, cask: &str, description: &str) -> FontCatalogEntry {
    FontCatalogEntry {
        unpatched_name: name.to_string(),
        license_id: "OFL-1.1-RFN".to_string(),
        rfn: true,
        version: CASCADIA_VERSION.to_string(),
        patched_name: name.to_string(),
        folder_name: format!("CascadiaCode-{}", CASCADIA_VERSION),
        image_preview_font: Some(name.to_string()),
        link_preview_font: None,
        cask_name: cask.to_string(),
        repo_release: true,
        description: description.to_string(),
        release_url: cascadia_release_url(),
        source: EntrySource::Builtin,
    }
}

/// Fonts not present in the Nerd Fonts catalog.
pub fn static_entries() -> Vec<FontCatalogEntry> {
    vec![
        cascadia(
            "Cascadia Code",
            "cascadia-code",
            "The official Cascadia Code font by Microsoft with programming ligatures",
        ),
        cascadia(
            "Cascadia Mono",
            "cascadia-mono",
            "The official Cascadia Mono font by Microsoft without programming ligatures",
        ),
    ]
}

/// Decorate remote entries with their release URL, append the built-in
/// entries and sort by short name. The first entry wins on duplicate names.
pub fn merge_catalog(remote: Vec<FontCatalogEntry>, release_url: &str) -> Vec<FontCatalogEntry> {
    let mut merged: Vec<FontCatalogEntry> = remote
        .into_iter()
        .map(|mut entry| {
            entry.release_url = release_url.to_string();
            entry.source = EntrySource::Remote;
            entry
        })
        .chain(static_entries())
        .collect();

    let mut seen = HashSet::new();
    merged.retain(|entry| seen.insert(entry.cask_name.clone()));
    merged.sort_by(|a, b| a.cask_name.cmp(&b.cask_name));
    merged
}

/// Load the catalog from the disk cache, or fetch and rebuild it.
pub async fn load_catalog(api: &FontsApi, config: &Config) -> Result<Vec<FontCatalogEntry>> {
    let cache_path = config.catalog_cache_file();

    // Try cache first
    if let Some(cached) = cache::get_cached_catalog(&cache_path, config.cache_ttl) {
        debug!("Using cached catalog from {}", cache_path.display());
        return Ok(cached);
    }

    let remote = api.fetch_catalog(&config.catalog_url).await?;
    let catalog = merge_catalog(remote, &config.release_url);

    if let Err(e) = cache::store_catalog(&cache_path, &catalog) {
        debug!("Failed to write catalog cache {}: {}", cache_path.display(), e);
    }

    Ok(catalog)
}

/// Resolve requested short names against the catalog.
///
/// Names are matched case-insensitively. Unknown names fail with the closest
/// known short name as a suggestion.
pub fn select_entries<'a>(
    catalog: &'a [FontCatalogEntry],
    names: &[String],
    all: bool,
) -> Result<Vec<&'a FontCatalogEntry>> {
    if all {
        return if catalog.is_empty() {
            Err(FontError::NoFontsSelected)
        } else {
            Ok(catalog.iter().collect())
        };
    }

    let mut selected: Vec<&FontCatalogEntry> = Vec::new();
    for name in names {
        let wanted = name.to_lowercase();
        let entry = catalog
            .iter()
            .find(|e| e.cask_name.eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| FontError::UnknownFont {
                name: name.clone(),
                suggestion: suggest(catalog, &wanted),
            })?;

        if !selected.iter().any(|e| e.cask_name == entry.cask_name) {
            selected.push(entry);
        }
    }

    if selected.is_empty() {
        return Err(FontError::NoFontsSelected);
    }

    selected.sort_by(|a, b| a.cask_name.cmp(&b.cask_name));
    Ok(selected)
}

fn suggest(catalog: &[FontCatalogEntry], name: &str) -> Option<String> {
    catalog
        .iter()
        .map(|e| (strsim::jaro_winkler(name, &e.cask_name), &e.cask_name))
        .filter(|(score, _)| *score >= 0.8)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, cask)| cask.clone())
}

/// Entries whose names or description contain `filter` (case-insensitive).
pub fn filter_catalog<'a>(
    catalog: &'a [FontCatalogEntry],
    filter: Option<&str>,
) -> Vec<&'a FontCatalogEntry> {
    let Some(filter) = filter.map(str::to_lowercase) else {
        return catalog.iter().collect();
    };

    catalog
        .iter()
        .filter(|e| {
            e.cask_name.to_lowercase().contains(&filter)
                || e.unpatched_name.to_lowercase().contains(&filter)
                || e.patched_name.to_lowercase().contains(&filter)
                || e.description.to_lowercase().contains(&filter)
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn test_entry(cask: &str, folder: &str) -> FontCatalogEntry {
    FontCatalogEntry {
        unpatched_name: folder.to_string(),
        license_id: "MIT".to_string(),
        rfn: false,
        version: "1.0".to_string(),
        patched_name: format!("{} Nerd Font", folder),
        folder_name: folder.to_string(),
        image_preview_font: None,
        link_preview_font: None,
        cask_name: cask.to_string(),
        repo_release: false,
        description: String::new(),
        release_url: String::new(),
        source: EntrySource::Remote,
    }
}
