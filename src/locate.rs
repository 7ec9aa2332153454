//! Find the font files to install inside an extracted archive.
//!
//! Archives come in many layouts: flat (`Hack.zip`), split by type
//! (`ttf/`, `otf/`, `woff2/`), and with static cuts next to the variable
//! fonts (`ttf/static/`, `static/`). The search root is narrowed by variant
//! and type first, then the first type that has any files wins.

use crate::catalog::FontCatalogEntry;
use crate::config::{FontType, Variant};
use crate::error::{FontError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const STATIC_DIR: &str = "static";

fn subdir(dir: &Path, name: &str) -> Option<PathBuf> {
    let candidate = dir.join(name);
    candidate.is_dir().then_some(candidate)
}

/// Narrow `extract_root` to the directory holding the wanted files.
pub fn search_root(extract_root: &Path, variant: Variant, types: &[FontType]) -> PathBuf {
    let want_static = variant == Variant::Static;
    let mut root = extract_root.to_path_buf();

    if want_static {
        if let Some(dir) = subdir(&root, STATIC_DIR) {
            root = dir;
        }
    }

    for font_type in types {
        if let Some(dir) = subdir(&root, font_type.extension()) {
            root = match subdir(&dir, STATIC_DIR) {
                Some(nested) if want_static => nested,
                _ => dir,
            };
            break;
        }
    }

    root
}

/// Lowercase file-name prefixes an entry's files must start with.
///
/// Remote entries share one release, so their archives are filtered by the
/// entry's folder name or patched name (`CascadiaCode` ships
/// `CaskaydiaCove*`). Built-in entries share one versioned archive holding
/// every family, so only the patched family name applies (`CascadiaMono*`).
fn name_prefixes(entry: &FontCatalogEntry) -> Vec<String> {
    let names = if entry.is_builtin() {
        vec![&entry.patched_name]
    } else {
        vec![&entry.folder_name, &entry.patched_name]
    };

    let mut prefixes = Vec::new();
    for name in names {
        let prefix: String = name
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        if !prefix.is_empty() && !prefixes.contains(&prefix) {
            prefixes.push(prefix);
        }
    }
    prefixes
}

fn files_with_extension(dir: &Path, extension: &str, prefixes: &[String]) -> Vec<PathBuf> {
    let suffix = format!(".{}", extension);

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_lowercase();
            name.ends_with(&suffix)
                && (prefixes.is_empty() || prefixes.iter().any(|p| name.starts_with(p)))
        })
        .map(|e| e.into_path())
        .collect()
}

/// Font files for `entry` under `extract_root`, honouring variant and type
/// preference. Finding nothing is an error for the entry.
pub fn locate_font_files(
    extract_root: &Path,
    variant: Variant,
    types: &[FontType],
    entry: &FontCatalogEntry,
) -> Result<Vec<PathBuf>> {
    let root = search_root(extract_root, variant, types);
    let prefixes = name_prefixes(entry);

    types
        .iter()
        .map(|t| files_with_extension(&root, t.extension(), &prefixes))
        .find(|files| !files.is_empty())
        .ok_or_else(|| FontError::NoFontFiles {
            font: entry.cask_name.clone(),
            dir: root,
        })
}
