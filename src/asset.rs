//! Pick the release asset to download for a catalog entry.

use crate::api::{ReleaseAsset, ReleaseMetadata};
use crate::catalog::FontCatalogEntry;
use crate::formats::FormatCapability;

/// The asset chosen for an entry and the capability that will unpack it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedAsset {
    pub asset: ReleaseAsset,
    pub capability: FormatCapability,
}

/// Does `name` match `entry` for the given extension?
///
/// Entries with a folder-name convention require the exact
/// `<folderName>.<extension>`; an entry without one takes any asset with the
/// extension.
fn matches(entry: &FontCatalogEntry, name: &str, extension: &str) -> bool {
    if entry.folder_name.is_empty() {
        return name
            .strip_suffix(extension)
            .is_some_and(|stem| stem.len() > 1 && stem.ends_with('.'));
    }
    name.len() == entry.folder_name.len() + 1 + extension.len()
        && name.starts_with(entry.folder_name.as_str())
        && name.ends_with(extension)
        && name.as_bytes()[entry.folder_name.len()] == b'.'
}

/// First asset matching the entry, trying formats in preference order.
pub fn select_asset(
    entry: &FontCatalogEntry,
    release: &ReleaseMetadata,
    formats: &[FormatCapability],
) -> Option<SelectedAsset> {
    formats.iter().find_map(|capability| {
        let extension = capability.format.extension();
        release
            .assets
            .iter()
            .find(|asset| matches(entry, &asset.name, extension))
            .map(|asset| SelectedAsset {
                asset: asset.clone(),
                capability: *capability,
            })
    })
}
