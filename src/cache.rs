use crate::catalog::FontCatalogEntry;
use crate::error::Result;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Check if a cached file is still fresh at `now` (age within `ttl`)
pub fn is_cache_fresh_at(path: &Path, ttl: Duration, now: SystemTime) -> bool {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return false,
    };

    let modified = match metadata.modified() {
        Ok(t) => t,
        Err(_) => return false,
    };

    // A file stamped in the future counts as brand new
    let age = now.duration_since(modified).unwrap_or(Duration::ZERO);

    age <= ttl
}

pub fn is_cache_fresh(path: &Path, ttl: Duration) -> bool {
    is_cache_fresh_at(path, ttl, SystemTime::now())
}

/// Get the cached catalog or None if stale/missing/unreadable
pub fn get_cached_catalog(path: &Path, ttl: Duration) -> Option<Vec<FontCatalogEntry>> {
    if !is_cache_fresh(path, ttl) {
        return None;
    }

    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Store the merged catalog
pub fn store_catalog(path: &Path, catalog: &[FontCatalogEntry]) -> Result<()> {
    // Create cache directory if needed
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string(catalog)?;
    std::fs::write(path, json)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::static_entries;

    #[test]
    fn test_missing_file_is_not_fresh() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_cache_fresh(&dir.path().join("nope.json"), Duration::from_secs(120)));
    }

    #[test]
    fn test_freshness_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fonts.json");
        std::fs::write(&path, "[]").unwrap();
        let written = std::fs::metadata(&path).unwrap().modified().unwrap();
        let ttl = Duration::from_secs(120);

        assert!(is_cache_fresh_at(&path, ttl, written));
        assert!(is_cache_fresh_at(&path, ttl, written + Duration::from_secs(120)));
        assert!(!is_cache_fresh_at(&path, ttl, written + Duration::from_secs(121)));
    }

    #[test]
    fn test_store_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/fonts.json");
        let catalog = static_entries();

        store_catalog(&path, &catalog).unwrap();
        let cached = get_cached_catalog(&path, Duration::from_secs(120)).unwrap();
        assert_eq!(cached, catalog);
    }

    #[test]
    fn test_corrupt_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fonts.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(get_cached_catalog(&path, Duration::from_secs(120)).is_none());
    }
}
