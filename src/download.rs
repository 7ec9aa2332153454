//! Archive download with checksum verification

use crate::error::{FontError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Result of checking an archive against the release's checksum manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    /// The release publishes no manifest.
    Unverified,
}

/// Local file name for an asset URL (last path segment).
pub fn asset_file_name(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| anyhow::anyhow!("Invalid URL {}: {}", url, e))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("No file name in URL: {}", url).into())
}

/// SHA256 of a file as lowercase hex
pub async fn sha256_file(file_path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use tokio::io::AsyncReadExt;

    let mut file = fs::File::open(file_path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 8192];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Download `url` into `staging_dir`, skipping the transfer when the file is
/// already there. Returns the local path and whether a transfer happened.
pub async fn download_asset(
    client: &reqwest::Client,
    url: &str,
    staging_dir: &Path,
    show_progress: bool,
) -> Result<(PathBuf, bool)> {
    let file_name = asset_file_name(url)?;
    let output_path = staging_dir.join(&file_name);

    // Skip if already downloaded
    if output_path.exists() {
        debug!("{} already downloaded", output_path.display());
        return Ok((output_path, false));
    }

    fs::create_dir_all(staging_dir).await?;

    let mut response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(FontError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let pb = if show_progress {
        let pb = ProgressBar::new(response.content_length().unwrap_or(0));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                )
                .map_err(anyhow::Error::from)?
                .progress_chars("#>-"),
        );
        pb.set_message(format!("⬇ {}", file_name));
        Some(pb)
    } else {
        None
    };

    // Stream to a side file so an interrupted transfer is never mistaken
    // for a finished one
    let partial_path = staging_dir.join(format!("{}.part", file_name));
    let mut file = fs::File::create(&partial_path).await?;
    let mut downloaded: u64 = 0;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        if let Some(pb) = &pb {
            pb.set_position(downloaded);
        }
    }

    file.flush().await?;
    drop(file);
    fs::rename(&partial_path, &output_path).await?;

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    debug!("Downloaded {} ({} bytes)", file_name, downloaded);
    Ok((output_path, true))
}

/// Check `archive` against the release manifest.
///
/// No manifest (or an empty one) means nothing to check. A manifest that does
/// not list the file is refused, and a mismatching archive is deleted so the
/// next attempt downloads it again.
pub async fn verify_archive(
    archive: &Path,
    checksums: Option<&HashMap<String, String>>,
) -> Result<Verification> {
    let Some(checksums) = checksums.filter(|c| !c.is_empty()) else {
        return Ok(Verification::Unverified);
    };

    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let expected = checksums
        .get(&file_name)
        .ok_or_else(|| FontError::ChecksumMissing {
            file: file_name.clone(),
        })?;

    let actual = sha256_file(archive).await?;
    if !actual.eq_ignore_ascii_case(expected) {
        fs::remove_file(archive).await?;
        return Err(FontError::ChecksumMismatch {
            file: file_name,
            expected: expected.clone(),
            actual,
        });
    }

    Ok(Verification::Verified)
}

/// Download an asset into staging and verify it.
pub async fn fetch_and_verify(
    client: &reqwest::Client,
    url: &str,
    checksums: Option<&HashMap<String, String>>,
    staging_dir: &Path,
    show_progress: bool,
) -> Result<PathBuf> {
    let (path, _) = download_asset(client, url, staging_dir, show_progress).await?;
    verify_archive(&path, checksums).await?;
    Ok(path)
}
