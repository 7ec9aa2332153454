//! Install run orchestration.
//!
//! A run resolves every selected entry's release first, then processes the
//! entries one at a time: select asset, download and verify, extract, locate
//! font files, install. Failures of one entry are reported and the run moves
//! on; network failures while resolving releases abort the whole run. All
//! downloads and extractions live under one staging root that is removed
//! when the run ends, whichever way it ends.

use crate::api::{FontsApi, ReleaseMetadata};
use crate::asset::{self, SelectedAsset};
use crate::catalog::FontCatalogEntry;
use crate::config::InstallOptions;
use crate::download;
use crate::error::{FontError, Result};
use crate::extract;
use crate::formats::FormatCapability;
use crate::install::{FileOutcome, InstallReport, Installer};
use crate::locate;
use crate::platform;
use crate::registry::FontRegistry;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

const STAGING_PREFIX: &str = "nfi-";

/// Run-wide staging directory, removed on drop.
///
/// Always freshly created under a unique name and readable only by the
/// current user, so nothing inside it predates the run.
#[derive(Debug)]
pub struct StagingRoot {
    dir: TempDir,
}

impl StagingRoot {
    /// `<tmp>/nfi-XXXXXX`
    pub fn create() -> Result<Self> {
        Self::create_in(std::env::temp_dir())
    }

    pub fn create_in(parent: impl AsRef<Path>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)?;
        debug!("Staging in {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// One entry's installation attempt.
#[derive(Debug, Clone)]
pub struct InstallationTask<'a> {
    pub entry: &'a FontCatalogEntry,
    pub asset: SelectedAsset,
    pub archive_path: PathBuf,
    pub extract_dir: PathBuf,
    pub dest_dir: PathBuf,
    pub force: bool,
    pub font_files: Vec<PathBuf>,
}

impl<'a> InstallationTask<'a> {
    /// Staging paths are derived from the archive name, so a second task for
    /// the same asset resumes where the first left off.
    pub fn plan(
        entry: &'a FontCatalogEntry,
        asset: SelectedAsset,
        staging: &Path,
        dest_dir: &Path,
        force: bool,
    ) -> Result<Self> {
        let file_name = download::asset_file_name(&asset.asset.download_url)?;
        let stem = asset
            .capability
            .format
            .strip_extension(&file_name)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_extracted", file_name));

        Ok(Self {
            entry,
            archive_path: staging.join(&file_name),
            extract_dir: staging.join(stem),
            asset,
            dest_dir: dest_dir.to_path_buf(),
            force,
            font_files: Vec::new(),
        })
    }
}

/// How one entry ended.
#[derive(Debug)]
pub enum EntryOutcome {
    Installed(InstallReport),
    /// Dry run: the asset that would be installed.
    WouldInstall(String),
}

/// Entry names by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub installed: Vec<String>,
    pub planned: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub files_copied: usize,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Drives the acquisition and installation of selected catalog entries.
pub struct FontInstaller<'a> {
    api: &'a FontsApi,
    options: &'a InstallOptions,
    formats: Vec<FormatCapability>,
    dest_dir: PathBuf,
    registry: Option<Box<dyn FontRegistry>>,
    staging: StagingRoot,
    show_progress: bool,
}

impl<'a> FontInstaller<'a> {
    pub fn new(
        api: &'a FontsApi,
        options: &'a InstallOptions,
        formats: Vec<FormatCapability>,
        dest_dir: PathBuf,
        registry: Box<dyn FontRegistry>,
        staging: StagingRoot,
    ) -> Self {
        Self {
            api,
            options,
            formats,
            dest_dir,
            registry: Some(registry),
            staging,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Process `entries` in order. Consumes the installer so the staging root
    /// is removed on every exit path.
    pub async fn run(mut self, entries: &[&FontCatalogEntry]) -> Result<RunSummary> {
        if self.formats.is_empty() {
            return Err(FontError::UnsupportedFormat("no archive formats available".to_string()));
        }

        let releases = self.api.resolve_releases(entries).await?;
        let mut summary = RunSummary::default();

        for entry in entries {
            let name = entry.cask_name.clone();
            match self.process(entry, &releases).await {
                Ok(EntryOutcome::Installed(report)) => {
                    println!(
                        "{} Installed {} ({} copied, {} already present)",
                        "✓".green(),
                        entry.display_name().bold(),
                        report.copied,
                        report.already_present + report.owned_by_other_app
                    );
                    summary.files_copied += report.copied;
                    summary.installed.push(name);
                }
                Ok(EntryOutcome::WouldInstall(asset)) => {
                    println!(
                        "{} Would install {} from {}",
                        "⚠".yellow(),
                        entry.display_name().bold(),
                        asset
                    );
                    summary.planned.push(name);
                }
                Err(e) if e.is_warning() || self.is_dry_run_miss(&e) => {
                    println!("{} {}: {}", "⚠".yellow(), name.bold(), e);
                    summary.skipped.push(name);
                }
                Err(e) => {
                    println!("{} {}: {}", "✗".red(), name.bold(), e);
                    summary.failed.push(name);
                }
            }
        }

        if summary.files_copied > 0 {
            platform::refresh_font_cache(&self.dest_dir);
        }

        Ok(summary)
    }

    fn is_dry_run_miss(&self, error: &FontError) -> bool {
        self.options.dry_run && matches!(error, FontError::AssetNotFound { .. })
    }

    async fn process(
        &mut self,
        entry: &FontCatalogEntry,
        releases: &BTreeMap<String, ReleaseMetadata>,
    ) -> Result<EntryOutcome> {
        let not_found = || FontError::AssetNotFound {
            font: entry.cask_name.clone(),
        };

        let release = releases.get(&entry.release_url).ok_or_else(not_found)?;
        let selected = asset::select_asset(entry, release, &self.formats).ok_or_else(not_found)?;

        if self.options.dry_run {
            return Ok(EntryOutcome::WouldInstall(selected.asset.name));
        }

        let mut task = InstallationTask::plan(
            entry,
            selected,
            self.staging.path(),
            &self.dest_dir,
            self.options.force,
        )?;
        info!("Installing {} from {}", entry.cask_name, task.asset.asset.name);

        download::fetch_and_verify(
            self.api.client(),
            &task.asset.asset.download_url,
            release.checksums.as_ref(),
            self.staging.path(),
            self.show_progress,
        )
        .await?;

        let archive = task.archive_path.clone();
        let extract_dir = task.extract_dir.clone();
        let capability = task.asset.capability;
        let variant = self.options.variant;
        let types = self.options.font_types.clone();
        let owned = entry.clone();
        task.font_files = blocking(move || {
            extract::extract_archive(&archive, &extract_dir, &capability)?;
            locate::locate_font_files(&extract_dir, variant, &types, &owned)
        })
        .await?;

        // The registry moves onto the blocking thread and back
        let mut registry = self
            .registry
            .take()
            .ok_or_else(|| anyhow::anyhow!("Font registry unavailable"))?;
        let dest_dir = task.dest_dir.clone();
        let scope = self.options.scope;
        let force = task.force;
        let files = task.font_files.clone();
        let (registry, report) = blocking(move || {
            let report = Installer::new(&dest_dir, scope, force, registry.as_mut())
                .install(&files, |file, outcome| print_file_line(file, outcome));
            Ok((registry, report))
        })
        .await?;
        self.registry = Some(registry);
        let report = report?;

        Ok(EntryOutcome::Installed(report))
    }
}

/// Run blocking disk and process work off the async workers.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| anyhow::anyhow!("Blocking task failed: {}", e))?
}

fn print_file_line(file: &Path, outcome: FileOutcome) {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match outcome {
        FileOutcome::Copied => println!("  {} {}", "✓".green(), name),
        FileOutcome::AlreadyPresent => {
            println!("  {} {} {}", "✓".green(), name, "(already installed)".dimmed())
        }
        FileOutcome::OwnedByOtherApp => println!(
            "  {} {} {}",
            "✓".green(),
            name,
            "(installed by another application)".dimmed()
        ),
    }
}
