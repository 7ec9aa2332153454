//! Copy located font files into the destination directory.
//!
//! Each file ends in one of three states: copied, already present (and not
//! forced) or owned by another application (registered elsewhere under the
//! same file name). Copies are retried while the target is locked by another
//! process; any other I/O error fails the file immediately. The first failed
//! file aborts the rest of the entry.

use crate::config::Scope;
use crate::error::{FontError, Result};
use crate::registry::{self, FontRegistry};
use crate::retry::{self, RetryError, RetryPolicy};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// What happened to one font file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Copied,
    AlreadyPresent,
    OwnedByOtherApp,
}

/// Per-entry tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub copied: usize,
    pub already_present: usize,
    pub owned_by_other_app: usize,
}

impl InstallReport {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Copied => self.copied += 1,
            FileOutcome::AlreadyPresent => self.already_present += 1,
            FileOutcome::OwnedByOtherApp => self.owned_by_other_app += 1,
        }
    }
}

/// Windows `ERROR_SHARING_VIOLATION` and `ERROR_LOCK_VIOLATION`.
const SHARING_VIOLATION_CODES: [i32; 2] = [32, 33];

/// Is `error` a file-in-use condition that may clear on its own?
pub fn is_sharing_violation(error: &io::Error) -> bool {
    if cfg!(windows)
        && error
            .raw_os_error()
            .is_some_and(|code| SHARING_VIOLATION_CODES.contains(&code))
    {
        return true;
    }
    matches!(
        error.kind(),
        io::ErrorKind::ResourceBusy | io::ErrorKind::ExecutableFileBusy
    )
}

/// Retry policy for font copies: ten attempts, one second apart.
#[derive(Debug, Clone, Copy)]
pub struct CopyRetry {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for CopyRetry {
    fn default() -> Self {
        Self {
            max_retries: 9,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy<io::Error> for CopyRetry {
    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn is_retryable(&self, error: &io::Error) -> bool {
        is_sharing_violation(error)
    }

    fn delay(&self, _retry: u32, error: &io::Error) -> Duration {
        debug!("Font file busy ({}), retrying", error);
        self.delay
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    if cfg!(windows) {
        a.to_string_lossy().eq_ignore_ascii_case(&b.to_string_lossy())
    } else {
        a == b
    }
}

fn same_name(a: &Path, b: &Path) -> bool {
    match (a.file_name(), b.file_name()) {
        (Some(a), Some(b)) if cfg!(windows) => {
            a.to_string_lossy().eq_ignore_ascii_case(&b.to_string_lossy())
        }
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Installs font files into one destination directory.
pub struct Installer<'a> {
    dest_dir: PathBuf,
    scope: Scope,
    force: bool,
    registry: &'a mut dyn FontRegistry,
    retry: CopyRetry,
}

impl<'a> Installer<'a> {
    pub fn new(
        dest_dir: impl Into<PathBuf>,
        scope: Scope,
        force: bool,
        registry: &'a mut dyn FontRegistry,
    ) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            scope,
            force,
            registry,
            retry: CopyRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: CopyRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Install `files`, calling `on_file` after each one. Stops at the first
    /// file that cannot be copied.
    pub fn install(
        &mut self,
        files: &[PathBuf],
        mut on_file: impl FnMut(&Path, FileOutcome),
    ) -> Result<InstallReport> {
        fs::create_dir_all(&self.dest_dir)?;
        let registered = self.registry.registered_files()?;
        let mut report = InstallReport::default();

        for file in files {
            let outcome = self.install_file(file, &registered)?;
            report.record(outcome);
            on_file(file, outcome);
        }

        Ok(report)
    }

    fn install_file(&mut self, file: &Path, registered: &[PathBuf]) -> Result<FileOutcome> {
        let file_name = file
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Not a file: {}", file.display()))?;
        let target = self.dest_dir.join(file_name);

        if registered
            .iter()
            .any(|r| same_name(r, &target) && !same_path(r, &target))
        {
            debug!("{} is registered by another application", target.display());
            return Ok(FileOutcome::OwnedByOtherApp);
        }

        if target.exists() && !self.force {
            return Ok(FileOutcome::AlreadyPresent);
        }

        self.copy_with_retry(file, &target)?;

        self.registry.register(
            self.scope,
            &registry::display_name_for(&target),
            &registry::registration_value(self.scope, &target),
        )?;

        Ok(FileOutcome::Copied)
    }

    fn copy_with_retry(&self, source: &Path, target: &Path) -> Result<()> {
        let mut attempts = 0;
        let outcome = retry::retry_blocking(&self.retry, || {
            attempts += 1;
            fs::copy(source, target)
        });

        outcome.map(|_| ()).map_err(|e| {
            let source = match e {
                RetryError::Exhausted { last, .. } => last,
                RetryError::Aborted(err) => err,
            };
            FontError::CopyFailed {
                file: target.to_path_buf(),
                attempts,
                source,
            }
        })
    }
}
