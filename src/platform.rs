//! Platform facts: font destinations, elevation and hosting environment.
//!
//! # Destinations
//!
//! | OS      | Current user                                 | All users                |
//! |---------|----------------------------------------------|--------------------------|
//! | Windows | `%LOCALAPPDATA%\Microsoft\Windows\Fonts`     | `%WINDIR%\Fonts`         |
//! | macOS   | `~/Library/Fonts`                            | `/Library/Fonts`         |
//! | Linux   | `$XDG_DATA_HOME/fonts`                       | `/usr/local/share/fonts` |

use crate::config::Scope;
use crate::error::{FontError, Result};
use crate::formats::find_executable;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Windows,
    MacOs,
    Linux,
}

impl Os {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => Os::Windows,
            "macos" => Os::MacOs,
            // Other unixes follow the XDG layout
            _ => Os::Linux,
        }
    }
}

/// Font directory for `scope` on `os`.
pub fn font_dir_for(
    os: Os,
    scope: Scope,
    data_home: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<PathBuf> {
    let var = |key: &str| {
        lookup(key)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| anyhow::anyhow!("{} is not set", key))
    };

    let dir = match (os, scope) {
        (Os::Windows, Scope::CurrentUser) => var("LOCALAPPDATA")?
            .join("Microsoft")
            .join("Windows")
            .join("Fonts"),
        (Os::Windows, Scope::AllUsers) => var("WINDIR")
            .or_else(|_| var("SystemRoot"))?
            .join("Fonts"),
        (Os::MacOs, Scope::CurrentUser) => var("HOME")?.join("Library").join("Fonts"),
        (Os::MacOs, Scope::AllUsers) => PathBuf::from("/Library/Fonts"),
        (Os::Linux, Scope::CurrentUser) => data_home.join("fonts"),
        (Os::Linux, Scope::AllUsers) => PathBuf::from("/usr/local/share/fonts"),
    };
    Ok(dir)
}

/// Font directory for `scope` on this machine.
pub fn font_dir(scope: Scope, data_home: &Path) -> Result<PathBuf> {
    font_dir_for(Os::current(), scope, data_home, |k| std::env::var(k).ok())
}

/// Environment markers of hosts where installing fonts makes no sense.
const CONTAINER_MARKERS: [(&str, &str); 5] = [
    ("CODESPACES", "GitHub Codespaces"),
    ("REMOTE_CONTAINERS", "a VS Code dev container"),
    ("container", "a container"),
    ("DOTNET_RUNNING_IN_CONTAINER", "a .NET container"),
    ("ACC_CLOUD", "Azure Cloud Shell"),
];

/// Name of the disallowed environment we are running in, if any.
pub fn container_environment(lookup: impl Fn(&str) -> Option<String>) -> Option<&'static str> {
    CONTAINER_MARKERS
        .iter()
        .find(|(var, _)| lookup(var).is_some_and(|v| !v.is_empty()))
        .map(|(_, name)| *name)
}

/// Refuse to run inside containers and cloud shells.
pub fn check_environment() -> Result<()> {
    match container_environment(|k| std::env::var(k).ok()) {
        Some(name) => Err(FontError::DisallowedEnvironment(name.to_string())),
        None => Ok(()),
    }
}

/// Does this process run with administrator/root rights?
pub fn is_elevated() -> bool {
    if cfg!(windows) {
        // `net session` is refused to non-elevated processes
        Command::new("net")
            .arg("session")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    } else {
        Command::new("id")
            .arg("-u")
            .output()
            .map(|o| String::from_utf8_lossy(&o.stdout).trim() == "0")
            .unwrap_or(false)
    }
}

/// All-users installs need elevation.
pub fn check_scope(scope: Scope) -> Result<()> {
    if scope == Scope::AllUsers && !is_elevated() {
        return Err(FontError::ElevationRequired);
    }
    Ok(())
}

/// Rebuild the fontconfig cache for `dir` (Linux only).
pub fn refresh_font_cache(dir: &Path) {
    if Os::current() != Os::Linux {
        return;
    }
    let Some(fc_cache) = find_executable("fc-cache") else {
        debug!("fc-cache not found, skipping font cache refresh");
        return;
    };

    match Command::new(fc_cache).arg("-f").arg(dir).output() {
        Ok(output) if output.status.success() => debug!("Refreshed font cache for {}", dir.display()),
        Ok(output) => warn!(
            "fc-cache failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => warn!("Failed to run fc-cache: {}", e),
    }
}
