//! Windows font registrations.
//!
//! Windows only loads fonts that are listed under
//! `SOFTWARE\Microsoft\Windows NT\CurrentVersion\Fonts`, either machine-wide
//! (`HKLM`, value is the bare file name inside `%WINDIR%\Fonts`) or per user
//! (`HKCU`, value is the full path). The store is read and written through
//! `reg.exe`; other platforms have nothing to register.

use crate::config::Scope;
use crate::error::{FontError, Result};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

pub const FONTS_KEY: &str = r"SOFTWARE\Microsoft\Windows NT\CurrentVersion\Fonts";

/// Root key for a scope.
pub fn root_key(scope: Scope) -> &'static str {
    match scope {
        Scope::AllUsers => "HKLM",
        Scope::CurrentUser => "HKCU",
    }
}

/// Registration name for a font file, e.g. `Hack Regular (TrueType)`.
pub fn display_name_for(file: &Path) -> String {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = file
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let technology = match ext.as_str() {
        "ttf" | "ttc" => "TrueType",
        _ => "OpenType",
    };
    format!("{} ({})", stem, technology)
}

/// Value stored for a file installed at `installed` under `scope`.
pub fn registration_value(scope: Scope, installed: &Path) -> String {
    match scope {
        Scope::AllUsers => installed
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Scope::CurrentUser => installed.to_string_lossy().into_owned(),
    }
}

/// An OS font registration store.
pub trait FontRegistry: Send {
    /// Files referenced by any registration, in any scope, as absolute paths.
    fn registered_files(&self) -> Result<Vec<PathBuf>>;

    fn register(&mut self, scope: Scope, name: &str, value: &str) -> Result<()>;
}

/// Platforms without a registration store.
#[derive(Debug, Default)]
pub struct NoRegistry;

impl FontRegistry for NoRegistry {
    fn registered_files(&self) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    fn register(&mut self, _scope: Scope, _name: &str, _value: &str) -> Result<()> {
        Ok(())
    }
}

/// Parse `reg query` output into `(name, data)` pairs of string values.
pub fn parse_reg_query(output: &str) -> Vec<(String, String)> {
    const TYPES: [&str; 2] = ["REG_SZ", "REG_EXPAND_SZ"];

    output
        .lines()
        .filter_map(|line| {
            // "    Hack Regular (TrueType)    REG_SZ    Hack-Regular.ttf"
            TYPES.iter().find_map(|ty| {
                let marker = format!("    {}    ", ty);
                let (name, data) = line.split_once(&marker)?;
                let name = name.trim();
                let data = data.trim();
                (!name.is_empty() && !data.is_empty())
                    .then(|| (name.to_string(), data.to_string()))
            })
        })
        .collect()
}

/// Resolve a registration value; bare file names live in `system_fonts`.
pub fn resolve_value(value: &str, system_fonts: &Path) -> PathBuf {
    if value.contains('\\') || value.contains('/') {
        PathBuf::from(value)
    } else {
        system_fonts.join(value)
    }
}

/// Registry access through `reg.exe`.
#[derive(Debug)]
pub struct RegExe {
    system_fonts: PathBuf,
}

impl RegExe {
    pub fn new(system_fonts: PathBuf) -> Self {
        Self { system_fonts }
    }

    fn query(&self, scope: Scope) -> Result<Vec<(String, String)>> {
        let key = format!(r"{}\{}", root_key(scope), FONTS_KEY);
        let output = Command::new("reg")
            .args(["query", &key])
            .output()
            .context("Failed to run reg query")?;

        if !output.status.success() {
            // A user without per-user fonts has no HKCU key at all
            debug!("reg query {} failed: {}", key, output.status);
            return Ok(Vec::new());
        }

        Ok(parse_reg_query(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl FontRegistry for RegExe {
    fn registered_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for scope in [Scope::AllUsers, Scope::CurrentUser] {
            files.extend(
                self.query(scope)?
                    .into_iter()
                    .map(|(_, value)| resolve_value(&value, &self.system_fonts)),
            );
        }
        Ok(files)
    }

    fn register(&mut self, scope: Scope, name: &str, value: &str) -> Result<()> {
        let key = format!(r"{}\{}", root_key(scope), FONTS_KEY);
        let output = Command::new("reg")
            .args(["add", &key, "/v", name, "/t", "REG_SZ", "/d", value, "/f"])
            .output()
            .context("Failed to run reg add")?;

        if !output.status.success() {
            return Err(FontError::Registry(format!(
                "reg add {} /v {} failed: {}",
                key,
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// The registration store for this platform.
pub fn platform_registry(system_fonts: PathBuf) -> Box<dyn FontRegistry> {
    if cfg!(windows) {
        Box::new(RegExe::new(system_fonts))
    } else {
        Box::new(NoRegistry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: &str = "\r\n\
HKEY_CURRENT_USER\\SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\Fonts\r\n\
    Hack Regular (TrueType)    REG_SZ    C:\\Users\\ada\\AppData\\Local\\Microsoft\\Windows\\Fonts\\Hack-Regular.ttf\r\n\
    Segoe UI (TrueType)    REG_SZ    segoeui.ttf\r\n\
    Broken    REG_DWORD    0x1\r\n\
\r\n";

    #[test]
    fn test_parse_reg_query() {
        let values = parse_reg_query(QUERY);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].0, "Hack Regular (TrueType)");
        assert!(values[0].1.ends_with("Hack-Regular.ttf"));
        assert_eq!(values[1], ("Segoe UI (TrueType)".to_string(), "segoeui.ttf".to_string()));
    }

    #[test]
    fn test_resolve_value() {
        let system = Path::new("C:/Windows/Fonts");
        assert_eq!(
            resolve_value("segoeui.ttf", system),
            PathBuf::from("C:/Windows/Fonts/segoeui.ttf")
        );
        assert_eq!(
            resolve_value("D:/fonts/Hack.ttf", system),
            PathBuf::from("D:/fonts/Hack.ttf")
        );
    }

    #[test]
    fn test_display_names() {
        assert_eq!(
            display_name_for(Path::new("HackNerdFont-Regular.ttf")),
            "HackNerdFont-Regular (TrueType)"
        );
        assert_eq!(display_name_for(Path::new("Font.TTC")), "Font (TrueType)");
        assert_eq!(display_name_for(Path::new("Font.otf")), "Font (OpenType)");
    }

    #[test]
    fn test_registration_value_by_scope() {
        let installed = Path::new("/fonts/Hack.ttf");
        assert_eq!(registration_value(Scope::AllUsers, installed), "Hack.ttf");
        assert_eq!(registration_value(Scope::CurrentUser, installed), "/fonts/Hack.ttf");
        assert_eq!(root_key(Scope::AllUsers), "HKLM");
    }
}
