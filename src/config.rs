//! Runtime configuration resolved from the environment.
//!
//! Everything the pipeline needs to know about *where* things live (cache,
//! data home, remote endpoints) is collected here once and passed down
//! explicitly. Per-run choices made on the command line live in
//! [`InstallOptions`].

use std::path::PathBuf;
use std::time::Duration;

/// Canonical Nerd Fonts catalog.
pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/ryanoasis/nerd-fonts/master/bin/scripts/lib/fonts.json";

/// Latest Nerd Fonts release on the GitHub API.
pub const DEFAULT_RELEASE_URL: &str =
    "https://api.github.com/repos/ryanoasis/nerd-fonts/releases/latest";

/// How long a cached catalog is reused before hitting the network again.
pub const CATALOG_CACHE_TTL: Duration = Duration::from_secs(2 * 60);

const APP_DIR: &str = "nerdfont-installer";

#[derive(Debug, Clone)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub data_home: PathBuf,
    pub catalog_url: String,
    pub release_url: String,
    pub github_token: Option<String>,
    pub cache_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let home = var("HOME")
            .or_else(|| var("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let cache_dir = if let Some(dir) = var("NFI_CACHE_DIR") {
            PathBuf::from(dir)
        } else if let Some(cache_home) = var("XDG_CACHE_HOME") {
            PathBuf::from(cache_home).join(APP_DIR)
        } else {
            home.join(".cache").join(APP_DIR)
        };

        let data_home = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".local/share"));

        Self {
            cache_dir,
            data_home,
            catalog_url: var("NFI_CATALOG_URL").unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            release_url: var("NFI_RELEASE_URL").unwrap_or_else(|| DEFAULT_RELEASE_URL.to_string()),
            github_token: var("GITHUB_TOKEN"),
            cache_ttl: CATALOG_CACHE_TTL,
        }
    }

    pub fn catalog_cache_file(&self) -> PathBuf {
        self.cache_dir.join("fonts.json")
    }
}

/// Static (single-style) or variable (multi-axis) font files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Variant {
    #[default]
    Variable,
    Static,
}

/// Installation breadth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Scope {
    #[default]
    CurrentUser,
    AllUsers,
}

/// Font file technologies, tried in a configurable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontType {
    Ttf,
    Otf,
    Woff2,
    Woff,
    Ttc,
}

impl FontType {
    pub const DEFAULT_ORDER: [FontType; 3] = [FontType::Ttf, FontType::Otf, FontType::Woff2];

    /// Lowercase file extension, also used as the type subdirectory name.
    pub fn extension(self) -> &'static str {
        match self {
            FontType::Ttf => "ttf",
            FontType::Otf => "otf",
            FontType::Woff2 => "woff2",
            FontType::Woff => "woff",
            FontType::Ttc => "ttc",
        }
    }
}

impl std::str::FromStr for FontType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ttf" => Ok(FontType::Ttf),
            "otf" => Ok(FontType::Otf),
            "woff2" => Ok(FontType::Woff2),
            "woff" => Ok(FontType::Woff),
            "ttc" => Ok(FontType::Ttc),
            other => Err(format!("unknown font type '{}'", other)),
        }
    }
}

/// Choices for one installation run.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub variant: Variant,
    pub font_types: Vec<FontType>,
    pub scope: Scope,
    pub force: bool,
    pub dry_run: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            variant: Variant::default(),
            font_types: FontType::DEFAULT_ORDER.to_vec(),
            scope: Scope::default(),
            force: false,
            dry_run: false,
        }
    }
}
