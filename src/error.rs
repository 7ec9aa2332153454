use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FontError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("GitHub API rate limit still exceeded after {retries} retries: {url}")]
    RateLimitExhausted { url: String, retries: u32 },

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("No downloadable archive found for {font}")]
    AssetNotFound { font: String },

    #[error("No checksum listed for {file}, refusing to install unverified archive")]
    ChecksumMissing { file: String },

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to extract {}: {reason}", archive.display())]
    ExtractFailed { archive: PathBuf, reason: String },

    #[error("No font files found for {font} in {}", dir.display())]
    NoFontFiles { font: String, dir: PathBuf },

    #[error("Failed to copy {} after {attempts} attempts: {source}", file.display())]
    CopyFailed {
        file: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Font registry error: {0}")]
    Registry(String),

    #[error("Refusing to run inside {0}")]
    DisallowedEnvironment(String),

    #[error("Installing for all users requires administrator privileges")]
    ElevationRequired,

    #[error("Unknown font: {name}{}", suggestion.as_ref().map(|s| format!(" (did you mean '{}'?)", s)).unwrap_or_default())]
    UnknownFont {
        name: String,
        suggestion: Option<String>,
    },

    #[error("No fonts selected")]
    NoFontsSelected,

    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl FontError {
    /// Per-entry failures that are reported as warnings rather than errors.
    pub fn is_warning(&self) -> bool {
        matches!(self, FontError::ChecksumMissing { .. })
    }
}

pub type Result<T> = std::result::Result<T, FontError>;
