//! HTTP client for the font catalog and upstream GitHub releases.
//!
//! [`FontsApi`] owns the single `reqwest` client used for every request in a
//! run (catalog, release metadata, checksum manifests and archive downloads).
//! Release metadata is resolved once per distinct release URL and kept in an
//! in-memory cache for the lifetime of the client, so several catalog entries
//! that point at the same upstream release share one lookup.
//!
//! # Rate limits
//!
//! GitHub answers `403`/`429` when the anonymous quota runs out. The client
//! waits for `Retry-After` (seconds) or until `X-RateLimit-Reset` (Unix time)
//! when that is at most a minute away, and otherwise backs off exponentially
//! (`15 * 2^retry` seconds). After [`MAX_RATE_LIMIT_RETRIES`] retries the run
//! is aborted with [`FontError::RateLimitExhausted`].
//!
//! # Pagination
//!
//! Requests to the GitHub API host follow RFC 5988 `Link: <...>; rel="next"`
//! headers, concatenating the asset lists of every page.

use crate::catalog::{CatalogDocument, FontCatalogEntry};
use crate::config::Config;
use crate::error::{FontError, Result};
use crate::retry::{self, RetryError, RetryPolicy};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, LINK, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

const GITHUB_API_HOST: &str = "api.github.com";
const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Release asset holding `<sha256>  <file>` lines for the other assets.
pub const CHECKSUM_MANIFEST_NAME: &str = "SHA-256.txt";

/// Rate-limit retries before giving up.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// Longest server-suggested wait that is honoured as-is.
const MAX_HINTED_WAIT_SECS: i64 = 60;

/// Base of the exponential backoff used when no usable hint is present.
const BACKOFF_BASE_SECS: u64 = 15;

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

/// Assets and optional checksum manifest of one upstream release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseMetadata {
    pub assets: Vec<ReleaseAsset>,
    /// Asset file name to lowercase hex SHA-256.
    pub checksums: Option<HashMap<String, String>>,
}

impl ReleaseMetadata {
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// A page is either a full release object or a bare asset list.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReleasePage {
    Release {
        #[serde(default)]
        assets: Vec<ReleaseAsset>,
    },
    Assets(Vec<ReleaseAsset>),
}

impl ReleasePage {
    fn into_assets(self) -> Vec<ReleaseAsset> {
        match self {
            ReleasePage::Release { assets } => assets,
            ReleasePage::Assets(assets) => assets,
        }
    }
}

/// Outcome of one request attempt, before retry handling.
#[derive(Debug)]
pub enum Attempt {
    /// 403/429; `hint` is the server-suggested wait in seconds, if any.
    RateLimited { hint: Option<i64> },
    Failed(FontError),
}

/// Backoff for GitHub rate limiting.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitBackoff {
    pub max_retries: u32,
}

impl Default for RateLimitBackoff {
    fn default() -> Self {
        Self {
            max_retries: MAX_RATE_LIMIT_RETRIES,
        }
    }
}

impl RateLimitBackoff {
    /// Wait before retry number `retry`, given the server's hint in seconds.
    pub fn wait(retry: u32, hint: Option<i64>) -> Duration {
        match hint {
            Some(secs) if secs > 0 && secs <= MAX_HINTED_WAIT_SECS => {
                Duration::from_secs(secs as u64)
            }
            _ => Duration::from_secs(BACKOFF_BASE_SECS << retry.min(16)),
        }
    }
}

impl RetryPolicy<Attempt> for RateLimitBackoff {
    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn is_retryable(&self, error: &Attempt) -> bool {
        matches!(error, Attempt::RateLimited { .. })
    }

    fn delay(&self, retry: u32, error: &Attempt) -> Duration {
        let hint = match error {
            Attempt::RateLimited { hint } => *hint,
            Attempt::Failed(_) => None,
        };
        let wait = Self::wait(retry, hint);
        warn!("GitHub rate limit hit, waiting {}s", wait.as_secs());
        wait
    }
}

/// Server-suggested wait in seconds from `Retry-After` or `X-RateLimit-Reset`.
pub fn rate_limit_hint(headers: &HeaderMap, now_unix: i64) -> Option<i64> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    if let Some(secs) = header(RETRY_AFTER.as_str()) {
        return Some(secs);
    }
    header("x-ratelimit-reset").map(|reset| reset - now_unix)
}

/// Target of the `rel="next"` entry of an RFC 5988 `Link` header.
pub fn next_page_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;

    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|param| {
            let param = param.trim().replace(' ', "");
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

/// Parse `sha256sum`-style manifest lines into a file name to hash map.
pub fn parse_checksum_manifest(text: &str) -> HashMap<String, String> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let hash = parts.next()?;
            let file = parts.next()?.trim_start_matches('*');
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            Some((file.to_string(), hash.to_ascii_lowercase()))
        })
        .collect()
}

/// Font catalog and release client with in-memory release caching
#[derive(Clone)]
pub struct FontsApi {
    client: reqwest::Client,
    github_host: String,
    github_token: Option<String>,
    release_cache: moka::future::Cache<String, ReleaseMetadata>,
    backoff: RateLimitBackoff,
}

impl FontsApi {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(format!("nerdfont-installer/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            github_host: GITHUB_API_HOST.to_string(),
            github_token: config.github_token.clone(),
            release_cache: moka::future::Cache::new(64),
            backoff: RateLimitBackoff::default(),
        })
    }

    /// Treat `host` as the GitHub API (JSON media type, pagination, token).
    pub fn with_github_host(mut self, host: impl Into<String>) -> Self {
        self.github_host = host.into();
        self
    }

    pub fn with_backoff(mut self, backoff: RateLimitBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn is_github_api(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(&self.github_host)))
            .unwrap_or(false)
    }

    /// Fetch the remote font list.
    pub async fn fetch_catalog(&self, url: &str) -> Result<Vec<FontCatalogEntry>> {
        debug!("Fetching font catalog from {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FontError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let document: CatalogDocument = response.json().await?;
        Ok(document.into_entries())
    }

    /// Resolve release metadata for the distinct release URLs of `entries`.
    pub async fn resolve_releases(
        &self,
        entries: &[&FontCatalogEntry],
    ) -> Result<BTreeMap<String, ReleaseMetadata>> {
        let mut releases = BTreeMap::new();

        for entry in entries {
            if releases.contains_key(&entry.release_url) {
                continue;
            }
            let metadata = self.fetch_release(&entry.release_url).await?;
            releases.insert(entry.release_url.clone(), metadata);
        }

        Ok(releases)
    }

    /// Fetch one release (all pages) and its checksum manifest, cached per URL.
    pub async fn fetch_release(&self, url: &str) -> Result<ReleaseMetadata> {
        if let Some(cached) = self.release_cache.get(url).await {
            return Ok(cached);
        }

        let mut assets = Vec::new();
        let mut next = Some(url.to_string());
        let github = self.is_github_api(url);

        while let Some(page_url) = next.take() {
            debug!("Fetching release page {}", page_url);
            let response = self.get_with_rate_limit(&page_url).await?;
            if github {
                next = next_page_link(response.headers());
            }
            let page: ReleasePage = response.json().await?;
            assets.extend(page.into_assets());
        }

        let checksums = match assets.iter().find(|a| a.name == CHECKSUM_MANIFEST_NAME) {
            Some(manifest) => {
                let text = self.get_text(&manifest.download_url).await?;
                Some(parse_checksum_manifest(&text))
            }
            None => None,
        };

        let metadata = ReleaseMetadata { assets, checksums };
        self.release_cache
            .insert(url.to_string(), metadata.clone())
            .await;

        Ok(metadata)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get_with_rate_limit(url).await?;
        Ok(response.text().await?)
    }

    /// GET with rate-limit backoff; other HTTP errors are terminal.
    async fn get_with_rate_limit(&self, url: &str) -> Result<reqwest::Response> {
        let github = self.is_github_api(url);
        let client = &self.client;
        let token = self.github_token.as_deref();

        let outcome = retry::retry(&self.backoff, || async move {
            let mut request = client.get(url);
            if github {
                request = request.header(ACCEPT, GITHUB_MEDIA_TYPE);
                if let Some(token) = token {
                    request = request.header(AUTHORIZATION, format!("Bearer {}", token));
                }
            }

            let response = request
                .send()
                .await
                .map_err(|e| Attempt::Failed(e.into()))?;
            let status = response.status();

            if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
                let hint = rate_limit_hint(response.headers(), chrono::Utc::now().timestamp());
                return Err(Attempt::RateLimited { hint });
            }
            if !status.is_success() {
                return Err(Attempt::Failed(FontError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                }));
            }
            Ok(response)
        })
        .await;

        outcome.map_err(|e| match e {
            RetryError::Exhausted { retries, .. } => FontError::RateLimitExhausted {
                url: url.to_string(),
                retries,
            },
            RetryError::Aborted(Attempt::Failed(err)) => err,
            RetryError::Aborted(Attempt::RateLimited { .. }) => FontError::RateLimitExhausted {
                url: url.to_string(),
                retries: 0,
            },
        })
    }
}
