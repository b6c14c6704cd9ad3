//! Configuration resolver
//!
//! Decides, per run, whether the setup configuration comes from a remote
//! fetch or the embedded bundle copy, and persists the winning payload to
//! the Working Root. Remote is best-effort with a fixed retry budget; the
//! embedded copy is the only fallback, and an unusable embedded copy is
//! fatal. The caller keeps the returned [`Provenance`] because it changes
//! the recovery behavior of the later active-module validation.

use crate::bundle::Bundle;
use crate::error::{Result, SetupError};
use crate::extract::TEMP_NAMESPACE;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// File name of the resolved setup configuration inside the Working Root.
pub const SETUP_FILE_NAME: &str = "setup.json";

/// Remote fetch attempt budget.
const FETCH_ATTEMPTS: u32 = 3;

/// Per-attempt fetch timeout.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the persisted setup configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Remote,
    Embedded,
}

/// Online configuration descriptor, `online.json` in the bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct OnlineDescriptor {
    /// Source repository URL.
    pub github: String,
    /// Resource file name to fetch.
    pub installer: String,
}

/// Minimal HTTP response surface needed by the resolver.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Whether the HTTP status is a success status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport seam for the remote configuration fetch.
pub trait Fetcher: Send + Sync {
    /// Perform one GET; `Err` is a transport-level failure.
    fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

/// Production fetcher: blocking HTTP client with the fixed per-attempt
/// timeout.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| SetupError::network(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SetupError::network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| SetupError::network(format!("body read failed: {}", e)))?
            .to_vec();
        Ok(FetchResponse { status, body })
    }
}

/// Create the per-run Working Root: a uniquely named temporary directory,
/// never reused across runs and never cleaned up automatically.
pub fn prepare_root() -> Result<PathBuf> {
    let root = std::env::temp_dir()
        .join(TEMP_NAMESPACE)
        .join(Uuid::new_v4().to_string());
    fs::create_dir_all(&root)
        .map_err(|e| SetupError::config(format!("cannot create working root: {}", e)))?;
    Ok(root)
}

/// Produce a validated setup configuration at `<root>/setup.json` and
/// report its provenance.
pub fn resolve(bundle: &dyn Bundle, fetcher: &dyn Fetcher, root: &Path) -> Result<Provenance> {
    let dest = root.join(SETUP_FILE_NAME);

    if let Some(url) = download_url(bundle) {
        info!("attempting remote setup configuration download: {}", url);
        match download_with_retry(fetcher, &url, FETCH_ATTEMPTS) {
            Ok(data) if is_valid_json(&data) => {
                info!(
                    "remote setup configuration valid ({} bytes), persisting to {}",
                    data.len(),
                    dest.display()
                );
                fs::write(&dest, &data)?;
                return Ok(Provenance::Remote);
            }
            Ok(data) => {
                warn!(
                    "remote payload is not valid JSON ({} bytes), falling back to embedded copy",
                    data.len()
                );
            }
            Err(e) => {
                warn!("remote download failed: {}, falling back to embedded copy", e);
            }
        }
    } else {
        warn!("no download URL available, using embedded setup configuration");
    }

    restore_embedded(bundle, root)?;
    Ok(Provenance::Embedded)
}

/// Read the embedded setup configuration, require it to be well-formed
/// JSON, and overwrite the working copy. There is no further fallback.
pub fn restore_embedded(bundle: &dyn Bundle, root: &Path) -> Result<()> {
    let data = bundle
        .read(SETUP_FILE_NAME)
        .map_err(|e| {
            warn!("cannot read embedded setup configuration: {}", e);
            SetupError::config("invalid setup configuration")
        })?;

    if !is_valid_json(&data) {
        warn!(
            "embedded setup configuration is not valid JSON ({} bytes)",
            data.len()
        );
        return Err(SetupError::config("invalid setup configuration"));
    }

    let dest = root.join(SETUP_FILE_NAME);
    info!(
        "embedded setup configuration valid ({} bytes), persisting to {}",
        data.len(),
        dest.display()
    );
    fs::write(dest, data)?;
    Ok(())
}

/// Compose the raw-content download URL from the online descriptor, or
/// `None` when the descriptor is absent, malformed, or incomplete.
fn download_url(bundle: &dyn Bundle) -> Option<String> {
    let data = match bundle.read("online.json") {
        Ok(data) => data,
        Err(e) => {
            warn!("cannot read online.json: {}", e);
            return None;
        }
    };

    let descriptor: OnlineDescriptor = match serde_json::from_slice(&data) {
        Ok(d) => d,
        Err(e) => {
            warn!("cannot parse online.json: {}", e);
            return None;
        }
    };

    let url = compose_raw_url(&descriptor.github, &descriptor.installer);
    if url.is_none() {
        warn!(
            "online descriptor incomplete or not a GitHub repository: {}",
            descriptor.github
        );
    }
    url
}

/// Rewrite a GitHub repository URL into the raw-content URL of a
/// configuration resource:
///
/// - host becomes `raw.githubusercontent.com`
/// - a `blob` path segment is stripped
/// - a branch segment (default `main`) is ensured directly after
///   `owner/repo`
/// - the fixed `config/` suffix plus the resource name is appended
pub fn compose_raw_url(repo: &str, resource: &str) -> Option<String> {
    let repo = repo.trim().trim_end_matches('/');
    let resource = resource.trim();
    if repo.is_empty() || resource.is_empty() {
        return None;
    }

    let (scheme, rest) = match repo.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("https", repo),
    };

    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let path = rest.strip_prefix("github.com/")?;

    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }

    // Strip a blob segment left over from a browser URL.
    if segments.get(2) == Some(&"blob") {
        segments.remove(2);
    }

    // Ensure a branch segment directly after owner/repo.
    match segments.get(2) {
        Some(&"main") | Some(&"master") => {}
        _ => segments.insert(2, "main"),
    }

    segments.push("config");
    segments.push(resource);

    Some(format!(
        "{}://raw.githubusercontent.com/{}",
        scheme,
        segments.join("/")
    ))
}

/// Up to `max_attempts` fetches at a fixed cadence, no backoff. Transport
/// errors and non-success statuses are logged and retried alike.
fn download_with_retry(fetcher: &dyn Fetcher, url: &str, max_attempts: u32) -> Result<Vec<u8>> {
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        info!("download attempt {}/{}: {}", attempt, max_attempts, url);
        match fetcher.fetch(url) {
            Ok(response) if response.is_success() => {
                info!(
                    "attempt {}/{} succeeded: HTTP {}, {} bytes",
                    attempt,
                    max_attempts,
                    response.status,
                    response.body.len()
                );
                return Ok(response.body);
            }
            Ok(response) => {
                last_error = format!("HTTP {}", response.status);
                warn!("attempt {}/{} failed: {}", attempt, max_attempts, last_error);
            }
            Err(e) => {
                last_error = e.to_string();
                warn!(
                    "attempt {}/{} failed (transport): {}",
                    attempt, max_attempts, last_error
                );
            }
        }
    }

    Err(SetupError::network(format!(
        "download failed after {} attempts: {}",
        max_attempts, last_error
    )))
}

fn is_valid_json(data: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(data).is_ok()
}
