// 🌐 Fetch Session - scoped document loader shared by all extractors
//
// One session per pipeline run. The HTTP client lives exactly as long as
// the session value; dropping it (normally or on an early return) releases it.

use std::cell::Cell;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::FetchError;

/// Identifying user agent sent with every HTTP request
pub const USER_AGENT: &str = concat!(
    "weather-consensus/",
    env!("CARGO_PKG_VERSION"),
    " (educational weather comparison bot)"
);

/// Default per-request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        FetchSettings {
            user_agent: USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl FetchSettings {
    pub fn with_timeout(timeout: Duration) -> Self {
        FetchSettings {
            timeout,
            ..FetchSettings::default()
        }
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// Document - raw markup plus where it came from
#[derive(Debug, Clone)]
pub struct Document {
    pub locator: String,
    pub body: String,
    pub from_local_file: bool,
}

impl Document {
    pub fn new(locator: &str, body: String, from_local_file: bool) -> Self {
        Document {
            locator: locator.to_string(),
            body,
            from_local_file,
        }
    }

    /// SHA-256 of the body, hex encoded
    ///
    /// Recorded per run so a sudden extraction failure can be matched
    /// against the day the page content changed.
    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.body.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// FetchSession - owns the HTTP client for the duration of a run
pub struct FetchSession {
    http: Client,
    fetched: Cell<usize>,
}

impl FetchSession {
    /// Open a session (builds the HTTP client once)
    pub fn open(settings: FetchSettings) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent)
            .build()
            .map_err(FetchError::Client)?;

        debug!(
            timeout_secs = settings.timeout.as_secs(),
            "opened fetch session"
        );

        Ok(FetchSession {
            http,
            fetched: Cell::new(0),
        })
    }

    /// Number of documents loaded through this session so far
    pub fn fetched_count(&self) -> usize {
        self.fetched.get()
    }

    /// Load a document
    ///
    /// If `locator` names an existing local file it is read from disk,
    /// otherwise it is treated as a URL and fetched with a GET request.
    /// Non-2xx answers and timeouts are errors.
    pub fn fetch(&self, locator: &str) -> Result<Document, FetchError> {
        let path = Path::new(locator);
        let document = if path.exists() {
            let body = std::fs::read_to_string(path).map_err(|e| FetchError::Io {
                path: locator.to_string(),
                source: e,
            })?;
            debug!(path = locator, bytes = body.len(), "loaded local document");
            Document::new(locator, body, true)
        } else {
            self.get(locator)?
        };

        self.fetched.set(self.fetched.get() + 1);
        Ok(document)
    }

    fn get(&self, url: &str) -> Result<Document, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        debug!(url, bytes = body.len(), "downloaded document");

        Ok(Document::new(url, body, false))
    }
}

impl Drop for FetchSession {
    fn drop(&mut self) {
        info!(documents = self.fetched.get(), "closed fetch session");
    }
}
