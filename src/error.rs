// 🚨 Error Taxonomy - one type per failure domain
//
// Fetch and extraction failures are isolated per source by the pipeline.
// Store failures are fatal only for the record being written.
// Consolidation never fails on missing data, only on malformed input.

use chrono::NaiveDate;
use thiserror::Error;

use crate::extractor::SourceKind;

/// Document could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Local file exists but could not be read
    #[error("failed to read local document {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Network-level failure (DNS, connection refused, broken body, ...)
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    /// No answer within the configured timeout
    #[error("request to {url} timed out")]
    Timeout { url: String },
}

impl FetchError {
    /// Classify a reqwest failure, separating timeouts from other transport errors.
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Http {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Document was retrieved but its structure did not match the location rule.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The location rule matched zero or too few elements
    #[error("{provider}: no element matches `{rule}` (markup changed?)")]
    MissingElement { provider: SourceKind, rule: String },

    /// The located element carried no decimal digit
    #[error("{provider}: element text {text:?} contains no digits")]
    NoDigits { provider: SourceKind, text: String },

    /// The digit run does not fit an integer
    #[error("{provider}: digits {digits:?} are out of range")]
    OutOfRange { provider: SourceKind, digits: String },

    /// The location rule itself is not a valid selector
    #[error("invalid selector `{rule}`: {message}")]
    Selector { rule: String, message: String },
}

/// Persisting a record failed.
#[derive(Debug, Error)]
pub enum StoreWriteError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything that can go wrong while reading a single source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

impl SourceError {
    pub fn is_fetch(&self) -> bool {
        matches!(self, SourceError::Fetch(_))
    }

    pub fn is_extraction(&self) -> bool {
        matches!(self, SourceError::Extraction(_))
    }
}

/// Structurally invalid input handed to the consolidator.
#[derive(Debug, Error, PartialEq)]
pub enum ConsolidationError {
    #[error("date range ends ({end}) before it starts ({start})")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_classification() {
        let fetch: SourceError = FetchError::Status {
            url: "https://example.org".to_string(),
            status: 503,
        }
        .into();
        assert!(fetch.is_fetch());
        assert!(!fetch.is_extraction());

        let extraction: SourceError = ExtractionError::MissingElement {
            provider: SourceKind::WetterCom,
            rule: "span.x".to_string(),
        }
        .into();
        assert!(extraction.is_extraction());
        assert!(extraction.to_string().contains("markup changed"));
    }

    #[test]
    fn test_invalid_range_message() {
        let err = ConsolidationError::InvalidRange {
            start: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "date range ends (2024-01-01) before it starts (2024-01-05)"
        );
    }
}
