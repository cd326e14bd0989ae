// 🌡️ Reading Model - one (date, source) → (high, low) record
//
// Extractors produce integers, the store keeps floats, and absence is
// carried as `None` in memory and as the NaN sentinel at rest.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Source name under which the home-automation dashboard reports.
pub const HOME_ASSISTANT_SOURCE: &str = "home_assistant";

// ============================================================================
// EXTRACTED PAIR
// ============================================================================

/// HighLow - what an extractor hands back for one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighLow {
    pub high: i64,
    pub low: i64,
}

impl HighLow {
    pub fn new(high: i64, low: i64) -> Self {
        HighLow { high, low }
    }
}

// ============================================================================
// READING
// ============================================================================

/// Reading - one logical record per (date, source)
///
/// `high` and `low` are independently optional. A source may report one
/// but not the other; the missing side is never coerced to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub date: NaiveDate,
    pub source: String,
    pub high: Option<f64>,
    pub low: Option<f64>,
}

impl Reading {
    pub fn new(date: NaiveDate, source: &str, high: Option<f64>, low: Option<f64>) -> Self {
        Reading {
            date,
            source: source.to_string(),
            high: high.filter(|v| v.is_finite()),
            low: low.filter(|v| v.is_finite()),
        }
    }

    /// Build a reading from an extractor result (integers widen to floats)
    pub fn from_extraction(date: NaiveDate, source: &str, values: HighLow) -> Self {
        Reading::new(
            date,
            source,
            Some(values.high as f64),
            Some(values.low as f64),
        )
    }

    /// Key used for last-write-wins deduplication
    pub fn key(&self) -> (NaiveDate, &str) {
        (self.date, self.source.as_str())
    }

    /// True when neither value is present
    pub fn is_empty(&self) -> bool {
        self.high.is_none() && self.low.is_none()
    }

    /// True when both values are present
    pub fn is_complete(&self) -> bool {
        self.high.is_some() && self.low.is_some()
    }

    /// Stored representation of `high` (NaN when absent)
    pub fn stored_high(&self) -> f64 {
        to_stored(self.high)
    }

    /// Stored representation of `low` (NaN when absent)
    pub fn stored_low(&self) -> f64 {
        to_stored(self.low)
    }

    /// One-line rendering for console output
    pub fn display_line(&self) -> String {
        format!(
            "{} {:<18} → High: {}°C | Low: {}°C",
            self.date,
            self.source,
            format_value(self.high),
            format_value(self.low)
        )
    }
}

// ============================================================================
// STORAGE SENTINEL
// ============================================================================

/// Encode an optional value as a float, absence becoming NaN
pub fn to_stored(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NAN)
}

/// Decode a stored float, NaN (or any non-finite value) becoming absence
pub fn from_stored(value: f64) -> Option<f64> {
    if !value.is_finite() {
        None
    } else {
        Some(value)
    }
}

/// Render an optional value, absence as "NaN" (what plotting consumers expect)
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{}", v),
        None => "NaN".to_string(),
    }
}
