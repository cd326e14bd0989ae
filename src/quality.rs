// ✅ Reading Quality - plausibility checks before a reading is stored
//
// Checks never alter or reject a reading. They surface what the digit
// decoder cannot know: a dropped minus sign typically shows up as a low
// above the high, or as a value outside any plausible outdoor range.

use serde::{Deserialize, Serialize};

use crate::reading::Reading;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Value cannot be a real outdoor temperature
    Warning,  // Value is questionable
    Info,     // Value is fine but incomplete
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

// ============================================================================
// QUALITY ENGINE
// ============================================================================

pub struct QualityEngine {
    /// Lowest plausible outdoor temperature, °C (default: -60)
    pub plausible_min: f64,

    /// Highest plausible outdoor temperature, °C (default: 60)
    pub plausible_max: f64,
}

impl Default for QualityEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QualityEngine {
    pub fn new() -> Self {
        QualityEngine {
            plausible_min: -60.0,
            plausible_max: 60.0,
        }
    }

    /// Run every check against a reading
    pub fn check(&self, reading: &Reading) -> Vec<QualityIssue> {
        let mut issues = Vec::new();

        if reading.is_empty() {
            issues.push(QualityIssue {
                severity: Severity::Warning,
                field: "reading".to_string(),
                issue: "neither high nor low is present".to_string(),
                recommendation: "Check the upstream source for this date".to_string(),
            });
            return issues;
        }

        for (field, value) in [("high", reading.high), ("low", reading.low)] {
            match value {
                None => issues.push(QualityIssue {
                    severity: Severity::Info,
                    field: field.to_string(),
                    issue: format!("{} is absent", field),
                    recommendation: "Aggregates for this date skip this source".to_string(),
                }),
                Some(v) if v < self.plausible_min || v > self.plausible_max => {
                    issues.push(QualityIssue {
                        severity: Severity::Critical,
                        field: field.to_string(),
                        issue: format!(
                            "{} = {} is outside [{}, {}]",
                            field, v, self.plausible_min, self.plausible_max
                        ),
                        recommendation: "Decimal separator merged into digits? Inspect the markup"
                            .to_string(),
                    })
                }
                Some(_) => {}
            }
        }

        if let (Some(high), Some(low)) = (reading.high, reading.low) {
            if low > high {
                issues.push(QualityIssue {
                    severity: Severity::Warning,
                    field: "low".to_string(),
                    issue: format!("low {} is above high {}", low, high),
                    recommendation: "Possible lost minus sign in digit decoding".to_string(),
                });
            }
        }

        issues
    }

    pub fn has_critical(issues: &[QualityIssue]) -> bool {
        issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reading(high: Option<f64>, low: Option<f64>) -> Reading {
        Reading::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            "wetter_com",
            high,
            low,
        )
    }

    #[test]
    fn test_clean_reading_has_no_issues() {
        let engine = QualityEngine::new();
        assert!(engine.check(&reading(Some(12.0), Some(3.0))).is_empty());
    }

    #[test]
    fn test_low_above_high_flags_sign_loss() {
        // -3 / -8 decoded without signs becomes 3 / 8
        let issues = QualityEngine::new().check(&reading(Some(3.0), Some(8.0)));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(issues[0].recommendation.contains("minus sign"));
    }

    #[test]
    fn test_out_of_range_is_critical() {
        // "12,5" decoded as 125
        let issues = QualityEngine::new().check(&reading(Some(125.0), Some(4.0)));
        assert!(QualityEngine::has_critical(&issues));
        assert_eq!(issues[0].field, "high");
    }

    #[test]
    fn test_missing_side_is_info() {
        let issues = QualityEngine::new().check(&reading(None, Some(4.0)));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Info);
    }

    #[test]
    fn test_empty_reading_short_circuits() {
        let issues = QualityEngine::new().check(&reading(None, None));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "reading");
    }
}
