// ⚖️ Consolidation - cross-source consensus and per-source error
//
// Input is a materialized reading set (at most one reading per date and
// source). Output is derived and never stored:
//   - DailyAggregate: mean and median of the present highs and lows
//   - ErrorBand:      deviation of one source from the reference source
//   - DailyErrorBand: mean absolute deviation across all other sources
//
// Absent values are skipped, never counted as zero. A statistic with no
// input is itself absent. Sources are visited in lexicographic order of
// name so floating-point sums do not depend on input order.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ConsolidationError;
use crate::reading::Reading;

// ============================================================================
// DATE RANGE
// ============================================================================

/// Inclusive range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ConsolidationError> {
        if end < start {
            return Err(ConsolidationError::InvalidRange { start, end });
        }
        Ok(DateRange { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        DateRange {
            start: date,
            end: date,
        }
    }

    /// Smallest range containing every reading (None for an empty set)
    pub fn covering(readings: &[Reading]) -> Option<Self> {
        let start = readings.iter().map(|r| r.date).min()?;
        let end = readings.iter().map(|r| r.date).max()?;
        Some(DateRange { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of days in the range (at least 1)
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Every day of the range, ascending
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.num_days()).map(move |offset| start + Duration::days(offset))
    }
}

// ============================================================================
// DERIVED VALUES
// ============================================================================

/// Consensus of all sources for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub mean_high: Option<f64>,
    pub median_high: Option<f64>,
    pub mean_low: Option<f64>,
    pub median_low: Option<f64>,

    /// How many sources contributed a high / a low
    pub sources_high: usize,
    pub sources_low: usize,
}

/// Deviation of one source from the reference on one day
///
/// A field is `None` unless both the reference and the source have that
/// value for the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBand {
    pub date: NaiveDate,
    pub source: String,
    pub abs_error_high: Option<f64>,
    pub abs_error_low: Option<f64>,

    /// source - reference
    pub signed_error_high: Option<f64>,
    pub signed_error_low: Option<f64>,
}

/// Per-day error band around the reference source, for plotting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyErrorBand {
    pub date: NaiveDate,
    pub reference_high: Option<f64>,
    pub reference_low: Option<f64>,

    /// Mean absolute deviation of the other sources (None: nothing to compare)
    pub error_high: Option<f64>,
    pub error_low: Option<f64>,

    /// How many other sources were compared
    pub compared_high: usize,
    pub compared_low: usize,
}

impl DailyErrorBand {
    /// (reference - error, reference + error) for the high
    pub fn bounds_high(&self) -> Option<(f64, f64)> {
        band(self.reference_high, self.error_high)
    }

    /// (reference - error, reference + error) for the low
    pub fn bounds_low(&self) -> Option<(f64, f64)> {
        band(self.reference_low, self.error_low)
    }
}

fn band(center: Option<f64>, error: Option<f64>) -> Option<(f64, f64)> {
    let (center, error) = (center?, error?);
    Some((center - error, center + error))
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Arithmetic mean, summed in the given order (None when empty)
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median (mean of the two middle values for even counts; None when empty)
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Readings grouped by date, then by source name
///
/// If the input holds several readings for one key, the later one in the
/// slice is used; callers pass `ReadingStore::materialize` output.
fn by_date(readings: &[Reading]) -> BTreeMap<NaiveDate, BTreeMap<&str, &Reading>> {
    let mut grouped: BTreeMap<NaiveDate, BTreeMap<&str, &Reading>> = BTreeMap::new();
    for reading in readings {
        grouped
            .entry(reading.date)
            .or_default()
            .insert(reading.source.as_str(), reading);
    }
    grouped
}

// ============================================================================
// CONSOLIDATOR
// ============================================================================

pub struct Consolidator {
    /// Source the error bands are measured against
    pub reference_source: String,
}

impl Consolidator {
    pub fn new(reference_source: &str) -> Self {
        Consolidator {
            reference_source: reference_source.to_string(),
        }
    }

    /// One aggregate per day of `range`, ascending
    ///
    /// Every source counts, the reference included. Days without any
    /// present value get `None` statistics, not zeros.
    pub fn aggregate(&self, readings: &[Reading], range: &DateRange) -> Vec<DailyAggregate> {
        let grouped = by_date(readings);

        range
            .days()
            .map(|date| {
                let sources = grouped.get(&date);
                let highs: Vec<f64> = sources
                    .map(|s| s.values().filter_map(|r| r.high).collect())
                    .unwrap_or_default();
                let lows: Vec<f64> = sources
                    .map(|s| s.values().filter_map(|r| r.low).collect())
                    .unwrap_or_default();

                DailyAggregate {
                    date,
                    mean_high: mean(&highs),
                    median_high: median(&highs),
                    mean_low: mean(&lows),
                    median_low: median(&lows),
                    sources_high: highs.len(),
                    sources_low: lows.len(),
                }
            })
            .collect()
    }

    /// Deviation of every non-reference source from the reference
    ///
    /// Only days where the reference has a reading contribute, and only
    /// sources with at least one comparable value get an entry.
    pub fn source_errors(&self, readings: &[Reading]) -> Vec<ErrorBand> {
        let mut bands = Vec::new();

        for (date, sources) in by_date(readings) {
            let Some(reference) = sources.get(self.reference_source.as_str()) else {
                continue;
            };

            for (name, reading) in &sources {
                if *name == self.reference_source {
                    continue;
                }

                let signed_high = deviation(reading.high, reference.high);
                let signed_low = deviation(reading.low, reference.low);
                if signed_high.is_none() && signed_low.is_none() {
                    continue;
                }

                bands.push(ErrorBand {
                    date,
                    source: name.to_string(),
                    abs_error_high: signed_high.map(f64::abs),
                    abs_error_low: signed_low.map(f64::abs),
                    signed_error_high: signed_high,
                    signed_error_low: signed_low,
                });
            }
        }

        bands
    }

    /// Per-day error band: mean absolute deviation across the other sources
    ///
    /// One entry per day present in `readings`, ascending. The error is
    /// `None` when the reference lacks the value or no other source can
    /// be compared that day.
    pub fn reconcile_error(&self, readings: &[Reading]) -> Vec<DailyErrorBand> {
        let mut per_date: BTreeMap<NaiveDate, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
        for band in self.source_errors(readings) {
            let entry = per_date.entry(band.date).or_default();
            if let Some(e) = band.abs_error_high {
                entry.0.push(e);
            }
            if let Some(e) = band.abs_error_low {
                entry.1.push(e);
            }
        }

        by_date(readings)
            .into_iter()
            .map(|(date, sources)| {
                let reference = sources.get(self.reference_source.as_str());
                let (highs, lows) = per_date.remove(&date).unwrap_or_default();

                DailyErrorBand {
                    date,
                    reference_high: reference.and_then(|r| r.high),
                    reference_low: reference.and_then(|r| r.low),
                    error_high: mean(&highs),
                    error_low: mean(&lows),
                    compared_high: highs.len(),
                    compared_low: lows.len(),
                }
            })
            .collect()
    }

    /// Days on which every source seen in `readings` reported both values
    pub fn complete_dates(&self, readings: &[Reading]) -> Vec<NaiveDate> {
        let all_sources: BTreeSet<&str> = readings.iter().map(|r| r.source.as_str()).collect();

        by_date(readings)
            .into_iter()
            .filter(|(_, sources)| {
                sources.len() == all_sources.len() && sources.values().all(|r| r.is_complete())
            })
            .map(|(date, _)| date)
            .collect()
    }
}

fn deviation(value: Option<f64>, reference: Option<f64>) -> Option<f64> {
    Some(value? - reference?)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn r(d: u32, source: &str, high: Option<f64>, low: Option<f64>) -> Reading {
        Reading::new(day(d), source, high, low)
    }

    #[test]
    fn test_two_source_scenario() {
        let readings = vec![
            r(1, "ref", Some(10.0), None),
            r(1, "src2", Some(12.0), None),
        ];
        let consolidator = Consolidator::new("ref");

        let aggregates = consolidator.aggregate(&readings, &DateRange::single(day(1)));
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].mean_high, Some(11.0));
        assert_eq!(aggregates[0].median_high, Some(11.0));
        assert_eq!(aggregates[0].mean_low, None);

        let errors = consolidator.source_errors(&readings);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source, "src2");
        assert_eq!(errors[0].abs_error_high, Some(2.0));
        assert_eq!(errors[0].signed_error_high, Some(2.0));
        assert_eq!(errors[0].abs_error_low, None);

        let daily = consolidator.reconcile_error(&readings);
        assert_eq!(daily[0].error_high, Some(2.0));
        assert_eq!(daily[0].error_low, None);
        assert_eq!(daily[0].bounds_high(), Some((8.0, 12.0)));
    }

    #[test]
    fn test_all_absent_day_is_absent_not_zero() {
        let readings = vec![r(1, "a", None, None), r(3, "a", Some(5.0), Some(1.0))];
        let range = DateRange::new(day(1), day(3)).unwrap();

        let aggregates = Consolidator::new("a").aggregate(&readings, &range);
        assert_eq!(aggregates.len(), 3);
        for aggregate in &aggregates[..2] {
            assert_eq!(aggregate.mean_high, None);
            assert_eq!(aggregate.median_high, None);
            assert_eq!(aggregate.mean_low, None);
            assert_eq!(aggregate.median_low, None);
            assert_eq!(aggregate.sources_high, 0);
        }
        assert_eq!(aggregates[2].mean_high, Some(5.0));
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let readings = vec![
            r(1, "home_assistant", Some(10.1), Some(-1.3)),
            r(1, "stadt_reutlingen", Some(11.0), Some(2.0)),
            r(1, "wetter_com", Some(9.7), None),
            r(1, "wetter_net", Some(12.3), Some(0.4)),
            r(2, "wetter_com", Some(0.1), Some(0.2)),
            r(2, "wetter_net", Some(0.7), Some(0.3)),
        ];
        let mut reversed = readings.clone();
        reversed.reverse();
        let mut rotated = readings.clone();
        rotated.rotate_left(2);

        let consolidator = Consolidator::new("home_assistant");
        let range = DateRange::new(day(1), day(2)).unwrap();
        let expected = consolidator.aggregate(&readings, &range);

        assert_eq!(consolidator.aggregate(&reversed, &range), expected);
        assert_eq!(consolidator.aggregate(&rotated, &range), expected);
        assert_eq!(
            consolidator.reconcile_error(&reversed),
            consolidator.reconcile_error(&readings)
        );
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_missing_values_are_skipped() {
        let readings = vec![
            r(1, "a", Some(10.0), Some(1.0)),
            r(1, "b", None, Some(3.0)),
            r(1, "c", Some(20.0), None),
        ];
        let aggregates = Consolidator::new("a").aggregate(&readings, &DateRange::single(day(1)));
        let aggregate = &aggregates[0];
        assert_eq!(aggregate.mean_high, Some(15.0));
        assert_eq!(aggregate.sources_high, 2);
        assert_eq!(aggregate.mean_low, Some(2.0));
        assert_eq!(aggregate.sources_low, 2);
    }

    #[test]
    fn test_reference_absent_gives_absent_error() {
        let readings = vec![
            r(1, "ref", Some(10.0), Some(0.0)),
            r(1, "x", Some(12.0), Some(1.0)),
            r(2, "x", Some(12.0), Some(1.0)),
            r(2, "y", Some(13.0), Some(2.0)),
        ];
        let daily = Consolidator::new("ref").reconcile_error(&readings);

        assert_eq!(daily.len(), 2);
        assert_eq!(daily[1].date, day(2));
        assert_eq!(daily[1].reference_high, None);
        assert_eq!(daily[1].error_high, None);
        assert_eq!(daily[1].error_low, None);
        assert_eq!(daily[1].bounds_high(), None);
    }

    #[test]
    fn test_reference_alone_gives_absent_error() {
        let readings = vec![r(1, "ref", Some(10.0), Some(0.0))];
        let daily = Consolidator::new("ref").reconcile_error(&readings);
        assert_eq!(daily[0].reference_high, Some(10.0));
        assert_eq!(daily[0].error_high, None);
        assert_eq!(daily[0].compared_high, 0);
    }

    #[test]
    fn test_error_band_is_mean_of_absolute_deviations() {
        let readings = vec![
            r(1, "ref", Some(10.0), Some(2.0)),
            r(1, "a", Some(13.0), Some(1.0)),
            r(1, "b", Some(9.0), None),
        ];
        let consolidator = Consolidator::new("ref");

        let errors = consolidator.source_errors(&readings);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].source, "a");
        assert_eq!(errors[1].signed_error_high, Some(-1.0));
        assert_eq!(errors[1].abs_error_high, Some(1.0));

        let daily = consolidator.reconcile_error(&readings);
        // |13-10| and |9-10| → mean 2
        assert_eq!(daily[0].error_high, Some(2.0));
        assert_eq!(daily[0].compared_high, 2);
        assert_eq!(daily[0].error_low, Some(1.0));
        assert_eq!(daily[0].compared_low, 1);
        assert_eq!(daily[0].bounds_low(), Some((1.0, 3.0)));
    }

    #[test]
    fn test_complete_dates() {
        let readings = vec![
            r(1, "a", Some(1.0), Some(0.0)),
            r(1, "b", Some(1.0), Some(0.0)),
            r(2, "a", Some(1.0), Some(0.0)),
            r(3, "a", Some(1.0), Some(0.0)),
            r(3, "b", Some(1.0), None),
        ];
        assert_eq!(Consolidator::new("a").complete_dates(&readings), vec![day(1)]);
    }

    #[test]
    fn test_date_range() {
        assert!(DateRange::new(day(3), day(1)).is_err());
        let range = DateRange::new(day(1), day(3)).unwrap();
        assert_eq!(range.num_days(), 3);
        assert_eq!(range.days().collect::<Vec<_>>(), vec![day(1), day(2), day(3)]);
        assert!(range.contains(day(2)));
        assert!(!range.contains(day(4)));

        let readings = vec![r(5, "a", None, None), r(2, "b", None, None)];
        let covering = DateRange::covering(&readings).unwrap();
        assert_eq!((covering.start(), covering.end()), (day(2), day(5)));
        assert!(DateRange::covering(&[]).is_none());
    }
}
