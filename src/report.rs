// 📊 Reporting - the dataset handed to plotting consumers
//
// Everything here is derived from the materialized store at read time.
// Rows are ascending by date with stable source ordering. Absent values
// are `NaN` in CSV and `null` in JSON.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

use crate::consolidation::{Consolidator, DailyAggregate, DailyErrorBand, DateRange, ErrorBand};
use crate::deduplication;
use crate::reading::{format_value, Reading};
use crate::store::ReadingStore;

#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    pub range: DateRange,
    pub reference_source: String,

    /// Every source with at least one reading in range, sorted
    pub sources: Vec<String>,

    pub readings: Vec<Reading>,
    pub aggregates: Vec<DailyAggregate>,
    pub error_bands: Vec<DailyErrorBand>,
    pub source_errors: Vec<ErrorBand>,

    /// Days where every source reported both values
    pub complete_dates: Vec<NaiveDate>,

    /// Raw appends hidden by last-write-wins (whole store, not just the range)
    pub superseded: usize,
}

/// Materialize the store and consolidate the readings inside `range`
pub fn build_dataset(
    store: &dyn ReadingStore,
    range: &DateRange,
    reference_source: &str,
) -> Result<Dataset> {
    let raw = store.raw_records().context("Failed to read stored readings")?;
    let superseded = deduplication::superseded(&raw).len();

    let readings: Vec<Reading> = deduplication::collapse(&raw)
        .into_iter()
        .filter(|r| range.contains(r.date))
        .collect();

    let sources: Vec<String> = readings
        .iter()
        .map(|r| r.source.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let consolidator = Consolidator::new(reference_source);

    Ok(Dataset {
        range: *range,
        reference_source: reference_source.to_string(),
        sources,
        aggregates: consolidator.aggregate(&readings, range),
        error_bands: consolidator.reconcile_error(&readings),
        source_errors: consolidator.source_errors(&readings),
        complete_dates: consolidator.complete_dates(&readings),
        readings,
        superseded,
    })
}

// ============================================================================
// WRITERS
// ============================================================================

pub fn write_json<W: Write>(dataset: &Dataset, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, dataset).context("Failed to write JSON dataset")?;
    Ok(())
}

pub fn write_readings_csv<W: Write>(readings: &[Reading], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["date", "source", "high_temp", "low_temp"])?;
    for r in readings {
        wtr.write_record([
            r.date.to_string(),
            r.source.clone(),
            format_value(r.high),
            format_value(r.low),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_aggregates_csv<W: Write>(aggregates: &[DailyAggregate], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "date",
        "mean_high",
        "median_high",
        "mean_low",
        "median_low",
        "sources_high",
        "sources_low",
    ])?;
    for a in aggregates {
        wtr.write_record([
            a.date.to_string(),
            format_value(a.mean_high),
            format_value(a.median_high),
            format_value(a.mean_low),
            format_value(a.median_low),
            a.sources_high.to_string(),
            a.sources_low.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reference values with their lower/upper band, ready to plot
pub fn write_error_bands_csv<W: Write>(bands: &[DailyErrorBand], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "date",
        "reference_high",
        "error_high",
        "lower_high",
        "upper_high",
        "reference_low",
        "error_low",
        "lower_low",
        "upper_low",
    ])?;
    for b in bands {
        let (lower_high, upper_high) = split(b.bounds_high());
        let (lower_low, upper_low) = split(b.bounds_low());
        wtr.write_record([
            b.date.to_string(),
            format_value(b.reference_high),
            format_value(b.error_high),
            format_value(lower_high),
            format_value(upper_high),
            format_value(b.reference_low),
            format_value(b.error_low),
            format_value(lower_low),
            format_value(upper_low),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_source_errors_csv<W: Write>(errors: &[ErrorBand], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "date",
        "source",
        "signed_error_high",
        "abs_error_high",
        "signed_error_low",
        "abs_error_low",
    ])?;
    for e in errors {
        wtr.write_record([
            e.date.to_string(),
            e.source.clone(),
            format_value(e.signed_error_high),
            format_value(e.abs_error_high),
            format_value(e.signed_error_low),
            format_value(e.abs_error_low),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the four CSV tables into `dir`, returning the files written
pub fn write_csv_bundle(dataset: &Dataset, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let create = |name: &str| -> Result<(PathBuf, File)> {
        let path = dir.join(name);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok((path, file))
    };

    let (readings_path, file) = create("readings.csv")?;
    write_readings_csv(&dataset.readings, file)?;

    let (aggregates_path, file) = create("aggregates.csv")?;
    write_aggregates_csv(&dataset.aggregates, file)?;

    let (bands_path, file) = create("error_bands.csv")?;
    write_error_bands_csv(&dataset.error_bands, file)?;

    let (errors_path, file) = create("source_errors.csv")?;
    write_source_errors_csv(&dataset.source_errors, file)?;

    Ok(vec![readings_path, aggregates_path, bands_path, errors_path])
}

fn split(bounds: Option<(f64, f64)>) -> (Option<f64>, Option<f64>) {
    match bounds {
        Some((lower, upper)) => (Some(lower), Some(upper)),
        None => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteReadingStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn seeded_store() -> SqliteReadingStore {
        let mut store = SqliteReadingStore::open_in_memory().unwrap();
        let rows = [
            (day(1), "home_assistant", Some(10.0), Some(2.0)),
            (day(1), "wetter_com", Some(12.0), Some(1.0)),
            (day(2), "home_assistant", Some(9.0), None),
            (day(2), "wetter_com", Some(8.0), Some(0.0)),
            (day(5), "wetter_com", Some(1.0), Some(0.0)),
        ];
        for (date, source, high, low) in rows {
            store.append(&Reading::new(date, source, high, low), None).unwrap();
        }
        // rewrite: the earlier day-1 wetter_com value is superseded
        store
            .append(&Reading::new(day(1), "wetter_com", Some(12.0), Some(1.0)), None)
            .unwrap();
        store
    }

    fn range() -> DateRange {
        DateRange::new(day(1), day(3)).unwrap()
    }

    #[test]
    fn test_build_dataset_filters_range() {
        let dataset = build_dataset(&seeded_store(), &range(), "home_assistant").unwrap();

        assert_eq!(dataset.readings.len(), 4);
        assert_eq!(dataset.sources, vec!["home_assistant", "wetter_com"]);
        assert_eq!(dataset.aggregates.len(), 3);
        assert_eq!(dataset.aggregates[0].mean_high, Some(11.0));
        assert_eq!(dataset.aggregates[2].mean_high, None);
        assert_eq!(dataset.superseded, 1);
        assert_eq!(dataset.complete_dates, vec![day(1)]);
    }

    #[test]
    fn test_error_band_csv_writes_nan_for_absent() {
        let dataset = build_dataset(&seeded_store(), &range(), "home_assistant").unwrap();

        let mut out = Vec::new();
        write_error_bands_csv(&dataset.error_bands, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "2024-01-01,10,2,8,12,2,1,1,3");
        assert!(lines[2].starts_with("2024-01-02,9,1,8,10,NaN,NaN,NaN,NaN"));
    }

    #[test]
    fn test_json_uses_null_for_absent() {
        let dataset = build_dataset(&seeded_store(), &range(), "home_assistant").unwrap();

        let mut out = Vec::new();
        write_json(&dataset, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["reference_source"], "home_assistant");
        assert!(value["aggregates"][2]["mean_high"].is_null());
        assert_eq!(value["aggregates"][0]["median_high"], 11.0);
    }

    #[test]
    fn test_csv_bundle_writes_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = build_dataset(&seeded_store(), &range(), "home_assistant").unwrap();

        let written = write_csv_bundle(&dataset, dir.path()).unwrap();
        assert_eq!(written.len(), 4);
        for path in &written {
            assert!(path.exists());
        }

        let readings = fs::read_to_string(dir.path().join("readings.csv")).unwrap();
        assert!(readings.contains("2024-01-02,home_assistant,9,NaN"));
    }
}
