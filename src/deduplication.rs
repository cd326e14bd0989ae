// 🔍 Deduplication - last-write-wins over raw appends
//
// The store never rejects a write. Repeated runs for the same day simply
// append again, and the duplicate is resolved here, at read time: for
// each (date, source) key the record with the highest append sequence wins.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::reading::Reading;
use crate::store::RawRecord;

// ============================================================================
// DUPLICATE MATCH RESULT
// ============================================================================

/// A raw record that lost to a later append for the same key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub date: NaiveDate,
    pub source: String,

    /// Sequence of the record that survives
    pub kept_seq: i64,

    /// Sequence of the record that was superseded
    pub superseded_seq: i64,

    /// True when the superseded record carried different values
    pub values_changed: bool,

    /// Human-readable reason
    pub reason: String,
}

// ============================================================================
// COLLAPSE
// ============================================================================

/// Latest record per (date, source), keyed and ordered by date then source
fn latest_by_key(records: &[RawRecord]) -> BTreeMap<(NaiveDate, &str), &RawRecord> {
    let mut latest: BTreeMap<(NaiveDate, &str), &RawRecord> = BTreeMap::new();

    for record in records {
        latest
            .entry(record.reading.key())
            .and_modify(|kept| {
                if record.seq > kept.seq {
                    *kept = record;
                }
            })
            .or_insert(record);
    }

    latest
}

/// Deduplicated view of a set of raw appends
///
/// At most one reading per (date, source), the one with the greatest
/// `seq`. Sorted ascending by date, then by source name.
pub fn collapse(records: &[RawRecord]) -> Vec<Reading> {
    latest_by_key(records)
        .into_values()
        .map(|record| record.reading.clone())
        .collect()
}

/// Every raw record that `collapse` discards, with the record that beat it
pub fn superseded(records: &[RawRecord]) -> Vec<DuplicateMatch> {
    let latest = latest_by_key(records);

    let mut matches: Vec<DuplicateMatch> = records
        .iter()
        .filter_map(|record| {
            let kept = latest.get(&record.reading.key())?;
            if kept.seq == record.seq {
                return None;
            }
            let values_changed = kept.reading != record.reading;
            Some(DuplicateMatch {
                date: record.reading.date,
                source: record.reading.source.clone(),
                kept_seq: kept.seq,
                superseded_seq: record.seq,
                values_changed,
                reason: if values_changed {
                    format!(
                        "Rewritten: {} | {} superseded by seq {}",
                        record.reading.date, record.reading.source, kept.seq
                    )
                } else {
                    format!(
                        "Repeated: {} | {} identical to seq {}",
                        record.reading.date, record.reading.source, kept.seq
                    )
                },
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        (a.date, &a.source, a.superseded_seq).cmp(&(b.date, &b.source, b.superseded_seq))
    });
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn raw(seq: i64, date: NaiveDate, source: &str, high: Option<f64>) -> RawRecord {
        RawRecord {
            seq,
            reading: Reading::new(date, source, high, Some(1.0)),
            recorded_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            run_id: None,
        }
    }

    #[test]
    fn test_collapse_keeps_latest_per_key() {
        let records = vec![
            raw(1, day(1), "wetter_com", Some(10.0)),
            raw(2, day(1), "wetter_net", Some(11.0)),
            raw(3, day(1), "wetter_com", Some(12.0)),
        ];

        let readings = collapse(&records);
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].source, "wetter_com");
        assert_eq!(readings[0].high, Some(12.0));
        assert_eq!(readings[1].source, "wetter_net");
    }

    #[test]
    fn test_collapse_uses_seq_not_slice_position() {
        let records = vec![
            raw(5, day(1), "wetter_com", Some(15.0)),
            raw(2, day(1), "wetter_com", Some(2.0)),
        ];
        assert_eq!(collapse(&records)[0].high, Some(15.0));
    }

    #[test]
    fn test_collapse_orders_by_date_then_source() {
        let records = vec![
            raw(1, day(3), "a", Some(1.0)),
            raw(2, day(1), "b", Some(1.0)),
            raw(3, day(1), "a", Some(1.0)),
        ];
        let keys: Vec<(NaiveDate, String)> = collapse(&records)
            .into_iter()
            .map(|r| (r.date, r.source))
            .collect();
        assert_eq!(
            keys,
            vec![
                (day(1), "a".to_string()),
                (day(1), "b".to_string()),
                (day(3), "a".to_string())
            ]
        );
    }

    #[test]
    fn test_superseded_reports_losers() {
        let records = vec![
            raw(1, day(1), "wetter_com", Some(10.0)),
            raw(2, day(1), "wetter_com", Some(10.0)),
            raw(3, day(1), "wetter_com", Some(13.0)),
        ];

        let lost = superseded(&records);
        assert_eq!(lost.len(), 2);
        assert!(lost.iter().all(|m| m.kept_seq == 3));
        assert_eq!(lost[0].superseded_seq, 1);
        assert!(lost[0].values_changed);
        assert!(lost[0].reason.starts_with("Rewritten"));
    }

    #[test]
    fn test_superseded_empty_without_duplicates() {
        let records = vec![raw(1, day(1), "a", None), raw(2, day(2), "a", None)];
        assert!(superseded(&records).is_empty());
    }
}
