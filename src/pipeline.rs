// 🔄 Capture Pipeline - sources → extractors → store
//
// The only component that knows the source list. Each source is read in
// isolation: a fetch or extraction failure marks that source failed for
// the run and processing moves on. A store failure loses only that record.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SourceDescriptor;
use crate::error::{SourceError, StoreWriteError};
use crate::extractor::{get_extractor, SourceExtractor};
use crate::quality::{QualityEngine, QualityIssue};
use crate::reading::{Reading, HOME_ASSISTANT_SOURCE};
use crate::session::{FetchSession, FetchSettings};
use crate::store::{ReadingStore, RunEvent};

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceStatus {
    Stored,
    FetchFailed,
    ExtractionFailed,
    StoreFailed,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Stored => "stored",
            SourceStatus::FetchFailed => "fetch_failed",
            SourceStatus::ExtractionFailed => "extraction_failed",
            SourceStatus::StoreFailed => "store_failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        *self != SourceStatus::Stored
    }
}

/// What happened to one source during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub source: String,
    pub locator: String,
    pub status: SourceStatus,

    /// Error text for failures
    pub message: Option<String>,

    /// The reading, when extraction succeeded (even if the store then failed)
    pub reading: Option<Reading>,

    /// Append sequence, when stored
    pub seq: Option<i64>,

    pub document_sha256: Option<String>,
    pub issues: Vec<QualityIssue>,

    /// Version of the extractor that handled the source
    pub extractor_version: String,
}

impl SourceOutcome {
    fn failed(
        descriptor: &SourceDescriptor,
        extractor: &dyn SourceExtractor,
        status: SourceStatus,
        message: String,
    ) -> Self {
        SourceOutcome {
            source: descriptor.name.clone(),
            locator: descriptor.locator.clone(),
            status,
            message: Some(message),
            reading: None,
            seq: None,
            document_sha256: None,
            issues: Vec::new(),
            extractor_version: extractor.version().to_string(),
        }
    }
}

/// Outcome of one capture run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<SourceOutcome>,
}

impl RunReport {
    /// Readings that made it into the store
    pub fn stored(&self) -> Vec<&Reading> {
        self.outcomes
            .iter()
            .filter(|o| o.status == SourceStatus::Stored)
            .filter_map(|o| o.reading.as_ref())
            .collect()
    }

    /// Sources that failed, with their reasons
    pub fn failures(&self) -> Vec<&SourceOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status.is_failure())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Capture {} for {}: {} of {} sources stored, {} failed",
            self.run_id,
            self.date,
            self.stored().len(),
            self.outcomes.len(),
            self.failures().len()
        )
    }

    /// Audit-trail rows, one per source
    pub fn events(&self) -> Vec<RunEvent> {
        self.outcomes
            .iter()
            .map(|o| RunEvent {
                run_id: self.run_id,
                timestamp: self.finished_at,
                date: self.date,
                source: o.source.clone(),
                status: o.status.as_str().to_string(),
                message: o.message.clone(),
                document_sha256: o.document_sha256.clone(),
                data: serde_json::json!({
                    "locator": o.locator,
                    "high": o.reading.as_ref().and_then(|r| r.high),
                    "low": o.reading.as_ref().and_then(|r| r.low),
                    "seq": o.seq,
                    "issues": o.issues,
                    "extractor_version": o.extractor_version,
                }),
            })
            .collect()
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    descriptors: Vec<SourceDescriptor>,
    settings: FetchSettings,
    quality: QualityEngine,
}

impl Pipeline {
    pub fn new(descriptors: Vec<SourceDescriptor>, settings: FetchSettings) -> Self {
        Pipeline {
            descriptors,
            settings,
            quality: QualityEngine::new(),
        }
    }

    pub fn descriptors(&self) -> &[SourceDescriptor] {
        &self.descriptors
    }

    /// Capture every configured source for `date`
    ///
    /// Opens a fetch session for the duration of the call; it is released
    /// when this function returns, whatever the outcome.
    pub fn capture(&self, store: &mut dyn ReadingStore, date: NaiveDate) -> Result<RunReport> {
        let session = FetchSession::open(self.settings.clone())?;
        Ok(self.capture_with(&session, store, date, Uuid::new_v4()))
    }

    /// Capture with a caller-provided session
    pub fn capture_with(
        &self,
        session: &FetchSession,
        store: &mut dyn ReadingStore,
        date: NaiveDate,
        run_id: Uuid,
    ) -> RunReport {
        let started_at = Utc::now();
        info!(%run_id, %date, sources = self.descriptors.len(), "starting capture");

        let outcomes = self
            .descriptors
            .iter()
            .map(|descriptor| self.capture_source(session, store, descriptor, date, run_id))
            .collect();

        let report = RunReport {
            run_id,
            date,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        info!("{}", report.summary());
        report
    }

    fn capture_source(
        &self,
        session: &FetchSession,
        store: &mut dyn ReadingStore,
        descriptor: &SourceDescriptor,
        date: NaiveDate,
        run_id: Uuid,
    ) -> SourceOutcome {
        let extractor = get_extractor(descriptor.kind);

        let (document, values) = match extractor.read(session, &descriptor.locator) {
            Ok(result) => result,
            Err(err) => {
                let status = match err {
                    SourceError::Fetch(_) => SourceStatus::FetchFailed,
                    SourceError::Extraction(_) => SourceStatus::ExtractionFailed,
                };
                warn!(source = %descriptor.name, status = status.as_str(), error = %err, "source failed");
                return SourceOutcome::failed(
                    descriptor,
                    extractor.as_ref(),
                    status,
                    err.to_string(),
                );
            }
        };

        let reading = Reading::from_extraction(date, &descriptor.name, values);
        let issues = self.quality.check(&reading);
        for issue in &issues {
            warn!(source = %descriptor.name, field = %issue.field, "{}", issue.issue);
        }

        let mut outcome = SourceOutcome {
            source: descriptor.name.clone(),
            locator: descriptor.locator.clone(),
            status: SourceStatus::Stored,
            message: None,
            reading: None,
            seq: None,
            document_sha256: Some(document.sha256()),
            issues,
            extractor_version: extractor.version().to_string(),
        };

        match store.append(&reading, Some(run_id)) {
            Ok(seq) => {
                info!(
                    source = %descriptor.name,
                    "{:<18} → High: {}°C | Low: {}°C",
                    descriptor.name, values.high, values.low
                );
                outcome.seq = Some(seq);
            }
            Err(err) => {
                warn!(source = %descriptor.name, error = %err, "failed to store reading");
                outcome.status = SourceStatus::StoreFailed;
                outcome.message = Some(err.to_string());
            }
        }
        outcome.reading = Some(reading);
        outcome
    }
}

// ============================================================================
// UPSTREAM PRODUCER (home-automation dashboard)
// ============================================================================

/// The dashboard's statistic cards for one day
///
/// Values arrive already numeric and signed, so no digit decoding applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamReading {
    pub date: NaiveDate,
    pub high: Option<f64>,
    pub low: Option<f64>,
}

impl UpstreamReading {
    /// Reading for the day before `today` (the dashboard reports "yesterday")
    ///
    /// `None` when `today` has no previous day.
    pub fn for_yesterday(today: NaiveDate, high: Option<f64>, low: Option<f64>) -> Option<Self> {
        Some(UpstreamReading {
            date: today.pred_opt()?,
            high,
            low,
        })
    }
}

/// Store the dashboard pair under the `home_assistant` source
pub fn ingest_upstream(
    store: &mut dyn ReadingStore,
    upstream: &UpstreamReading,
) -> Result<Reading, StoreWriteError> {
    let reading = Reading::new(
        upstream.date,
        HOME_ASSISTANT_SOURCE,
        upstream.high,
        upstream.low,
    );
    let seq = store.append(&reading, None)?;
    info!(seq, date = %reading.date, "stored home-automation reading");
    Ok(reading)
}
