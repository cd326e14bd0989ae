// Weather Consensus - Core Library
// Exposes all modules for use in the CLI and tests

pub mod config;         // Source list (CSV)
pub mod consolidation;  // Mean/median aggregates and error bands
pub mod deduplication;  // Last-write-wins over raw appends
pub mod error;          // Typed error taxonomy
pub mod extractor;      // One extractor per weather provider
pub mod pipeline;       // Capture runs with per-source isolation
pub mod quality;        // Plausibility checks
pub mod reading;        // Reading record
pub mod report;         // Dataset and CSV/JSON writers
pub mod session;        // HTTP client lifetime
pub mod store;          // Append-only SQLite store

// Re-export commonly used types
pub use config::{load_sources, read_sources, SkippedRow, SourceCatalog, SourceDescriptor};
pub use consolidation::{
    mean, median, Consolidator, DailyAggregate, DailyErrorBand, DateRange, ErrorBand,
};
pub use deduplication::{collapse, superseded, DuplicateMatch};
pub use error::{ConsolidationError, ExtractionError, FetchError, SourceError, StoreWriteError};
pub use extractor::{
    decode_digits, get_extractor, SourceExtractor, SourceKind,
    StadtReutlingenExtractor, WetterComExtractor, WetterNetExtractor,
};
pub use pipeline::{
    ingest_upstream, Pipeline, RunReport, SourceOutcome, SourceStatus, UpstreamReading,
};
pub use quality::{QualityEngine, QualityIssue, Severity};
pub use reading::{HighLow, Reading, HOME_ASSISTANT_SOURCE};
pub use report::{build_dataset, Dataset};
pub use session::{Document, FetchSession, FetchSettings};
pub use store::{RawRecord, ReadingStore, RunEvent, SqliteReadingStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
