// ⚙️ Source Configuration - tabular list of providers to capture
//
// Format (CSV with header):
//   source,url
//   stadt_reutlingen,https://www.reutlingen.de/...
//   wetter_com,pages/wetter_com.html
//
// The locator may be a URL or a local path. Rows naming an unknown
// source are skipped with a diagnostic, never fatal.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::extractor::SourceKind;

/// One row of the configuration file, as written
#[derive(Debug, Deserialize)]
struct SourceRow {
    source: String,
    url: String,
}

/// SourceDescriptor - immutable description of one provider to capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub locator: String,
    pub kind: SourceKind,
}

impl SourceDescriptor {
    pub fn new(kind: SourceKind, locator: &str) -> Self {
        SourceDescriptor {
            name: kind.code().to_string(),
            locator: locator.to_string(),
            kind,
        }
    }
}

/// A row that was not turned into a descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    pub line: usize,
    pub source: String,
    pub reason: String,
}

/// Result of loading the configuration
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    pub descriptors: Vec<SourceDescriptor>,
    pub skipped: Vec<SkippedRow>,
}

impl SourceCatalog {
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Load the source list from a CSV file
pub fn load_sources(csv_path: &Path) -> Result<SourceCatalog> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open source list: {}", csv_path.display()))?;
    read_sources(file)
}

/// Load the source list from any reader (header row required)
pub fn read_sources<R: Read>(reader: R) -> Result<SourceCatalog> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut catalog = SourceCatalog::default();

    for (index, result) in rdr.deserialize::<SourceRow>().enumerate() {
        // +2: 1-indexed plus the header row
        let line = index + 2;
        let row = result.with_context(|| format!("Failed to parse source list line {}", line))?;

        if row.url.is_empty() {
            warn!(line, source = %row.source, "source row has no locator, skipping");
            catalog.skipped.push(SkippedRow {
                line,
                source: row.source,
                reason: "missing locator".to_string(),
            });
            continue;
        }

        match SourceKind::from_code(&row.source) {
            Some(kind) => catalog
                .descriptors
                .push(SourceDescriptor::new(kind, &row.url)),
            None => {
                warn!(line, source = %row.source, "Unsupported source, skipping");
                catalog.skipped.push(SkippedRow {
                    line,
                    source: row.source,
                    reason: "unsupported source".to_string(),
                });
            }
        }
    }

    Ok(catalog)
}
