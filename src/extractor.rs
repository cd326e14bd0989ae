// 🏗️ Extractor Framework
// Polymorphic extractors, one per weather provider
//
// Every extractor maps one document to one (high, low) pair or fails.
// The location rule differs per provider; the decoding rule is shared.

use std::fmt;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ExtractionError, FetchError, SourceError};
use crate::reading::HighLow;
use crate::session::{Document, FetchSession};

// ============================================================================
// CORE TYPES
// ============================================================================

/// SourceKind - which provider a document comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceKind {
    StadtReutlingen,
    WetterCom,
    WetterNet,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [
        SourceKind::StadtReutlingen,
        SourceKind::WetterCom,
        SourceKind::WetterNet,
    ];

    /// Configuration code, also the source name readings are stored under
    pub fn code(&self) -> &'static str {
        match self {
            SourceKind::StadtReutlingen => "stadt_reutlingen",
            SourceKind::WetterCom => "wetter_com",
            SourceKind::WetterNet => "wetter_net",
        }
    }

    /// Registry lookup by configuration code
    pub fn from_code(code: &str) -> Option<SourceKind> {
        let code = code.trim();
        SourceKind::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// EXTRACTOR TRAIT
// ============================================================================

/// SourceExtractor - the capability every provider variant implements
///
/// Adding a provider means a new `SourceKind` variant, a new type
/// implementing this trait and one arm in `get_extractor`. Nothing shared
/// changes.
pub trait SourceExtractor: Send + Sync {
    /// Which provider this extractor reads
    fn kind(&self) -> SourceKind;

    /// Pull the (high, low) pair out of a document
    ///
    /// Atomic: either both values decode or an error is returned.
    fn extract(&self, document: &Document) -> Result<HighLow, ExtractionError>;

    /// Load the document for `locator` (local path if it exists, else HTTP GET)
    fn fetch(&self, session: &FetchSession, locator: &str) -> Result<Document, FetchError> {
        session.fetch(locator)
    }

    /// Fetch then extract, returning the document alongside the pair
    fn read(
        &self,
        session: &FetchSession,
        locator: &str,
    ) -> Result<(Document, HighLow), SourceError> {
        let document = self.fetch(session, locator)?;
        let values = self.extract(&document)?;
        Ok((document, values))
    }

    /// Extractor version, logged with every capture outcome
    fn version(&self) -> &str {
        "1.0.0"
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Get the extractor for a provider
///
/// ```
/// use weather_consensus::extractor::{get_extractor, SourceKind};
///
/// let extractor = get_extractor(SourceKind::WetterCom);
/// assert_eq!(extractor.kind(), SourceKind::WetterCom);
/// ```
pub fn get_extractor(kind: SourceKind) -> Box<dyn SourceExtractor> {
    match kind {
        SourceKind::StadtReutlingen => Box::new(StadtReutlingenExtractor::new()),
        SourceKind::WetterCom => Box::new(WetterComExtractor::new()),
        SourceKind::WetterNet => Box::new(WetterNetExtractor::new()),
    }
}

// ============================================================================
// SHARED DECODING
// ============================================================================

/// Keep only the decimal digits of `text` and parse them as an integer
///
/// Survives unit suffixes and locale punctuation ("12 °C", "12°") but
/// drops the sign: "−3°C" decodes to 3. Returns `None` when no digit is
/// present or the digits overflow.
pub fn decode_digits(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// True if the text carries a minus sign the digit decoder will discard
pub fn has_minus_sign(text: &str) -> bool {
    text.chars().any(|c| matches!(c, '-' | '\u{2212}' | '\u{2013}'))
}

fn parse_selector(rule: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(rule).map_err(|e| ExtractionError::Selector {
        rule: rule.to_string(),
        message: e.to_string(),
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn decode_element(kind: SourceKind, element: ElementRef<'_>) -> Result<i64, ExtractionError> {
    let text = element_text(element);

    if has_minus_sign(&text) {
        warn!(
            source = kind.code(),
            text = %text,
            "temperature text carries a minus sign that digit decoding drops"
        );
    }

    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(ExtractionError::NoDigits {
            provider: kind,
            text,
        });
    }
    decode_digits(&digits).ok_or(ExtractionError::OutOfRange {
        provider: kind,
        digits,
    })
}

/// Decode the first element matching each of two rules (high rule, low rule)
fn extract_marker_pair(
    kind: SourceKind,
    document: &Document,
    high_rule: &str,
    low_rule: &str,
) -> Result<HighLow, ExtractionError> {
    let html = Html::parse_document(&document.body);
    let high_selector = parse_selector(high_rule)?;
    let low_selector = parse_selector(low_rule)?;

    let high_el = html
        .select(&high_selector)
        .next()
        .ok_or_else(|| ExtractionError::MissingElement {
            provider: kind,
            rule: high_rule.to_string(),
        })?;
    let low_el = html
        .select(&low_selector)
        .next()
        .ok_or_else(|| ExtractionError::MissingElement {
            provider: kind,
            rule: low_rule.to_string(),
        })?;

    let high = decode_element(kind, high_el)?;
    let low = decode_element(kind, low_el)?;
    Ok(HighLow::new(high, low))
}

// ============================================================================
// STADT REUTLINGEN
// ============================================================================

/// Stadt Reutlingen city weather widget
///
/// `<span class="hitWeather_averageTempMax">` holds the high,
/// `<span class="hitWeather_averageTempMin">` the low.
pub struct StadtReutlingenExtractor;

impl StadtReutlingenExtractor {
    pub const HIGH_RULE: &'static str = "span.hitWeather_averageTempMax";
    pub const LOW_RULE: &'static str = "span.hitWeather_averageTempMin";

    pub fn new() -> Self {
        StadtReutlingenExtractor
    }
}

impl Default for StadtReutlingenExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for StadtReutlingenExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::StadtReutlingen
    }

    fn extract(&self, document: &Document) -> Result<HighLow, ExtractionError> {
        extract_marker_pair(self.kind(), document, Self::HIGH_RULE, Self::LOW_RULE)
    }
}

// ============================================================================
// WETTER.COM
// ============================================================================

/// wetter.com forecast navigation
pub struct WetterComExtractor;

impl WetterComExtractor {
    pub const HIGH_RULE: &'static str = "span.forecast-navigation-temperature-max";
    pub const LOW_RULE: &'static str = "span.forecast-navigation-temperature-min";

    pub fn new() -> Self {
        WetterComExtractor
    }
}

impl Default for WetterComExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for WetterComExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::WetterCom
    }

    fn extract(&self, document: &Document) -> Result<HighLow, ExtractionError> {
        extract_marker_pair(self.kind(), document, Self::HIGH_RULE, Self::LOW_RULE)
    }
}

// ============================================================================
// WETTER.NET
// ============================================================================

/// wetter.net today panel
///
/// High and low share the same markup: `<h2>` headings carrying any of
/// the classes `white`, `center`, `tempText`, `todayText`. The first match
/// in document order is the high, the second the low.
pub struct WetterNetExtractor;

impl WetterNetExtractor {
    pub const TEMP_RULE: &'static str = "h2.white, h2.center, h2.tempText, h2.todayText";

    pub fn new() -> Self {
        WetterNetExtractor
    }
}

impl Default for WetterNetExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for WetterNetExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::WetterNet
    }

    fn extract(&self, document: &Document) -> Result<HighLow, ExtractionError> {
        let html = Html::parse_document(&document.body);
        let selector = parse_selector(Self::TEMP_RULE)?;
        let tags: Vec<ElementRef<'_>> = html.select(&selector).take(2).collect();

        if tags.len() < 2 {
            return Err(ExtractionError::MissingElement {
                provider: self.kind(),
                rule: format!("{} (need 2, found {})", Self::TEMP_RULE, tags.len()),
            });
        }

        let high = decode_element(self.kind(), tags[0])?;
        let low = decode_element(self.kind(), tags[1])?;
        Ok(HighLow::new(high, low))
    }
}

// ============================================================================
// TESTS
// ============================================================================
