use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::text::normalize_name;

/// Event record as extracted from a source, before any resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Name of the source that produced the record
    #[serde(default)]
    pub source: String,
    /// Free-text session name ("F1 - Qualifying")
    pub name: String,
    /// Free-text date fragment ("02/08/2025", "Sábado")
    #[serde(default)]
    pub date_text: Option<String>,
    /// Free-text time fragment ("às 14h30")
    #[serde(default)]
    pub time_text: Option<String>,
    /// Free-text venue
    #[serde(default)]
    pub location: String,
    /// Category as printed by the source, if any
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub streaming_links: Vec<String>,
    /// Priority of the producing source, higher wins
    #[serde(default)]
    pub priority: u32,
}

/// Inclusive date range a page declares it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Metadata extracted from the page or section enclosing a batch of events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    /// Programming period the page describes
    #[serde(default)]
    pub period: Option<ContextPeriod>,
    /// Section category ("Fórmula 1") shared by every event of the batch
    #[serde(default)]
    pub category_hint: Option<String>,
    /// Raw period text as printed on the page
    #[serde(default)]
    pub period_text: Option<String>,
}

/// How a category was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    RuleMatched,
    Learned,
    FuzzyMatched,
    Semantic,
    ContextInferred,
    Fallback,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::RuleMatched => "rule-matched",
            Provenance::Learned => "learned",
            Provenance::FuzzyMatched => "fuzzy-matched",
            Provenance::Semantic => "semantic",
            Provenance::ContextInferred => "context-inferred",
            Provenance::Fallback => "fallback",
        }
    }
}

/// Category decided for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResolution {
    /// Canonical code ("F1", "MOTOGP", "UNKNOWN")
    pub code: String,
    /// Display label ("Formula 1")
    pub label: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub provenance: Provenance,
}

impl CategoryResolution {
    pub const UNKNOWN_CODE: &'static str = "UNKNOWN";

    pub fn unknown() -> Self {
        Self {
            code: Self::UNKNOWN_CODE.to_string(),
            label: "Unknown".to_string(),
            confidence: 0.1,
            provenance: Provenance::Fallback,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.code == Self::UNKNOWN_CODE
    }
}

/// Venue after normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub name: String,
    pub country: Option<String>,
}

impl ResolvedLocation {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// "Venue, Country" or just the venue.
    pub fn display(&self) -> String {
        match &self.country {
            Some(country) if !self.name.is_empty() => format!("{}, {}", self.name, country),
            Some(country) => country.clone(),
            None => self.name.clone(),
        }
    }
}

/// A raw event after timestamp, category and venue resolution.
#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    pub raw: RawEvent,
    /// Session start in the configured timezone
    pub start: DateTime<Tz>,
    /// False when the time fragment was missing and midnight was assumed
    pub time_explicit: bool,
    /// True when the date came from the page context instead of the event itself
    pub from_context: bool,
    pub category: CategoryResolution,
    pub location: ResolvedLocation,
    /// Content-derived identifier, stable across runs
    pub id: String,
    /// Deduplicated, sorted streaming links (grows when duplicates merge)
    pub streaming_links: Vec<String>,
    /// Every source that reported this session (grows when duplicates merge)
    pub sources: Vec<String>,
}

impl NormalizedEvent {
    pub fn name(&self) -> &str {
        &self.raw.name
    }

    pub fn priority(&self) -> u32 {
        self.raw.priority
    }

    pub fn source(&self) -> &str {
        &self.raw.source
    }

    /// Hex SHA-256 over source, normalized name, UTC start and category code.
    pub fn content_id(source: &str, name: &str, start: &DateTime<Tz>, category_code: &str) -> String {
        let name = normalize_name(name);
        let start = start
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut hasher = Sha256::new();
        for part in [source, name.as_str(), start.as_str(), category_code] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// One VEVENT of the emitted calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub uid: String,
    pub name: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub category_code: String,
    pub category_label: String,
    pub location: String,
    pub streaming_links: Vec<String>,
    pub sources: Vec<String>,
    pub priority: u32,
    pub content_id: String,
}

/// The serialized calendar plus the entries hidden by silent periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarArtifact {
    pub calendar_name: Option<String>,
    pub timezone: String,
    /// Entries rendered into the calendar, in their deterministic order
    pub entries: Vec<CalendarEntry>,
    /// Entries matched by a silent period: reported, not rendered
    pub suppressed: Vec<CalendarEntry>,
}

impl CalendarArtifact {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.suppressed.is_empty()
    }
}
