//! Fixtures shared by unit tests.

use chrono::{DateTime, Duration, TimeZone};
use chrono_tz::Tz;

use crate::{CategoryResolution, NormalizedEvent, Provenance, RawEvent, ResolvedLocation};

pub const TZ: Tz = chrono_tz::America::Sao_Paulo;

/// Saturday 2025-08-02 14:00 in São Paulo, shifted by `minutes`.
pub fn at(minutes: i64) -> DateTime<Tz> {
    TZ.with_ymd_and_hms(2025, 8, 2, 14, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub fn category(code: &str, label: &str) -> CategoryResolution {
    CategoryResolution {
        code: code.to_string(),
        label: label.to_string(),
        confidence: 1.0,
        provenance: Provenance::RuleMatched,
    }
}

/// Normalized event with an unknown category and no venue.
pub fn event(source: &str, name: &str, minutes: i64, priority: u32) -> NormalizedEvent {
    let start = at(minutes);
    let raw = RawEvent {
        source: source.to_string(),
        name: name.to_string(),
        date_text: Some(start.format("%d/%m/%Y").to_string()),
        time_text: Some(start.format("%H:%M").to_string()),
        location: String::new(),
        category: None,
        streaming_links: Vec::new(),
        priority,
    };
    let category = CategoryResolution::unknown();
    NormalizedEvent {
        id: NormalizedEvent::content_id(source, name, &start, &category.code),
        raw,
        start,
        time_explicit: true,
        from_context: false,
        category,
        location: ResolvedLocation::default(),
        streaming_links: Vec::new(),
        sources: vec![source.to_string()],
    }
}

/// Normalized event in a known category.
pub fn categorized(
    source: &str,
    name: &str,
    minutes: i64,
    priority: u32,
    code: &str,
    label: &str,
) -> NormalizedEvent {
    let mut e = event(source, name, minutes, priority);
    e.category = category(code, label);
    e.id = NormalizedEvent::content_id(source, name, &e.start, code);
    e
}
