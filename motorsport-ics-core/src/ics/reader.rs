use std::io::BufReader;

use chrono::{DateTime, NaiveDateTime, Utc};
use ical::parser::ical::{IcalParser, component::IcalEvent};

use crate::{Error, Result};

/// A VEVENT read back from a calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvent {
    pub uid: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<String>,
    pub categories: Option<String>,
    pub url: Option<String>,
}

/// Calendar-level properties plus its events.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCalendar {
    pub name: Option<String>,
    pub timezone: Option<String>,
    pub events: Vec<ParsedEvent>,
}

/// Parse iCalendar text produced by [`super::CalendarSerializer::render`].
pub fn parse_calendar(ics: &str) -> Result<ParsedCalendar> {
    let mut parser = IcalParser::new(BufReader::new(ics.as_bytes()));
    let calendar = parser
        .next()
        .ok_or_else(|| Error::IcsGeneration("no VCALENDAR found".to_string()))?
        .map_err(|err| Error::IcsGeneration(format!("calendar parse failed: {}", err)))?;

    let calendar_property = |name: &str| {
        calendar
            .properties
            .iter()
            .find(|prop| prop.name.eq_ignore_ascii_case(name))
            .and_then(|prop| prop.value.clone())
    };

    let events = calendar
        .events
        .iter()
        .map(parse_event)
        .collect::<Result<Vec<_>>>()?;

    Ok(ParsedCalendar {
        name: calendar_property("X-WR-CALNAME").map(|v| unescape_text(&v)),
        timezone: calendar_property("X-WR-TIMEZONE"),
        events,
    })
}

fn parse_event(event: &IcalEvent) -> Result<ParsedEvent> {
    let required = |name: &str| {
        event_property(event, name)
            .ok_or_else(|| Error::IcsGeneration(format!("VEVENT without {}", name)))
    };

    Ok(ParsedEvent {
        uid: required("UID")?.to_string(),
        summary: unescape_text(required("SUMMARY")?),
        start: parse_utc(required("DTSTART")?)?,
        end: parse_utc(required("DTEND")?)?,
        location: event_property(event, "LOCATION").map(unescape_text),
        categories: event_property(event, "CATEGORIES").map(unescape_text),
        url: event_property(event, "URL").map(str::to_string),
    })
}

fn event_property<'a>(event: &'a IcalEvent, name: &str) -> Option<&'a str> {
    event
        .properties
        .iter()
        .find(|prop| prop.name.eq_ignore_ascii_case(name))
        .and_then(|prop| prop.value.as_deref())
}

fn parse_utc(value: &str) -> Result<DateTime<Utc>> {
    Ok(NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ")?.and_utc())
}

/// Inverse of [`super::escape_text`].
pub fn unescape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
