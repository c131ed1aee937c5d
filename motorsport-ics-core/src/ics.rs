pub mod reader;

use std::{cmp::Ordering, collections::HashMap};

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::{
    CalendarArtifact, CalendarEntry, NormalizedEvent, Result,
    config::CalendarConfig,
    text::{contains_phrase, normalize_name},
};

const UID_DOMAIN: &str = "motorsport-ics";
const MAX_LINE_OCTETS: usize = 75;

const RACE_KEYWORDS: &[&str] = &["race", "corrida", "grand prix", "gp", "feature", "sprint"];
const NON_RACE_KEYWORDS: &[&str] = &[
    "qualifying",
    "quali",
    "classificacao",
    "shootout",
    "practice",
    "treino",
    "warm up",
];

/// Turns consolidated events into a deterministic calendar.
pub struct CalendarSerializer {
    config: CalendarConfig,
    tz: Tz,
}

impl CalendarSerializer {
    pub fn new(config: CalendarConfig, tz: Tz) -> Self {
        Self { config, tz }
    }

    /// Order events, derive UIDs and split out silent entries.
    pub fn build(&self, events: &[NormalizedEvent]) -> CalendarArtifact {
        let mut ordered: Vec<&NormalizedEvent> = events.iter().collect();
        ordered.sort_by(|a, b| entry_order(a, b));

        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut entries = Vec::new();
        let mut suppressed = Vec::new();

        for event in ordered {
            let base = base_uid(event);
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            let uid = if *count == 1 {
                format!("{}@{}", base, UID_DOMAIN)
            } else {
                format!("{}-{}@{}", base, count, UID_DOMAIN)
            };

            let entry = self.entry(event, uid);
            let local = event.start.with_timezone(&self.tz).naive_local();
            let silent = self
                .config
                .silent_periods
                .iter()
                .any(|p| p.matches(local, &entry.category_code, &entry.name));

            if silent {
                tracing::debug!(uid = %entry.uid, name = %entry.name, "Entry suppressed by silent period");
                suppressed.push(entry);
            } else {
                entries.push(entry);
            }
        }

        CalendarArtifact {
            calendar_name: self.config.calendar_name.clone(),
            timezone: self.tz.name().to_string(),
            entries,
            suppressed,
        }
    }

    fn entry(&self, event: &NormalizedEvent, uid: String) -> CalendarEntry {
        let start = event.start.fixed_offset();
        let minutes = if is_race(event.name()) {
            self.config.race_duration_minutes
        } else {
            self.config.default_duration_minutes
        };

        let mut links = event.streaming_links.clone();
        links.sort();
        links.dedup();
        links.truncate(self.config.max_streaming_links);

        let mut sources = event.sources.clone();
        sources.sort();
        sources.dedup();

        CalendarEntry {
            uid,
            name: event.name().split_whitespace().collect::<Vec<_>>().join(" "),
            start,
            end: start + Duration::minutes(minutes),
            category_code: event.category.code.clone(),
            category_label: event.category.label.clone(),
            location: event.location.display(),
            streaming_links: links,
            sources,
            priority: event.priority(),
            content_id: event.id.clone(),
        }
    }

    /// Render an artifact as iCalendar text.
    pub fn render(&self, artifact: &CalendarArtifact) -> String {
        let mut ics_content = String::new();

        push_line(&mut ics_content, "BEGIN:VCALENDAR");
        push_line(&mut ics_content, "VERSION:2.0");
        push_line(&mut ics_content, "PRODID:-//Motorsport ICS//Weekend Calendar//EN");
        push_line(&mut ics_content, "CALSCALE:GREGORIAN");
        push_line(&mut ics_content, "METHOD:PUBLISH");
        if let Some(ref name) = artifact.calendar_name {
            push_line(&mut ics_content, &format!("X-WR-CALNAME:{}", escape_text(name)));
        }
        push_line(&mut ics_content, &format!("X-WR-TIMEZONE:{}", artifact.timezone));

        for entry in &artifact.entries {
            self.add_entry(&mut ics_content, entry);
        }

        push_line(&mut ics_content, "END:VCALENDAR");
        ics_content
    }

    fn add_entry(&self, ics_content: &mut String, entry: &CalendarEntry) {
        let start = utc_stamp(&entry.start);

        push_line(ics_content, "BEGIN:VEVENT");
        push_line(ics_content, &format!("UID:{}", entry.uid));
        push_line(ics_content, &format!("DTSTAMP:{}", start));
        push_line(ics_content, &format!("DTSTART:{}", start));
        push_line(ics_content, &format!("DTEND:{}", utc_stamp(&entry.end)));
        push_line(ics_content, &format!("SUMMARY:{}", escape_text(&entry.name)));
        if !entry.location.is_empty() {
            push_line(ics_content, &format!("LOCATION:{}", escape_text(&entry.location)));
        }
        push_line(
            ics_content,
            &format!("CATEGORIES:{}", escape_text(&entry.category_label)),
        );
        push_line(
            ics_content,
            &format!("DESCRIPTION:{}", escape_text(&self.description(entry))),
        );
        if let Some(link) = entry.streaming_links.first() {
            push_line(ics_content, &format!("URL:{}", link));
        }
        push_line(ics_content, "END:VEVENT");
    }

    /// Human readable description: category, streams and sources.
    pub fn description(&self, entry: &CalendarEntry) -> String {
        let mut lines = vec![format!("Category: {}", entry.category_label)];
        if !entry.streaming_links.is_empty() {
            lines.push(format!("Watch: {}", entry.streaming_links.join(" ")));
        }
        lines.push(format!("Sources: {}", entry.sources.join(", ")));
        lines.join("\n")
    }

    /// Render an artifact, suppressed entries included, as pretty JSON.
    pub fn render_json(&self, artifact: &CalendarArtifact) -> Result<String> {
        Ok(serde_json::to_string_pretty(artifact)?)
    }
}

/// Start instant, category code, name, priority (descending), content id.
fn entry_order(a: &NormalizedEvent, b: &NormalizedEvent) -> Ordering {
    a.start
        .with_timezone(&Utc)
        .cmp(&b.start.with_timezone(&Utc))
        .then_with(|| a.category.code.cmp(&b.category.code))
        .then_with(|| a.name().cmp(b.name()))
        .then_with(|| b.priority().cmp(&a.priority()))
        .then_with(|| a.id.cmp(&b.id))
}

fn base_uid(event: &NormalizedEvent) -> String {
    let key = format!(
        "{}|{}|{}",
        event.category.code,
        normalize_name(event.name()),
        event.start.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ")
    );
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

fn is_race(name: &str) -> bool {
    let name = normalize_name(name);
    RACE_KEYWORDS.iter().any(|k| contains_phrase(&name, k))
        && !NON_RACE_KEYWORDS.iter().any(|k| contains_phrase(&name, k))
}

fn utc_stamp<T: chrono::TimeZone>(at: &DateTime<T>) -> String {
    at.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ").to_string()
}

/// Escape TEXT values.
pub fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
        .replace('\r', "")
        .replace(',', "\\,")
        .replace(';', "\\;")
}

/// Append a content line folded at 75 octets, never inside a UTF-8 sequence.
fn push_line(out: &mut String, line: &str) {
    let mut budget = MAX_LINE_OCTETS;
    let mut used = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if used + len > budget {
            out.push_str("\r\n ");
            // The leading space counts toward the continuation line
            budget = MAX_LINE_OCTETS - 1;
            used = 0;
        }
        out.push(ch);
        used += len;
    }
    out.push_str("\r\n");
}

#[cfg(test)]
mod tests;
