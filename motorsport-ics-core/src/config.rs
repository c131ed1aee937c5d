//! Typed pipeline configuration.
//!
//! Every option has a named field and a default; `validate` runs once before
//! any collection starts and is the only place configuration errors surface.

use std::{collections::HashSet, fs, path::Path, path::PathBuf, time::Duration};

use chrono::{NaiveDateTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// Upper bounds keep durations representable and runs finite
const MAX_SECONDS: u64 = 24 * 60 * 60;
const MAX_RETRIES: u32 = 20;
const MAX_RETRY_DELAY_MS: u64 = 10 * 60 * 1000;
const MAX_TOLERANCE_MINUTES: i64 = 24 * 60;
const MAX_DURATION_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Sources fetched in parallel; the rest queue
    pub max_concurrency: usize,
    /// Retries after the first attempt, transient failures only
    pub max_retries: u32,
    /// Linear backoff step: attempt n waits n * retry_delay
    pub retry_delay_ms: u64,
    /// Per-attempt timeout unless the source overrides it
    pub source_timeout_secs: u64,
    /// Global collection deadline
    pub deadline_secs: u64,
}

impl CollectionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_retries: 2,
            retry_delay_ms: 500,
            source_timeout_secs: 30,
            deadline_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub first_day: Weekday,
    pub last_day: Weekday,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            first_day: Weekday::Fri,
            last_day: Weekday::Sun,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Minimum score for a fuzzy alias match
    pub fuzzy_threshold: f64,
    pub semantic_enabled: bool,
    /// Minimum oracle score for a semantic match
    pub semantic_threshold: f64,
    /// Where learned name → category mappings persist between runs
    pub learned_store_path: Option<PathBuf>,
    /// Extra categories (JSON list) merged over the built-in table
    pub categories_path: Option<PathBuf>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.85,
            semantic_enabled: false,
            semantic_threshold: 0.8,
            learned_store_path: None,
            categories_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Only events this close in time are compared
    pub time_tolerance_minutes: i64,
    /// Minimum name similarity for two events to be duplicates
    pub name_threshold: f64,
    /// Share of the semantic score in the blended similarity when an oracle is present
    pub semantic_weight: f64,
    /// Veto merges between events whose venues are both known and differ
    pub require_location_match: bool,
}

impl DedupConfig {
    pub fn time_tolerance(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.time_tolerance_minutes)
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            time_tolerance_minutes: 30,
            name_threshold: 0.85,
            semantic_weight: 0.3,
            require_location_match: false,
        }
    }
}

/// Hides matching entries from the rendered calendar without dropping them from reports.
///
/// Every populated criterion must match. A period with no criteria matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SilentPeriod {
    /// Category codes, case-insensitive
    pub categories: Vec<String>,
    /// Local start of the silent range, inclusive
    pub from: Option<NaiveDateTime>,
    /// Local end of the silent range, inclusive
    pub until: Option<NaiveDateTime>,
    /// Case-insensitive substring of the session name
    pub name_contains: Option<String>,
}

impl SilentPeriod {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
            && self.from.is_none()
            && self.until.is_none()
            && self.name_contains.is_none()
    }

    pub fn matches(&self, local_start: NaiveDateTime, category_code: &str, name: &str) -> bool {
        if self.is_empty() {
            return false;
        }
        if !self.categories.is_empty()
            && !self
                .categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(category_code))
        {
            return false;
        }
        if self.from.is_some_and(|from| local_start < from) {
            return false;
        }
        if self.until.is_some_and(|until| local_start > until) {
            return false;
        }
        if let Some(ref needle) = self.name_contains {
            if !name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub calendar_name: Option<String>,
    /// Streaming links kept per entry
    pub max_streaming_links: usize,
    pub default_duration_minutes: i64,
    pub race_duration_minutes: i64,
    pub silent_periods: Vec<SilentPeriod>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            calendar_name: Some("Motorsport Weekend".to_string()),
            max_streaming_links: 3,
            default_duration_minutes: 60,
            race_duration_minutes: 120,
            silent_periods: Vec::new(),
        }
    }
}

/// A JSON feed to collect from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// IANA timezone identifier all timestamps are resolved in
    pub timezone: String,
    pub collection: CollectionConfig,
    pub window: WindowConfig,
    pub classification: ClassificationConfig,
    pub dedup: DedupConfig,
    pub calendar: CalendarConfig,
    pub sources: Vec<SourceConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timezone: "America/Sao_Paulo".to_string(),
            collection: CollectionConfig::default(),
            window: WindowConfig::default(),
            classification: ClassificationConfig::default(),
            dedup: DedupConfig::default(),
            calendar: CalendarConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read configuration {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// The configured timezone.
    pub fn tz(&self) -> Result<Tz> {
        parse_timezone(&self.timezone)
    }

    pub fn validate(&self) -> Result<()> {
        self.tz()?;

        let c = &self.collection;
        if c.max_concurrency == 0 {
            return Err(Error::Config("collection.max_concurrency must be > 0".to_string()));
        }
        if c.source_timeout_secs == 0 {
            return Err(Error::Config(
                "collection.source_timeout_secs must be > 0".to_string(),
            ));
        }
        if c.deadline_secs == 0 {
            return Err(Error::Config("collection.deadline_secs must be > 0".to_string()));
        }
        check_max("collection.source_timeout_secs", c.source_timeout_secs, MAX_SECONDS)?;
        check_max("collection.deadline_secs", c.deadline_secs, MAX_SECONDS)?;
        check_max("collection.max_retries", c.max_retries, MAX_RETRIES)?;
        check_max("collection.retry_delay_ms", c.retry_delay_ms, MAX_RETRY_DELAY_MS)?;

        let cl = &self.classification;
        check_unit("classification.fuzzy_threshold", cl.fuzzy_threshold)?;
        check_unit("classification.semantic_threshold", cl.semantic_threshold)?;

        let d = &self.dedup;
        check_unit("dedup.name_threshold", d.name_threshold)?;
        check_unit("dedup.semantic_weight", d.semantic_weight)?;
        if d.time_tolerance_minutes < 0 {
            return Err(Error::Config(
                "dedup.time_tolerance_minutes must not be negative".to_string(),
            ));
        }
        check_max(
            "dedup.time_tolerance_minutes",
            d.time_tolerance_minutes,
            MAX_TOLERANCE_MINUTES,
        )?;

        let cal = &self.calendar;
        if cal.max_streaming_links == 0 {
            return Err(Error::Config(
                "calendar.max_streaming_links must be > 0".to_string(),
            ));
        }
        if cal.default_duration_minutes <= 0 || cal.race_duration_minutes <= 0 {
            return Err(Error::Config(
                "calendar session durations must be > 0".to_string(),
            ));
        }
        check_max(
            "calendar.default_duration_minutes",
            cal.default_duration_minutes,
            MAX_DURATION_MINUTES,
        )?;
        check_max(
            "calendar.race_duration_minutes",
            cal.race_duration_minutes,
            MAX_DURATION_MINUTES,
        )?;
        for (i, period) in cal.silent_periods.iter().enumerate() {
            if let (Some(from), Some(until)) = (period.from, period.until) {
                if from > until {
                    return Err(Error::Config(format!(
                        "calendar.silent_periods[{}]: from is after until",
                        i
                    )));
                }
            }
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(Error::Config("source name must not be empty".to_string()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(Error::Config(format!("duplicate source name: {}", source.name)));
            }
            if source.timeout_secs == Some(0) {
                return Err(Error::Config(format!(
                    "source {}: timeout_secs must be > 0",
                    source.name
                )));
            }
            if let Some(timeout) = source.timeout_secs {
                check_max(&format!("source {}: timeout_secs", source.name), timeout, MAX_SECONDS)?;
            }
        }

        Ok(())
    }
}

/// Resolve an IANA timezone identifier.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| Error::Config(format!("Invalid timezone '{}': {}", name, e)))
}

fn check_max<T: PartialOrd + std::fmt::Display>(field: &str, value: T, max: T) -> Result<()> {
    if value <= max {
        Ok(())
    } else {
        Err(Error::Config(format!("{} must be <= {}, got {}", field, max, value)))
    }
}

fn check_unit(field: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} must be within [0, 1], got {}",
            field, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tz().unwrap(), chrono_tz::America::Sao_Paulo);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "timezone": "Europe/Lisbon",
                "dedup": { "name_threshold": 0.9 },
                "window": { "first_day": "Thu", "last_day": "Mon" },
                "sources": [{ "name": "feed-a", "url": "http://localhost/a.json", "priority": 2 }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.dedup.name_threshold, 0.9);
        assert_eq!(config.dedup.time_tolerance_minutes, 30);
        assert_eq!(config.window.first_day, Weekday::Thu);
        assert_eq!(config.window.last_day, Weekday::Mon);
        assert_eq!(config.sources[0].priority, 2);
        assert_eq!(config.collection.max_retries, 2);
    }

    #[test]
    fn invalid_timezone_is_fatal() {
        let config = PipelineConfig {
            timezone: "Mars/Olympus_Mons".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn threshold_out_of_range_is_fatal() {
        let mut config = PipelineConfig::default();
        config.dedup.name_threshold = 1.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PipelineConfig::default();
        config.classification.fuzzy_threshold = -0.1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn oversized_values_are_fatal() {
        let cases: [fn(&mut PipelineConfig); 8] = [
            |c| c.dedup.time_tolerance_minutes = i64::MAX,
            |c| c.calendar.default_duration_minutes = i64::MAX,
            |c| c.calendar.race_duration_minutes = 100_000,
            |c| c.collection.retry_delay_ms = u64::MAX,
            |c| c.collection.max_retries = u32::MAX,
            |c| c.collection.deadline_secs = u64::MAX,
            |c| c.collection.source_timeout_secs = 1_000_000,
            |c| {
                c.sources = vec![SourceConfig {
                    name: "slow".to_string(),
                    url: "http://localhost".to_string(),
                    description: None,
                    priority: 1,
                    timeout_secs: Some(u64::MAX),
                }]
            },
        ];
        for apply in cases {
            let mut config = PipelineConfig::default();
            apply(&mut config);
            assert!(matches!(config.validate(), Err(Error::Config(_))));
        }

        let mut config = PipelineConfig::default();
        config.dedup.time_tolerance_minutes = 24 * 60;
        config.collection.deadline_secs = 24 * 60 * 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn duplicate_sources_rejected() {
        let mut config = PipelineConfig::default();
        let source = SourceConfig {
            name: "a".to_string(),
            url: "http://localhost".to_string(),
            description: None,
            priority: 1,
            timeout_secs: None,
        };
        config.sources = vec![source.clone(), source];
        assert!(config.validate().is_err());
    }

    #[test]
    fn silent_period_matching() {
        let at = NaiveDate::from_ymd_opt(2025, 8, 2)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap();
        let period = SilentPeriod {
            categories: vec!["f1".to_string()],
            from: Some(at - chrono::Duration::hours(1)),
            until: Some(at + chrono::Duration::hours(1)),
            name_contains: None,
        };
        assert!(period.matches(at, "F1", "F1 Qualifying"));
        assert!(!period.matches(at, "F2", "F2 Qualifying"));
        assert!(!period.matches(at + chrono::Duration::hours(2), "F1", "F1 Race"));
        assert!(!SilentPeriod::default().matches(at, "F1", "F1 Race"));
    }
}
