//! Mixed-format date and time resolution.
//!
//! Listings mostly come from day/month/year locales, so numeric dates are read
//! day-first. An ISO `YYYY-MM-DD` match is tried before anything else: a string
//! like `2025-08-02` is always August 2nd.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;
use regex::Regex;

use crate::{ContextPeriod, Error, PageContext, Result, text::fold_accents};

// Text is folded to lowercase before matching, so the ISO "T" separator is "t"
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})(?:t|\b)").expect("valid regex"));

static YEAR_FIRST_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})[/.](\d{1,2})[/.](\d{1,2})\b").expect("valid regex"));

static DAY_FIRST_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4}|\d{2})\b").expect("valid regex")
});

static DAY_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})[/.](\d{1,2})\b").expect("valid regex"));

static TEXTUAL_DAY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})o?\s*(?:de\s+)?([a-z]{3,})\.?,?(?:\s*(?:de\s+)?(\d{4}))?")
        .expect("valid regex")
});

static TEXTUAL_MONTH_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([a-z]{3,})\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b,?(?:\s*(\d{4}))?")
        .expect("valid regex")
});

static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\b|t)(\d{1,2}):(\d{2})(?:\s*(am|pm)\b)?").expect("valid regex")
});

static HOUR_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})\s*(?:horas?|hrs?|h)(?:\s*(\d{2}))?(?:\s*min)?\b")
        .expect("valid regex")
});

static MERIDIEM_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\s*(am|pm)\b").expect("valid regex"));

static DAY_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})\s*(?:a|e|ate|to|-|–)\s*(\d{1,2})\s*(?:de\s+)?([a-z]{3,})\.?(?:\s*(?:de\s+)?(\d{4}))?")
        .expect("valid regex")
});

const MONTHS: [(&str, &str, u32); 12] = [
    ("janeiro", "january", 1),
    ("fevereiro", "february", 2),
    ("marco", "march", 3),
    ("abril", "april", 4),
    ("maio", "may", 5),
    ("junho", "june", 6),
    ("julho", "july", 7),
    ("agosto", "august", 8),
    ("setembro", "september", 9),
    ("outubro", "october", 10),
    ("novembro", "november", 11),
    ("dezembro", "december", 12),
];

const WEEKDAYS: [(&str, &str, Weekday); 7] = [
    ("segunda", "monday", Weekday::Mon),
    ("terca", "tuesday", Weekday::Tue),
    ("quarta", "wednesday", Weekday::Wed),
    ("quinta", "thursday", Weekday::Thu),
    ("sexta", "friday", Weekday::Fri),
    ("sabado", "saturday", Weekday::Sat),
    ("domingo", "sunday", Weekday::Sun),
];

/// Month number for a Portuguese or English month name or abbreviation ("ago", "Aug.", "março").
fn month_from_name(word: &str) -> Option<u32> {
    let word = word.trim_end_matches('.');
    if word.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .find(|(pt, en, _)| pt.starts_with(word) || en.starts_with(word))
        .map(|(_, _, n)| *n)
}

/// Weekday named anywhere in already-folded text.
fn weekday_in(folded: &str) -> Option<Weekday> {
    for token in folded.split(|c: char| !c.is_alphanumeric()) {
        if token.len() < 3 {
            continue;
        }
        for (pt, en, day) in WEEKDAYS {
            if pt.starts_with(token) || en.starts_with(token) || token.starts_with(pt) {
                return Some(day);
            }
        }
    }
    None
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    if raw.len() == 2 { Some(2000 + year) } else { Some(year) }
}

/// Timestamp produced by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTime {
    pub at: DateTime<Tz>,
    /// Date inferred from the page context rather than the event itself
    pub from_context: bool,
    /// False when no time was given and midnight was assumed
    pub time_explicit: bool,
}

/// Turns free-text date/time fragments into timezone-aware timestamps.
#[derive(Debug, Clone)]
pub struct DateTimeResolver {
    tz: Tz,
    reference: NaiveDate,
}

impl DateTimeResolver {
    /// `reference` supplies the year for year-less dates when no context period exists.
    pub fn new(tz: Tz, reference: NaiveDate) -> Self {
        Self { tz, reference }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn reference(&self) -> NaiveDate {
        self.reference
    }

    /// Resolve one event's fragments, falling back to the page context for the date.
    pub fn resolve(
        &self,
        date_text: Option<&str>,
        time_text: Option<&str>,
        context: &PageContext,
    ) -> Result<ResolvedTime> {
        let date_text = date_text.map(str::trim).filter(|s| !s.is_empty());
        let time_text = time_text.map(str::trim).filter(|s| !s.is_empty());

        let time = match time_text {
            Some(text) => Some(
                Self::parse_time(text)
                    .ok_or_else(|| Error::UnresolvedDate(format!("unrecognized time '{}'", text)))?,
            ),
            None => date_text.and_then(Self::parse_time),
        };

        let period = context.period.as_ref();
        let (date, from_context) = match date_text {
            Some(text) => match self.parse_date(text, period) {
                Some(date) => (date, false),
                None => {
                    let folded = fold_accents(text);
                    match (weekday_in(&folded), period) {
                        (Some(day), Some(period)) => {
                            let date = Self::weekday_in_period(day, period).ok_or_else(|| {
                                Error::UnresolvedDate(format!(
                                    "'{}' does not fall inside {} – {}",
                                    text, period.start, period.end
                                ))
                            })?;
                            (date, true)
                        }
                        (None, Some(period)) if !text.chars().any(|c| c.is_ascii_digit()) => {
                            (period.start, true)
                        }
                        _ => {
                            return Err(Error::UnresolvedDate(format!(
                                "unrecognized date '{}'",
                                text
                            )));
                        }
                    }
                }
            },
            None => match period {
                Some(period) => (period.start, true),
                None => {
                    return Err(Error::UnresolvedDate(
                        "no date on the event and no period in its context".to_string(),
                    ));
                }
            },
        };

        let at = self.localize(date.and_time(time.unwrap_or(NaiveTime::MIN)))?;
        Ok(ResolvedTime {
            at,
            from_context,
            time_explicit: time.is_some(),
        })
    }

    /// Parse an explicit date, trying ISO and year-first forms before day-first
    /// numeric, textual and year-less ones.
    pub fn parse_date(&self, text: &str, period: Option<&ContextPeriod>) -> Option<NaiveDate> {
        let folded = fold_accents(text);

        if let Some(caps) = ISO_DATE.captures(&folded) {
            let year = caps[1].parse().ok()?;
            let month = caps[2].parse().ok()?;
            let day = caps[3].parse().ok()?;
            return NaiveDate::from_ymd_opt(year, month, day);
        }

        // "2025/08/02" must not fall through to the day/month form as "08/02"
        if let Some(caps) = YEAR_FIRST_DATE.captures(&folded) {
            let year = caps[1].parse().ok()?;
            let month = caps[2].parse().ok()?;
            let day = caps[3].parse().ok()?;
            return NaiveDate::from_ymd_opt(year, month, day);
        }

        if let Some(caps) = DAY_FIRST_DATE.captures(&folded) {
            let day = caps[1].parse().ok()?;
            let month = caps[2].parse().ok()?;
            let year = expand_year(&caps[3])?;
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(date);
            }
        }

        for caps in TEXTUAL_DAY_FIRST.captures_iter(&folded) {
            let Some(month) = month_from_name(&caps[2]) else {
                continue;
            };
            let Ok(day) = caps[1].parse::<u32>() else {
                continue;
            };
            let date = match caps.get(3) {
                Some(year) => year
                    .as_str()
                    .parse()
                    .ok()
                    .and_then(|y| NaiveDate::from_ymd_opt(y, month, day)),
                None => self.infer_year(month, day, period),
            };
            if date.is_some() {
                return date;
            }
        }

        for caps in TEXTUAL_MONTH_FIRST.captures_iter(&folded) {
            let Some(month) = month_from_name(&caps[1]) else {
                continue;
            };
            let Ok(day) = caps[2].parse::<u32>() else {
                continue;
            };
            let date = match caps.get(3) {
                Some(year) => year
                    .as_str()
                    .parse()
                    .ok()
                    .and_then(|y| NaiveDate::from_ymd_opt(y, month, day)),
                None => self.infer_year(month, day, period),
            };
            if date.is_some() {
                return date;
            }
        }

        if let Some(caps) = DAY_MONTH.captures(&folded) {
            let day = caps[1].parse().ok()?;
            let month = caps[2].parse().ok()?;
            return self.infer_year(month, day, period);
        }

        None
    }

    /// Parse a time of day. Missing minutes default to zero.
    pub fn parse_time(text: &str) -> Option<NaiveTime> {
        let folded = fold_accents(text);

        if let Some(caps) = CLOCK_TIME.captures(&folded) {
            let hour: u32 = caps[1].parse().ok()?;
            let minute: u32 = caps[2].parse().ok()?;
            let hour = apply_meridiem(hour, caps.get(3).map(|m| m.as_str()))?;
            return NaiveTime::from_hms_opt(hour, minute, 0);
        }

        if let Some(caps) = HOUR_TIME.captures(&folded) {
            let hour: u32 = caps[1].parse().ok()?;
            let minute: u32 = match caps.get(2) {
                Some(m) => m.as_str().parse().ok()?,
                None => 0,
            };
            return NaiveTime::from_hms_opt(hour, minute, 0);
        }

        if let Some(caps) = MERIDIEM_TIME.captures(&folded) {
            let hour: u32 = caps[1].parse().ok()?;
            let hour = apply_meridiem(hour, Some(&caps[2]))?;
            return NaiveTime::from_hms_opt(hour, 0, 0);
        }

        None
    }

    /// Parse a declared programming period such as "de 01 a 03 de agosto de 2025"
    /// or "31/07/2025 - 03/08/2025".
    pub fn parse_period(&self, text: &str) -> Option<ContextPeriod> {
        let folded = fold_accents(text);

        if let Some(caps) = DAY_RANGE.captures(&folded) {
            if let Some(month) = month_from_name(&caps[3]) {
                let first: u32 = caps[1].parse().ok()?;
                let last: u32 = caps[2].parse().ok()?;
                let year = match caps.get(4) {
                    Some(y) => y.as_str().parse().ok()?,
                    None => self.nearest_year(month, last)?,
                };
                let end = NaiveDate::from_ymd_opt(year, month, last)?;
                // "30 a 02 de agosto" starts in the previous month
                let start = if first <= last {
                    NaiveDate::from_ymd_opt(year, month, first)?
                } else {
                    let prev = end.checked_sub_signed(Duration::days(i64::from(last)))?;
                    NaiveDate::from_ymd_opt(prev.year(), prev.month(), first)?
                };
                return Some(ContextPeriod { start, end });
            }
        }

        let mut dates: Vec<NaiveDate> = ISO_DATE
            .captures_iter(&folded)
            .filter_map(|c| {
                NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
            })
            .collect();
        if dates.len() < 2 {
            dates.extend(DAY_FIRST_DATE.captures_iter(&folded).filter_map(|c| {
                NaiveDate::from_ymd_opt(expand_year(&c[3])?, c[2].parse().ok()?, c[1].parse().ok()?)
            }));
        }
        if dates.len() < 2 {
            dates.extend(TEXTUAL_DAY_FIRST.captures_iter(&folded).filter_map(|c| {
                let month = month_from_name(&c[2])?;
                let day = c[1].parse().ok()?;
                match c.get(3) {
                    Some(y) => NaiveDate::from_ymd_opt(y.as_str().parse().ok()?, month, day),
                    None => self.infer_year(month, day, None),
                }
            }));
        }

        let start = *dates.iter().min()?;
        let end = *dates.iter().max()?;
        Some(ContextPeriod { start, end })
    }

    /// Build a page context from the declared period text and section category.
    pub fn page_context(&self, period_text: Option<&str>, category_hint: Option<&str>) -> PageContext {
        PageContext {
            period: period_text.and_then(|t| self.parse_period(t)),
            category_hint: category_hint.map(str::to_string),
            period_text: period_text.map(str::to_string),
        }
    }

    /// Attach a local wall-clock time to the configured timezone.
    ///
    /// Ambiguous times (DST fall-back) take the earlier instant; times inside a
    /// DST gap move forward to the first valid instant.
    pub fn localize(&self, naive: NaiveDateTime) -> Result<DateTime<Tz>> {
        if let Some(at) = self.tz.from_local_datetime(&naive).earliest() {
            return Ok(at);
        }
        for minutes in (15..=180).step_by(15) {
            let shifted = naive + Duration::minutes(minutes);
            if let Some(at) = self.tz.from_local_datetime(&shifted).earliest() {
                return Ok(at);
            }
        }
        Err(Error::UnresolvedDate(format!(
            "{} does not exist in {}",
            naive,
            self.tz.name()
        )))
    }

    fn weekday_in_period(day: Weekday, period: &ContextPeriod) -> Option<NaiveDate> {
        period
            .start
            .iter_days()
            .take_while(|d| *d <= period.end)
            .find(|d| d.weekday() == day)
    }

    /// Year for a year-less day/month: the period's year when known, else the one nearest the reference.
    fn infer_year(&self, month: u32, day: u32, period: Option<&ContextPeriod>) -> Option<NaiveDate> {
        if let Some(period) = period {
            for year in [period.start.year(), period.end.year()] {
                if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                    if date >= period.start - Duration::days(7)
                        && date <= period.end + Duration::days(7)
                    {
                        return Some(date);
                    }
                }
            }
            return NaiveDate::from_ymd_opt(period.start.year(), month, day);
        }
        let year = self.nearest_year(month, day)?;
        NaiveDate::from_ymd_opt(year, month, day)
    }

    fn nearest_year(&self, month: u32, day: u32) -> Option<i32> {
        let base = self.reference.year();
        [base - 1, base, base + 1]
            .into_iter()
            .filter_map(|y| NaiveDate::from_ymd_opt(y, month, day).map(|d| (y, d)))
            .min_by_key(|(_, d)| (d.signed_duration_since(self.reference).num_days().abs(), *d))
            .map(|(y, _)| y)
    }
}

fn apply_meridiem(hour: u32, meridiem: Option<&str>) -> Option<u32> {
    match meridiem {
        None => Some(hour),
        Some(_) if hour == 0 || hour > 12 => None,
        Some("am") => Some(hour % 12),
        Some(_) => Some(hour % 12 + 12),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn resolver() -> DateTimeResolver {
        DateTimeResolver::new(
            chrono_tz::America::Sao_Paulo,
            NaiveDate::from_ymd_opt(2025, 7, 28).unwrap(),
        )
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn august_weekend() -> PageContext {
        PageContext {
            period: Some(ContextPeriod {
                start: ymd(2025, 8, 1),
                end: ymd(2025, 8, 3),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn iso_takes_precedence() {
        let r = resolver();
        assert_eq!(r.parse_date("2025-08-02", None), Some(ymd(2025, 8, 2)));
        assert_eq!(r.parse_date("Sábado 2025-08-02", None), Some(ymd(2025, 8, 2)));
        assert_eq!(r.parse_date("2025-08-02T14:00:00", None), Some(ymd(2025, 8, 2)));
    }

    #[test]
    fn year_first_slashed_dates_are_not_day_month() {
        let r = resolver();
        assert_eq!(r.parse_date("2025/08/02", None), Some(ymd(2025, 8, 2)));
        assert_eq!(r.parse_date("2025.08.02", None), Some(ymd(2025, 8, 2)));
        assert_eq!(r.parse_date("Domingo, 2025/08/03", None), Some(ymd(2025, 8, 3)));
        assert_eq!(r.parse_date("02/08", None), Some(ymd(2025, 8, 2)));
    }

    #[test]
    fn numeric_dates_are_day_first() {
        let r = resolver();
        assert_eq!(r.parse_date("02/08/2025", None), Some(ymd(2025, 8, 2)));
        assert_eq!(r.parse_date("02.08.25", None), Some(ymd(2025, 8, 2)));
        assert_eq!(r.parse_date("02-08-2025", None), Some(ymd(2025, 8, 2)));
    }

    #[test]
    fn textual_dates() {
        let r = resolver();
        assert_eq!(r.parse_date("2 de agosto de 2025", None), Some(ymd(2025, 8, 2)));
        assert_eq!(r.parse_date("sábado, 2 ago", None), Some(ymd(2025, 8, 2)));
        assert_eq!(r.parse_date("Aug 2, 2025", None), Some(ymd(2025, 8, 2)));
        assert_eq!(r.parse_date("1º de março de 2026", None), Some(ymd(2026, 3, 1)));
    }

    #[test]
    fn year_less_dates_use_nearest_year() {
        let r = DateTimeResolver::new(chrono_tz::UTC, ymd(2025, 12, 30));
        assert_eq!(r.parse_date("02/01", None), Some(ymd(2026, 1, 2)));
        assert_eq!(r.parse_date("28/12", None), Some(ymd(2025, 12, 28)));
    }

    #[test]
    fn time_variants() {
        let t = |s| DateTimeResolver::parse_time(s).map(|t| (t.hour(), t.minute()));
        assert_eq!(t("14:30"), Some((14, 30)));
        assert_eq!(t("14h"), Some((14, 0)));
        assert_eq!(t("14h30"), Some((14, 30)));
        assert_eq!(t("14 horas"), Some((14, 0)));
        assert_eq!(t("às 14h30"), Some((14, 30)));
        assert_eq!(t("2:30 PM"), Some((14, 30)));
        assert_eq!(t("9am"), Some((9, 0)));
        assert_eq!(t("25:00"), None);
        assert_eq!(t("a definir"), None);
    }

    #[test]
    fn resolves_in_timezone() {
        let r = resolver();
        let resolved = r
            .resolve(Some("02/08/2025"), Some("às 14h30"), &PageContext::default())
            .unwrap();
        assert!(!resolved.from_context);
        assert!(resolved.time_explicit);
        assert_eq!(
            resolved.at.naive_utc(),
            ymd(2025, 8, 2).and_hms_opt(17, 30, 0).unwrap()
        );
    }

    #[test]
    fn weekday_resolves_against_context() {
        let r = resolver();
        let resolved = r.resolve(Some("Sábado"), Some("10:00"), &august_weekend()).unwrap();
        assert!(resolved.from_context);
        assert_eq!(resolved.at.date_naive(), ymd(2025, 8, 2));
    }

    #[test]
    fn missing_date_falls_back_to_period_start() {
        let r = resolver();
        let resolved = r.resolve(None, Some("09:00"), &august_weekend()).unwrap();
        assert!(resolved.from_context);
        assert_eq!(resolved.at.date_naive(), ymd(2025, 8, 1));
    }

    #[test]
    fn missing_time_defaults_to_midnight() {
        let r = resolver();
        let resolved = r.resolve(Some("2025-08-02"), None, &PageContext::default()).unwrap();
        assert!(!resolved.time_explicit);
        assert_eq!(resolved.at.time(), NaiveTime::MIN);
    }

    #[test]
    fn iso_datetime_carries_its_time() {
        let r = resolver();
        let resolved = r
            .resolve(Some("2025-08-02T14:00:00"), None, &PageContext::default())
            .unwrap();
        assert!(resolved.time_explicit);
        assert_eq!(
            resolved.at.naive_local(),
            ymd(2025, 8, 2).and_hms_opt(14, 0, 0).unwrap()
        );
        assert_eq!(
            DateTimeResolver::parse_time("2025-08-02t09:15").map(|t| (t.hour(), t.minute())),
            Some((9, 15))
        );
    }

    #[test]
    fn unresolvable_is_typed_failure() {
        let r = resolver();
        assert!(matches!(
            r.resolve(None, Some("10:00"), &PageContext::default()),
            Err(Error::UnresolvedDate(_))
        ));
        assert!(matches!(
            r.resolve(Some("99/99/9999"), None, &august_weekend()),
            Err(Error::UnresolvedDate(_))
        ));
        assert!(matches!(
            r.resolve(Some("2025-08-02"), Some("sometime"), &PageContext::default()),
            Err(Error::UnresolvedDate(_))
        ));
    }

    #[test]
    fn period_text_variants() {
        let r = resolver();
        let expected = ContextPeriod {
            start: ymd(2025, 8, 1),
            end: ymd(2025, 8, 3),
        };
        assert_eq!(r.parse_period("Programação de 01 a 03 de agosto de 2025"), Some(expected));
        assert_eq!(r.parse_period("01/08/2025 - 03/08/2025"), Some(expected));
        assert_eq!(r.parse_period("2025-08-01 a 2025-08-03"), Some(expected));
        assert_eq!(
            r.parse_period("de 31 de julho a 3 de agosto de 2025"),
            Some(ContextPeriod {
                start: ymd(2025, 7, 31),
                end: ymd(2025, 8, 3)
            })
        );
        assert_eq!(r.parse_period("sem programação"), None);
    }

    #[test]
    fn dst_gap_moves_forward() {
        let r = DateTimeResolver::new(chrono_tz::Europe::Lisbon, ymd(2025, 3, 30));
        let at = r
            .localize(ymd(2025, 3, 30).and_hms_opt(1, 30, 0).unwrap())
            .unwrap();
        assert_eq!(at.naive_local(), ymd(2025, 3, 30).and_hms_opt(2, 0, 0).unwrap());
    }
}
