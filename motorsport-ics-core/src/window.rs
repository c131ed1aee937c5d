use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, config::WindowConfig};

/// Configured day span of a race weekend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekendDays {
    pub first: Weekday,
    pub last: Weekday,
}

impl WeekendDays {
    pub const fn friday_to_sunday() -> Self {
        Self {
            first: Weekday::Fri,
            last: Weekday::Sun,
        }
    }

    pub const fn thursday_to_sunday() -> Self {
        Self {
            first: Weekday::Thu,
            last: Weekday::Sun,
        }
    }

    pub const fn friday_to_monday() -> Self {
        Self {
            first: Weekday::Fri,
            last: Weekday::Mon,
        }
    }

    pub const fn thursday_to_monday() -> Self {
        Self {
            first: Weekday::Thu,
            last: Weekday::Mon,
        }
    }

    /// Days after `first` up to and including `last`, wrapping over the week boundary.
    pub fn span_days(&self) -> i64 {
        i64::from((self.last.num_days_from_monday() + 7 - self.first.num_days_from_monday()) % 7)
    }
}

impl Default for WeekendDays {
    fn default() -> Self {
        Self::friday_to_sunday()
    }
}

impl From<&WindowConfig> for WeekendDays {
    fn from(config: &WindowConfig) -> Self {
        Self {
            first: config.first_day,
            last: config.last_day,
        }
    }
}

/// Closed interval events are filtered against. Both ends carry the same timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekendWindow {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl WeekendWindow {
    pub fn timezone(&self) -> Tz {
        self.start.timezone()
    }

    /// Inclusive on both ends; `at` may be in any timezone.
    pub fn contains<T: TimeZone>(&self, at: &DateTime<T>) -> bool {
        *at >= self.start && *at <= self.end
    }

    /// Local dates covered by the window.
    pub fn days(&self) -> Vec<NaiveDate> {
        let last = self.end.date_naive();
        self.start
            .date_naive()
            .iter_days()
            .take_while(|d| *d <= last)
            .collect()
    }
}

/// Computes the active weekend window.
#[derive(Debug, Clone)]
pub struct WeekendWindowCalculator {
    tz: Tz,
    days: WeekendDays,
}

impl WeekendWindowCalculator {
    pub fn new(tz: Tz, days: WeekendDays) -> Self {
        Self { tz, days }
    }

    pub fn days(&self) -> WeekendDays {
        self.days
    }

    /// Window for the weekend that is in progress at `now`, or the next one to occur.
    pub fn next_from_now(&self) -> Result<WeekendWindow> {
        self.window_for(&chrono::Utc::now())
    }

    /// Window around a reference instant in any timezone.
    ///
    /// The reference is first moved into the configured timezone; if its local
    /// date lies inside a configured span that span is returned, otherwise the
    /// next occurring one.
    pub fn window_for<T: TimeZone>(&self, reference: &DateTime<T>) -> Result<WeekendWindow> {
        let local = reference.with_timezone(&self.tz);
        self.window_for_date(local.date_naive())
    }

    /// Window around a local calendar date.
    pub fn window_for_date(&self, date: NaiveDate) -> Result<WeekendWindow> {
        let span = self.days.span_days();
        let offset = i64::from(
            (date.weekday().num_days_from_monday() + 7 - self.days.first.num_days_from_monday()) % 7,
        );
        let first_day = if offset <= span {
            date - Duration::days(offset)
        } else {
            date + Duration::days(7 - offset)
        };
        let last_day = first_day + Duration::days(span);

        let start = self.local(first_day, NaiveTime::MIN)?;
        let end_time = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
            .ok_or_else(|| Error::Internal("invalid end-of-day time".to_string()))?;
        let end = self.local(last_day, end_time)?;

        Ok(WeekendWindow { start, end })
    }

    fn local(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Tz>> {
        let naive = date.and_time(time);
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                // Midnight can fall inside a DST gap in some zones
                self.tz
                    .from_local_datetime(&(naive + Duration::hours(1)))
                    .earliest()
            })
            .ok_or_else(|| {
                Error::Internal(format!("{} does not exist in {}", naive, self.tz.name()))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, Utc};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn calc(days: WeekendDays) -> WeekendWindowCalculator {
        WeekendWindowCalculator::new(chrono_tz::America::Sao_Paulo, days)
    }

    #[test]
    fn midweek_reference_picks_next_weekend() {
        // 2025-07-30 is a Wednesday
        let w = calc(WeekendDays::default())
            .window_for_date(ymd(2025, 7, 30))
            .unwrap();
        assert_eq!(w.start.date_naive(), ymd(2025, 8, 1));
        assert_eq!(w.end.date_naive(), ymd(2025, 8, 3));
        assert_eq!(w.start.time(), NaiveTime::MIN);
        assert_eq!(
            (w.end.hour(), w.end.minute(), w.end.second()),
            (23, 59, 59)
        );
        assert_eq!(w.end.nanosecond(), 999_000_000);
    }

    #[test]
    fn reference_inside_weekend_keeps_it() {
        let w = calc(WeekendDays::default())
            .window_for_date(ymd(2025, 8, 3))
            .unwrap();
        assert_eq!(w.start.date_naive(), ymd(2025, 8, 1));
        assert_eq!(w.days().len(), 3);
    }

    #[test]
    fn extended_spans() {
        let w = calc(WeekendDays::thursday_to_monday())
            .window_for_date(ymd(2025, 8, 4))
            .unwrap();
        assert_eq!(w.start.date_naive(), ymd(2025, 7, 31));
        assert_eq!(w.end.date_naive(), ymd(2025, 8, 4));

        let w = calc(WeekendDays::friday_to_monday())
            .window_for_date(ymd(2025, 8, 5))
            .unwrap();
        assert_eq!(w.start.date_naive(), ymd(2025, 8, 8));
        assert_eq!(w.days().len(), 4);
    }

    #[test]
    fn reference_normalized_into_timezone() {
        // Saturday 01:00 UTC is still Friday evening in São Paulo
        let reference = Utc.with_ymd_and_hms(2025, 8, 2, 1, 0, 0).unwrap();
        let w = calc(WeekendDays::default()).window_for(&reference).unwrap();
        assert_eq!(w.start.date_naive(), ymd(2025, 8, 1));

        // Thursday 23:30 in São Paulo is Friday in UTC; the window is still next Friday's
        let reference = Utc.with_ymd_and_hms(2025, 8, 1, 2, 30, 0).unwrap();
        let w = calc(WeekendDays::default()).window_for(&reference).unwrap();
        assert_eq!(w.start.date_naive(), ymd(2025, 8, 1));
    }

    #[test]
    fn window_invariant_holds_for_every_day() {
        let presets = [
            WeekendDays::friday_to_sunday(),
            WeekendDays::thursday_to_sunday(),
            WeekendDays::friday_to_monday(),
            WeekendDays::thursday_to_monday(),
        ];
        for tz in [
            chrono_tz::America::Sao_Paulo,
            chrono_tz::Europe::London,
            chrono_tz::Australia::Sydney,
        ] {
            for days in presets {
                let calc = WeekendWindowCalculator::new(tz, days);
                for date in ymd(2025, 1, 1).iter_days().take(400) {
                    let w = calc.window_for_date(date).unwrap();
                    assert!(w.start <= w.end);
                    assert_eq!(w.start.timezone(), w.end.timezone());
                    assert_eq!(w.start.weekday(), days.first);
                    assert_eq!(w.end.weekday(), days.last);
                    assert!(w.start.date_naive() >= date || w.end.date_naive() >= date);
                }
            }
        }
    }

    #[test]
    fn contains_is_inclusive() {
        let w = calc(WeekendDays::default())
            .window_for_date(ymd(2025, 8, 1))
            .unwrap();
        assert!(w.contains(&w.start));
        assert!(w.contains(&w.end));
        assert!(!w.contains(&(w.end + Duration::milliseconds(1))));
        assert!(!w.contains(&(w.start - Duration::milliseconds(1))));
    }
}
