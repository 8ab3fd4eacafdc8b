use chrono::{DateTime, Datelike, TimeZone, Timelike};
use thiserror::Error;

use crate::field::{Field, FieldError};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatternError {
    #[error("cron pattern must have exactly 5 whitespace-separated fields, got {count}")]
    WrongFieldCount { count: usize },
    #[error("minute field: {0}")]
    Minute(FieldError),
    #[error("hour field: {0}")]
    Hour(FieldError),
    #[error("day-of-month field: {0}")]
    DayOfMonth(FieldError),
    #[error("month field: {0}")]
    Month(FieldError),
    #[error("day-of-week field: {0}")]
    DayOfWeek(FieldError),
}

/// A five-field calendar pattern: minute, hour, day-of-month, month,
/// day-of-week. When both day-of-month and day-of-week are restricted
/// (neither is `*`), a tick matches if *either* matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronPattern {
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

impl CronPattern {
    pub fn parse(spec: &str) -> Result<Self, PatternError> {
        let fields: Vec<&str> = spec.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(PatternError::WrongFieldCount { count: fields.len() });
        }

        Ok(Self {
            minute: Field::parse(fields[0], 0, 59).map_err(PatternError::Minute)?,
            hour: Field::parse(fields[1], 0, 23).map_err(PatternError::Hour)?,
            day_of_month: Field::parse(fields[2], 1, 31).map_err(PatternError::DayOfMonth)?,
            month: Field::parse(fields[3], 1, 12).map_err(PatternError::Month)?,
            day_of_week: Field::parse(fields[4], 0, 7).map_err(PatternError::DayOfWeek)?,
        })
    }

    pub fn matches<Tz: TimeZone>(&self, when: &DateTime<Tz>) -> bool {
        if !self.minute.matches(when.minute()) || !self.hour.matches(when.hour()) {
            return false;
        }
        if !self.month.matches(when.month()) {
            return false;
        }

        let dom_restricted = !self.day_of_month.is_wildcard();
        let dow_restricted = !self.day_of_week.is_wildcard();

        // chrono's Weekday::num_days_from_sunday: Sun=0 .. Sat=6, matching
        // the field's 0-7 domain (7 also means Sunday).
        let dow_value = when.weekday().num_days_from_sunday();
        let dom_match = self.day_of_month.matches(when.day());
        let dow_match = self.day_of_week.matches(dow_value) || self.day_of_week.matches(dow_value + 7);

        match (dom_restricted, dow_restricted) {
            (true, true) => dom_match || dow_match,
            (true, false) => dom_match,
            (false, true) => dow_match,
            (false, false) => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(
            CronPattern::parse("* * * *"),
            Err(PatternError::WrongFieldCount { count: 4 })
        );
    }

    #[test]
    fn every_minute() {
        let p = CronPattern::parse("* * * * *").unwrap();
        assert!(p.matches(&at(2026, 7, 26, 13, 7)));
    }

    #[test]
    fn specific_minute_and_hour() {
        let p = CronPattern::parse("30 9 * * *").unwrap();
        assert!(p.matches(&at(2026, 7, 26, 9, 30)));
        assert!(!p.matches(&at(2026, 7, 26, 9, 31)));
        assert!(!p.matches(&at(2026, 7, 26, 10, 30)));
    }

    #[test]
    fn dom_and_dow_restricted_is_or() {
        // 2026-07-26 is a Sunday. Pattern: 1st-of-month OR Sunday.
        let p = CronPattern::parse("0 0 1 * 0").unwrap();
        assert!(p.matches(&at(2026, 7, 26, 0, 0)), "Sunday should match via dow");
        assert!(p.matches(&at(2026, 8, 1, 0, 0)), "1st should match via dom");
        assert!(!p.matches(&at(2026, 7, 27, 0, 0)), "Monday 27th is neither");
    }

    #[test]
    fn dow_seven_means_sunday_too() {
        let p = CronPattern::parse("0 0 * * 7").unwrap();
        assert!(p.matches(&at(2026, 7, 26, 0, 0)));
    }

    #[test]
    fn only_dom_restricted_is_plain_and() {
        let p = CronPattern::parse("0 0 15 * *").unwrap();
        assert!(p.matches(&at(2026, 7, 15, 0, 0)));
        assert!(!p.matches(&at(2026, 7, 16, 0, 0)));
    }
}
