use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::pattern::CronPattern;

/// A cron pattern that can be swapped out at runtime while a periodic
/// scheduler is already running against it.
pub struct CronSchedule {
    pattern: RwLock<CronPattern>,
}

impl CronSchedule {
    pub fn new(pattern: CronPattern) -> Self {
        Self { pattern: RwLock::new(pattern) }
    }

    /// Replace the active pattern. Takes effect on the next evaluation.
    pub fn replace(&self, pattern: CronPattern) {
        *self.pattern.write() = pattern;
    }

    /// Evaluate the current pattern against `now`. Callers are expected
    /// to invoke this once per minute.
    pub fn matches(&self, now: &DateTime<Utc>) -> bool {
        self.pattern.read().matches(now)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn replace_takes_effect_immediately() {
        let schedule = CronSchedule::new(CronPattern::parse("0 0 * * *").unwrap());
        let noon = Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap();
        assert!(!schedule.matches(&noon));

        schedule.replace(CronPattern::parse("0 12 * * *").unwrap());
        assert!(schedule.matches(&noon));
    }
}
