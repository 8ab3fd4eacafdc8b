//! Calendar-driven scheduling for incremental push: a five-field cron
//! pattern (minute, hour, day-of-month, month, day-of-week) evaluated
//! once per minute, replaceable at runtime without restarting the
//! scheduler that owns it.

mod field;
mod pattern;
mod schedule;

pub use field::FieldError;
pub use pattern::{CronPattern, PatternError};
pub use schedule::CronSchedule;
