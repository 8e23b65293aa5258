use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset, NaiveTime, Utc, Weekday};

/// Builds the fixed offset the bot publishes in, e.g. `330` minutes for IST.
pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| anyhow!("UTC offset of {} minutes is out of range", minutes))
}

/// Current wall-clock time in the given offset.
pub fn now_in(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}

/// Parses a slot time written as `HH:MM`.
pub fn parse_slot_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|why| anyhow!("Failed to parse slot time '{}' because {:?}", s, why))
}

/// Parses `Mon`, `monday`, `FRI` ... into a `Weekday`.
pub fn parse_weekday(s: &str) -> Result<Weekday> {
    Weekday::from_str(s.trim()).map_err(|_| anyhow!("'{}' is not a weekday", s))
}
