//! Zone-aware helpers shared by the projector and the formatter.

use chrono::{DateTime, NaiveDate, NaiveTime, Offset, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::ScheduleError;

/// Parse an IANA timezone string into `Tz`.
pub fn parse_timezone(s: &str) -> Result<Tz, ScheduleError> {
    s.trim()
        .parse::<Tz>()
        .map_err(|_| ScheduleError::UnknownTimezone(format!("'{s}'")))
}

/// Parse a wall-clock time of day: "19:00", "7:30", "19:00:00".
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime, ScheduleError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| ScheduleError::InvalidTime(format!("'{s}': {e}")))
}

/// Inverse of [`parse_time_of_day`]: "HH:MM", with seconds only when set.
pub fn format_time_of_day(time: NaiveTime) -> String {
    if time.second() == 0 {
        time.format("%H:%M").to_string()
    } else {
        time.format("%H:%M:%S").to_string()
    }
}

/// Resolve a local wall-clock date and time in `tz` to an absolute instant.
///
/// An ambiguous wall time (fall-back overlap) resolves to the earlier
/// instant. A nonexistent wall time (spring-forward gap) resolves to the same
/// wall time one hour later.
pub fn resolve_local(tz: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }
    if let Some(dt) = naive
        .checked_add_signed(TimeDelta::hours(1))
        .and_then(|shifted| tz.from_local_datetime(&shifted).earliest())
    {
        return dt.with_timezone(&Utc);
    }
    // Gaps longer than an hour only exist in historical data. At the edge of
    // the calendar the wall time is taken as UTC.
    let offset = tz.offset_from_utc_datetime(&naive).fix().local_minus_utc();
    let utc = naive
        .checked_sub_signed(TimeDelta::seconds(offset as i64))
        .unwrap_or(naive);
    DateTime::from_naive_utc_and_offset(utc, Utc)
}

/// The local calendar date of `instant` in `tz`.
pub fn local_date(tz: &Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// UTC offset of `tz` at `instant`, in seconds east of UTC.
pub fn utc_offset_seconds(tz: &Tz, instant: DateTime<Utc>) -> i32 {
    instant.with_timezone(tz).offset().fix().local_minus_utc()
}

/// Format a UTC offset in seconds as "-05:00" / "+09:00".
pub fn format_utc_offset(offset_secs: i32) -> String {
    let sign = if offset_secs >= 0 { "+" } else { "-" };
    let abs_secs = offset_secs.unsigned_abs();
    let hours = abs_secs / 3600;
    let minutes = (abs_secs % 3600) / 60;
    format!("{sign}{hours:02}:{minutes:02}")
}
