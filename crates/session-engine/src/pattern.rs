//! Recurrence rules for campaign sessions.
//!
//! A pattern arrives over the wire as a [`RawSchedulePattern`] (loose,
//! optional fields, the shape persisted with the campaign) and is validated
//! into a [`SchedulePattern`] before anything is projected from it. All
//! validation happens here, so a projection never fails midway.
//!
//! Day-of-week indices follow the product convention: Sunday = 0 through
//! Saturday = 6.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};
use crate::zone::{format_time_of_day, local_date, parse_time_of_day, parse_timezone, resolve_local};

/// Session length used when a pattern does not specify one.
pub const DEFAULT_DURATION_MINUTES: u32 = 240;

/// Session start used when a pattern does not specify one.
pub const DEFAULT_TIME: &str = "19:00";

// ── Wire form ───────────────────────────────────────────────────────────────

/// Recurrence frequency as written in the persisted pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyKind {
    Weekly,
    Biweekly,
    Monthly,
    Custom,
}

/// A schedule pattern as persisted: every rule-specific field is optional,
/// and consistency is checked by [`SchedulePattern::try_from`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSchedulePattern {
    #[serde(alias = "type")]
    pub frequency: FrequencyKind,
    /// 0-6, Sunday = 0. Weekly, biweekly, and nth-weekday monthly rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u8>,
    /// 1-5 or -1 (last). Selects the nth-weekday monthly rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_of_month: Option<i8>,
    /// 1-31, clamped to shorter months. Selects the day-of-month monthly rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u8>,
    /// "HH:MM" in the pattern's timezone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub timezone: String,
    /// Required for every frequency except `custom`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Explicit instants for `custom`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dates: Vec<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

// ── Validated form ──────────────────────────────────────────────────────────

/// How a monthly pattern picks its day within each calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthlyRule {
    /// Fixed day of month (1-31), clamped to the last day of shorter months.
    DayOfMonth(u32),
    /// The nth weekday of the month; `ordinal` is 1-5, or -1 for the last one.
    NthWeekday { ordinal: i8, weekday: Weekday },
}

impl MonthlyRule {
    /// The date this rule selects in the given month, if any.
    pub fn resolve(&self, year: i32, month: u32) -> Option<NaiveDate> {
        match *self {
            MonthlyRule::DayOfMonth(day) => {
                let last = last_day_of_month(year, month)?;
                NaiveDate::from_ymd_opt(year, month, day.min(last.day()))
            }
            MonthlyRule::NthWeekday { ordinal, weekday } => {
                find_nth_weekday_in_month(year, month, weekday, ordinal as i32)
            }
        }
    }
}

/// The recurrence shape of a validated pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recurrence {
    Weekly(Weekday),
    Biweekly(Weekday),
    Monthly(MonthlyRule),
    /// Explicit instants, sorted ascending, at most one per local date.
    Custom(Vec<DateTime<Utc>>),
}

/// A validated, immutable recurrence rule.
///
/// Construct with [`SchedulePattern::new`] or from a [`RawSchedulePattern`].
/// "Changing" a pattern means building a new one with the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePattern {
    recurrence: Recurrence,
    time_of_day: NaiveTime,
    timezone: Tz,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    duration_minutes: u32,
    location: Option<String>,
}

impl SchedulePattern {
    /// Build a pattern from its parts.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::UnknownTimezone`] for an unrecognized zone name, or
    /// [`ScheduleError::Configuration`] if the recurrence is malformed (an
    /// empty or colliding custom list, an out-of-range monthly rule).
    pub fn new(
        recurrence: Recurrence,
        time_of_day: NaiveTime,
        timezone: &str,
        start_date: NaiveDate,
    ) -> Result<Self> {
        let timezone = parse_timezone(timezone)?;
        let recurrence = normalize_recurrence(recurrence, &timezone)?;
        Ok(Self {
            recurrence,
            time_of_day,
            timezone,
            start_date,
            end_date: None,
            duration_minutes: DEFAULT_DURATION_MINUTES,
            location: None,
        })
    }

    /// Bound the pattern; `end_date` is the last valid occurrence date, inclusive.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Configuration`] if `end_date` is before the start date.
    pub fn with_end_date(mut self, end_date: NaiveDate) -> Result<Self> {
        if end_date < self.start_date {
            return Err(ScheduleError::Configuration(format!(
                "end date {end_date} is before start date {}",
                self.start_date
            )));
        }
        self.end_date = Some(end_date);
        Ok(self)
    }

    pub fn with_duration_minutes(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn recurrence(&self) -> &Recurrence {
        &self.recurrence
    }

    pub fn time_of_day(&self) -> NaiveTime {
        self.time_of_day
    }

    /// The authoring timezone.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// The instant `time_of_day` falls on `date` in the authoring zone.
    pub fn local_instant(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        resolve_local(&self.timezone, date, time)
    }

    /// The instant the pattern was set up against: its start date at its time
    /// of day. DST shifts are measured relative to this.
    pub fn baseline_instant(&self) -> DateTime<Utc> {
        match &self.recurrence {
            Recurrence::Custom(dates) => dates
                .first()
                .copied()
                .unwrap_or_else(|| self.local_instant(self.start_date, self.time_of_day)),
            _ => self.local_instant(self.start_date, self.time_of_day),
        }
    }

    /// Whether `date` falls inside `[start_date, end_date]`.
    pub fn in_range(&self, date: NaiveDate) -> bool {
        date >= self.start_date && self.end_date.is_none_or(|end| date <= end)
    }

    /// First weekly/biweekly occurrence date: the first `weekday` on or after
    /// the start date. The biweekly grid is anchored here.
    pub(crate) fn anchor_date(&self, weekday: Weekday) -> Option<NaiveDate> {
        first_weekday_on_or_after(self.start_date, weekday)
    }

    /// The instant the unmodified rule produces on local `date`, or `None` if
    /// `date` is not an occurrence.
    pub fn occurrence_on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        if !self.in_range(date) {
            return None;
        }
        match &self.recurrence {
            Recurrence::Weekly(weekday) => {
                (date.weekday() == *weekday).then(|| self.local_instant(date, self.time_of_day))
            }
            Recurrence::Biweekly(weekday) => {
                let offset = (date - self.anchor_date(*weekday)?).num_days();
                (date.weekday() == *weekday && offset >= 0 && offset % 14 == 0)
                    .then(|| self.local_instant(date, self.time_of_day))
            }
            Recurrence::Monthly(rule) => (rule.resolve(date.year(), date.month()) == Some(date))
                .then(|| self.local_instant(date, self.time_of_day)),
            Recurrence::Custom(dates) => dates
                .iter()
                .copied()
                .find(|instant| local_date(&self.timezone, *instant) == date),
        }
    }

    /// Convert back to the persisted wire form.
    pub fn to_raw(&self) -> RawSchedulePattern {
        let mut raw = RawSchedulePattern {
            frequency: FrequencyKind::Weekly,
            day_of_week: None,
            week_of_month: None,
            day_of_month: None,
            time: Some(format_time_of_day(self.time_of_day)),
            timezone: self.timezone.name().to_string(),
            start_date: Some(self.start_date),
            end_date: self.end_date,
            dates: Vec::new(),
            duration_minutes: Some(self.duration_minutes),
            location: self.location.clone(),
        };
        match &self.recurrence {
            Recurrence::Weekly(weekday) => {
                raw.day_of_week = Some(weekday.num_days_from_sunday() as u8);
            }
            Recurrence::Biweekly(weekday) => {
                raw.frequency = FrequencyKind::Biweekly;
                raw.day_of_week = Some(weekday.num_days_from_sunday() as u8);
            }
            Recurrence::Monthly(MonthlyRule::DayOfMonth(day)) => {
                raw.frequency = FrequencyKind::Monthly;
                raw.day_of_month = Some(*day as u8);
            }
            Recurrence::Monthly(MonthlyRule::NthWeekday { ordinal, weekday }) => {
                raw.frequency = FrequencyKind::Monthly;
                raw.week_of_month = Some(*ordinal);
                raw.day_of_week = Some(weekday.num_days_from_sunday() as u8);
            }
            Recurrence::Custom(dates) => {
                raw.frequency = FrequencyKind::Custom;
                raw.dates = dates.clone();
            }
        }
        raw
    }

    /// Human-readable summary, e.g. "Every other Tuesday at 7:00 PM".
    pub fn describe(&self) -> String {
        let at = format_time_12h(self.time_of_day);
        match &self.recurrence {
            Recurrence::Weekly(weekday) => format!("Every {} at {at}", weekday_name(*weekday)),
            Recurrence::Biweekly(weekday) => {
                format!("Every other {} at {at}", weekday_name(*weekday))
            }
            Recurrence::Monthly(MonthlyRule::NthWeekday { ordinal, weekday }) => format!(
                "{} {} of each month at {at}",
                ordinal_label(*ordinal),
                weekday_name(*weekday)
            ),
            Recurrence::Monthly(MonthlyRule::DayOfMonth(day)) => {
                format!("Day {day} of each month at {at}")
            }
            Recurrence::Custom(dates) => format!(
                "Custom dates ({} scheduled)",
                dates.len()
            ),
        }
    }
}

impl fmt::Display for SchedulePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl TryFrom<RawSchedulePattern> for SchedulePattern {
    type Error = ScheduleError;

    fn try_from(raw: RawSchedulePattern) -> Result<Self> {
        let timezone = parse_timezone(&raw.timezone)?;
        let time_of_day = parse_time_of_day(raw.time.as_deref().unwrap_or(DEFAULT_TIME))?;

        let recurrence = match raw.frequency {
            FrequencyKind::Weekly => Recurrence::Weekly(require_weekday(&raw, "weekly")?),
            FrequencyKind::Biweekly => Recurrence::Biweekly(require_weekday(&raw, "biweekly")?),
            FrequencyKind::Monthly => Recurrence::Monthly(monthly_rule(&raw)?),
            FrequencyKind::Custom => Recurrence::Custom(raw.dates.clone()),
        };

        let start_date = match (raw.start_date, &recurrence) {
            (Some(date), _) => date,
            (None, Recurrence::Custom(dates)) => dates
                .iter()
                .min()
                .map(|first| local_date(&timezone, *first))
                .ok_or_else(|| {
                    ScheduleError::Configuration("custom pattern has no dates".to_string())
                })?,
            (None, _) => {
                return Err(ScheduleError::Configuration(
                    "start_date is required".to_string(),
                ))
            }
        };

        let mut pattern = SchedulePattern::new(recurrence, time_of_day, timezone.name(), start_date)?
            .with_duration_minutes(raw.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES));
        if let Some(end_date) = raw.end_date {
            pattern = pattern.with_end_date(end_date)?;
        }
        if let Some(location) = raw.location.filter(|l| !l.trim().is_empty()) {
            pattern = pattern.with_location(location);
        }
        Ok(pattern)
    }
}

// ── Validation helpers ──────────────────────────────────────────────────────

fn require_weekday(raw: &RawSchedulePattern, frequency: &str) -> Result<Weekday> {
    let index = raw.day_of_week.ok_or_else(|| {
        ScheduleError::Configuration(format!("day_of_week is required for {frequency} patterns"))
    })?;
    weekday_from_index(index)
}

fn monthly_rule(raw: &RawSchedulePattern) -> Result<MonthlyRule> {
    match (raw.week_of_month, raw.day_of_month) {
        (Some(_), Some(_)) => Err(ScheduleError::Configuration(
            "monthly pattern sets both week_of_month and day_of_month".to_string(),
        )),
        (Some(ordinal), None) => {
            let index = raw.day_of_week.ok_or_else(|| {
                ScheduleError::Configuration(
                    "day_of_week is required with week_of_month".to_string(),
                )
            })?;
            Ok(MonthlyRule::NthWeekday {
                ordinal,
                weekday: weekday_from_index(index)?,
            })
        }
        (None, Some(day)) => Ok(MonthlyRule::DayOfMonth(day as u32)),
        (None, None) => Err(ScheduleError::Configuration(
            "monthly pattern needs week_of_month or day_of_month".to_string(),
        )),
    }
}

fn normalize_recurrence(recurrence: Recurrence, tz: &Tz) -> Result<Recurrence> {
    match recurrence {
        Recurrence::Monthly(MonthlyRule::DayOfMonth(day)) if !(1..=31).contains(&day) => Err(
            ScheduleError::Configuration(format!("day_of_month {day} is outside 1-31")),
        ),
        Recurrence::Monthly(MonthlyRule::NthWeekday { ordinal, .. })
            if !(ordinal == -1 || (1..=5).contains(&ordinal)) =>
        {
            Err(ScheduleError::Configuration(format!(
                "week_of_month {ordinal} must be 1-5 or -1"
            )))
        }
        Recurrence::Custom(mut dates) => {
            if dates.is_empty() {
                return Err(ScheduleError::Configuration(
                    "custom pattern has no dates".to_string(),
                ));
            }
            dates.sort();
            // Each occurrence is keyed by its local date, so two instants on
            // the same local day would be indistinguishable.
            for pair in dates.windows(2) {
                let (a, b) = (local_date(tz, pair[0]), local_date(tz, pair[1]));
                if a == b {
                    return Err(ScheduleError::Configuration(format!(
                        "custom pattern has more than one session on {a}"
                    )));
                }
            }
            Ok(Recurrence::Custom(dates))
        }
        other => Ok(other),
    }
}

/// Map a Sunday-based index (0-6) to a `Weekday`.
pub fn weekday_from_index(index: u8) -> Result<Weekday> {
    match index {
        0 => Ok(Weekday::Sun),
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        _ => Err(ScheduleError::Configuration(format!(
            "day_of_week {index} is outside 0-6"
        ))),
    }
}

// ── Calendar helpers ────────────────────────────────────────────────────────

/// `None` only at the very end of the representable calendar.
pub(crate) fn first_weekday_on_or_after(date: NaiveDate, weekday: Weekday) -> Option<NaiveDate> {
    let diff = (weekday.num_days_from_monday() as i64 - date.weekday().num_days_from_monday() as i64
        + 7)
        % 7;
    date.checked_add_signed(TimeDelta::days(diff))
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    if month == 12 {
        return NaiveDate::from_ymd_opt(year, 12, 31);
    }
    NaiveDate::from_ymd_opt(year, month + 1, 1)?.pred_opt()
}

/// Find the Nth weekday in a month. ordinal < 0 means "last" (-1).
fn find_nth_weekday_in_month(
    year: i32,
    month: u32,
    weekday: Weekday,
    ordinal: i32,
) -> Option<NaiveDate> {
    let target = if ordinal > 0 {
        let first = first_weekday_on_or_after(NaiveDate::from_ymd_opt(year, month, 1)?, weekday)?;
        first.checked_add_signed(TimeDelta::weeks((ordinal - 1) as i64))?
    } else {
        let last = last_day_of_month(year, month)?;
        let diff =
            (last.weekday().num_days_from_monday() as i64 - weekday.num_days_from_monday() as i64
                + 7)
                % 7;
        last.checked_sub_signed(TimeDelta::days(diff) + TimeDelta::weeks((-ordinal - 1) as i64))?
    };
    (target.month() == month && target.year() == year).then_some(target)
}

// ── Display helpers ─────────────────────────────────────────────────────────

/// Full day name for a Sunday-based index, e.g. `day_name(2) == "Tuesday"`.
pub fn day_name(index: u8) -> &'static str {
    weekday_from_index(index).map_or("Unknown", weekday_name)
}

/// Short day name for a Sunday-based index, e.g. `short_day_name(2) == "Tue"`.
pub fn short_day_name(index: u8) -> &'static str {
    match weekday_from_index(index) {
        Ok(weekday) => &weekday_name(weekday)[..3],
        Err(_) => "???",
    }
}

pub(crate) fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn ordinal_label(ordinal: i8) -> &'static str {
    match ordinal {
        1 => "1st",
        2 => "2nd",
        3 => "3rd",
        4 => "4th",
        5 => "5th",
        _ => "Last",
    }
}

/// "19:00" → "7:00 PM".
pub(crate) fn format_time_12h(time: NaiveTime) -> String {
    let (is_pm, hour) = time.hour12();
    format!(
        "{hour}:{:02} {}",
        time.minute(),
        if is_pm { "PM" } else { "AM" }
    )
}

// ── Tests ───────────────────────────────────────────────────────────────────
