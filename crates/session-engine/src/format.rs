//! Session time formatting with DST-shift detection.
//!
//! Renders an occurrence instant in the viewer's zone and reports two
//! signals:
//!
//! - `is_dst_shift`: the authoring zone's UTC offset at this occurrence
//!   differs from its offset at the pattern's baseline (its start). The
//!   wall-clock time in the authoring zone is unchanged, but the absolute
//!   time is not.
//! - `viewer_shift`: the viewer's offset *relative to the authoring zone*
//!   differs from the baseline, so the session lands at an unusual local time
//!   for the viewer (one zone changed clocks and the other has not).
//!   Never set when viewer and authoring zone are the same.
//!
//! Neither is an error.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::Result;
use crate::pattern::SchedulePattern;
use crate::zone::{format_utc_offset, parse_timezone, utc_offset_seconds};

/// Minimum relative offset change reported as a shift.
const SHIFT_THRESHOLD_SECS: i32 = 30 * 60;

/// Clock convention for rendered times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HourCycle {
    /// "7:00 PM"
    #[default]
    H12,
    /// "19:00"
    H23,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftDirection {
    Earlier,
    Later,
}

/// How an occurrence moved on the viewer's clock relative to the baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DstShift {
    pub direction: ShiftDirection,
    /// Size of the shift in hours (0.5 for half-hour zones).
    pub hours: f64,
    pub warning: String,
}

/// Display strings for one occurrence in one viewer's zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedSessionTime {
    /// e.g. "Thursday, January 4"
    pub date: String,
    /// e.g. "7:00 PM"
    pub time: String,
    /// e.g. "Thursday, January 4 at 7:00 PM"
    pub full: String,
    /// Zone abbreviation at this instant, e.g. "EST".
    pub timezone_label: String,
    /// Viewer's UTC offset at this instant, e.g. "-05:00".
    pub utc_offset: String,
    pub is_dst_shift: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer_shift: Option<DstShift>,
}

/// Formats occurrences of one pattern for any viewer.
#[derive(Debug, Clone, Copy)]
pub struct SessionFormatter {
    authoring: Tz,
    baseline: DateTime<Utc>,
    hour_cycle: HourCycle,
}

impl SessionFormatter {
    /// # Errors
    ///
    /// [`crate::ScheduleError::UnknownTimezone`] if `authoring_zone` is not a
    /// valid IANA name.
    pub fn new(authoring_zone: &str, baseline: DateTime<Utc>) -> Result<Self> {
        Ok(Self::for_zone(parse_timezone(authoring_zone)?, baseline))
    }

    pub fn for_zone(authoring: Tz, baseline: DateTime<Utc>) -> Self {
        Self {
            authoring,
            baseline,
            hour_cycle: HourCycle::default(),
        }
    }

    /// A formatter using the pattern's own zone and baseline.
    pub fn for_pattern(pattern: &SchedulePattern) -> Self {
        Self {
            authoring: pattern.timezone(),
            baseline: pattern.baseline_instant(),
            hour_cycle: HourCycle::default(),
        }
    }

    pub fn with_hour_cycle(mut self, hour_cycle: HourCycle) -> Self {
        self.hour_cycle = hour_cycle;
        self
    }

    /// Format `instant` for a viewer in `viewer_zone`.
    ///
    /// # Errors
    ///
    /// [`crate::ScheduleError::UnknownTimezone`] if `viewer_zone` is invalid.
    pub fn format(&self, instant: DateTime<Utc>, viewer_zone: &str) -> Result<FormattedSessionTime> {
        Ok(self.format_in(instant, parse_timezone(viewer_zone)?))
    }

    /// Format `instant` for a viewer in an already-parsed zone.
    pub fn format_in(&self, instant: DateTime<Utc>, viewer: Tz) -> FormattedSessionTime {
        let local = instant.with_timezone(&viewer);
        let date = local.format("%A, %B %-d").to_string();
        let time = match self.hour_cycle {
            HourCycle::H12 => local.format("%-I:%M %p").to_string(),
            HourCycle::H23 => local.format("%H:%M").to_string(),
        };

        FormattedSessionTime {
            full: format!("{date} at {time}"),
            date,
            time,
            timezone_label: local.format("%Z").to_string(),
            utc_offset: format_utc_offset(utc_offset_seconds(&viewer, instant)),
            is_dst_shift: utc_offset_seconds(&self.authoring, instant)
                != utc_offset_seconds(&self.authoring, self.baseline),
            viewer_shift: detect_dst_shift(instant, self.authoring, viewer, self.baseline),
        }
    }
}

/// Format `instant` for a viewer, measuring DST shifts against `baseline`.
///
/// # Errors
///
/// [`crate::ScheduleError::UnknownTimezone`] if either zone is invalid.
pub fn format_session_time(
    instant: DateTime<Utc>,
    authoring_zone: &str,
    viewer_zone: &str,
    baseline: DateTime<Utc>,
) -> Result<FormattedSessionTime> {
    SessionFormatter::new(authoring_zone, baseline)?.format(instant, viewer_zone)
}

/// The shift, if any, in the viewer's local time for `instant` compared to
/// the same session at `baseline`.
pub fn detect_dst_shift(
    instant: DateTime<Utc>,
    authoring: Tz,
    viewer: Tz,
    baseline: DateTime<Utc>,
) -> Option<DstShift> {
    if authoring == viewer {
        return None;
    }
    let relative = |at: DateTime<Utc>| utc_offset_seconds(&viewer, at) - utc_offset_seconds(&authoring, at);
    let shift_secs = relative(instant) - relative(baseline);
    if shift_secs.abs() < SHIFT_THRESHOLD_SECS {
        return None;
    }

    let direction = if shift_secs > 0 {
        ShiftDirection::Later
    } else {
        ShiftDirection::Earlier
    };
    let hours = shift_secs.unsigned_abs() as f64 / 3600.0;
    let amount = if hours.fract() == 0.0 {
        format!("{hours:.0}")
    } else {
        format!("{hours}")
    };
    let warning = format!(
        "Due to daylight saving time changes, this session is {amount} hour{} {} than usual in your timezone.",
        if hours == 1.0 { "" } else { "s" },
        match direction {
            ShiftDirection::Earlier => "earlier",
            ShiftDirection::Later => "later",
        }
    );
    Some(DstShift {
        direction,
        hours,
        warning,
    })
}
