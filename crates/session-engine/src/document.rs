//! A campaign's persisted schedule, as loaded by request handlers.
//!
//! [`ScheduleDocument`] is the wire shape (settings, pattern, exceptions, and
//! the manually set next session used in simple mode). [`Schedule`] is the
//! validated form every other operation takes.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::error::Result;
use crate::exception::{DuplicatePolicy, ExceptionSet, ScheduleException};
use crate::overlay::{OccurrenceStatus, ProjectedSession};
use crate::pattern::{RawSchedulePattern, SchedulePattern, DEFAULT_TIME};
use crate::settings::{ScheduleMode, ScheduleSettings};
use crate::upcoming::{next_session, upcoming_sessions};
use crate::zone::{format_time_of_day, parse_time_of_day, parse_timezone, resolve_local};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDocument {
    #[serde(default)]
    pub settings: ScheduleSettings,
    #[serde(default)]
    pub pattern: Option<RawSchedulePattern>,
    #[serde(default)]
    pub exceptions: Vec<ScheduleException>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_session_date: Option<NaiveDate>,
    /// "HH:MM"; defaults to 19:00.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_session_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_session_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_session_notes: Option<String>,
    /// Zone for the manual next session when there is no pattern. Defaults to UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// A manually scheduled next session (simple mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextSessionOverride {
    pub date: DateTime<Utc>,
    pub date_string: NaiveDate,
    /// Wall-clock time and zone `date` was resolved from.
    #[serde(skip)]
    pub time: NaiveTime,
    #[serde(skip)]
    pub timezone: Tz,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A validated campaign schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub settings: ScheduleSettings,
    pub pattern: Option<SchedulePattern>,
    pub exceptions: ExceptionSet,
    pub manual: Option<NextSessionOverride>,
}

impl ScheduleDocument {
    /// Validate into a [`Schedule`].
    ///
    /// # Errors
    ///
    /// Any pattern validation error, [`crate::ScheduleError::UnknownTimezone`]
    /// for a bad document timezone, [`crate::ScheduleError::InvalidTime`] for
    /// a bad next-session time, or a duplicate exception under
    /// [`DuplicatePolicy::Reject`].
    pub fn validate(self, policy: DuplicatePolicy) -> Result<Schedule> {
        let pattern = self.pattern.map(SchedulePattern::try_from).transpose()?;

        let exceptions = match &pattern {
            Some(pattern) => ExceptionSet::build(pattern, self.exceptions, policy)?,
            None => {
                if !self.exceptions.is_empty() {
                    debug!(
                        count = self.exceptions.len(),
                        "ignoring exceptions without a pattern"
                    );
                }
                ExceptionSet::new()
            }
        };

        let manual = match self.next_session_date {
            Some(date) => {
                let tz: Tz = match (&pattern, &self.timezone) {
                    (_, Some(name)) => parse_timezone(name)?,
                    (Some(pattern), None) => pattern.timezone(),
                    (None, None) => Tz::UTC,
                };
                let time =
                    parse_time_of_day(self.next_session_time.as_deref().unwrap_or(DEFAULT_TIME))?;
                Some(NextSessionOverride {
                    date: resolve_local(&tz, date, time),
                    date_string: date,
                    time,
                    timezone: tz,
                    location: self.next_session_location,
                    notes: self.next_session_notes,
                })
            }
            None => None,
        };

        Ok(Schedule {
            settings: self.settings,
            pattern,
            exceptions,
            manual,
        })
    }
}

impl Schedule {
    /// The recurring pattern, if the campaign is in full scheduling mode.
    pub fn active_pattern(&self) -> Option<&SchedulePattern> {
        match self.settings.mode {
            ScheduleMode::Full => self.pattern.as_ref(),
            ScheduleMode::Off | ScheduleMode::Simple => None,
        }
    }

    /// Upcoming sessions from `from`. Empty outside full mode.
    pub fn upcoming(&self, from: DateTime<Utc>, count: usize) -> Vec<ProjectedSession> {
        upcoming_sessions(self.active_pattern(), &self.exceptions, from, count)
    }

    /// Upcoming sessions from the clock's "now".
    pub fn upcoming_now(&self, clock: &impl Clock, count: usize) -> Vec<ProjectedSession> {
        self.upcoming(clock.now(), count)
    }

    /// The next session: projected in full mode, the manual one in simple
    /// mode (if it has not started yet), nothing when scheduling is off.
    pub fn next_session(&self, from: DateTime<Utc>) -> Option<ProjectedSession> {
        match self.settings.mode {
            ScheduleMode::Off => None,
            ScheduleMode::Full => next_session(self.pattern.as_ref(), &self.exceptions, from),
            ScheduleMode::Simple => self
                .manual
                .as_ref()
                .filter(|manual| manual.date >= from)
                .map(|manual| ProjectedSession {
                    date: manual.date,
                    date_string: manual.date_string,
                    status: OccurrenceStatus::Pending,
                    exception: None,
                    rescheduled_from: None,
                }),
        }
    }

    /// Back to the persisted shape.
    pub fn to_document(&self) -> ScheduleDocument {
        ScheduleDocument {
            settings: self.settings.clone(),
            pattern: self.pattern.as_ref().map(SchedulePattern::to_raw),
            exceptions: self.exceptions.to_vec(),
            next_session_date: self.manual.as_ref().map(|m| m.date_string),
            next_session_time: self.manual.as_ref().map(|m| format_time_of_day(m.time)),
            next_session_location: self.manual.as_ref().and_then(|m| m.location.clone()),
            next_session_notes: self.manual.as_ref().and_then(|m| m.notes.clone()),
            timezone: self.manual.as_ref().map(|m| m.timezone.name().to_string()),
        }
    }

    /// The zone sessions are authored in: the manual session's zone in simple
    /// mode, otherwise the pattern's. UTC when neither is set.
    pub fn authoring_zone(&self) -> Tz {
        let pattern = self.pattern.as_ref().map(SchedulePattern::timezone);
        let manual = self.manual.as_ref().map(|m| m.timezone);
        let preferred = match self.settings.mode {
            ScheduleMode::Simple => manual.or(pattern),
            ScheduleMode::Off | ScheduleMode::Full => pattern.or(manual),
        };
        preferred.unwrap_or(Tz::UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::ScheduleError;
    use chrono::TimeZone;

    const FULL: &str = r#"{
        "settings": {"mode": "full", "minimum_players": 4},
        "pattern": {
            "frequency": "weekly",
            "day_of_week": 4,
            "time": "19:00",
            "timezone": "America/New_York",
            "start_date": "2024-01-04",
            "location": "Discord"
        },
        "exceptions": [
            {"original_date_string": "2024-01-11", "action": "skip", "reason": "holiday"}
        ]
    }"#;

    fn jan_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_full_mode_document() {
        let doc: ScheduleDocument = serde_json::from_str(FULL).unwrap();
        let schedule = doc.validate(DuplicatePolicy::LastWriteWins).unwrap();
        assert_eq!(schedule.settings.minimum_players, 4);
        assert_eq!(schedule.pattern.as_ref().unwrap().location(), Some("Discord"));
        assert_eq!(schedule.exceptions.len(), 1);

        let upcoming = schedule.upcoming_now(&FixedClock(jan_first()), 2);
        assert_eq!(upcoming.len(), 3);
        assert_eq!(upcoming[1].status, OccurrenceStatus::Skipped);
    }

    #[test]
    fn test_simple_mode_ignores_pattern() {
        let mut doc: ScheduleDocument = serde_json::from_str(FULL).unwrap();
        doc.settings.mode = ScheduleMode::Simple;
        doc.next_session_date = NaiveDate::from_ymd_opt(2024, 1, 6);
        doc.next_session_time = Some("18:30".to_string());
        let schedule = doc.validate(DuplicatePolicy::LastWriteWins).unwrap();

        assert!(schedule.upcoming(jan_first(), 4).is_empty());
        let next = schedule.next_session(jan_first()).unwrap();
        assert_eq!(next.date_string, NaiveDate::from_ymd_opt(2024, 1, 6).unwrap());
        // Resolved in the pattern's zone: 18:30 EST
        assert_eq!(next.date, Utc.with_ymd_and_hms(2024, 1, 6, 23, 30, 0).unwrap());

        // Once it has passed there is no next session.
        let later = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        assert!(schedule.next_session(later).is_none());
    }

    #[test]
    fn test_off_mode_has_nothing() {
        let mut doc: ScheduleDocument = serde_json::from_str(FULL).unwrap();
        doc.settings.mode = ScheduleMode::Off;
        let schedule = doc.validate(DuplicatePolicy::LastWriteWins).unwrap();
        assert!(schedule.upcoming(jan_first(), 4).is_empty());
        assert!(schedule.next_session(jan_first()).is_none());
    }

    #[test]
    fn test_full_mode_next_session() {
        let doc: ScheduleDocument = serde_json::from_str(FULL).unwrap();
        let schedule = doc.validate(DuplicatePolicy::LastWriteWins).unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        // Jan 11 is skipped, so the next one is Jan 18.
        let next = schedule.next_session(from).unwrap();
        assert_eq!(next.date_string, NaiveDate::from_ymd_opt(2024, 1, 18).unwrap());
    }

    #[test]
    fn test_empty_document_defaults() {
        let schedule = ScheduleDocument::default()
            .validate(DuplicatePolicy::Reject)
            .unwrap();
        assert_eq!(schedule.settings, ScheduleSettings::default());
        assert!(schedule.pattern.is_none());
        assert!(schedule.manual.is_none());
    }

    #[test]
    fn test_manual_session_without_pattern_uses_document_zone() {
        let doc = ScheduleDocument {
            next_session_date: NaiveDate::from_ymd_opt(2024, 3, 2),
            timezone: Some("Asia/Tokyo".to_string()),
            ..ScheduleDocument::default()
        };
        let schedule = doc.validate(DuplicatePolicy::Reject).unwrap();
        // 19:00 JST
        assert_eq!(
            schedule.manual.unwrap().date,
            Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_invalid_pattern_surfaces_error() {
        let json = r#"{"pattern": {"frequency": "weekly", "timezone": "America/New_York", "start_date": "2024-01-04"}}"#;
        let doc: ScheduleDocument = serde_json::from_str(json).unwrap();
        assert!(matches!(
            doc.validate(DuplicatePolicy::LastWriteWins),
            Err(ScheduleError::Configuration(_))
        ));
    }

    #[test]
    fn test_duplicate_exceptions_rejected() {
        let mut doc: ScheduleDocument = serde_json::from_str(FULL).unwrap();
        doc.exceptions
            .push(ScheduleException::confirm(NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()));
        assert!(matches!(
            doc.clone().validate(DuplicatePolicy::Reject),
            Err(ScheduleError::DuplicateException(_))
        ));
        assert!(doc.validate(DuplicatePolicy::LastWriteWins).is_ok());
    }

    #[test]
    fn test_round_trip_document() {
        let doc: ScheduleDocument = serde_json::from_str(FULL).unwrap();
        let schedule = doc.validate(DuplicatePolicy::LastWriteWins).unwrap();
        let again = schedule
            .to_document()
            .validate(DuplicatePolicy::Reject)
            .unwrap();
        assert_eq!(schedule, again);
    }

    #[test]
    fn test_round_trip_manual_session() {
        let json = r#"{
            "settings": {"mode": "simple"},
            "next_session_date": "2024-03-02",
            "next_session_time": "18:30",
            "next_session_location": "Table 4",
            "timezone": "Asia/Tokyo"
        }"#;
        let doc: ScheduleDocument = serde_json::from_str(json).unwrap();
        let schedule = doc.validate(DuplicatePolicy::Reject).unwrap();
        // 18:30 JST
        let expected = Utc.with_ymd_and_hms(2024, 3, 2, 9, 30, 0).unwrap();
        assert_eq!(schedule.manual.as_ref().unwrap().date, expected);

        let persisted = schedule.to_document();
        assert_eq!(persisted.next_session_time.as_deref(), Some("18:30"));
        assert_eq!(persisted.timezone.as_deref(), Some("Asia/Tokyo"));

        let again = persisted.validate(DuplicatePolicy::Reject).unwrap();
        assert_eq!(again.manual.as_ref().unwrap().date, expected);
        assert_eq!(schedule, again);
    }

    #[test]
    fn test_authoring_zone() {
        let mut doc: ScheduleDocument = serde_json::from_str(FULL).unwrap();
        doc.next_session_date = NaiveDate::from_ymd_opt(2024, 3, 2);
        doc.timezone = Some("Asia/Tokyo".to_string());

        let full = doc.clone().validate(DuplicatePolicy::Reject).unwrap();
        assert_eq!(full.authoring_zone(), chrono_tz::America::New_York);

        doc.settings.mode = ScheduleMode::Simple;
        let simple = doc.validate(DuplicatePolicy::Reject).unwrap();
        assert_eq!(simple.authoring_zone(), chrono_tz::Asia::Tokyo);

        let empty = ScheduleDocument::default()
            .validate(DuplicatePolicy::Reject)
            .unwrap();
        assert_eq!(empty.authoring_zone(), Tz::UTC);
    }

    #[test]
    fn test_wall_clock_reschedule_rows_in_document() {
        let mut doc: ScheduleDocument = serde_json::from_str(FULL).unwrap();
        let row = r#"{"date":"2024-01-18","type":"reschedule","new_date":"2024-01-20","new_time":"14:00"}"#;
        doc.exceptions.push(serde_json::from_str(row).unwrap());
        let schedule = doc.validate(DuplicatePolicy::Reject).unwrap();

        let upcoming = schedule.upcoming(jan_first(), 3);
        let moved = upcoming.iter().find(|s| s.is_replacement()).unwrap();
        // 14:00 EST
        assert_eq!(moved.date, Utc.with_ymd_and_hms(2024, 1, 20, 19, 0, 0).unwrap());
        assert_eq!(moved.date_string, NaiveDate::from_ymd_opt(2024, 1, 18).unwrap());

        // Persisted as the resolved instant.
        let again = schedule
            .to_document()
            .validate(DuplicatePolicy::Reject)
            .unwrap();
        assert_eq!(schedule, again);
    }
}
