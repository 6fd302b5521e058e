//! Exception overlay: raw occurrences + exceptions → projected sessions.
//!
//! Output is strictly ascending by `date`. `count` is the number of
//! *actionable* sessions (pending or confirmed) to return: skipped
//! occurrences and the `rescheduled` marker left in a moved session's
//! original slot are emitted inline, so callers can render them struck
//! through, but they do not use up a slot. The list ends at the `count`-th
//! actionable session, or earlier if the pattern runs out.
//!
//! A reschedule emits two entries: the marker at the original slot, and the
//! replacement at its new instant. The replacement keeps the original
//! `date_string` (so later lookups by key still resolve) and carries
//! `rescheduled_from`. Replacements are built from the exception set up
//! front, not discovered while walking the raw sequence, because a
//! replacement may move ahead of occurrences that have not been pulled yet.

use std::iter::Peekable;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::exception::{ExceptionAction, ExceptionSet, ScheduleException};
use crate::projector::RawOccurrence;

/// Status of a projected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceStatus {
    /// No exception. Rendered as "on" or "awaiting confirmation" depending on
    /// the campaign's attendance mode.
    Pending,
    Confirmed,
    Skipped,
    /// The marker left in the original slot of a moved session.
    Rescheduled,
}

/// One session in the upcoming list. Computed fresh on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedSession {
    pub date: DateTime<Utc>,
    /// Canonical key. For a replacement this is still the original key.
    pub date_string: NaiveDate,
    pub status: OccurrenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ScheduleException>,
    /// Original instant; set only on the replacement of a moved session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rescheduled_from: Option<DateTime<Utc>>,
}

impl ProjectedSession {
    /// Whether the session is expected to happen (pending or confirmed).
    pub fn is_actionable(&self) -> bool {
        matches!(
            self.status,
            OccurrenceStatus::Pending | OccurrenceStatus::Confirmed
        )
    }

    /// Whether this is the replacement entry of a moved session.
    pub fn is_replacement(&self) -> bool {
        self.rescheduled_from.is_some()
    }
}

/// Annotate one raw occurrence with its exception, if any.
fn overlay_one(occurrence: RawOccurrence, exceptions: &ExceptionSet) -> ProjectedSession {
    let exception = exceptions.get(occurrence.date_string).cloned();
    let status = match exception.as_ref().map(|e| e.action) {
        None => OccurrenceStatus::Pending,
        Some(ExceptionAction::Confirm) => OccurrenceStatus::Confirmed,
        Some(ExceptionAction::Skip) => OccurrenceStatus::Skipped,
        Some(ExceptionAction::Reschedule { .. } | ExceptionAction::RescheduleLocal { .. }) => {
            OccurrenceStatus::Rescheduled
        }
    };
    ProjectedSession {
        date: occurrence.date,
        date_string: occurrence.date_string,
        status,
        exception,
        rescheduled_from: None,
    }
}

/// Replacement entries on or after `from`, ascending.
fn replacements(exceptions: &ExceptionSet, from: DateTime<Utc>) -> Vec<ProjectedSession> {
    let mut moved: Vec<ProjectedSession> = exceptions
        .reschedules()
        .filter(|(_, _, new_date)| *new_date >= from)
        .map(|(exception, original, new_date)| ProjectedSession {
            date: new_date,
            date_string: exception.original_date_string,
            status: OccurrenceStatus::Pending,
            exception: Some(exception.clone()),
            rescheduled_from: Some(original),
        })
        .collect();
    moved.sort_by_key(|s| (s.date, s.date_string));
    moved
}

/// Merge two ascending streams; on ties the raw entry comes first.
struct Merge<R: Iterator<Item = ProjectedSession>, M: Iterator<Item = ProjectedSession>> {
    raw: Peekable<R>,
    moved: Peekable<M>,
}

impl<R, M> Iterator for Merge<R, M>
where
    R: Iterator<Item = ProjectedSession>,
    M: Iterator<Item = ProjectedSession>,
{
    type Item = ProjectedSession;

    fn next(&mut self) -> Option<ProjectedSession> {
        match (self.raw.peek(), self.moved.peek()) {
            (Some(raw), Some(moved)) if moved.date < raw.date => self.moved.next(),
            (Some(_), _) => self.raw.next(),
            (None, _) => self.moved.next(),
        }
    }
}

/// Overlay `exceptions` onto `raw` (ascending occurrences on or after
/// `from`) and return sessions up to and including the `count`-th
/// actionable one.
///
/// `raw` is pulled lazily and only as far as needed.
pub fn apply<I>(
    raw: I,
    exceptions: &ExceptionSet,
    from: DateTime<Utc>,
    count: usize,
) -> Vec<ProjectedSession>
where
    I: IntoIterator<Item = RawOccurrence>,
{
    let mut sessions = Vec::new();
    if count == 0 {
        return sessions;
    }

    let merged = Merge {
        raw: raw
            .into_iter()
            .map(|occurrence| overlay_one(occurrence, exceptions))
            .peekable(),
        moved: replacements(exceptions, from).into_iter().peekable(),
    };

    let mut actionable = 0;
    for session in merged {
        if session.is_actionable() {
            actionable += 1;
        }
        sessions.push(session);
        if actionable == count {
            break;
        }
    }
    sessions
}
