//! Upcoming sessions: the public entry point over projector + overlay.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::exception::ExceptionSet;
use crate::overlay::{apply, OccurrenceStatus, ProjectedSession};
use crate::pattern::SchedulePattern;

/// Default number of actionable sessions shown in upcoming lists.
pub const DEFAULT_UPCOMING_COUNT: usize = 4;

/// Upcoming sessions for `pattern` on or after `from`.
///
/// Returns an empty list when there is no pattern (the campaign is not in
/// full scheduling mode). See [`crate::overlay`] for how `count` treats
/// skipped and rescheduled entries.
pub fn upcoming_sessions(
    pattern: Option<&SchedulePattern>,
    exceptions: &ExceptionSet,
    from: DateTime<Utc>,
    count: usize,
) -> Vec<ProjectedSession> {
    let Some(pattern) = pattern else {
        return Vec::new();
    };
    let sessions = apply(pattern.occurrences_from(from), exceptions, from, count);
    debug!(
        from = %from,
        requested = count,
        returned = sessions.len(),
        exceptions = exceptions.len(),
        "projected upcoming sessions"
    );
    sessions
}

/// The first actionable session on or after `from`, if any.
pub fn next_session(
    pattern: Option<&SchedulePattern>,
    exceptions: &ExceptionSet,
    from: DateTime<Utc>,
) -> Option<ProjectedSession> {
    upcoming_sessions(pattern, exceptions, from, 1)
        .into_iter()
        .find(ProjectedSession::is_actionable)
}

/// Upcoming-sessions service bound to a clock.
#[derive(Debug, Clone, Default)]
pub struct UpcomingSessions<C = SystemClock> {
    clock: C,
}

impl<C: Clock> UpcomingSessions<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Upcoming sessions from the clock's "now".
    pub fn get_upcoming_sessions(
        &self,
        pattern: Option<&SchedulePattern>,
        exceptions: &ExceptionSet,
        count: usize,
    ) -> Vec<ProjectedSession> {
        upcoming_sessions(pattern, exceptions, self.clock.now(), count)
    }

    /// The next actionable session from the clock's "now".
    pub fn next_session(
        &self,
        pattern: Option<&SchedulePattern>,
        exceptions: &ExceptionSet,
    ) -> Option<ProjectedSession> {
        next_session(pattern, exceptions, self.clock.now())
    }
}

/// Entries the DM can act on (confirm, skip, reschedule): everything except
/// the marker left behind in a moved session's original slot.
pub fn dm_actionable(sessions: &[ProjectedSession]) -> impl Iterator<Item = &ProjectedSession> {
    sessions
        .iter()
        .filter(|s| s.status != OccurrenceStatus::Rescheduled)
}
