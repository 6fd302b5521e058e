//! Per-occurrence overrides: skip, reschedule, confirm.
//!
//! Exceptions are sparse. They are keyed by the canonical occurrence date
//! (the local date the unmodified rule produces) and never touch the pattern
//! itself. [`ExceptionSet`] is the validated lookup the overlay reads from.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ScheduleError};
use crate::pattern::SchedulePattern;
use crate::zone::{format_time_of_day, parse_time_of_day};

/// What an exception does to its occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionAction {
    Skip,
    Confirm,
    Reschedule { new_date: DateTime<Utc> },
    /// A reschedule written as a wall-clock date, and optionally a time, in
    /// the pattern's zone. [`ExceptionSet::insert`] resolves it to
    /// [`ExceptionAction::Reschedule`]; the time defaults to the pattern's.
    RescheduleLocal {
        new_date: NaiveDate,
        new_time: Option<NaiveTime>,
    },
}

/// A sparse override for one occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawScheduleException", into = "RawScheduleException")]
pub struct ScheduleException {
    /// Canonical key of the occurrence this overrides. Stable across reschedules.
    pub original_date_string: NaiveDate,
    pub action: ExceptionAction,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ActionKind {
    Skip,
    #[serde(alias = "confirmed")]
    Confirm,
    Reschedule,
}

/// Wire form of an exception. Older rows use `date` and `type` for the key
/// and action, and store a reschedule target as a local "YYYY-MM-DD" plus an
/// optional "HH:MM" instead of an instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawScheduleException {
    #[serde(alias = "date")]
    original_date_string: NaiveDate,
    #[serde(alias = "type")]
    action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl TryFrom<RawScheduleException> for ScheduleException {
    type Error = ScheduleError;

    fn try_from(raw: RawScheduleException) -> Result<Self> {
        let action = match raw.action {
            ActionKind::Skip => ExceptionAction::Skip,
            ActionKind::Confirm => ExceptionAction::Confirm,
            ActionKind::Reschedule => {
                let new_date = raw.new_date.as_deref().ok_or_else(|| {
                    ScheduleError::Configuration(format!(
                        "reschedule of {} has no new_date",
                        raw.original_date_string
                    ))
                })?;
                reschedule_target(new_date, raw.new_time.as_deref())?
            }
        };
        Ok(Self {
            original_date_string: raw.original_date_string,
            action,
            reason: raw.reason,
        })
    }
}

impl From<ScheduleException> for RawScheduleException {
    fn from(exception: ScheduleException) -> Self {
        let (action, new_date, new_time) = match exception.action {
            ExceptionAction::Skip => (ActionKind::Skip, None, None),
            ExceptionAction::Confirm => (ActionKind::Confirm, None, None),
            ExceptionAction::Reschedule { new_date } => (
                ActionKind::Reschedule,
                Some(new_date.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
                None,
            ),
            ExceptionAction::RescheduleLocal { new_date, new_time } => (
                ActionKind::Reschedule,
                Some(new_date.format("%Y-%m-%d").to_string()),
                new_time.map(format_time_of_day),
            ),
        };
        Self {
            original_date_string: exception.original_date_string,
            action,
            new_date,
            new_time,
            reason: exception.reason,
        }
    }
}

/// An RFC 3339 instant, or a local date with an optional time of day.
fn reschedule_target(new_date: &str, new_time: Option<&str>) -> Result<ExceptionAction> {
    if let Ok(instant) = new_date.parse::<DateTime<Utc>>() {
        return Ok(ExceptionAction::Reschedule { new_date: instant });
    }
    let date = NaiveDate::parse_from_str(new_date.trim(), "%Y-%m-%d").map_err(|e| {
        ScheduleError::Configuration(format!("new_date '{new_date}' is not a date or instant: {e}"))
    })?;
    Ok(ExceptionAction::RescheduleLocal {
        new_date: date,
        new_time: new_time.map(parse_time_of_day).transpose()?,
    })
}

impl ScheduleException {
    pub fn skip(original: NaiveDate, reason: Option<String>) -> Self {
        Self {
            original_date_string: original,
            action: ExceptionAction::Skip,
            reason,
        }
    }

    pub fn confirm(original: NaiveDate) -> Self {
        Self {
            original_date_string: original,
            action: ExceptionAction::Confirm,
            reason: None,
        }
    }

    pub fn reschedule(original: NaiveDate, new_date: DateTime<Utc>, reason: Option<String>) -> Self {
        Self {
            original_date_string: original,
            action: ExceptionAction::Reschedule { new_date },
            reason,
        }
    }

    /// Reschedule to a wall-clock date in the pattern's timezone. `new_time`
    /// defaults to the pattern's own time of day.
    pub fn reschedule_local(
        pattern: &SchedulePattern,
        original: NaiveDate,
        new_date: NaiveDate,
        new_time: Option<NaiveTime>,
        reason: Option<String>,
    ) -> Self {
        let instant = pattern.local_instant(new_date, new_time.unwrap_or(pattern.time_of_day()));
        Self::reschedule(original, instant, reason)
    }

    pub fn new_date(&self) -> Option<DateTime<Utc>> {
        match self.action {
            ExceptionAction::Reschedule { new_date } => Some(new_date),
            _ => None,
        }
    }
}

/// What to do when two exceptions share an `original_date_string`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// The later exception replaces the earlier one.
    #[default]
    LastWriteWins,
    /// Fail with [`ScheduleError::DuplicateException`].
    Reject,
}

/// An exception together with the instant its key resolves to under the
/// pattern. `original` is `None` for a key that is not an occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedException {
    pub exception: ScheduleException,
    pub original: Option<DateTime<Utc>>,
}

/// Validated exceptions for one pattern, keyed by canonical date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionSet {
    by_date: BTreeMap<NaiveDate, ResolvedException>,
}

impl ExceptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `exceptions` against `pattern`.
    ///
    /// A reschedule whose new instant equals the original instant is a no-op
    /// and is stored as a confirm. Keys that are not occurrences of the
    /// pattern are kept (so they round-trip) but never match anything.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::DuplicateException`] when `policy` is
    /// [`DuplicatePolicy::Reject`] and two exceptions share a key.
    pub fn build<I>(pattern: &SchedulePattern, exceptions: I, policy: DuplicatePolicy) -> Result<Self>
    where
        I: IntoIterator<Item = ScheduleException>,
    {
        let mut set = Self::new();
        for exception in exceptions {
            set.insert(pattern, exception, policy)?;
        }
        Ok(set)
    }

    /// Insert or replace one exception, returning the one it replaced.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::DuplicateException`] under [`DuplicatePolicy::Reject`]
    /// if the key is already present.
    pub fn insert(
        &mut self,
        pattern: &SchedulePattern,
        mut exception: ScheduleException,
        policy: DuplicatePolicy,
    ) -> Result<Option<ScheduleException>> {
        let key = exception.original_date_string;
        if policy == DuplicatePolicy::Reject && self.by_date.contains_key(&key) {
            return Err(ScheduleError::DuplicateException(key));
        }
        if let ExceptionAction::RescheduleLocal { new_date, new_time } = exception.action {
            let reason = exception.reason.take();
            exception = ScheduleException::reschedule_local(pattern, key, new_date, new_time, reason);
        }

        let original = pattern.occurrence_on(key);
        if original.is_none() {
            warn!(date = %key, "exception does not match any occurrence of the pattern");
        }
        if let (Some(original), Some(new_date)) = (original, exception.new_date()) {
            if original == new_date {
                debug!(date = %key, "reschedule to the original instant treated as confirm");
                exception.action = ExceptionAction::Confirm;
            }
        }

        let previous = self.by_date.insert(
            key,
            ResolvedException {
                exception,
                original,
            },
        );
        if previous.is_some() {
            debug!(date = %key, "exception replaced an earlier one");
        }
        Ok(previous.map(|p| p.exception))
    }

    /// Drop the exception for `key`, if any.
    pub fn remove(&mut self, key: NaiveDate) -> Option<ScheduleException> {
        self.by_date.remove(&key).map(|r| r.exception)
    }

    pub fn get(&self, key: NaiveDate) -> Option<&ScheduleException> {
        self.by_date.get(&key).map(|r| &r.exception)
    }

    pub fn resolved(&self, key: NaiveDate) -> Option<&ResolvedException> {
        self.by_date.get(&key)
    }

    /// Exceptions in key order.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduleException> {
        self.by_date.values().map(|r| &r.exception)
    }

    /// Reschedules whose key is a real occurrence, with that occurrence's instant.
    pub fn reschedules(&self) -> impl Iterator<Item = (&ScheduleException, DateTime<Utc>, DateTime<Utc>)> {
        self.by_date.values().filter_map(|r| {
            let original = r.original?;
            let new_date = r.exception.new_date()?;
            Some((&r.exception, original, new_date))
        })
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    /// The exceptions as a list, for persisting.
    pub fn to_vec(&self) -> Vec<ScheduleException> {
        self.iter().cloned().collect()
    }
}
