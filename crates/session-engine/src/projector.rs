//! Raw occurrence projection: pattern → ascending sequence of instants.
//!
//! [`Occurrences`] is a lazy iterator over the exception-free occurrences of a
//! [`SchedulePattern`] on or after a starting instant. It is restartable:
//! cloning it, or calling [`SchedulePattern::occurrences_from`] again with the
//! same instant, yields the same sequence.
//!
//! All stepping happens on local calendar dates in the pattern's timezone.
//! Each date is converted to an absolute instant only when it is emitted, so a
//! session "every Thursday at 7pm Eastern" stays at 7pm Eastern across DST
//! boundaries while its UTC instant moves by an hour.

use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use serde::Serialize;

use crate::pattern::{first_weekday_on_or_after, Recurrence, SchedulePattern};
use crate::zone::local_date;

/// One occurrence of the unmodified rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RawOccurrence {
    /// Absolute start instant.
    pub date: DateTime<Utc>,
    /// Canonical key: the local date in the pattern's timezone.
    pub date_string: NaiveDate,
}

#[derive(Debug, Clone)]
enum Cursor {
    /// Weekly and biweekly: the next candidate date and the step in days.
    /// `next` is `None` once stepping would leave the calendar.
    Stepping { next: Option<NaiveDate>, step_days: i64 },
    /// Monthly: the next calendar month to resolve.
    Monthly { year: i32, month: u32 },
    /// Custom: index into the sorted instant list.
    Custom { index: usize },
}

/// Lazy, ascending occurrences of a pattern on or after `from`.
#[derive(Debug, Clone)]
pub struct Occurrences<'a> {
    pattern: &'a SchedulePattern,
    from: DateTime<Utc>,
    cursor: Cursor,
    exhausted: bool,
}

impl<'a> Occurrences<'a> {
    fn new(pattern: &'a SchedulePattern, from: DateTime<Utc>) -> Self {
        let tz = pattern.timezone();
        // Any occurrence on a local date before `from`'s local date is
        // already in the past, so candidates can start there.
        let floor = local_date(&tz, from).max(pattern.start_date());

        let cursor = match pattern.recurrence() {
            Recurrence::Weekly(weekday) => Cursor::Stepping {
                next: first_weekday_on_or_after(floor, *weekday),
                step_days: 7,
            },
            Recurrence::Biweekly(weekday) => {
                let next = pattern.anchor_date(*weekday).and_then(|anchor| {
                    let elapsed = (floor - anchor).num_days().max(0);
                    // Round up to the next slot on the grid anchored at `anchor`.
                    let periods = (elapsed + 13) / 14;
                    anchor.checked_add_signed(TimeDelta::days(periods * 14))
                });
                Cursor::Stepping { next, step_days: 14 }
            }
            Recurrence::Monthly(_) => Cursor::Monthly {
                year: floor.year(),
                month: floor.month(),
            },
            Recurrence::Custom(_) => Cursor::Custom { index: 0 },
        };

        Self {
            pattern,
            from,
            cursor,
            exhausted: false,
        }
    }

    /// Next candidate `(local date, instant)` in ascending order, before
    /// range and `from` filtering. `None` once the candidates run out.
    fn next_candidate(&mut self) -> Option<(NaiveDate, DateTime<Utc>)> {
        let pattern = self.pattern;
        match &mut self.cursor {
            Cursor::Stepping { next, step_days } => {
                let date = (*next)?;
                *next = date.checked_add_signed(TimeDelta::days(*step_days));
                Some((date, pattern.local_instant(date, pattern.time_of_day())))
            }
            Cursor::Monthly { year, month } => {
                let Recurrence::Monthly(rule) = pattern.recurrence() else {
                    return None;
                };
                loop {
                    let (y, m) = (*year, *month);
                    if *month == 12 {
                        *year += 1;
                        *month = 1;
                    } else {
                        *month += 1;
                    }
                    if let Some(date) = rule.resolve(y, m) {
                        return Some((date, pattern.local_instant(date, pattern.time_of_day())));
                    }
                    // No such weekday this month (e.g. a 5th Thursday); once the
                    // whole month lies past the end date there is nothing left.
                    let month_start = NaiveDate::from_ymd_opt(y, m, 1)?;
                    if pattern.end_date().is_some_and(|end| month_start > end) {
                        return None;
                    }
                }
            }
            Cursor::Custom { index } => {
                let Recurrence::Custom(dates) = pattern.recurrence() else {
                    return None;
                };
                let instant = *dates.get(*index)?;
                *index += 1;
                Some((local_date(&pattern.timezone(), instant), instant))
            }
        }
    }
}

impl Iterator for Occurrences<'_> {
    type Item = RawOccurrence;

    fn next(&mut self) -> Option<RawOccurrence> {
        if self.exhausted {
            return None;
        }
        loop {
            let Some((date, instant)) = self.next_candidate() else {
                self.exhausted = true;
                return None;
            };
            if self.pattern.end_date().is_some_and(|end| date > end) {
                self.exhausted = true;
                return None;
            }
            if date < self.pattern.start_date() || instant < self.from {
                continue;
            }
            return Some(RawOccurrence {
                date: instant,
                date_string: date,
            });
        }
    }
}

impl SchedulePattern {
    /// Lazy occurrences of this pattern on or after `from`.
    pub fn occurrences_from(&self, from: DateTime<Utc>) -> Occurrences<'_> {
        Occurrences::new(self, from)
    }
}

/// Up to `count` raw occurrences of `pattern` on or after `from`.
///
/// Returns fewer than `count` only when the pattern's end date (or a custom
/// list) runs out.
pub fn generate(pattern: &SchedulePattern, from: DateTime<Utc>, count: usize) -> Vec<RawOccurrence> {
    pattern.occurrences_from(from).take(count).collect()
}

// ── Tests ───────────────────────────────────────────────────────────────────
