//! Per-occurrence attendance and quorum.
//!
//! Responses are keyed by the occurrence's canonical date and the member.
//! Writes are plain upserts (last write wins); who may write a response is
//! decided by the caller's permission layer.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::exception::ScheduleException;
use crate::settings::{AttendanceMode, ScheduleSettings};

pub type MemberId = String;

/// Reason attached to a skip proposed by [`auto_skip_exception`].
pub const AUTO_SKIP_REASON: &str = "Not enough players";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Attending,
    Unavailable,
    Late,
}

impl AttendanceStatus {
    /// Whether the member counts toward quorum. Late arrivals do.
    pub fn counts_toward_quorum(self) -> bool {
        matches!(self, AttendanceStatus::Attending | AttendanceStatus::Late)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One member's response for one occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberResponse {
    pub member_id: MemberId,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// In-memory attendance ledger: occurrence key → member → record.
#[derive(Debug, Clone, Default)]
pub struct AttendanceTracker {
    records: HashMap<NaiveDate, BTreeMap<MemberId, AttendanceRecord>>,
}

impl AttendanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a member's response, replacing any earlier one. Returns the
    /// replaced record.
    pub fn set_response(
        &mut self,
        occurrence: NaiveDate,
        member_id: impl Into<MemberId>,
        status: AttendanceStatus,
        note: Option<String>,
    ) -> Option<AttendanceRecord> {
        let note = note.filter(|n| !n.trim().is_empty());
        self.records
            .entry(occurrence)
            .or_default()
            .insert(member_id.into(), AttendanceRecord { status, note })
    }

    pub fn response(&self, occurrence: NaiveDate, member_id: &str) -> Option<&AttendanceRecord> {
        self.records.get(&occurrence)?.get(member_id)
    }

    /// Explicit responses for an occurrence, ordered by member id.
    pub fn responses(&self, occurrence: NaiveDate) -> Vec<MemberResponse> {
        self.records
            .get(&occurrence)
            .map(|members| {
                members
                    .iter()
                    .map(|(member_id, record)| MemberResponse {
                        member_id: member_id.clone(),
                        status: record.status,
                        note: record.note.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Responses for every member of `roster`. In assumed mode a member who
    /// has not responded is listed as attending; in confirmed mode they are
    /// left out.
    pub fn roster_responses(
        &self,
        occurrence: NaiveDate,
        roster: &[MemberId],
        mode: AttendanceMode,
    ) -> Vec<MemberResponse> {
        roster
            .iter()
            .filter_map(|member_id| match self.response(occurrence, member_id) {
                Some(record) => Some(MemberResponse {
                    member_id: member_id.clone(),
                    status: record.status,
                    note: record.note.clone(),
                }),
                None if mode == AttendanceMode::Assumed => Some(MemberResponse {
                    member_id: member_id.clone(),
                    status: AttendanceStatus::Attending,
                    note: None,
                }),
                None => None,
            })
            .collect()
    }

    /// Whether the explicit responses for `occurrence` meet `minimum_players`.
    pub fn quorum_met(&self, occurrence: NaiveDate, minimum_players: u32) -> bool {
        quorum_met(&self.responses(occurrence), minimum_players)
    }

    /// Forget every response for an occurrence.
    pub fn clear_occurrence(&mut self, occurrence: NaiveDate) {
        self.records.remove(&occurrence);
    }
}

/// Whether at least `minimum_players` responses are attending or late.
pub fn quorum_met(responses: &[MemberResponse], minimum_players: u32) -> bool {
    available_count(responses) >= minimum_players as usize
}

fn available_count(responses: &[MemberResponse]) -> usize {
    responses
        .iter()
        .filter(|r| r.status.counts_toward_quorum())
        .count()
}

/// Overall state of an occurrence given its responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Everyone can make it.
    On,
    /// Some absences, but quorum holds.
    OnPartial,
    /// Below quorum; the DM has to decide.
    NeedsDecision,
    /// Nobody to schedule.
    NotScheduled,
}

/// Attendance summary for the DM view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub label: String,
    pub available_count: usize,
    pub total_count: usize,
    pub unavailable: Vec<MemberResponse>,
    pub late: Vec<MemberResponse>,
    pub warnings: Vec<String>,
}

/// Summarize responses for one occurrence.
pub fn session_status(responses: &[MemberResponse], settings: &ScheduleSettings) -> SessionStatus {
    let unavailable: Vec<MemberResponse> = responses
        .iter()
        .filter(|r| r.status == AttendanceStatus::Unavailable)
        .cloned()
        .collect();
    let late: Vec<MemberResponse> = responses
        .iter()
        .filter(|r| r.status == AttendanceStatus::Late)
        .cloned()
        .collect();
    let available_count = available_count(responses);
    let total_count = responses.len();
    let minimum = settings.effective_minimum_players() as usize;

    let mut warnings = Vec::new();
    let (state, label) = if total_count == 0 {
        (SessionState::NotScheduled, "No players".to_string())
    } else if unavailable.is_empty() {
        (SessionState::On, "Session On".to_string())
    } else if available_count >= minimum {
        let absent = unavailable.len();
        warnings.push(format!(
            "{absent} player{} can't make it",
            if absent == 1 { "" } else { "s" }
        ));
        (SessionState::OnPartial, format!("On ({absent} absent)"))
    } else {
        warnings.push(format!(
            "Only {available_count}/{total_count} available (minimum: {minimum})"
        ));
        (SessionState::NeedsDecision, "Needs Decision".to_string())
    };

    SessionStatus {
        state,
        label,
        available_count,
        total_count,
        unavailable,
        late,
        warnings,
    }
}

/// A skip exception to persist when the campaign auto-skips sessions that
/// fall below quorum. `None` when no skip is warranted.
pub fn auto_skip_exception(
    occurrence: NaiveDate,
    status: &SessionStatus,
    settings: &ScheduleSettings,
) -> Option<ScheduleException> {
    (settings.auto_skip_below_minimum && status.state == SessionState::NeedsDecision)
        .then(|| ScheduleException::skip(occurrence, Some(AUTO_SKIP_REASON.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::ExceptionAction;

    fn key() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()
    }

    fn response(member: &str, status: AttendanceStatus) -> MemberResponse {
        MemberResponse {
            member_id: member.to_string(),
            status,
            note: None,
        }
    }

    #[test]
    fn test_quorum_counts_late_as_attending() {
        let responses = vec![
            response("A", AttendanceStatus::Attending),
            response("B", AttendanceStatus::Late),
            response("C", AttendanceStatus::Unavailable),
            response("D", AttendanceStatus::Attending),
        ];
        assert!(quorum_met(&responses, 3));
        assert!(!quorum_met(&responses, 4));
    }

    #[test]
    fn test_quorum_zero_minimum_always_met() {
        assert!(quorum_met(&[], 0));
        assert!(!quorum_met(&[], 1));
    }

    #[test]
    fn test_set_response_last_write_wins() {
        let mut tracker = AttendanceTracker::new();
        assert!(tracker
            .set_response(key(), "A", AttendanceStatus::Attending, None)
            .is_none());
        let previous = tracker
            .set_response(key(), "A", AttendanceStatus::Late, Some("traffic".into()))
            .unwrap();
        assert_eq!(previous.status, AttendanceStatus::Attending);

        let record = tracker.response(key(), "A").unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);
        assert_eq!(record.note.as_deref(), Some("traffic"));
        assert_eq!(tracker.responses(key()).len(), 1);
    }

    #[test]
    fn test_blank_note_dropped() {
        let mut tracker = AttendanceTracker::new();
        tracker.set_response(key(), "A", AttendanceStatus::Attending, Some("  ".into()));
        assert!(tracker.response(key(), "A").unwrap().note.is_none());
    }

    #[test]
    fn test_responses_are_per_occurrence() {
        let mut tracker = AttendanceTracker::new();
        let other = NaiveDate::from_ymd_opt(2024, 1, 18).unwrap();
        tracker.set_response(key(), "A", AttendanceStatus::Unavailable, None);
        tracker.set_response(other, "A", AttendanceStatus::Attending, None);
        assert_eq!(
            tracker.response(key(), "A").unwrap().status,
            AttendanceStatus::Unavailable
        );
        assert_eq!(
            tracker.response(other, "A").unwrap().status,
            AttendanceStatus::Attending
        );
        tracker.clear_occurrence(key());
        assert!(tracker.responses(key()).is_empty());
        assert_eq!(tracker.responses(other).len(), 1);
    }

    #[test]
    fn test_tracker_quorum() {
        let mut tracker = AttendanceTracker::new();
        tracker.set_response(key(), "A", AttendanceStatus::Attending, None);
        tracker.set_response(key(), "B", AttendanceStatus::Late, None);
        tracker.set_response(key(), "C", AttendanceStatus::Unavailable, None);
        tracker.set_response(key(), "D", AttendanceStatus::Attending, None);
        assert!(tracker.quorum_met(key(), 3));
    }

    #[test]
    fn test_roster_responses_by_mode() {
        let mut tracker = AttendanceTracker::new();
        tracker.set_response(key(), "B", AttendanceStatus::Unavailable, None);
        let roster = vec!["A".to_string(), "B".to_string(), "C".to_string()];

        let assumed = tracker.roster_responses(key(), &roster, AttendanceMode::Assumed);
        assert_eq!(assumed.len(), 3);
        assert_eq!(assumed[0].status, AttendanceStatus::Attending);
        assert_eq!(assumed[1].status, AttendanceStatus::Unavailable);

        let confirmed = tracker.roster_responses(key(), &roster, AttendanceMode::Confirmed);
        assert_eq!(confirmed, vec![response("B", AttendanceStatus::Unavailable)]);
    }

    #[test]
    fn test_session_status_states() {
        let settings = ScheduleSettings::default();

        let empty = session_status(&[], &settings);
        assert_eq!(empty.state, SessionState::NotScheduled);
        assert_eq!(empty.label, "No players");

        let all_in = session_status(
            &[
                response("A", AttendanceStatus::Attending),
                response("B", AttendanceStatus::Late),
            ],
            &settings,
        );
        assert_eq!(all_in.state, SessionState::On);
        assert_eq!(all_in.late.len(), 1);

        let partial = session_status(
            &[
                response("A", AttendanceStatus::Attending),
                response("B", AttendanceStatus::Late),
                response("C", AttendanceStatus::Unavailable),
                response("D", AttendanceStatus::Attending),
            ],
            &settings,
        );
        assert_eq!(partial.state, SessionState::OnPartial);
        assert_eq!(partial.label, "On (1 absent)");
        assert_eq!(partial.available_count, 3);
        assert_eq!(partial.warnings, ["1 player can't make it"]);

        let short = session_status(
            &[
                response("A", AttendanceStatus::Attending),
                response("B", AttendanceStatus::Unavailable),
                response("C", AttendanceStatus::Unavailable),
            ],
            &settings,
        );
        assert_eq!(short.state, SessionState::NeedsDecision);
        assert_eq!(short.warnings, ["Only 1/3 available (minimum: 3)"]);
        assert_eq!(short.unavailable.len(), 2);
    }

    #[test]
    fn test_zero_minimum_uses_default_quorum() {
        let settings = ScheduleSettings {
            minimum_players: 0,
            ..ScheduleSettings::default()
        };
        let status = session_status(
            &[
                response("A", AttendanceStatus::Attending),
                response("B", AttendanceStatus::Unavailable),
            ],
            &settings,
        );
        assert_eq!(status.state, SessionState::NeedsDecision);
        assert_eq!(status.warnings, ["Only 1/2 available (minimum: 3)"]);
    }

    #[test]
    fn test_auto_skip_only_when_enabled_and_short() {
        let short = session_status(
            &[response("A", AttendanceStatus::Unavailable)],
            &ScheduleSettings::default(),
        );
        assert!(auto_skip_exception(key(), &short, &ScheduleSettings::default()).is_none());

        let settings = ScheduleSettings {
            auto_skip_below_minimum: true,
            ..ScheduleSettings::default()
        };
        let skip = auto_skip_exception(key(), &short, &settings).unwrap();
        assert_eq!(skip.action, ExceptionAction::Skip);
        assert_eq!(skip.original_date_string, key());
        assert_eq!(skip.reason.as_deref(), Some(AUTO_SKIP_REASON));

        let fine = session_status(&[response("A", AttendanceStatus::Attending)], &settings);
        assert!(auto_skip_exception(key(), &fine, &settings).is_none());
    }
}
