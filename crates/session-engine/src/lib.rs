//! # session-engine
//!
//! Recurring-session scheduling for tabletop campaigns.
//!
//! A campaign describes its cadence once (weekly, biweekly, monthly, or an
//! explicit list of dates) in its own timezone. The engine projects concrete
//! session instants from that pattern, overlays the DM's per-date decisions
//! (skip, confirm, reschedule), and renders each instant for a viewer in
//! another zone, flagging when daylight-saving changes move it.
//!
//! ## Modules
//!
//! - [`pattern`]: schedule patterns, wire form and validation
//! - [`projector`]: lazy occurrence generation from a pattern
//! - [`exception`]: per-date overrides keyed by local date
//! - [`overlay`]: merging exceptions into a projected stream
//! - [`upcoming`]: upcoming-sessions and next-session entry points
//! - [`format`]: viewer-zone rendering and DST-shift detection
//! - [`attendance`]: member responses, quorum, and session status
//! - [`document`]: the persisted campaign schedule and its mode gate
//! - [`settings`]: per-campaign scheduling settings
//! - [`zone`]: timezone parsing and local-time resolution
//! - [`clock`]: injectable time source
//! - [`error`]: error types

pub mod attendance;
pub mod clock;
pub mod document;
pub mod error;
pub mod exception;
pub mod format;
pub mod overlay;
pub mod pattern;
pub mod projector;
pub mod settings;
pub mod upcoming;
pub mod zone;

pub use attendance::{
    auto_skip_exception, quorum_met, session_status, AttendanceStatus, AttendanceTracker,
    MemberResponse, SessionState, SessionStatus,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use document::{NextSessionOverride, Schedule, ScheduleDocument};
pub use error::{Result, ScheduleError};
pub use exception::{DuplicatePolicy, ExceptionAction, ExceptionSet, ScheduleException};
pub use format::{
    detect_dst_shift, format_session_time, DstShift, FormattedSessionTime, HourCycle,
    SessionFormatter, ShiftDirection,
};
pub use overlay::{apply, OccurrenceStatus, ProjectedSession};
pub use pattern::{
    day_name, short_day_name, FrequencyKind, MonthlyRule, RawSchedulePattern, Recurrence,
    SchedulePattern,
};
pub use projector::{generate, Occurrences, RawOccurrence};
pub use settings::{AttendanceMode, ScheduleMode, ScheduleSettings};
pub use upcoming::{next_session, upcoming_sessions, UpcomingSessions, DEFAULT_UPCOMING_COUNT};
