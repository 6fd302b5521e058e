//! Error types for session-engine operations.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid schedule pattern: {0}")]
    Configuration(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Duplicate exception for {0}")]
    DuplicateException(NaiveDate),

    #[error("Invalid time: {0}")]
    InvalidTime(String),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
