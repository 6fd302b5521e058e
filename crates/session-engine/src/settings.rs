//! Campaign-level scheduling settings.

use serde::{Deserialize, Serialize};

/// Minimum attending players used when settings leave it unset.
pub const DEFAULT_MINIMUM_PLAYERS: u32 = 3;

/// How much scheduling the campaign uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    /// Scheduling happens outside the product.
    Off,
    /// A single manually set next session.
    #[default]
    Simple,
    /// Recurring pattern, exceptions, and attendance tracking.
    Full,
}

/// How silence from a member is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceMode {
    /// Members are attending unless they say otherwise.
    #[default]
    Assumed,
    /// Members count only once they respond.
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub mode: ScheduleMode,
    pub attendance_mode: AttendanceMode,
    pub minimum_players: u32,
    pub auto_skip_below_minimum: bool,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            mode: ScheduleMode::Simple,
            attendance_mode: AttendanceMode::Assumed,
            minimum_players: DEFAULT_MINIMUM_PLAYERS,
            auto_skip_below_minimum: false,
        }
    }
}

impl ScheduleSettings {
    /// The quorum to enforce. An unset (zero) minimum means the default.
    pub fn effective_minimum_players(&self) -> u32 {
        match self.minimum_players {
            0 => DEFAULT_MINIMUM_PLAYERS,
            n => n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ScheduleSettings::default();
        assert_eq!(settings.mode, ScheduleMode::Simple);
        assert_eq!(settings.attendance_mode, AttendanceMode::Assumed);
        assert_eq!(settings.minimum_players, 3);
        assert!(!settings.auto_skip_below_minimum);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: ScheduleSettings = serde_json::from_str(r#"{"mode":"full"}"#).unwrap();
        assert_eq!(settings.mode, ScheduleMode::Full);
        assert_eq!(settings.minimum_players, DEFAULT_MINIMUM_PLAYERS);
    }

    #[test]
    fn test_zero_minimum_falls_back_to_default() {
        let settings: ScheduleSettings =
            serde_json::from_str(r#"{"minimum_players":0}"#).unwrap();
        assert_eq!(settings.effective_minimum_players(), DEFAULT_MINIMUM_PLAYERS);

        let five = ScheduleSettings {
            minimum_players: 5,
            ..ScheduleSettings::default()
        };
        assert_eq!(five.effective_minimum_players(), 5);
    }
}
