use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The three independent per-agent limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// Module submissions per day.
    SubmissionsPerDay,
    /// Session calls (create, input, state, reset, end) per hour.
    CallsPerHour,
    /// Session creations per hour.
    SessionsPerHour,
}

impl LimitKind {
    pub const ALL: [LimitKind; 3] = [
        Self::SubmissionsPerDay,
        Self::CallsPerHour,
        Self::SessionsPerHour,
    ];

    /// Length of the counting window.
    pub fn window(&self) -> Duration {
        match self {
            Self::SubmissionsPerDay => Duration::from_secs(24 * 3600),
            Self::CallsPerHour | Self::SessionsPerHour => Duration::from_secs(3600),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmissionsPerDay => "submissions_per_day",
            Self::CallsPerHour => "calls_per_hour",
            Self::SessionsPerHour => "sessions_per_hour",
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
