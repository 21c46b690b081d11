use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::bridge::GameState;

// =============================================================================
// Session & State Types
// =============================================================================

/// Lifecycle phase of a programmatic play session.
///
/// Phases only move forward: `Created → Active → Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Instance exists but the game has not started.
    Created,
    /// The game is running and accepts input.
    Active,
    /// Terminal. The score has been settled (or the session failed to boot).
    Ended,
}

impl SessionPhase {
    /// Whether `next` is a legal successor of this phase.
    pub fn can_advance_to(self, next: SessionPhase) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Active)
                | (Self::Created, Self::Ended)
                | (Self::Active, Self::Active)
                | (Self::Active, Self::Ended)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Ended
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The owning agent called end.
    AgentEnded,
    /// The session was idle past its TTL.
    IdleTimeout,
    /// The isolated instance could not be stood up.
    BootstrapFailed,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AgentEnded => "agent_ended",
            Self::IdleTimeout => "idle_timeout",
            Self::BootstrapFailed => "bootstrap_failed",
        };
        f.write_str(s)
    }
}

/// One programmatic play session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID.
    pub id: String,
    /// Agent that owns the session.
    pub agent_id: String,
    /// Module being played.
    pub game_id: String,
    /// Isolated instance backing the session, while live.
    pub instance_id: Option<String>,
    pub phase: SessionPhase,
    /// Last state observed through `readState`.
    pub last_state: Option<GameState>,
    /// Number of accepted inputs.
    pub accepted_inputs: u64,
    /// Number of inputs sent, accepted or not.
    pub total_inputs: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    /// Score submitted at settlement. Set exactly once.
    pub settled_score: Option<f64>,
}

impl Session {
    pub fn new(agent_id: impl Into<String>, game_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            game_id: game_id.into(),
            instance_id: None,
            phase: SessionPhase::Created,
            last_state: None,
            accepted_inputs: 0,
            total_inputs: 0,
            created_at: now,
            updated_at: now,
            ended_at: None,
            end_reason: None,
            settled_score: None,
        }
    }

    /// Last observed score, zero before any read.
    pub fn score(&self) -> f64 {
        self.last_state.as_ref().map(|s| s.score).unwrap_or(0.0)
    }

    /// Time since the session was last touched.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.updated_at).to_std().unwrap_or_default()
    }
}

/// Final score handed to the ledger when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub session_id: String,
    pub agent_id: String,
    pub game_id: String,
    pub score: f64,
    pub reason: EndReason,
    pub settled_at: DateTime<Utc>,
}

/// Result of one `send_input` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputOutcome {
    /// Whether the module accepted the action.
    pub accepted: bool,
    /// State observed right after the action.
    pub state: GameState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions_are_monotonic() {
        use SessionPhase::*;
        assert!(Created.can_advance_to(Active));
        assert!(Active.can_advance_to(Active));
        assert!(Active.can_advance_to(Ended));
        assert!(!Active.can_advance_to(Created));
        assert!(!Ended.can_advance_to(Active));
        assert!(!Ended.can_advance_to(Ended));
        assert!(Ended.is_terminal());
    }

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new("agent-1", "game-1");
        assert_eq!(session.phase, SessionPhase::Created);
        assert_eq!(session.score(), 0.0);
        assert!(session.settled_score.is_none());
    }
}
