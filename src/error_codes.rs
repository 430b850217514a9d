//! Structured error codes and the alert text shown for each of them.
//!
//! Codes serialize as `SCREAMING_SNAKE_CASE` strings (e.g. `"GAME_NOT_FOUND"`) so a
//! presentation layer can map them to its own copy if it prefers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure kinds a player can be told about.
///
/// Every failure in the session client degrades to one of these: an alert, a retry
/// prompt, or a silent local fallback ([`MissingHistoryEntry`](ErrorCode::MissingHistoryEntry)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Join errors
    GameNotFound,
    GameFull,
    InvalidGameCode,
    NotAPlayer,

    // Store errors
    WriteFailure,
    StoreUnavailable,
    CorruptDocument,

    // Local errors
    InvalidInput,
    NotHost,
    SessionClosed,

    // Recovered locally, never shown as a failure
    MissingHistoryEntry,
}

impl ErrorCode {
    /// Returns the player-facing alert text for this code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::GameNotFound => "Game not found! Check the code.",
            Self::GameFull => "Game is full!",
            Self::InvalidGameCode => "Game codes are exactly four digits.",
            Self::NotAPlayer => "You are not a player in this game. Join with the code instead.",
            Self::WriteFailure => "Couldn't reach the game. Check your connection and try again.",
            Self::StoreUnavailable => {
                "The game service is temporarily unavailable. Please try again in a few moments."
            }
            Self::CorruptDocument => "This game looks damaged. Start a new one.",
            Self::InvalidInput => "Pick a topic and at least one round.",
            Self::NotHost => "Only the host can do that.",
            Self::SessionClosed => "This game has ended.",
            Self::MissingHistoryEntry => {
                "A round result was missing from the shared game; using this device's copy."
            }
        }
    }

    /// Whether the player should be offered a retry for this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteFailure | Self::StoreUnavailable)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::MissingHistoryEntry).unwrap();
        assert_eq!(json, "\"MISSING_HISTORY_ENTRY\"");
        let back: ErrorCode = serde_json::from_str("\"GAME_FULL\"").unwrap();
        assert_eq!(back, ErrorCode::GameFull);
    }

    #[test]
    fn join_failures_use_alert_copy() {
        assert_eq!(ErrorCode::GameNotFound.to_string(), "Game not found! Check the code.");
        assert_eq!(ErrorCode::GameFull.to_string(), "Game is full!");
    }

    #[test]
    fn only_store_failures_are_retryable() {
        assert!(ErrorCode::WriteFailure.is_retryable());
        assert!(ErrorCode::StoreUnavailable.is_retryable());
        assert!(!ErrorCode::GameFull.is_retryable());
        assert!(!ErrorCode::MissingHistoryEntry.is_retryable());
    }
}
