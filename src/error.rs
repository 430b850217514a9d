//! Error types for the Would You Rather session client.

use thiserror::Error;

use crate::document::GameCode;
use crate::error_codes::ErrorCode;

/// Errors that can occur when using the session client.
#[derive(Debug, Error)]
pub enum WyrError {
    /// No game document exists under the given code.
    #[error("game {code} not found")]
    GameNotFound {
        /// Code the caller tried to join.
        code: GameCode,
    },

    /// The guest slot of the game is already taken.
    #[error("game {code} is full")]
    GameFull {
        /// Code the caller tried to join.
        code: GameCode,
    },

    /// The store rejected a write (offline, permission denied, ...).
    #[error("store write failed: {0}")]
    WriteFailure(String),

    /// The store could not serve a read or subscription.
    #[error("store read failed: {0}")]
    ReadFailure(String),

    /// Failed to serialize or deserialize a game document.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A game code was not exactly four ASCII digits.
    #[error("invalid game code: {0:?}")]
    InvalidGameCode(String),

    /// The content pool has no topic with this name.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// A game must have at least one round.
    #[error("invalid round count: {0}")]
    InvalidRoundCount(usize),

    /// A host-only operation was attempted by the guest.
    #[error("only the host can do that")]
    NotHost,

    /// This device is not seated in the game it tried to rejoin.
    #[error("this device is not a player in game {code}")]
    NotAPlayer {
        /// Code of the game that was inspected.
        code: GameCode,
    },

    /// The session loop has exited; no further commands are accepted.
    #[error("session closed")]
    SessionClosed,
}

impl WyrError {
    /// Structured code for this error, used to pick the user-facing alert.
    pub fn code(&self) -> ErrorCode {
        match self {
            WyrError::GameNotFound { .. } => ErrorCode::GameNotFound,
            WyrError::GameFull { .. } => ErrorCode::GameFull,
            WyrError::WriteFailure(_) => ErrorCode::WriteFailure,
            WyrError::ReadFailure(_) => ErrorCode::StoreUnavailable,
            WyrError::Serialization(_) => ErrorCode::CorruptDocument,
            WyrError::InvalidGameCode(_) => ErrorCode::InvalidGameCode,
            WyrError::UnknownTopic(_) | WyrError::InvalidRoundCount(_) => ErrorCode::InvalidInput,
            WyrError::NotHost => ErrorCode::NotHost,
            WyrError::NotAPlayer { .. } => ErrorCode::NotAPlayer,
            WyrError::SessionClosed => ErrorCode::SessionClosed,
        }
    }
}

/// A specialized [`Result`] type for session client operations.
pub type Result<T> = std::result::Result<T, WyrError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn code() -> GameCode {
        GameCode::parse("4821").unwrap()
    }

    #[test]
    fn every_error_maps_to_its_alert_code() {
        let cases = [
            (WyrError::GameNotFound { code: code() }, ErrorCode::GameNotFound),
            (WyrError::GameFull { code: code() }, ErrorCode::GameFull),
            (WyrError::WriteFailure("offline".into()), ErrorCode::WriteFailure),
            (WyrError::ReadFailure("offline".into()), ErrorCode::StoreUnavailable),
            (WyrError::InvalidGameCode("12".into()), ErrorCode::InvalidGameCode),
            (WyrError::UnknownTopic("Opera".into()), ErrorCode::InvalidInput),
            (WyrError::InvalidRoundCount(0), ErrorCode::InvalidInput),
            (WyrError::NotHost, ErrorCode::NotHost),
            (WyrError::NotAPlayer { code: code() }, ErrorCode::NotAPlayer),
            (WyrError::SessionClosed, ErrorCode::SessionClosed),
        ];
        for (err, expected) in cases {
            assert_eq!(err.code(), expected, "{err}");
        }
    }

    #[test]
    fn decode_errors_read_as_corrupt_documents() {
        let err: WyrError = serde_json::from_str::<u8>("nope").unwrap_err().into();
        assert_eq!(err.code(), ErrorCode::CorruptDocument);
    }
}
