//! Events emitted by a running [`GameSession`](crate::GameSession).
//!
//! A presentation layer renders each event as it arrives; every view carries
//! everything needed to draw its screen, so nothing has to be remembered
//! between events.

use url::Url;

use crate::document::{Choice, GameCode, Phase, Role, RoundResult};
use crate::error_codes::ErrorCode;
use crate::score::Summary;

/// Something the local player should see.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// The session is attached to a game document.
    Attached {
        code: GameCode,
        role: Role,
        /// Link that pre-fills the join form with `code`.
        join_url: Option<Url>,
    },

    /// Pictures for every round, to warm the image cache before play.
    Prefetch { urls: Vec<Url> },

    /// Waiting room: the host is waiting for a guest.
    Waiting(WaitingView),

    /// A round is being played, or its lock-in status changed.
    Playing(PlayingView),

    /// The countdown (re)started at its full length.
    CountdownStarted { seconds: u32 },

    /// One second passed on the countdown.
    CountdownTick { remaining: u32, urgent: bool },

    /// The countdown was cancelled; display "∞".
    CountdownReset,

    /// The countdown expired before the local player chose; this choice was
    /// made for them.
    AutoPicked { choice: Choice },

    /// Both choices are shown side by side.
    Reveal(RevealView),

    /// The game is over.
    Finale(FinaleView),

    /// The host removed the game document (play again).
    GameDeleted,

    /// A recoverable failure the player should be told about.
    Error { code: ErrorCode, message: String },

    /// The session loop exited. Always the last event.
    Closed { reason: Option<String> },
}

impl GameEvent {
    /// The shared phase this event renders, if it renders one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            GameEvent::Waiting(_) => Some(Phase::Waiting),
            GameEvent::Playing(_) => Some(Phase::Playing),
            GameEvent::Reveal(_) => Some(Phase::Reveal),
            GameEvent::Finale(_) => Some(Phase::Finale),
            _ => None,
        }
    }
}

/// Waiting room contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingView {
    pub host_name: String,
    /// Set once a guest has joined.
    pub guest_name: Option<String>,
}

/// One round as the local player sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayingView {
    /// 0-based round index.
    pub round: usize,
    pub total_rounds: usize,
    pub option_a: String,
    pub option_b: String,
    pub image_a: Option<Url>,
    pub image_b: Option<Url>,
    /// Pictures of the next round, to warm while this one is played.
    pub next_images: Vec<Url>,
    /// The local player's choice, if locked.
    pub my_choice: Option<Choice>,
    pub opponent_name: Option<String>,
    pub opponent_locked: bool,
}

/// Side-by-side result of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealView {
    pub round: usize,
    pub total_rounds: usize,
    pub result: RoundResult,
    pub player1_name: String,
    pub player2_name: String,
    pub player1_random: bool,
    pub player2_random: bool,
    pub is_last_round: bool,
    /// Only the host may continue; the guest waits.
    pub can_advance: bool,
}

/// Final scoreboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinaleView {
    pub summary: Summary,
    /// Per-round breakdown, in round order.
    pub results: Vec<RoundResult>,
    pub player1_name: String,
    pub player2_name: String,
    /// Only the host may start a new game; the guest waits.
    pub can_restart: bool,
}
