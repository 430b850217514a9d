//! The shared game document and the types stored inside it.
//!
//! Every type here serializes to the JSON layout both peers read and write under
//! `<root>/<code>`:
//!
//! ```json
//! {
//!   "topic": "Food Fights",
//!   "totalRounds": 2,
//!   "currentRound": 0,
//!   "rounds": [{ "optionA": "Pizza", "optionB": "Burgers" }, ...],
//!   "phase": "playing",
//!   "player1": { "id": "...", "name": "Ana", "choice": "A" },
//!   "player2": { "id": "...", "name": "Ben", "choice": null, "isRandom": true },
//!   "history": { "0": { "p1Choice": "Pizza", "p2Choice": "Burgers", ... } }
//! }
//! ```
//!
//! The store drops `null` values, so every optional field is also accepted when absent.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{Result, WyrError};

// ── Type aliases ────────────────────────────────────────────────────

/// Opaque per-device identifier. Identifies "this browser", not a user.
pub type PlayerId = Uuid;

/// Generate a fresh device identifier.
pub fn new_player_id() -> PlayerId {
    Uuid::new_v4()
}

// ── Field names ─────────────────────────────────────────────────────

/// Relative path of the phase field.
pub const PHASE: &str = "phase";
/// Relative path of the round cursor.
pub const CURRENT_ROUND: &str = "currentRound";
/// Relative path of the history map.
pub const HISTORY: &str = "history";

// ── GameCode ────────────────────────────────────────────────────────

/// Four-digit numeric code that names a game document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameCode(String);

impl GameCode {
    /// Generate a random code in `1000..=9999`.
    ///
    /// Collisions with live games are not checked.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.random_range(1000..=9999_u16).to_string())
    }

    /// Parse and validate a code typed by a player.
    ///
    /// # Errors
    ///
    /// Returns [`WyrError::InvalidGameCode`] unless the trimmed input is exactly four
    /// ASCII digits.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.len() == 4 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(WyrError::InvalidGameCode(input.to_string()))
        }
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Store path of the document this code names, under `root`.
    pub fn document_path(&self, root: &str) -> String {
        format!("{}/{}", root.trim_end_matches('/'), self.0)
    }
}

impl fmt::Display for GameCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GameCode {
    type Err = WyrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for GameCode {
    type Error = WyrError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<GameCode> for String {
    fn from(code: GameCode) -> Self {
        code.0
    }
}

// ── Enums ───────────────────────────────────────────────────────────

/// Stage of the shared round state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Host is waiting for a guest to join.
    Waiting,
    /// Both players are choosing.
    Playing,
    /// Both choices are shown side by side.
    Reveal,
    /// All rounds are over; the scoreboard is shown.
    Finale,
}

/// One of the two options of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    /// The round's `optionA`.
    A,
    /// The round's `optionB`.
    B,
}

impl Choice {
    /// Pick `A` or `B` with equal probability.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.random_bool(0.5) {
            Choice::A
        } else {
            Choice::B
        }
    }

    /// The option text this choice selects in `round`.
    pub fn option_in(self, round: &Round) -> &str {
        match self {
            Choice::A => &round.option_a,
            Choice::B => &round.option_b,
        }
    }
}

/// Which player slot of the document a peer occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    Player1,
    Player2,
}

impl Seat {
    /// Key of this slot inside the document.
    pub fn key(self) -> &'static str {
        match self {
            Seat::Player1 => "player1",
            Seat::Player2 => "player2",
        }
    }

    /// The other seat.
    pub fn opponent(self) -> Self {
        match self {
            Seat::Player1 => Seat::Player2,
            Seat::Player2 => Seat::Player1,
        }
    }

    /// Relative path of this seat's `choice` field.
    pub fn choice_path(self) -> String {
        format!("{}/choice", self.key())
    }

    /// Relative path of this seat's `isRandom` field.
    pub fn random_path(self) -> String {
        format!("{}/isRandom", self.key())
    }
}

/// Role of the local peer, fixed for the lifetime of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Created the document; sole authority past `reveal` and `finale`.
    Host,
    /// Joined with the code; passive during `reveal` and `finale`.
    Guest,
}

impl Role {
    /// The seat this role occupies.
    pub fn seat(self) -> Seat {
        match self {
            Role::Host => Seat::Player1,
            Role::Guest => Seat::Player2,
        }
    }

    /// Whether this role may advance out of `reveal` or delete the game.
    pub fn is_host(self) -> bool {
        self == Role::Host
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// A pair of options shown in one round. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub option_a: String,
    pub option_b: String,
}

impl Round {
    pub fn new(option_a: impl Into<String>, option_b: impl Into<String>) -> Self {
        Self {
            option_a: option_a.into(),
            option_b: option_b.into(),
        }
    }
}

/// A player's sub-document. Each peer only ever writes its own slot's choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSlot {
    pub id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub choice: Option<Choice>,
    /// Set when the choice was auto-picked on countdown expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_random: Option<bool>,
}

impl PlayerSlot {
    /// A slot that has not chosen yet.
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            choice: None,
            is_random: None,
        }
    }

    /// Whether the player has locked a choice this round.
    pub fn has_chosen(&self) -> bool {
        self.choice.is_some()
    }

    /// Whether the current choice was auto-picked.
    pub fn picked_randomly(&self) -> bool {
        self.is_random.unwrap_or(false)
    }
}

/// Outcome of one finished round. Derived from both choices, written once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub p1_choice: String,
    pub p2_choice: String,
    pub option_a: String,
    pub option_b: String,
    pub matched: bool,
}

impl RoundResult {
    /// Resolve both choices against `round`.
    pub fn new(round: &Round, p1: Choice, p2: Choice) -> Self {
        Self {
            p1_choice: p1.option_in(round).to_string(),
            p2_choice: p2.option_in(round).to_string(),
            option_a: round.option_a.clone(),
            option_b: round.option_b.clone(),
            matched: p1 == p2,
        }
    }
}

/// The single shared aggregate both peers coordinate through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDocument {
    pub topic: String,
    pub total_rounds: usize,
    #[serde(default)]
    pub current_round: usize,
    #[serde(default)]
    pub rounds: Vec<Round>,
    pub phase: Phase,
    pub player1: PlayerSlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player2: Option<PlayerSlot>,
    /// Round index → result. Keys are decimal strings on the wire.
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "deserialize_history"
    )]
    pub history: BTreeMap<usize, RoundResult>,
    /// Milliseconds since the Unix epoch, stamped by the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
}

impl GameDocument {
    /// Initial document written by the host: waiting for a guest, round 0.
    pub fn new(
        topic: impl Into<String>,
        rounds: Vec<Round>,
        host: PlayerSlot,
        created_at: Option<u64>,
    ) -> Self {
        Self {
            topic: topic.into(),
            total_rounds: rounds.len(),
            current_round: 0,
            rounds,
            phase: Phase::Waiting,
            player1: host,
            player2: None,
            history: BTreeMap::new(),
            created_at,
        }
    }

    /// Decode a store snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`WyrError::Serialization`] if the value is not a game document.
    pub fn from_snapshot(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Encode for a store write.
    ///
    /// # Errors
    ///
    /// Returns [`WyrError::Serialization`] if encoding fails.
    pub fn to_snapshot(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// The slot occupying `seat`, if any.
    pub fn slot(&self, seat: Seat) -> Option<&PlayerSlot> {
        match seat {
            Seat::Player1 => Some(&self.player1),
            Seat::Player2 => self.player2.as_ref(),
        }
    }

    /// The seat `id` occupies, if any.
    pub fn seat_of(&self, id: PlayerId) -> Option<Seat> {
        if self.player1.id == id {
            Some(Seat::Player1)
        } else if self.player2.as_ref().is_some_and(|p2| p2.id == id) {
            Some(Seat::Player2)
        } else {
            None
        }
    }

    /// The round currently being played.
    pub fn current(&self) -> Option<&Round> {
        self.rounds.get(self.current_round)
    }

    /// The round after the current one, if any.
    pub fn next(&self) -> Option<&Round> {
        self.rounds.get(self.current_round.saturating_add(1))
    }

    /// Whether the current round is the final one.
    pub fn is_last_round(&self) -> bool {
        self.current_round.saturating_add(1) >= self.total_rounds
    }

    /// Whether `seat` has locked a choice this round.
    pub fn has_chosen(&self, seat: Seat) -> bool {
        self.slot(seat).is_some_and(PlayerSlot::has_chosen)
    }

    /// Both players have locked a choice.
    pub fn both_chosen(&self) -> bool {
        self.has_chosen(Seat::Player1) && self.has_chosen(Seat::Player2)
    }

    /// At least one player has locked a choice.
    pub fn any_chosen(&self) -> bool {
        self.has_chosen(Seat::Player1) || self.has_chosen(Seat::Player2)
    }

    /// Result of the current round, once both choices are in.
    pub fn round_result(&self) -> Option<RoundResult> {
        let round = self.current()?;
        let p1 = self.player1.choice?;
        let p2 = self.player2.as_ref()?.choice?;
        Some(RoundResult::new(round, p1, p2))
    }

    /// Relative path of `history[round]`.
    pub fn history_path(round: usize) -> String {
        format!("{HISTORY}/{round}")
    }
}

/// Accept `history` as a map or as an array.
///
/// Realtime databases may hand back an object with dense integer keys as a JSON
/// array, with `null` holes for missing rounds.
fn deserialize_history<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<usize, RoundResult>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Map(BTreeMap<String, RoundResult>),
        List(Vec<Option<RoundResult>>),
    }

    let history = match Wire::deserialize(deserializer)? {
        Wire::Map(map) => map
            .into_iter()
            .filter_map(|(key, result)| key.parse().ok().map(|round| (round, result)))
            .collect(),
        Wire::List(list) => list
            .into_iter()
            .enumerate()
            .filter_map(|(round, result)| result.map(|result| (round, result)))
            .collect(),
    };
    Ok(history)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn pizza_round() -> Round {
        Round::new("Pizza", "Burgers")
    }

    #[test]
    fn clash_resolves_option_text() {
        let result = RoundResult::new(&pizza_round(), Choice::A, Choice::B);
        assert!(!result.matched);
        assert_eq!(result.p1_choice, "Pizza");
        assert_eq!(result.p2_choice, "Burgers");
        assert_eq!(result.option_a, "Pizza");
        assert_eq!(result.option_b, "Burgers");
    }

    #[test]
    fn same_choice_is_a_match() {
        let result = RoundResult::new(&pizza_round(), Choice::A, Choice::A);
        assert!(result.matched);
        assert_eq!(result.p1_choice, result.p2_choice);
    }

    #[test]
    fn parses_store_shape_with_missing_optionals() {
        let id = Uuid::from_u128(7);
        let doc = GameDocument::from_snapshot(json!({
            "topic": "Food Fights",
            "totalRounds": 1,
            "currentRound": 0,
            "rounds": [{ "optionA": "Pizza", "optionB": "Burgers" }],
            "phase": "waiting",
            "player1": { "id": id, "name": "Ana" }
        }))
        .unwrap();
        assert_eq!(doc.phase, Phase::Waiting);
        assert!(doc.player2.is_none());
        assert!(doc.history.is_empty());
        assert_eq!(doc.player1.choice, None);
        assert!(!doc.player1.picked_randomly());
    }

    #[test]
    fn history_keys_are_decimal_strings() {
        let round = pizza_round();
        let mut doc = GameDocument::new("Food Fights", vec![round.clone()], PlayerSlot::new(Uuid::nil(), "Ana"), None);
        doc.history.insert(0, RoundResult::new(&round, Choice::B, Choice::B));
        let value = doc.to_snapshot().unwrap();
        assert_eq!(value["history"]["0"]["matched"], json!(true));
        assert_eq!(value["totalRounds"], json!(1));
        assert!(value.get("player2").is_none());

        let back = GameDocument::from_snapshot(value).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn history_also_decodes_from_an_array() {
        let round = pizza_round();
        let mut value = GameDocument::new("Food Fights", vec![round.clone(), round.clone()], PlayerSlot::new(Uuid::nil(), "Ana"), None)
            .to_snapshot()
            .unwrap();
        let result = serde_json::to_value(RoundResult::new(&round, Choice::A, Choice::B)).unwrap();
        value["history"] = json!([null, result]);

        let doc = GameDocument::from_snapshot(value).unwrap();
        assert_eq!(doc.history.len(), 1);
        assert!(!doc.history[&1].matched);
    }

    #[test]
    fn round_result_requires_both_choices() {
        let mut doc = GameDocument::new("Food Fights", vec![pizza_round()], PlayerSlot::new(Uuid::nil(), "Ana"), None);
        doc.player1.choice = Some(Choice::A);
        assert!(doc.round_result().is_none());

        let mut guest = PlayerSlot::new(Uuid::from_u128(2), "Ben");
        guest.choice = Some(Choice::B);
        doc.player2 = Some(guest);
        assert!(doc.both_chosen());
        assert_eq!(doc.round_result().unwrap().p2_choice, "Burgers");
    }

    #[test]
    fn seat_lookup_by_device_id() {
        let mut doc = GameDocument::new("Travel", vec![pizza_round()], PlayerSlot::new(Uuid::from_u128(1), "Ana"), None);
        doc.player2 = Some(PlayerSlot::new(Uuid::from_u128(2), "Ben"));
        assert_eq!(doc.seat_of(Uuid::from_u128(1)), Some(Seat::Player1));
        assert_eq!(doc.seat_of(Uuid::from_u128(2)), Some(Seat::Player2));
        assert_eq!(doc.seat_of(Uuid::from_u128(3)), None);
    }

    #[test]
    fn game_code_validation() {
        assert_eq!(GameCode::parse(" 4821 ").unwrap().as_str(), "4821");
        assert!(GameCode::parse("482").is_err());
        assert!(GameCode::parse("48a1").is_err());
        assert!(GameCode::parse("48211").is_err());
        assert!(serde_json::from_str::<GameCode>("\"12x4\"").is_err());
    }

    #[test]
    fn generated_codes_are_four_digits() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let code = GameCode::generate(&mut rng);
            let n: u16 = code.as_str().parse().unwrap();
            assert!((1000..=9999).contains(&n));
        }
    }

    #[test]
    fn seat_paths() {
        assert_eq!(Seat::Player2.choice_path(), "player2/choice");
        assert_eq!(Seat::Player1.random_path(), "player1/isRandom");
        assert_eq!(GameDocument::history_path(3), "history/3");
        assert_eq!(GameCode::parse("1234").unwrap().document_path("wyr-games/"), "wyr-games/1234");
    }
}
