//! Round state machine.
//!
//! Each peer runs its own [`RoundMachine`] and feeds it every snapshot of the
//! shared document. The machine answers with [`Effect`]s for the session loop to
//! carry out: events to render, countdown changes, and promotions to schedule.
//! It never talks to the store itself.
//!
//! Cross-peer transitions are written as absolute values (`phase = "reveal"`,
//! `currentRound = 3`), never as toggles or increments, so two peers racing to
//! apply the same transition end up with the same document. Promotions re-read
//! the document right before writing ([`reveal_ready`], [`start_ready`]); that
//! narrows the race window but correctness rests on the writes being idempotent.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::content;
use crate::document::{
    Choice, GameDocument, Phase, Role, RoundResult, CURRENT_ROUND, PHASE,
};
use crate::error::Result;
use crate::event::{FinaleView, GameEvent, PlayingView, RevealView, WaitingView};
use crate::score::{collect_results, summarize};
use crate::store::UpdateBatch;

/// Work the session loop should do in response to a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Show this to the player.
    Emit(GameEvent),
    /// Host only: after the start grace delay, promote `waiting → playing`.
    ScheduleStart,
    /// After the reveal delay, promote `playing → reveal` for `round`.
    ScheduleReveal { round: usize },
    /// One player is locked in: make sure the countdown is running.
    StartCountdown,
    /// Nobody or everybody is locked in: stop the countdown.
    ResetCountdown,
}

/// Whether a `waiting → playing` promotion should still be written.
pub fn start_ready(doc: &GameDocument) -> bool {
    doc.phase == Phase::Waiting && doc.player2.is_some()
}

/// Whether a `playing → reveal` promotion should still be written.
pub fn reveal_ready(doc: &GameDocument) -> bool {
    doc.phase == Phase::Playing && doc.both_chosen()
}

/// Per-peer view of the shared round state machine.
#[derive(Debug, Clone)]
pub struct RoundMachine {
    role: Role,
    /// Last snapshot evaluated; identical snapshots are ignored.
    last: Option<GameDocument>,
    /// This device's copy of every revealed round's result, by round index.
    cached: Vec<Option<RoundResult>>,
    start_scheduled: bool,
    reveal_scheduled: Option<usize>,
    /// Round in which the local player sent a choice that may not be visible yet.
    chosen_round: Option<usize>,
    /// Round the host already sent the advance write for.
    advanced_round: Option<usize>,
}

impl RoundMachine {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            last: None,
            cached: Vec::new(),
            start_scheduled: false,
            reveal_scheduled: None,
            chosen_round: None,
            advanced_round: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The most recent snapshot.
    pub fn document(&self) -> Option<&GameDocument> {
        self.last.as_ref()
    }

    /// Locally cached round results, by round index.
    pub fn cached_results(&self) -> &[Option<RoundResult>] {
        &self.cached
    }

    /// Whether the local player has locked a choice in the current round,
    /// either visibly in the snapshot or by a write still in flight.
    pub fn has_chosen(&self) -> bool {
        let Some(doc) = &self.last else {
            return false;
        };
        doc.has_chosen(self.role.seat()) || self.chosen_round == Some(doc.current_round)
    }

    /// Evaluate a snapshot against the full transition table.
    ///
    /// Re-evaluating an unchanged snapshot yields no effects.
    pub fn on_snapshot(&mut self, doc: GameDocument) -> Vec<Effect> {
        if self.last.as_ref() == Some(&doc) {
            debug!("snapshot unchanged; nothing to do");
            return Vec::new();
        }

        let effects = match doc.phase {
            Phase::Waiting => self.on_waiting(&doc),
            Phase::Playing => self.on_playing(&doc),
            Phase::Reveal => self.on_reveal(&doc),
            Phase::Finale => self.on_finale(&doc),
        };
        self.last = Some(doc);
        effects
    }

    fn on_waiting(&mut self, doc: &GameDocument) -> Vec<Effect> {
        let mut effects = vec![
            Effect::ResetCountdown,
            Effect::Emit(GameEvent::Waiting(WaitingView {
                host_name: doc.player1.name.clone(),
                guest_name: doc.player2.as_ref().map(|p2| p2.name.clone()),
            })),
        ];
        if self.role.is_host() && doc.player2.is_some() && !self.start_scheduled {
            self.start_scheduled = true;
            effects.push(Effect::ScheduleStart);
        }
        effects
    }

    fn on_playing(&mut self, doc: &GameDocument) -> Vec<Effect> {
        let Some(round) = doc.current() else {
            warn!(
                current_round = doc.current_round,
                total_rounds = doc.total_rounds,
                "current round out of range"
            );
            return Vec::new();
        };
        let seat = self.role.seat();
        let opponent = doc.slot(seat.opponent());
        let view = PlayingView {
            round: doc.current_round,
            total_rounds: doc.total_rounds,
            option_a: round.option_a.clone(),
            option_b: round.option_b.clone(),
            image_a: content::image_url(&round.option_a, &doc.topic),
            image_b: content::image_url(&round.option_b, &doc.topic),
            next_images: doc
                .next()
                .map(|next| content::prefetch_urls(std::slice::from_ref(next), &doc.topic))
                .unwrap_or_default(),
            my_choice: doc.slot(seat).and_then(|slot| slot.choice),
            opponent_name: opponent.map(|slot| slot.name.clone()),
            opponent_locked: opponent.is_some_and(|slot| slot.has_chosen()),
        };
        let mut effects = vec![Effect::Emit(GameEvent::Playing(view))];

        if doc.both_chosen() {
            effects.push(Effect::ResetCountdown);
            if self.reveal_scheduled != Some(doc.current_round) {
                self.reveal_scheduled = Some(doc.current_round);
                effects.push(Effect::ScheduleReveal {
                    round: doc.current_round,
                });
            }
        } else if doc.any_chosen() {
            effects.push(Effect::StartCountdown);
        } else {
            effects.push(Effect::ResetCountdown);
        }
        effects
    }

    fn on_reveal(&mut self, doc: &GameDocument) -> Vec<Effect> {
        let mut effects = vec![Effect::ResetCountdown];
        let Some(result) = doc.round_result() else {
            warn!(round = doc.current_round, "reveal without both choices");
            return effects;
        };
        self.cache(doc.current_round, result.clone());

        let p2 = doc.player2.as_ref();
        effects.push(Effect::Emit(GameEvent::Reveal(RevealView {
            round: doc.current_round,
            total_rounds: doc.total_rounds,
            result,
            player1_name: doc.player1.name.clone(),
            player2_name: p2.map(|slot| slot.name.clone()).unwrap_or_default(),
            player1_random: doc.player1.picked_randomly(),
            player2_random: p2.is_some_and(|slot| slot.picked_randomly()),
            is_last_round: doc.is_last_round(),
            can_advance: self.role.is_host(),
        })));
        effects
    }

    fn on_finale(&mut self, doc: &GameDocument) -> Vec<Effect> {
        let results = collect_results(doc, &self.cached);
        let summary = summarize(&results);
        vec![
            Effect::ResetCountdown,
            Effect::Emit(GameEvent::Finale(FinaleView {
                summary,
                results,
                player1_name: doc.player1.name.clone(),
                player2_name: doc
                    .player2
                    .as_ref()
                    .map(|slot| slot.name.clone())
                    .unwrap_or_default(),
                can_restart: self.role.is_host(),
            })),
        ]
    }

    fn cache(&mut self, round: usize, result: RoundResult) {
        if self.cached.len() <= round {
            self.cached.resize(round + 1, None);
        }
        if let Some(slot) = self.cached.get_mut(round) {
            *slot = Some(result);
        }
    }

    /// Writes that lock the local player's choice, or `None` if there is nothing
    /// to choose right now (wrong phase, already chosen this round).
    ///
    /// Only the local seat's fields are touched.
    pub fn choice_batch(&mut self, base: &str, choice: Choice, random: bool) -> Option<UpdateBatch> {
        let doc = self.last.as_ref()?;
        if doc.phase != Phase::Playing || self.has_chosen() {
            return None;
        }
        let round = doc.current_round;
        let seat = self.role.seat();
        self.chosen_round = Some(round);
        Some(
            UpdateBatch::new(base)
                .set(&seat.choice_path(), json!(choice))
                .set(&seat.random_path(), Value::Bool(random)),
        )
    }

    /// Forget an in-flight choice whose write failed, so the player can retry.
    pub fn forget_choice(&mut self) {
        self.chosen_round = None;
    }

    /// The atomic write that ends the revealed round, or `None` if the current
    /// snapshot is not a reveal or this round was already advanced.
    ///
    /// The round's history entry and the phase change travel in one batch so no
    /// peer can observe one without the other.
    ///
    /// # Errors
    ///
    /// Returns [`WyrError::Serialization`](crate::WyrError::Serialization) if the
    /// round result cannot be encoded.
    pub fn advance_batch(&mut self, base: &str) -> Result<Option<UpdateBatch>> {
        let Some(doc) = self.last.as_ref() else {
            return Ok(None);
        };
        let round = doc.current_round;
        if doc.phase != Phase::Reveal || self.advanced_round == Some(round) {
            return Ok(None);
        }
        let Some(result) = doc.round_result() else {
            return Ok(None);
        };

        let mut batch = UpdateBatch::new(base)
            .set(&GameDocument::history_path(round), serde_json::to_value(&result)?);
        batch = if doc.is_last_round() {
            batch.set(PHASE, json!(Phase::Finale))
        } else {
            let mut batch = batch
                .set(CURRENT_ROUND, json!(round + 1))
                .set(PHASE, json!(Phase::Playing));
            for seat in [Role::Host.seat(), Role::Guest.seat()] {
                batch = batch.clear(&seat.choice_path()).clear(&seat.random_path());
            }
            batch
        };

        self.advanced_round = Some(round);
        self.cache(round, result);
        Ok(Some(batch))
    }

    /// Forget an advance whose write failed, so the host can retry.
    pub fn forget_advance(&mut self) {
        self.advanced_round = None;
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::document::{PlayerSlot, Round, Seat};
    use uuid::Uuid;

    const BASE: &str = "wyr-games/4821";

    fn doc(rounds: usize) -> GameDocument {
        let rounds = (0..rounds)
            .map(|i| Round::new(format!("A{i}"), format!("B{i}")))
            .collect();
        let mut doc = GameDocument::new(
            "Tech",
            rounds,
            PlayerSlot::new(Uuid::from_u128(1), "Ana"),
            None,
        );
        doc.player2 = Some(PlayerSlot::new(Uuid::from_u128(2), "Ben"));
        doc.phase = Phase::Playing;
        doc
    }

    fn choose(doc: &mut GameDocument, seat: Seat, choice: Choice) {
        match seat {
            Seat::Player1 => doc.player1.choice = Some(choice),
            Seat::Player2 => doc.player2.as_mut().unwrap().choice = Some(choice),
        }
    }

    fn count(effects: &[Effect], f: impl Fn(&Effect) -> bool) -> usize {
        effects.iter().filter(|e| f(e)).count()
    }

    #[test]
    fn unchanged_snapshot_is_a_no_op() {
        let mut machine = RoundMachine::new(Role::Guest);
        let mut snapshot = doc(2);
        choose(&mut snapshot, Seat::Player1, Choice::A);
        choose(&mut snapshot, Seat::Player2, Choice::B);

        let first = machine.on_snapshot(snapshot.clone());
        assert_eq!(
            count(&first, |e| matches!(e, Effect::ScheduleReveal { .. })),
            1
        );
        assert!(machine.on_snapshot(snapshot).is_empty());
    }

    #[test]
    fn reveal_promotion_scheduled_once_per_round() {
        let mut machine = RoundMachine::new(Role::Host);
        let mut snapshot = doc(2);
        choose(&mut snapshot, Seat::Player1, Choice::A);
        choose(&mut snapshot, Seat::Player2, Choice::B);
        let first = machine.on_snapshot(snapshot.clone());

        // A different snapshot of the same round (e.g. the random flag landing).
        snapshot.player2.as_mut().unwrap().is_random = Some(true);
        let second = machine.on_snapshot(snapshot);

        let reveals = |effects: &[Effect]| count(effects, |e| matches!(e, Effect::ScheduleReveal { round: 0 }));
        assert_eq!(reveals(&first), 1);
        assert_eq!(reveals(&second), 0);
    }

    #[test]
    fn one_lock_starts_countdown_none_resets() {
        let mut machine = RoundMachine::new(Role::Guest);
        let effects = machine.on_snapshot(doc(1));
        assert!(effects.contains(&Effect::ResetCountdown));
        assert!(!effects.contains(&Effect::StartCountdown));

        let mut snapshot = doc(1);
        choose(&mut snapshot, Seat::Player1, Choice::B);
        let effects = machine.on_snapshot(snapshot);
        assert!(effects.contains(&Effect::StartCountdown));
        match effects.first() {
            Some(Effect::Emit(GameEvent::Playing(view))) => {
                assert!(view.opponent_locked);
                assert_eq!(view.my_choice, None);
                assert_eq!(view.opponent_name.as_deref(), Some("Ana"));
            }
            other => panic!("expected playing view, got {other:?}"),
        }
    }

    #[test]
    fn host_schedules_start_once_guest_arrives() {
        let mut machine = RoundMachine::new(Role::Host);
        let mut waiting = doc(1);
        waiting.phase = Phase::Waiting;
        waiting.player2 = None;
        assert!(!machine.on_snapshot(waiting.clone()).contains(&Effect::ScheduleStart));

        waiting.player2 = Some(PlayerSlot::new(Uuid::from_u128(2), "Ben"));
        assert!(machine.on_snapshot(waiting.clone()).contains(&Effect::ScheduleStart));

        waiting.player2.as_mut().unwrap().name = "Benny".into();
        assert!(!machine.on_snapshot(waiting).contains(&Effect::ScheduleStart));
    }

    #[test]
    fn guest_never_schedules_start() {
        let mut machine = RoundMachine::new(Role::Guest);
        let mut waiting = doc(1);
        waiting.phase = Phase::Waiting;
        assert!(!machine.on_snapshot(waiting).contains(&Effect::ScheduleStart));
    }

    #[test]
    fn choice_touches_only_own_seat_and_only_once() {
        let mut machine = RoundMachine::new(Role::Guest);
        machine.on_snapshot(doc(1));

        let batch = machine.choice_batch(BASE, Choice::B, false).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get("wyr-games/4821/player2/choice"), Some(&json!("B")));
        assert_eq!(batch.get("wyr-games/4821/player2/isRandom"), Some(&json!(false)));
        assert!(batch.entries().all(|(path, _)| path.contains("player2")));

        assert!(machine.has_chosen());
        assert!(machine.choice_batch(BASE, Choice::A, false).is_none());

        machine.forget_choice();
        assert!(machine.choice_batch(BASE, Choice::A, true).is_some());
    }

    #[test]
    fn choosing_outside_playing_is_ignored() {
        let mut machine = RoundMachine::new(Role::Host);
        assert!(machine.choice_batch(BASE, Choice::A, false).is_none());
        let mut waiting = doc(1);
        waiting.phase = Phase::Waiting;
        machine.on_snapshot(waiting);
        assert!(machine.choice_batch(BASE, Choice::A, false).is_none());
    }

    #[test]
    fn has_chosen_is_rederived_from_snapshot() {
        let mut machine = RoundMachine::new(Role::Host);
        let mut snapshot = doc(2);
        choose(&mut snapshot, Seat::Player1, Choice::A);
        machine.on_snapshot(snapshot);
        assert!(machine.has_chosen());
    }

    #[test]
    fn advance_writes_history_with_next_round() {
        let mut machine = RoundMachine::new(Role::Host);
        let mut snapshot = doc(3);
        choose(&mut snapshot, Seat::Player1, Choice::A);
        choose(&mut snapshot, Seat::Player2, Choice::B);
        snapshot.phase = Phase::Reveal;
        let effects = machine.on_snapshot(snapshot);
        let reveal = effects.iter().find_map(|e| match e {
            Effect::Emit(GameEvent::Reveal(view)) => Some(view.clone()),
            _ => None,
        });
        let reveal = reveal.unwrap();
        assert!(reveal.can_advance);
        assert!(!reveal.result.matched);
        assert_eq!(reveal.result.p1_choice, "A0");
        assert_eq!(reveal.result.p2_choice, "B0");

        let batch = machine.advance_batch(BASE).unwrap().unwrap();
        assert_eq!(batch.get("wyr-games/4821/phase"), Some(&json!("playing")));
        assert_eq!(batch.get("wyr-games/4821/currentRound"), Some(&json!(1)));
        assert_eq!(
            batch.get("wyr-games/4821/history/0").unwrap()["matched"],
            json!(false)
        );
        for seat in ["player1", "player2"] {
            assert_eq!(batch.get(&format!("{BASE}/{seat}/choice")), Some(&Value::Null));
            assert_eq!(batch.get(&format!("{BASE}/{seat}/isRandom")), Some(&Value::Null));
        }

        // Double click: the same round is never advanced twice.
        assert!(machine.advance_batch(BASE).unwrap().is_none());
    }

    #[test]
    fn advance_on_last_round_goes_to_finale() {
        let mut machine = RoundMachine::new(Role::Host);
        let mut snapshot = doc(1);
        choose(&mut snapshot, Seat::Player1, Choice::B);
        choose(&mut snapshot, Seat::Player2, Choice::B);
        snapshot.phase = Phase::Reveal;
        machine.on_snapshot(snapshot);

        let batch = machine.advance_batch(BASE).unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get("wyr-games/4821/phase"), Some(&json!("finale")));
        assert_eq!(
            batch.get("wyr-games/4821/history/0").unwrap()["matched"],
            json!(true)
        );
    }

    #[test]
    fn advance_outside_reveal_is_ignored() {
        let mut machine = RoundMachine::new(Role::Host);
        machine.on_snapshot(doc(2));
        assert!(machine.advance_batch(BASE).unwrap().is_none());
    }

    #[test]
    fn finale_with_inflated_round_count_still_resolves() {
        let mut machine = RoundMachine::new(Role::Guest);
        let mut snapshot = doc(1);
        snapshot.total_rounds = usize::MAX;
        snapshot.phase = Phase::Finale;
        snapshot.history.insert(
            0,
            RoundResult::new(&Round::new("A0", "B0"), Choice::B, Choice::B),
        );
        let effects = machine.on_snapshot(snapshot);
        let finale = effects
            .iter()
            .find_map(|e| match e {
                Effect::Emit(GameEvent::Finale(view)) => Some(view.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(finale.results.len(), 1);
        assert_eq!(finale.summary.similarity, 100);
    }

    #[test]
    fn finale_uses_cached_result_when_history_dropped() {
        let mut machine = RoundMachine::new(Role::Guest);
        let mut snapshot = doc(2);
        choose(&mut snapshot, Seat::Player1, Choice::A);
        choose(&mut snapshot, Seat::Player2, Choice::A);
        snapshot.phase = Phase::Reveal;
        machine.on_snapshot(snapshot.clone());

        // Round 0's history write was lost; round 1 made it.
        snapshot.current_round = 1;
        snapshot.phase = Phase::Finale;
        snapshot.history.insert(
            1,
            RoundResult::new(&Round::new("A1", "B1"), Choice::A, Choice::B),
        );
        let effects = machine.on_snapshot(snapshot);
        let finale = effects
            .iter()
            .find_map(|e| match e {
                Effect::Emit(GameEvent::Finale(view)) => Some(view.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(finale.results.len(), 2);
        assert_eq!(finale.summary.matches, 1);
        assert_eq!(finale.summary.similarity, 50);
        assert!(!finale.can_restart);
    }

    #[test]
    fn readiness_checks() {
        let mut snapshot = doc(1);
        assert!(!reveal_ready(&snapshot));
        choose(&mut snapshot, Seat::Player1, Choice::A);
        choose(&mut snapshot, Seat::Player2, Choice::A);
        assert!(reveal_ready(&snapshot));
        snapshot.phase = Phase::Reveal;
        assert!(!reveal_ready(&snapshot));

        snapshot.phase = Phase::Waiting;
        assert!(start_ready(&snapshot));
        snapshot.player2 = None;
        assert!(!start_ready(&snapshot));
    }
}
