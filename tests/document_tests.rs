#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Wire-format tests for the shared game document.
//!
//! Fixtures are written the way a realtime database hands snapshots back:
//! null fields absent, arrays as JSON arrays, history keyed by decimal strings.

use serde_json::json;
use wyr_client::{Choice, GameDocument, Phase, RoundResult};

fn reveal_fixture() -> serde_json::Value {
    json!({
        "topic": "Food Fights",
        "totalRounds": 3,
        "currentRound": 1,
        "rounds": [
            { "optionA": "Pizza", "optionB": "Burgers" },
            { "optionA": "Coffee", "optionB": "Tea" },
            { "optionA": "Sushi", "optionB": "Tacos" }
        ],
        "phase": "reveal",
        "player1": {
            "id": "6f1c3d5e-8a42-4b7e-9d1a-2c3b4d5e6f70",
            "name": "Ana",
            "choice": "A",
            "isRandom": false,
            "ready": false
        },
        "player2": {
            "id": "0b9e8d7c-6a5b-4c3d-8e2f-1a0b9c8d7e6f",
            "name": "Ben",
            "choice": "B",
            "isRandom": true,
            "ready": false
        },
        "history": {
            "0": {
                "p1Choice": "Pizza",
                "p2Choice": "Pizza",
                "optionA": "Pizza",
                "optionB": "Burgers",
                "matched": true
            }
        },
        "createdAt": 1_760_000_000_000_u64
    })
}

#[test]
fn decodes_a_reveal_snapshot() {
    let doc = GameDocument::from_snapshot(reveal_fixture()).unwrap();
    assert_eq!(doc.phase, Phase::Reveal);
    assert_eq!(doc.current_round, 1);
    assert_eq!(doc.total_rounds, 3);
    assert_eq!(doc.player1.choice, Some(Choice::A));
    assert!(!doc.player1.picked_randomly());
    assert!(doc.player2.as_ref().unwrap().picked_randomly());
    assert_eq!(doc.created_at, Some(1_760_000_000_000));

    let first = &doc.history[&0];
    assert!(first.matched);
    assert_eq!(first.p1_choice, "Pizza");

    let current = doc.round_result().unwrap();
    assert_eq!(current.p1_choice, "Coffee");
    assert_eq!(current.p2_choice, "Tea");
    assert!(!current.matched);
}

#[test]
fn encoding_uses_camel_case_and_string_history_keys() {
    let doc = GameDocument::from_snapshot(reveal_fixture()).unwrap();
    let value = doc.to_snapshot().unwrap();
    assert_eq!(value["totalRounds"], json!(3));
    assert_eq!(value["currentRound"], json!(1));
    assert_eq!(value["player2"]["isRandom"], json!(true));
    assert_eq!(value["history"]["0"]["p2Choice"], json!("Pizza"));
    assert_eq!(value["phase"], json!("reveal"));
}

#[test]
fn cleared_choices_and_missing_guest_decode() {
    let value = json!({
        "topic": "Tech",
        "totalRounds": 1,
        "rounds": [{ "optionA": "No Phone", "optionB": "No Laptop" }],
        "phase": "waiting",
        "player1": { "id": "6f1c3d5e-8a42-4b7e-9d1a-2c3b4d5e6f70", "name": "Ana" }
    });
    let doc = GameDocument::from_snapshot(value).unwrap();
    assert_eq!(doc.current_round, 0);
    assert!(doc.player2.is_none());
    assert!(doc.history.is_empty());
    assert!(!doc.any_chosen());
    assert!(doc.is_last_round());
}

#[test]
fn round_result_examples() {
    let round = wyr_client::Round::new("Pizza", "Burgers");
    let clash = RoundResult::new(&round, Choice::A, Choice::B);
    assert!(!clash.matched);
    assert_eq!(clash.p1_choice, "Pizza");
    assert_eq!(clash.p2_choice, "Burgers");

    let agreed = RoundResult::new(&round, Choice::A, Choice::A);
    assert!(agreed.matched);
}

#[test]
fn rejects_unknown_phase_and_bad_choice() {
    let mut value = reveal_fixture();
    value["phase"] = json!("lobby");
    assert!(GameDocument::from_snapshot(value).is_err());

    let mut value = reveal_fixture();
    value["player1"]["choice"] = json!("C");
    let err = GameDocument::from_snapshot(value).unwrap_err();
    assert_eq!(err.code(), wyr_client::ErrorCode::CorruptDocument);
}
