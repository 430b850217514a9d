//! # Two Player Example
//!
//! Plays a complete game between two bots sharing one in-memory store:
//!
//! 1. The host creates a game and prints the invite text
//! 2. The guest joins with the 4-digit code
//! 3. Both bots pick an option every round; the guest stalls once so the
//!    countdown auto-picks for it
//! 4. The host advances through every reveal to the finale
//! 5. The finale is printed as share text
//!
//! ## Running
//!
//! ```sh
//! cargo run --example two_player
//!
//! # Watch the protocol writes:
//! RUST_LOG=wyr_client=debug cargo run --example two_player
//! ```

use std::sync::Arc;

use rand::Rng;
use url::Url;
use wyr_client::event::FinaleView;
use wyr_client::score::share_message;
use wyr_client::{
    Choice, CreateParams, DocumentStore, GameEvent, GameSession, JoinParams, MemoryStore,
    SessionConfig,
};

/// Round in which the guest never answers.
const STALL_ROUND: usize = 1;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let join_page = Url::parse("https://play.example/wyr/")?;

    // ── Create and join ─────────────────────────────────────────────
    let (mut host, host_events) = GameSession::create(
        Arc::clone(&store),
        SessionConfig::new().with_join_base_url(join_page.clone()),
        CreateParams::new("Ana", "Food Fights").with_total_rounds(4),
    )
    .await?;
    println!("{}\n", host.invite_message());

    let (mut guest, guest_events) = GameSession::join(
        store,
        SessionConfig::new(),
        JoinParams::new("Ben", host.code().as_str()),
    )
    .await?;

    // ── Play ────────────────────────────────────────────────────────
    let (finale, _) = tokio::join!(
        play("host", &host, host_events, None),
        play("guest", &guest, guest_events, Some(STALL_ROUND)),
    );

    if let Some(finale) = finale {
        for (i, result) in finale.results.iter().enumerate() {
            let mark = if result.matched { "✅" } else { "❌" };
            println!(
                "Round {}: {} vs {} {mark}",
                i + 1,
                result.p1_choice,
                result.p2_choice
            );
        }
        println!(
            "\n{}",
            share_message(
                &finale.summary,
                &finale.player1_name,
                &finale.player2_name,
                join_page.as_str(),
            )
        );
    }

    host.shutdown().await;
    guest.shutdown().await;
    Ok(())
}

/// Drive one bot until the finale (or until its session closes).
async fn play(
    who: &str,
    session: &GameSession,
    mut events: tokio::sync::mpsc::Receiver<GameEvent>,
    stall_round: Option<usize>,
) -> Option<FinaleView> {
    let mut answered = None;
    while let Some(event) = events.recv().await {
        match event {
            GameEvent::Playing(view) if view.my_choice.is_none() => {
                if stall_round == Some(view.round) || answered == Some(view.round) {
                    continue;
                }
                answered = Some(view.round);
                let choice = if rand::rng().random_bool(0.5) {
                    Choice::A
                } else {
                    Choice::B
                };
                println!(
                    "[{who}] round {}: {} or {}? → {choice:?}",
                    view.round + 1,
                    view.option_a,
                    view.option_b,
                );
                if let Err(e) = session.choose(choice) {
                    tracing::error!("[{who}] choose failed: {e}");
                }
            }
            GameEvent::CountdownTick { remaining, urgent } if urgent => {
                println!("[{who}] ⏳ {remaining}");
            }
            GameEvent::AutoPicked { choice } => {
                println!("[{who}] too slow, picked {choice:?} at random");
            }
            GameEvent::Reveal(view) => {
                let verdict = if view.result.matched { "match" } else { "clash" };
                println!(
                    "[{who}] reveal {}/{}: {verdict}",
                    view.round + 1,
                    view.total_rounds
                );
                if view.can_advance {
                    if let Err(e) = session.advance() {
                        tracing::error!("[{who}] advance failed: {e}");
                    }
                }
            }
            GameEvent::Finale(view) => return Some(view),
            GameEvent::Error { code, message } => {
                tracing::warn!("[{who}] {code}: {message}");
            }
            GameEvent::Closed { reason } => {
                tracing::info!("[{who}] session closed: {reason:?}");
                return None;
            }
            _ => {}
        }
    }
    None
}
