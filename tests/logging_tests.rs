#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Log level checks for store failures.
//!
//! Kept in its own test binary: the capturing subscriber is installed as the
//! thread default and must not see events from unrelated tests.

mod common;

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;
use wyr_client::{Choice, ErrorCode, GameEvent};

use common::{start_game, wait_for, RecordingStore};

/// Records the level and message of every event.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<(Level, String)>>>);

impl Captured {
    fn at(&self, level: Level, needle: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(seen, message)| *seen == level && message.contains(needle))
            .count()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for Captured {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.0
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0));
    }
}

#[tokio::test(start_paused = true)]
async fn failed_choice_write_logs_at_error_level() {
    let captured = Captured::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(captured.clone()));

    let store = RecordingStore::new();
    let (_host, _host_events, guest, mut guest_events) = start_game(&store, "Travel", 1).await;
    wait_for(&mut guest_events, |event| match event {
        GameEvent::Playing(_) => Some(()),
        _ => None,
    })
    .await;

    store.set_offline(true);
    guest.choose(Choice::A).unwrap();
    let code = wait_for(&mut guest_events, |event| match event {
        GameEvent::Error { code, .. } => Some(*code),
        _ => None,
    })
    .await;
    assert_eq!(code, ErrorCode::WriteFailure);

    assert_eq!(captured.at(Level::ERROR, "failed to write choice"), 1);
    assert_eq!(captured.at(Level::WARN, "failed to write choice"), 0);
}
