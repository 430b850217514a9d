#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for session integration tests.
//!
//! Provides a [`RecordingStore`] that wraps [`MemoryStore`] and records every
//! mutation issued against it, plus helpers for waiting on session events.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use wyr_client::store::{segments, Subscription};
use wyr_client::{
    CreateParams, DocumentStore, GameDocument, GameEvent, GameSession, JoinParams, MemoryStore,
    SessionConfig, UpdateBatch,
};

/// How long (virtual time) to wait for any single event before failing.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(120);

// ── RecordingStore ──────────────────────────────────────────────────

/// One mutation attempted against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Write { path: String, value: Value },
    Update(BTreeMap<String, Value>),
    Delete { path: String },
}

impl Mutation {
    /// Every absolute path → value this mutation assigns.
    pub fn assignments(&self) -> Vec<(String, Value)> {
        match self {
            Mutation::Write { path, value } => vec![(path.clone(), value.clone())],
            Mutation::Update(entries) => entries
                .iter()
                .map(|(path, value)| (path.clone(), value.clone()))
                .collect(),
            Mutation::Delete { path } => vec![(path.clone(), Value::Null)],
        }
    }
}

/// A [`MemoryStore`] that records every mutation attempt, accepted or not.
#[derive(Debug, Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    mutations: StdMutex<Vec<Mutation>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.lock().unwrap().len()
    }

    /// Number of mutations that set a `phase` field to `phase`.
    pub fn phase_writes(&self, phase: &str) -> usize {
        self.mutations()
            .iter()
            .filter(|mutation| {
                mutation.assignments().iter().any(|(path, value)| {
                    segments(path).last() == Some("phase") && value.as_str() == Some(phase)
                })
            })
            .count()
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.set_offline(offline);
    }

    /// Decode the document stored under `path`.
    pub fn document(&self, path: &str) -> Option<GameDocument> {
        self.inner
            .snapshot(path)
            .map(|value| GameDocument::from_snapshot(value).unwrap())
    }

    fn record(&self, mutation: Mutation) {
        self.mutations.lock().unwrap().push(mutation);
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn read(&self, path: &str) -> wyr_client::Result<Option<Value>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, value: Value) -> wyr_client::Result<()> {
        self.record(Mutation::Write {
            path: path.to_string(),
            value: value.clone(),
        });
        self.inner.write(path, value).await
    }

    async fn update(&self, batch: UpdateBatch) -> wyr_client::Result<()> {
        self.record(Mutation::Update(batch.clone().into_entries()));
        self.inner.update(batch).await
    }

    async fn subscribe(&self, path: &str) -> wyr_client::Result<Subscription> {
        self.inner.subscribe(path).await
    }

    async fn delete(&self, path: &str) -> wyr_client::Result<()> {
        self.record(Mutation::Delete {
            path: path.to_string(),
        });
        self.inner.delete(path).await
    }
}

// ── Session helpers ─────────────────────────────────────────────────

pub type Events = mpsc::Receiver<GameEvent>;

/// Host creates a game on `store`, guest joins it.
pub async fn start_game(
    store: &Arc<RecordingStore>,
    topic: &str,
    rounds: usize,
) -> (GameSession, Events, GameSession, Events) {
    let dyn_store: Arc<dyn DocumentStore> = store.clone();
    let (host, host_events) = GameSession::create(
        Arc::clone(&dyn_store),
        SessionConfig::new(),
        CreateParams::new("Ana", topic).with_total_rounds(rounds),
    )
    .await
    .expect("create game");
    let (guest, guest_events) = GameSession::join(
        dyn_store,
        SessionConfig::new(),
        JoinParams::new("Ben", host.code().as_str()),
    )
    .await
    .expect("join game");
    (host, host_events, guest, guest_events)
}

/// Next event, failing the test if none arrives within [`EVENT_TIMEOUT`].
pub async fn next_event(events: &mut Events) -> GameEvent {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Skip events until `pick` returns `Some`.
pub async fn wait_for<T>(events: &mut Events, mut pick: impl FnMut(&GameEvent) -> Option<T>) -> T {
    loop {
        let event = next_event(events).await;
        if let Some(found) = pick(&event) {
            return found;
        }
    }
}

/// Drain events until the channel closes and return everything seen.
pub async fn drain(events: &mut Events) -> Vec<GameEvent> {
    let mut seen = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(EVENT_TIMEOUT, events.recv()).await {
        seen.push(event);
    }
    seen
}
