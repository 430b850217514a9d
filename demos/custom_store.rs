//! # Custom Store Example
//!
//! Shows how to implement the [`DocumentStore`] trait. The store here wraps
//! another store and delays every operation, the way a hosted realtime
//! database would. This is useful for:
//!
//! - **Testing**: see how the promotion delays behave under latency
//! - **Custom backends**: the same five methods adapt any realtime document
//!   database
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_store
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use wyr_client::store::Subscription;
use wyr_client::{
    Choice, CreateParams, DocumentStore, GameEvent, GameSession, JoinParams, MemoryStore,
    SessionConfig, UpdateBatch,
};

// ─────────────────────────────────────────────────────────────────────
// Step 1: Define a store that delays every operation
// ─────────────────────────────────────────────────────────────────────

/// Adds a fixed round-trip delay in front of another store.
struct LaggyStore<S> {
    inner: S,
    latency: Duration,
}

impl<S> LaggyStore<S> {
    fn new(inner: S, latency: Duration) -> Self {
        Self { inner, latency }
    }

    async fn round_trip(&self) {
        tokio::time::sleep(self.latency).await;
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Implement DocumentStore
// ─────────────────────────────────────────────────────────────────────

#[async_trait]
impl<S: DocumentStore> DocumentStore for LaggyStore<S> {
    async fn read(&self, path: &str) -> wyr_client::Result<Option<Value>> {
        self.round_trip().await;
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, value: Value) -> wyr_client::Result<()> {
        self.round_trip().await;
        self.inner.write(path, value).await
    }

    async fn update(&self, batch: UpdateBatch) -> wyr_client::Result<()> {
        self.round_trip().await;
        tracing::debug!(entries = batch.len(), "atomic update");
        self.inner.update(batch).await
    }

    async fn subscribe(&self, path: &str) -> wyr_client::Result<Subscription> {
        self.round_trip().await;
        self.inner.subscribe(path).await
    }

    async fn delete(&self, path: &str) -> wyr_client::Result<()> {
        self.round_trip().await;
        self.inner.delete(path).await
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Play a one-round game through it
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store: Arc<dyn DocumentStore> = Arc::new(LaggyStore::new(
        MemoryStore::new(),
        Duration::from_millis(150),
    ));

    let (host, mut host_events) = GameSession::create(
        Arc::clone(&store),
        SessionConfig::new(),
        CreateParams::new("Ana", "Tech").with_total_rounds(1),
    )
    .await?;
    let (guest, mut guest_events) = GameSession::join(
        store,
        SessionConfig::new(),
        JoinParams::new("Ben", host.code().as_str()),
    )
    .await?;

    // Guest answers as soon as the round shows up.
    tokio::spawn(async move {
        while let Some(event) = guest_events.recv().await {
            if let GameEvent::Playing(view) = event {
                if view.my_choice.is_none() {
                    let _ = guest.choose(Choice::B);
                }
            }
        }
    });

    while let Some(event) = host_events.recv().await {
        match event {
            GameEvent::Playing(view) if view.my_choice.is_none() => host.choose(Choice::A)?,
            GameEvent::Reveal(view) => {
                println!(
                    "Ana picked {}, Ben picked {}",
                    view.result.p1_choice, view.result.p2_choice
                );
                host.advance()?;
            }
            GameEvent::Finale(view) => {
                println!("{}% similar: {}", view.summary.similarity, view.summary.band);
                break;
            }
            _ => {}
        }
    }
    Ok(())
}
