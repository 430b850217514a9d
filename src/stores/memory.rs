//! In-process document store.
//!
//! [`MemoryStore`] keeps one JSON tree behind a mutex and behaves like a hosted
//! realtime database as far as the session client can tell:
//!
//! - `null` writes remove the path and prune parents left empty,
//! - a whole [`UpdateBatch`] is applied under one lock, so subscribers see it
//!   all at once,
//! - every subscriber whose path overlaps a changed path receives the full value
//!   at its own path, and a new subscriber immediately receives the current value.
//!
//! Two sessions sharing one `Arc<MemoryStore>` play a complete game in-process,
//! which is how the integration tests and the `two_player` demo run.
//!
//! # Feature gate
//!
//! Only available with the `store-memory` feature (enabled by default).

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::{Result, WyrError};
use crate::store::{segments, DocumentStore, Subscription, UpdateBatch};

struct Subscriber {
    path: String,
    tx: mpsc::UnboundedSender<Option<Value>>,
}

struct Inner {
    root: Value,
    subscribers: Vec<Subscriber>,
    offline: bool,
}

/// A [`DocumentStore`] held entirely in memory.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                root: Value::Object(Map::new()),
                subscribers: Vec::new(),
                offline: false,
            }),
        }
    }

    /// Reject (`true`) or accept (`false`) every subsequent mutation.
    ///
    /// Reads and subscriptions keep working while offline, like a client-side
    /// cache would.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Synchronous read, handy in tests.
    pub fn snapshot(&self, path: &str) -> Option<Value> {
        lookup(&self.lock().root, path).cloned()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|sub| !sub.tx.is_closed());
        inner.subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `(path, value)` pairs under one lock, then notify once.
    fn apply(&self, changes: Vec<(String, Value)>) -> Result<()> {
        let mut inner = self.lock();
        if inner.offline {
            return Err(WyrError::WriteFailure("store is offline".into()));
        }
        for (path, value) in &changes {
            assign(&mut inner.root, path, value.clone());
        }
        let Inner {
            root, subscribers, ..
        } = &mut *inner;
        let root: &Value = root;
        subscribers.retain(|sub| {
            if !changes.iter().any(|(path, _)| overlaps(path, &sub.path)) {
                return !sub.tx.is_closed();
            }
            sub.tx.send(lookup(root, &sub.path).cloned()).is_ok()
        });
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MemoryStore")
            .field("subscribers", &inner.subscribers.len())
            .field("offline", &inner.offline)
            .finish()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.snapshot(path))
    }

    async fn write(&self, path: &str, value: Value) -> Result<()> {
        tracing::debug!(path, "memory store write");
        self.apply(vec![(path.to_string(), value)])
    }

    async fn update(&self, batch: UpdateBatch) -> Result<()> {
        tracing::debug!(base = batch.base(), entries = batch.len(), "memory store update");
        self.apply(batch.into_entries().into_iter().collect())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        // Subscribers always start from the current value.
        let _ = tx.send(lookup(&inner.root, path).cloned());
        inner.subscribers.push(Subscriber {
            path: path.to_string(),
            tx,
        });
        Ok(rx)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.apply(vec![(path.to_string(), Value::Null)])
    }
}

// ── JSON tree helpers ───────────────────────────────────────────────

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path).try_fold(root, |node, segment| node.as_object()?.get(segment))
}

fn overlaps(a: &str, b: &str) -> bool {
    segments(a).zip(segments(b)).all(|(x, y)| x == y)
}

/// Drop nulls and empty objects, the way a hosted realtime database stores data.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, child)| (key, normalize(child)))
                .filter(|(_, child)| !is_empty(child))
                .collect(),
        ),
        other => other,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn assign(root: &mut Value, path: &str, value: Value) {
    let value = normalize(value);
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        *root = if is_empty(&value) {
            Value::Object(Map::new())
        } else {
            value
        };
        return;
    };

    if is_empty(&value) {
        remove(root, &parts);
        return;
    }

    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        map.insert((*last).to_string(), value);
    }
}

/// Remove the value at `parts`; returns whether the parent became empty.
fn remove(node: &mut Value, parts: &[&str]) -> bool {
    let Value::Object(map) = node else {
        return false;
    };
    match parts {
        [] => false,
        [leaf] => {
            map.remove(*leaf);
            map.is_empty()
        }
        [head, rest @ ..] => {
            let emptied = map
                .get_mut(*head)
                .is_some_and(|child| remove(child, rest));
            if emptied {
                map.remove(*head);
            }
            map.is_empty()
        }
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
    use serde_json::json;

    #[test]
    fn memory_store_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MemoryStore>();
    }

    #[tokio::test]
    async fn write_then_read_nested_path() {
        let store = MemoryStore::new();
        store
            .write("wyr-games/1234", json!({ "phase": "waiting", "player2": null }))
            .await
            .unwrap();
        assert_eq!(
            store.read("wyr-games/1234/phase").await.unwrap(),
            Some(json!("waiting"))
        );
        // Nulls are never stored.
        assert_eq!(store.read("wyr-games/1234/player2").await.unwrap(), None);
        assert_eq!(store.read("wyr-games/9999").await.unwrap(), None);
    }

    #[tokio::test]
    async fn deleting_last_child_prunes_parents() {
        let store = MemoryStore::new();
        store.write("a/b/c", json!(1)).await.unwrap();
        store.delete("a/b/c").await.unwrap();
        assert_eq!(store.snapshot("a"), None);
    }

    #[tokio::test]
    async fn update_applies_all_entries() {
        let store = MemoryStore::new();
        store
            .write("g", json!({ "phase": "reveal", "player1": { "choice": "A" } }))
            .await
            .unwrap();
        let batch = UpdateBatch::new("g")
            .set("history/0", json!({ "matched": true }))
            .set("phase", json!("playing"))
            .clear("player1/choice");
        store.update(batch).await.unwrap();
        assert_eq!(
            store.snapshot("g"),
            Some(json!({ "phase": "playing", "history": { "0": { "matched": true } } }))
        );
    }

    #[tokio::test]
    async fn subscriber_gets_initial_value_then_full_snapshots() {
        let store = MemoryStore::new();
        store.write("g/phase", json!("waiting")).await.unwrap();
        let mut sub = store.subscribe("g").await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), Some(json!({ "phase": "waiting" })));

        store.write("g/player2/name", json!("Ben")).await.unwrap();
        assert_eq!(
            sub.recv().await.unwrap(),
            Some(json!({ "phase": "waiting", "player2": { "name": "Ben" } }))
        );

        store.delete("g").await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn atomic_update_notifies_once() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("g").await.unwrap();
        let _ = sub.recv().await;

        store
            .update(UpdateBatch::new("g").set("a", json!(1)).set("b", json!(2)))
            .await
            .unwrap();
        assert_eq!(sub.recv().await.unwrap(), Some(json!({ "a": 1, "b": 2 })));
        assert!(sub.try_recv().is_err());
    }

    #[tokio::test]
    async fn unrelated_paths_do_not_notify() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("games/1111").await.unwrap();
        let _ = sub.recv().await;
        store.write("games/2222/phase", json!("waiting")).await.unwrap();
        assert!(sub.try_recv().is_err());
        store.write("games", json!({ "1111": { "phase": "x" } })).await.unwrap();
        assert_eq!(sub.try_recv().unwrap(), Some(json!({ "phase": "x" })));
    }

    #[tokio::test]
    async fn offline_rejects_writes_without_applying() {
        let store = MemoryStore::new();
        store.write("g/phase", json!("playing")).await.unwrap();
        store.set_offline(true);
        let err = store
            .update(UpdateBatch::new("g").set("phase", json!("reveal")))
            .await
            .unwrap_err();
        assert!(matches!(err, WyrError::WriteFailure(_)));
        assert_eq!(store.snapshot("g/phase"), Some(json!("playing")));

        store.set_offline(false);
        store.write("g/phase", json!("reveal")).await.unwrap();
        assert_eq!(store.snapshot("g/phase"), Some(json!("reveal")));
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let store = MemoryStore::new();
        let sub = store.subscribe("g").await.unwrap();
        assert_eq!(store.subscriber_count(), 1);
        drop(sub);
        assert_eq!(store.subscriber_count(), 0);
    }
}
