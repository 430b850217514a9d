//! Shared document store abstraction.
//!
//! The [`DocumentStore`] trait is the contract the session client needs from the
//! realtime database both peers talk to: slash-separated paths into one JSON tree,
//! snapshot reads, plain writes, atomic multi-path updates and push subscriptions
//! that deliver the *full* current value at a path after every change.
//!
//! The store itself is an external collaborator. The crate ships an in-process
//! [`MemoryStore`](crate::stores::MemoryStore) behind the `store-memory` feature;
//! hosted backends implement the trait out of tree.
//!
//! # Semantics relied upon
//!
//! - Writing `null` removes the path.
//! - Each writer's own writes apply in the order issued. There is no total order
//!   across writers.
//! - An [`UpdateBatch`] is all-or-nothing: subscribers never observe half of it.
//! - A subscription yields the current value once immediately, then again after
//!   every change that touches the path. `None` means the path is empty.
//!
//! # Implementing a Custom Store
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use serde_json::Value;
//! use wyr_client::error::Result;
//! use wyr_client::store::{DocumentStore, Subscription, UpdateBatch};
//!
//! struct MyStore { /* ... */ }
//!
//! #[async_trait]
//! impl DocumentStore for MyStore {
//!     async fn read(&self, path: &str) -> Result<Option<Value>> {
//!         todo!()
//!     }
//!
//!     async fn write(&self, path: &str, value: Value) -> Result<()> {
//!         todo!()
//!     }
//!
//!     async fn update(&self, batch: UpdateBatch) -> Result<()> {
//!         // Apply every entry or none of them.
//!         todo!()
//!     }
//!
//!     async fn subscribe(&self, path: &str) -> Result<Subscription> {
//!         todo!()
//!     }
//!
//!     async fn delete(&self, path: &str) -> Result<()> {
//!         todo!()
//!     }
//! }
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Stream of full snapshots for one subscribed path.
///
/// Dropping the receiver ends the subscription.
pub type Subscription = mpsc::UnboundedReceiver<Option<Value>>;

/// A realtime JSON document store shared by both peers.
///
/// # Object Safety
///
/// This trait is object-safe; the session client holds it as
/// `Arc<dyn DocumentStore>` so both peers in one process can share a backend.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Read the current value at `path`, or `None` if nothing is stored there.
    ///
    /// # Errors
    ///
    /// Returns [`WyrError::ReadFailure`](crate::WyrError::ReadFailure) when the store
    /// cannot be reached.
    async fn read(&self, path: &str) -> Result<Option<Value>>;

    /// Replace the value at `path`. Writing `Value::Null` removes it.
    ///
    /// # Errors
    ///
    /// Returns [`WyrError::WriteFailure`](crate::WyrError::WriteFailure) if the write
    /// was rejected.
    async fn write(&self, path: &str, value: Value) -> Result<()>;

    /// Apply every entry of `batch` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`WyrError::WriteFailure`](crate::WyrError::WriteFailure) if the batch
    /// was rejected; no entry is applied in that case.
    async fn update(&self, batch: UpdateBatch) -> Result<()>;

    /// Subscribe to the full value at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WyrError::ReadFailure`](crate::WyrError::ReadFailure) when the store
    /// cannot be reached.
    async fn subscribe(&self, path: &str) -> Result<Subscription>;

    /// Remove everything at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`WyrError::WriteFailure`](crate::WyrError::WriteFailure) if the delete
    /// was rejected.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// A set of absolute path → value writes applied as one atomic update.
///
/// Entries are keyed relative to a base path, mirroring how a realtime database
/// `update()` call is issued against a document reference.
///
/// ```
/// use serde_json::json;
/// use wyr_client::store::UpdateBatch;
///
/// let batch = UpdateBatch::new("wyr-games/4821")
///     .set("phase", json!("reveal"))
///     .clear("player1/choice");
/// assert_eq!(batch.get("wyr-games/4821/phase"), Some(&json!("reveal")));
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateBatch {
    base: String,
    entries: BTreeMap<String, Value>,
}

impl UpdateBatch {
    /// Start an empty batch rooted at `base`.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            entries: BTreeMap::new(),
        }
    }

    /// Set `relative` (under the base) to `value`.
    #[must_use]
    pub fn set(mut self, relative: &str, value: Value) -> Self {
        let path = join_path(&self.base, relative);
        self.entries.insert(path, value);
        self
    }

    /// Remove `relative` (under the base).
    #[must_use]
    pub fn clear(self, relative: &str) -> Self {
        self.set(relative, Value::Null)
    }

    /// The base path entries are relative to.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Value queued for an absolute `path`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries.get(path)
    }

    /// Absolute path → value pairs, in path order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(path, value)| (path.as_str(), value))
    }

    /// Consume the batch into its absolute path → value pairs.
    pub fn into_entries(self) -> BTreeMap<String, Value> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Join a base path and a relative path with exactly one separator.
pub fn join_path(base: &str, relative: &str) -> String {
    let base = base.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    match (base.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{relative}"),
    }
}

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}
