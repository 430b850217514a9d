//! Document store implementations.
//!
//! Concrete [`DocumentStore`](crate::DocumentStore) backends live behind feature
//! gates:
//!
//! | Feature        | Store           |
//! |----------------|-----------------|
//! | `store-memory` | [`MemoryStore`] |
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wyr_client::{DocumentStore, MemoryStore};
//!
//! let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
//! store.write("wyr-games/4821/phase", serde_json::json!("waiting")).await?;
//! ```

#[cfg(feature = "store-memory")]
pub mod memory;

#[cfg(feature = "store-memory")]
pub use memory::MemoryStore;
