//! # Would You Rather Client
//!
//! Store-agnostic Rust client for a two-player "Would You Rather" party game.
//!
//! Two peers coordinate through a single shared JSON document. There is no
//! game server: each peer subscribes to the document, evaluates the round state
//! machine against every snapshot, and writes its own choice (or, for the host,
//! phase and history changes) back.
//!
//! ## Features
//!
//! - **Store-agnostic**: implement the [`DocumentStore`] trait for any realtime
//!   document backend
//! - **In-memory store built in**: the default `store-memory` feature provides
//!   [`MemoryStore`](stores::MemoryStore), shareable by both peers in one process
//! - **Event-driven**: receive typed [`GameEvent`]s via a channel
//! - **Race-tolerant**: every cross-peer transition is an idempotent absolute
//!   write; round results land atomically with the phase change
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
//! let (host, mut host_events) = GameSession::create(
//!     Arc::clone(&store),
//!     SessionConfig::new(),
//!     CreateParams::new("Ana", "Food Fights"),
//! )
//! .await?;
//! let (guest, mut guest_events) = GameSession::join(
//!     store,
//!     SessionConfig::new(),
//!     JoinParams::new("Ben", host.code().as_str()),
//! )
//! .await?;
//! ```

pub mod content;
pub mod countdown;
pub mod document;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod machine;
pub mod score;
pub mod session;
pub mod store;
pub mod stores;

// Re-export primary types for ergonomic imports.
pub use document::{
    Choice, GameCode, GameDocument, Phase, PlayerId, PlayerSlot, Role, Round, RoundResult, Seat,
};
pub use error::{Result, WyrError};
pub use error_codes::ErrorCode;
pub use event::GameEvent;
pub use score::{Band, Summary};
pub use session::{CreateParams, GameSession, JoinParams, SessionConfig};
pub use store::{DocumentStore, UpdateBatch};

#[cfg(feature = "store-memory")]
pub use stores::MemoryStore;
