//! # retort-store
//!
//! Durable record of the comments Retort has already replied to.
//!
//! The backing file is append-only: one comment identifier per line, loaded
//! fully into memory at startup and extended as replies are confirmed.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  ProcessedStore                          │
//! │    in-memory HashSet<String>  (contains) │
//! ├──────────────────────────────────────────┤
//! │  data/processed_comments.txt  (append)   │
//! │    <id>\t<recorded-at RFC 3339>          │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use retort_store::ProcessedStore;
//!
//! let mut store = ProcessedStore::open("data/processed_comments.txt").await?;
//! if !store.contains("1790000000000000001") {
//!     // ... reply ...
//!     store.record("1790000000000000001").await?;
//! }
//! ```

pub mod error;
pub mod processed;

// ── re-exports ───────────────────────────────────────────────────────

pub use error::{StoreError, StoreResult};
pub use processed::ProcessedStore;
