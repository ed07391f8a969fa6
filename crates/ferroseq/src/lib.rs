//! Per-tenant integer id allocation backed by a shared counter table.
//!
//! Every tenant owns one counter row per sequence. Rather than touching that
//! row for every id, an allocator reserves a whole block ("range") of ids in
//! one locked transaction and then serves them from memory. Ids are unique
//! across threads and across processes sharing the table, and strictly
//! increasing per `(tenant, key)`. Ids left in a range when the process stops
//! are never reissued.
//!
//! ```
//! use ferroseq::{Allocator, AllocatorConfig, LocalLockService, MemoryCounterStore};
//!
//! let store = MemoryCounterStore::new();
//! store.insert(1, 100, Some(1));
//!
//! let config = AllocatorConfig::builder()
//!     .sequence(100, 50)
//!     .key("customer", 100)
//!     .build()
//!     .unwrap();
//!
//! let allocator = Allocator::new(config, store, LocalLockService::new()).unwrap();
//! let first = allocator.next_id("customer", 1).unwrap();
//! let second = allocator.next_id("customer", 1).unwrap();
//! assert!(second > first);
//! ```
//!
//! ## Features
//!
//! - `sqlite`: [`SqliteCounterStore`], a counter store over a SQLite file.
//! - `serde`: `Serialize`/`Deserialize` for [`AllocatorConfig`].
//! - `tracing`: spans and events around refills.

mod allocator;
mod config;
mod error;
mod lock;
mod range;
mod store;

pub use crate::allocator::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::lock::*;
pub use crate::range::*;
pub use crate::store::*;
