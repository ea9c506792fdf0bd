//! # Agent Layer Core
//!
//! Pure domain logic for Agent Layer: place and lead models, the intent
//! router, the unified search engine, comparison and action generation,
//! lead rules, and the storage abstraction.
//!
//! This crate performs no network or filesystem I/O and does not depend on
//! tokio or sqlx. Persistence goes through the [`store::Store`] trait; the
//! application crate provides the SQLite backend.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `Vertical`, `PlaceRecord`, `NewPlace`, `SourceRef`, `SyncResult` |
//! | [`raw`] | Raw connector records and the default raw → place transform |
//! | [`unified`] | `UnifiedPlace` projection with per-vertical attributes |
//! | [`intent`] | Keyword intent router: vertical, location, intent type, filters |
//! | [`search`] | Filtered, sorted, cursor-paginated, faceted search |
//! | [`compare`] | Side-by-side comparison and next-action descriptors |
//! | [`lead`] | Lead requests, priority, response estimates, status lifecycle |
//! | [`store`] | `Store` trait and the in-memory backend |
//! | [`ids`] | Id generation and slugs |
//! | [`error`] | `AgentError` taxonomy |

pub mod compare;
pub mod error;
pub mod ids;
pub mod intent;
pub mod lead;
pub mod models;
pub mod raw;
pub mod search;
pub mod store;
pub mod unified;

pub use error::AgentError;
pub use models::{NewPlace, PlaceRecord, Vertical};
pub use unified::UnifiedPlace;
