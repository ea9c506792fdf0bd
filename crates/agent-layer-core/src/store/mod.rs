//! Storage abstraction for Agent Layer.
//!
//! The [`Store`] trait covers every persistence operation the search,
//! comparison, sync, and lead pipelines need. The core ships an
//! [`InMemoryStore`](memory::InMemoryStore); the application crate adds a
//! SQLite backend. Implementations must be `Send + Sync`.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`places_in_vertical`](Store::places_in_vertical) | Scan one vertical |
//! | [`get_place`](Store::get_place) | Point lookup by id within a vertical |
//! | [`find_place_by_slug`](Store::find_place_by_slug) | Lookup by `(slug, city)` |
//! | [`insert_place`](Store::insert_place) / [`update_place`](Store::update_place) | Direct writes |
//! | [`upsert_by_site_ref`](Store::upsert_by_site_ref) | Connector write path |
//! | [`insert_lead`](Store::insert_lead) / [`update_lead`](Store::update_lead) | Lead writes |
//! | [`get_lead`](Store::get_lead) / [`list_leads`](Store::list_leads) | Lead reads |
//!
//! Uniqueness rules every backend enforces:
//! - `(slug, city)` identifies at most one place ([`AgentError::Conflict`] otherwise).
//! - `(site_id, external_id)` points at at most one place.
//!
//! [`AgentError::Conflict`]: crate::error::AgentError::Conflict

pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::lead::{LeadFilter, LeadRecord, LeadStatus};
use crate::models::{NewPlace, PlaceRecord, UpsertOutcome, Vertical};

#[async_trait]
pub trait Store: Send + Sync {
    /// Every place in `vertical`, in no particular order.
    async fn places_in_vertical(&self, vertical: Vertical) -> Result<Vec<PlaceRecord>>;

    async fn get_place(&self, vertical: Vertical, id: &str) -> Result<Option<PlaceRecord>>;

    async fn find_place_by_slug(&self, slug: &str, city: &str) -> Result<Option<PlaceRecord>>;

    async fn insert_place(&self, place: &PlaceRecord) -> Result<()>;

    /// Replace a stored place. Fails with `NotFound` if the id is unknown.
    async fn update_place(&self, place: &PlaceRecord) -> Result<()>;

    /// Create or refresh the place a connector knows as `external_id`.
    ///
    /// Resolution order: the `(site_id, external_id)` reference, then a
    /// same-vertical place with the same `(slug, city)` (a second source for
    /// a place we already hold), then a fresh insert. Atomic per call.
    async fn upsert_by_site_ref(
        &self,
        site_id: &str,
        external_id: &str,
        place: NewPlace,
    ) -> Result<UpsertOutcome>;

    async fn place_counts(&self) -> Result<BTreeMap<Vertical, usize>>;

    async fn insert_lead(&self, lead: &LeadRecord) -> Result<()>;

    async fn get_lead(&self, id: &str) -> Result<Option<LeadRecord>>;

    async fn update_lead(&self, lead: &LeadRecord) -> Result<()>;

    /// Leads matching `filter`, newest first, paged by `limit`/`offset`.
    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<LeadRecord>>;

    async fn lead_counts(&self) -> Result<BTreeMap<LeadStatus, usize>>;
}
