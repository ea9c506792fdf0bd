//! In-memory [`Store`] implementation for tests and ephemeral runs.
//!
//! Places, leads, and the site-ref index live in `HashMap`s behind
//! `std::sync::RwLock`s. The upsert path holds the write locks for the
//! whole resolve-then-write step, which makes it atomic per call.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::error::AgentError;
use crate::lead::{LeadFilter, LeadRecord, LeadStatus};
use crate::models::{NewPlace, PlaceRecord, UpsertOutcome, Vertical};

use super::Store;

type SiteKey = (String, String);

/// In-memory store. Cheap to construct; nothing survives a drop.
pub struct InMemoryStore {
    places: RwLock<HashMap<String, PlaceRecord>>,
    site_index: RwLock<HashMap<SiteKey, String>>,
    leads: RwLock<HashMap<String, LeadRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            places: RwLock::new(HashMap::new()),
            site_index: RwLock::new(HashMap::new()),
            leads: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn slug_taken(places: &HashMap<String, PlaceRecord>, place: &PlaceRecord) -> bool {
    places
        .values()
        .any(|p| p.id != place.id && p.slug == place.slug && p.city == place.city)
}

fn slug_conflict(place: &PlaceRecord) -> AgentError {
    AgentError::Conflict(format!(
        "slug '{}' already exists in city '{}'",
        place.slug, place.city
    ))
}

fn index_site_refs(index: &mut HashMap<SiteKey, String>, place: &PlaceRecord) {
    for (site, ext) in &place.site_refs {
        index.insert((site.clone(), ext.clone()), place.id.clone());
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn places_in_vertical(&self, vertical: Vertical) -> Result<Vec<PlaceRecord>> {
        let places = read(&self.places)?;
        Ok(places
            .values()
            .filter(|p| p.vertical == vertical)
            .cloned()
            .collect())
    }

    async fn get_place(&self, vertical: Vertical, id: &str) -> Result<Option<PlaceRecord>> {
        let places = read(&self.places)?;
        Ok(places.get(id).filter(|p| p.vertical == vertical).cloned())
    }

    async fn find_place_by_slug(&self, slug: &str, city: &str) -> Result<Option<PlaceRecord>> {
        let places = read(&self.places)?;
        Ok(places
            .values()
            .find(|p| p.slug == slug && p.city == city)
            .cloned())
    }

    async fn insert_place(&self, place: &PlaceRecord) -> Result<()> {
        let mut places = write(&self.places)?;
        let mut index = write(&self.site_index)?;
        if places.contains_key(&place.id) {
            return Err(AgentError::Conflict(format!("place id '{}' already exists", place.id)).into());
        }
        if slug_taken(&places, place) {
            return Err(slug_conflict(place).into());
        }
        index_site_refs(&mut index, place);
        places.insert(place.id.clone(), place.clone());
        Ok(())
    }

    async fn update_place(&self, place: &PlaceRecord) -> Result<()> {
        let mut places = write(&self.places)?;
        let mut index = write(&self.site_index)?;
        if !places.contains_key(&place.id) {
            return Err(AgentError::not_found("place", place.id.clone()).into());
        }
        if slug_taken(&places, place) {
            return Err(slug_conflict(place).into());
        }
        index_site_refs(&mut index, place);
        places.insert(place.id.clone(), place.clone());
        Ok(())
    }

    async fn upsert_by_site_ref(
        &self,
        site_id: &str,
        external_id: &str,
        place: NewPlace,
    ) -> Result<UpsertOutcome> {
        place.validate()?;
        let now = Utc::now();
        let mut places = write(&self.places)?;
        let mut index = write(&self.site_index)?;

        let key = (site_id.to_string(), external_id.to_string());
        let existing_id = index.get(&key).cloned().or_else(|| {
            places
                .values()
                .find(|p| p.vertical == place.vertical && p.slug == place.slug && p.city == place.city)
                .map(|p| p.id.clone())
        });

        if let Some(id) = existing_id {
            if let Some(mut record) = places.get(&id).cloned() {
                record.merge_from(place, site_id, external_id, now);
                if slug_taken(&places, &record) {
                    return Err(slug_conflict(&record).into());
                }
                index.insert(key, id.clone());
                places.insert(id.clone(), record);
                return Ok(UpsertOutcome {
                    place_id: id,
                    created: false,
                });
            }
        }

        let record = place.into_record(site_id, external_id, now);
        if slug_taken(&places, &record) {
            return Err(slug_conflict(&record).into());
        }
        index.insert(key, record.id.clone());
        let place_id = record.id.clone();
        places.insert(place_id.clone(), record);
        Ok(UpsertOutcome {
            place_id,
            created: true,
        })
    }

    async fn place_counts(&self) -> Result<BTreeMap<Vertical, usize>> {
        let places = read(&self.places)?;
        let mut counts = BTreeMap::new();
        for p in places.values() {
            *counts.entry(p.vertical).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn insert_lead(&self, lead: &LeadRecord) -> Result<()> {
        let mut leads = write(&self.leads)?;
        if leads.contains_key(&lead.id) {
            return Err(AgentError::Conflict(format!("lead id '{}' already exists", lead.id)).into());
        }
        leads.insert(lead.id.clone(), lead.clone());
        Ok(())
    }

    async fn get_lead(&self, id: &str) -> Result<Option<LeadRecord>> {
        Ok(read(&self.leads)?.get(id).cloned())
    }

    async fn update_lead(&self, lead: &LeadRecord) -> Result<()> {
        let mut leads = write(&self.leads)?;
        match leads.get_mut(&lead.id) {
            Some(slot) => {
                *slot = lead.clone();
                Ok(())
            }
            None => Err(AgentError::not_found("lead", lead.id.clone()).into()),
        }
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<LeadRecord>> {
        let leads = read(&self.leads)?;
        let mut matched: Vec<LeadRecord> = leads
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }

    async fn lead_counts(&self) -> Result<BTreeMap<LeadStatus, usize>> {
        let leads = read(&self.leads)?;
        let mut counts = BTreeMap::new();
        for l in leads.values() {
            *counts.entry(l.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::slugify;
    use crate::lead::{LeadAction, LeadContact, LeadRequest};

    fn make_place(name: &str, city: &str, vertical: Vertical) -> NewPlace {
        NewPlace {
            name: name.to_string(),
            slug: slugify(name),
            vertical,
            province: "AB".to_string(),
            city: city.to_string(),
            neighborhood: None,
            address: None,
            coordinates: None,
            phone: None,
            website: None,
            booking_url: None,
            email: None,
            description: None,
            images: Vec::new(),
            rating: None,
            review_count: 0,
            tags: Vec::new(),
            sources: Vec::new(),
            raw_data: serde_json::json!({}),
        }
    }

    fn make_lead(action: LeadAction) -> LeadRecord {
        let req = LeadRequest {
            action,
            vertical: Vertical::Clinic,
            place_ids: Vec::new(),
            contact: LeadContact {
                name: None,
                email: "a@b.ca".to_string(),
                phone: None,
            },
            province: "AB".to_string(),
            city: None,
            message: None,
            requirements: None,
            timing: None,
        };
        LeadRecord::from_request(&req, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_per_site_ref() {
        let store = InMemoryStore::new();
        let first = store
            .upsert_by_site_ref("s1", "e1", make_place("Alpha Clinic", "calgary", Vertical::Clinic))
            .await
            .unwrap();
        assert!(first.created);

        let mut renamed = make_place("Alpha Clinic Downtown", "calgary", Vertical::Clinic);
        renamed.rating = Some(4.0);
        let second = store.upsert_by_site_ref("s1", "e1", renamed).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.place_id, first.place_id);

        let all = store.places_in_vertical(Vertical::Clinic).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Alpha Clinic Downtown");
    }

    #[tokio::test]
    async fn test_upsert_reconciles_second_source_by_slug() {
        let store = InMemoryStore::new();
        let a = store
            .upsert_by_site_ref("s1", "e1", make_place("Beta", "edmonton", Vertical::Clinic))
            .await
            .unwrap();
        let b = store
            .upsert_by_site_ref("s2", "x9", make_place("Beta", "edmonton", Vertical::Clinic))
            .await
            .unwrap();
        assert!(!b.created);
        assert_eq!(a.place_id, b.place_id);

        let record = store.get_place(Vertical::Clinic, &a.place_id).await.unwrap().unwrap();
        assert_eq!(record.site_refs.len(), 2);
    }

    #[tokio::test]
    async fn test_slug_conflict_across_verticals() {
        let store = InMemoryStore::new();
        store
            .upsert_by_site_ref("s1", "e1", make_place("Gamma", "calgary", Vertical::Clinic))
            .await
            .unwrap();
        let err = store
            .upsert_by_site_ref("s2", "e2", make_place("Gamma", "calgary", Vertical::Food))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AgentError>(),
            Some(AgentError::Conflict(_))
        ));
        // same slug in another city is fine
        store
            .upsert_by_site_ref("s2", "e3", make_place("Gamma", "edmonton", Vertical::Food))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_place_respects_vertical() {
        let store = InMemoryStore::new();
        let out = store
            .upsert_by_site_ref("s1", "e1", make_place("Delta", "calgary", Vertical::Wellness))
            .await
            .unwrap();
        assert!(store.get_place(Vertical::Clinic, &out.place_id).await.unwrap().is_none());
        assert!(store.get_place(Vertical::Wellness, &out.place_id).await.unwrap().is_some());
        assert!(store.find_place_by_slug("delta", "calgary").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_unknown_place_is_not_found() {
        let store = InMemoryStore::new();
        let record = make_place("Eps", "calgary", Vertical::Food).into_record("s", "e", Utc::now());
        let err = store.update_place(&record).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AgentError>(),
            Some(AgentError::NotFound { .. })
        ));
        store.insert_place(&record).await.unwrap();
        store.update_place(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_leads_list_filters_and_pages() {
        let store = InMemoryStore::new();
        for action in [LeadAction::Match, LeadAction::Book, LeadAction::Match] {
            store.insert_lead(&make_lead(action)).await.unwrap();
        }
        let all = store.list_leads(&LeadFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let filter = LeadFilter {
            priority: Some(crate::lead::LeadPriority::Medium),
            ..LeadFilter::default()
        };
        assert_eq!(store.list_leads(&filter).await.unwrap().len(), 2);

        let paged = LeadFilter {
            limit: 1,
            offset: 2,
            ..LeadFilter::default()
        };
        assert_eq!(store.list_leads(&paged).await.unwrap().len(), 1);

        let counts = store.lead_counts().await.unwrap();
        assert_eq!(counts.get(&LeadStatus::New), Some(&3));
    }
}
