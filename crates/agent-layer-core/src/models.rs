//! Core data models: verticals, stored place records, provenance, and sync
//! results.
//!
//! A [`PlaceRecord`] is what the store persists. Connectors produce a
//! [`NewPlace`] (everything except identity, timestamps, and site refs) and
//! the store turns it into a record, either fresh or merged into an
//! existing one found through its site reference.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::ids;

/// Business category with its own attribute schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vertical {
    Clinic,
    Playground,
    Wellness,
    Travel,
    Food,
    Industrial,
}

impl Vertical {
    /// Every supported vertical, in probe order.
    pub const ALL: [Vertical; 6] = [
        Vertical::Clinic,
        Vertical::Playground,
        Vertical::Wellness,
        Vertical::Travel,
        Vertical::Food,
        Vertical::Industrial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vertical::Clinic => "clinic",
            Vertical::Playground => "playground",
            Vertical::Wellness => "wellness",
            Vertical::Travel => "travel",
            Vertical::Food => "food",
            Vertical::Industrial => "industrial",
        }
    }

    /// Category used when a record does not carry one.
    pub fn default_category(&self) -> &'static str {
        match self {
            Vertical::Playground => "indoor-playground",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for Vertical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vertical {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Vertical::ALL
            .into_iter()
            .find(|v| v.as_str() == lower)
            .ok_or_else(|| {
                AgentError::validation(format!(
                    "unknown vertical '{}'; expected one of clinic, playground, wellness, travel, food, industrial",
                    s
                ))
            })
    }
}

/// A latitude/longitude pair. Both present or the whole value absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn from_parts(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        match (lat, lng) {
            (Some(lat), Some(lng)) => Some(Self { lat, lng }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    GooglePlaces,
    Osm,
    OfficialSite,
    Manual,
    Partner,
}

/// One provenance entry. A record's source list only grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl SourceRef {
    fn same_origin(&self, other: &SourceRef) -> bool {
        self.kind == other.kind && self.external_id == other.external_id
    }
}

/// Canonical place fields produced by a connector transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlace {
    pub name: String,
    pub slug: String,
    pub vertical: Vertical,
    pub province: String,
    pub city: String,
    pub neighborhood: Option<String>,
    pub address: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub booking_url: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub rating: Option<f64>,
    pub review_count: u32,
    pub tags: Vec<String>,
    pub sources: Vec<SourceRef>,
    pub raw_data: serde_json::Value,
}

impl NewPlace {
    /// Check the invariants every stored record must satisfy.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.name.trim().is_empty() {
            return Err(AgentError::validation("place name must not be empty"));
        }
        if self.slug.is_empty() {
            return Err(AgentError::validation(format!(
                "place '{}' produces an empty slug",
                self.name
            )));
        }
        if self.city.trim().is_empty() {
            return Err(AgentError::validation("place city is required"));
        }
        if self.province.trim().is_empty() {
            return Err(AgentError::validation("place province is required"));
        }
        if let Some(r) = self.rating {
            if !(0.0..=5.0).contains(&r) {
                return Err(AgentError::validation(format!(
                    "rating {} is outside [0, 5]",
                    r
                )));
            }
        }
        Ok(())
    }

    /// Materialize a brand-new record whose only site ref is `(site_id, external_id)`.
    pub fn into_record(self, site_id: &str, external_id: &str, now: DateTime<Utc>) -> PlaceRecord {
        let id = ids::generate_id("place", Some(&self.city));
        let mut site_refs = BTreeMap::new();
        site_refs.insert(site_id.to_string(), external_id.to_string());
        PlaceRecord {
            id,
            name: self.name,
            slug: self.slug,
            vertical: self.vertical,
            province: self.province,
            city: self.city,
            neighborhood: self.neighborhood,
            address: self.address,
            coordinates: self.coordinates,
            phone: self.phone,
            website: self.website,
            booking_url: self.booking_url,
            email: self.email,
            description: self.description,
            images: self.images,
            rating: self.rating,
            review_count: self.review_count,
            tags: self.tags,
            sources: self.sources,
            site_refs,
            raw_data: self.raw_data,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A persisted place listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRecord {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub vertical: Vertical,
    pub province: String,
    pub city: String,
    pub neighborhood: Option<String>,
    pub address: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub booking_url: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub rating: Option<f64>,
    pub review_count: u32,
    pub tags: Vec<String>,
    pub sources: Vec<SourceRef>,
    /// connector site id → that connector's external id
    pub site_refs: BTreeMap<String, String>,
    pub raw_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlaceRecord {
    /// Overwrite canonical fields from a fresh transform while keeping
    /// identity, creation time, existing site refs, and prior provenance.
    pub fn merge_from(&mut self, update: NewPlace, site_id: &str, external_id: &str, now: DateTime<Utc>) {
        self.name = update.name;
        self.slug = update.slug;
        self.vertical = update.vertical;
        self.province = update.province;
        self.city = update.city;
        self.neighborhood = update.neighborhood;
        self.address = update.address;
        self.coordinates = update.coordinates;
        self.phone = update.phone;
        self.website = update.website;
        self.booking_url = update.booking_url;
        self.email = update.email;
        self.description = update.description;
        self.images = update.images;
        self.rating = update.rating;
        self.review_count = update.review_count;
        self.tags = update.tags;
        self.raw_data = update.raw_data;

        for source in update.sources {
            match self.sources.iter_mut().find(|s| s.same_origin(&source)) {
                Some(existing) => {
                    existing.url = source.url;
                    existing.fetched_at = source.fetched_at;
                }
                None => self.sources.push(source),
            }
        }

        self.site_refs
            .insert(site_id.to_string(), external_id.to_string());
        self.updated_at = now.max(self.created_at);
    }
}

/// Result of one upsert-by-site-ref call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub place_id: String,
    pub created: bool,
}

/// Per-connector, per-run sync report. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub site_id: String,
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_new_place(name: &str) -> NewPlace {
        NewPlace {
            name: name.to_string(),
            slug: ids::slugify(name),
            vertical: Vertical::Clinic,
            province: "AB".to_string(),
            city: "calgary".to_string(),
            neighborhood: None,
            address: None,
            coordinates: None,
            phone: None,
            website: None,
            booking_url: None,
            email: None,
            description: None,
            images: Vec::new(),
            rating: Some(4.2),
            review_count: 3,
            tags: vec!["walk-in".to_string()],
            sources: vec![SourceRef {
                kind: SourceKind::Partner,
                external_id: Some("ext-1".to_string()),
                url: None,
                fetched_at: None,
            }],
            raw_data: serde_json::json!({}),
        }
    }

    #[test]
    fn test_vertical_parse_roundtrip() {
        for v in Vertical::ALL {
            assert_eq!(v.as_str().parse::<Vertical>().unwrap(), v);
        }
        assert_eq!(" Clinic ".parse::<Vertical>().unwrap(), Vertical::Clinic);
        assert!("bakery".parse::<Vertical>().is_err());
    }

    #[test]
    fn test_coordinates_require_both_parts() {
        assert!(Coordinates::from_parts(Some(1.0), None).is_none());
        assert!(Coordinates::from_parts(None, Some(1.0)).is_none());
        assert_eq!(
            Coordinates::from_parts(Some(1.0), Some(2.0)),
            Some(Coordinates { lat: 1.0, lng: 2.0 })
        );
    }

    #[test]
    fn test_validate_rejects_bad_rating_and_empty_city() {
        let mut p = make_new_place("Clinic");
        p.rating = Some(5.5);
        assert!(p.validate().is_err());

        let mut p = make_new_place("Clinic");
        p.city = "  ".to_string();
        assert!(p.validate().is_err());

        assert!(make_new_place("Clinic").validate().is_ok());
    }

    #[test]
    fn test_merge_keeps_identity_and_other_site_refs() {
        let created = Utc::now() - Duration::days(2);
        let mut record = make_new_place("Old Name").into_record("siteA", "ext-1", created);
        record.site_refs.insert("siteB".to_string(), "b-77".to_string());
        let id = record.id.clone();

        let now = Utc::now();
        record.merge_from(make_new_place("New Name"), "siteA", "ext-1", now);

        assert_eq!(record.id, id);
        assert_eq!(record.name, "New Name");
        assert_eq!(record.created_at, created);
        assert_eq!(record.updated_at, now);
        assert_eq!(record.site_refs.get("siteB").map(String::as_str), Some("b-77"));
        assert_eq!(record.site_refs.get("siteA").map(String::as_str), Some("ext-1"));
        // same origin is refreshed, not duplicated
        assert_eq!(record.sources.len(), 1);
    }

    #[test]
    fn test_merge_never_moves_updated_before_created() {
        let created = Utc::now();
        let mut record = make_new_place("X").into_record("s", "e", created);
        record.merge_from(make_new_place("X"), "s", "e", created - Duration::hours(1));
        assert!(record.updated_at >= record.created_at);
    }
}
