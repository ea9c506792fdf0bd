//! Unified search over every vertical.
//!
//! The engine operates entirely through the [`Store`] trait. The calling
//! application builds a [`SearchQuery`] and picks the limits; everything
//! else happens here.
//!
//! # Pipeline
//!
//! 1. If no vertical was given but there is free text, route the text
//!    through the [`IntentRouter`] to fill vertical, location, and filters.
//!    Explicit caller values always win over routed ones.
//! 2. Fan out one store scan per target vertical, concurrently. A vertical
//!    whose scan fails contributes nothing and is logged.
//! 3. Project every record to a [`UnifiedPlace`] and apply the predicate.
//! 4. Sort by rating (desc, unrated last), then id (asc).
//! 5. Compute facets (first page only), skip past the cursor, cut a page.
//!
//! # Cursor
//!
//! `base64url("{rating}:{id}")` of the last record on the page, with an
//! empty rating for unrated records. A cursor resumes at the first record
//! strictly after that position, so a record deleted between pages never
//! causes a skip or repeat. A cursor that fails to decode is ignored.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use anyhow::Result;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::intent::{IntentFilters, IntentRouter, StructuredIntent};
use crate::models::Vertical;
use crate::store::Store;
use crate::unified::UnifiedPlace;

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 50;

/// Page-size bounds, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

impl SearchLimits {
    /// Clamp a requested page size into `1..=max_limit`.
    pub fn clamp(&self, requested: Option<usize>) -> usize {
        let max = self.max_limit.max(1);
        requested.unwrap_or(self.default_limit).clamp(1, max)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub vertical: Option<Vertical>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub min_rating: Option<f64>,
    #[serde(default)]
    pub filters: IntentFilters,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Facets {
    pub cities: BTreeMap<String, usize>,
    pub tags: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub records: Vec<UnifiedPlace>,
    /// Size of the whole filtered set, independent of cursor and limit.
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Facets>,
    /// The vertical actually searched, if narrowed to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical: Option<Vertical>,
    /// Routing result, when the text went through the router.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<StructuredIntent>,
}

impl SearchPage {
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// Resume position in the sorted result set.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCursor {
    pub rating: Option<f64>,
    pub id: String,
}

impl SearchCursor {
    pub fn for_place(place: &UnifiedPlace) -> Self {
        Self {
            rating: place.rating,
            id: place.id.clone(),
        }
    }

    pub fn encode(&self) -> String {
        let rating = self.rating.map(|r| r.to_string()).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(format!("{}:{}", rating, self.id))
    }

    /// `None` for anything that is not a cursor this module produced.
    pub fn decode(token: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(token.trim()).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        let (rating, id) = text.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        let rating = if rating.is_empty() {
            None
        } else {
            Some(rating.parse::<f64>().ok().filter(|r| r.is_finite())?)
        };
        Some(Self {
            rating,
            id: id.to_string(),
        })
    }
}

/// Sort order: rating descending with unrated last, then id ascending.
fn order(a_rating: Option<f64>, a_id: &str, b_rating: Option<f64>, b_id: &str) -> Ordering {
    let by_rating = match (a_rating, b_rating) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_rating.then_with(|| a_id.cmp(b_id))
}

/// Canonical predicate plus the intent-derived attribute filters.
#[derive(Debug, Clone, Default)]
struct Predicate {
    city: Option<String>,
    province: Option<String>,
    text: Option<String>,
    tags: Vec<String>,
    min_rating: Option<f64>,
    filters: IntentFilters,
}

impl Predicate {
    fn matches(&self, place: &UnifiedPlace) -> bool {
        if let Some(province) = &self.province {
            if place.location.province != *province {
                return false;
            }
        }
        if let Some(city) = &self.city {
            if !place.location.city.eq_ignore_ascii_case(city) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let hit = place.name.to_lowercase().contains(text)
                || place
                    .location
                    .address
                    .as_deref()
                    .is_some_and(|a| a.to_lowercase().contains(text))
                || place
                    .description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(text))
                || place.tags.iter().any(|t| t.to_lowercase().contains(text));
            if !hit {
                return false;
            }
        }
        if !self.tags.iter().all(|t| place.has_tag(t)) {
            return false;
        }
        let floor = match (self.min_rating, self.filters.min_rating) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        if let Some(min) = floor {
            if place.rating.unwrap_or(0.0) < min {
                return false;
            }
        }
        self.matches_attributes(place)
    }

    fn matches_attributes(&self, place: &UnifiedPlace) -> bool {
        let f = &self.filters;
        let clinic = place.attributes.as_clinic();
        let playground = place.attributes.as_playground();

        if let Some(want) = f.is_walk_in {
            if clinic.map(|c| c.is_walk_in) != Some(want) {
                return false;
            }
        }
        if let Some(want) = f.accepting_new_patients {
            if clinic.map(|c| c.accepting_new_patients) != Some(want) {
                return false;
            }
        }
        if let Some(want) = f.has_party_packages {
            if playground.map(|p| p.party_packages) != Some(want) {
                return false;
            }
        }
        if let Some(max_age) = f.max_age {
            if !playground.is_some_and(|p| p.age_range.min <= max_age) {
                return false;
            }
        }
        if let Some(feature) = &f.feature {
            let feature = feature.to_lowercase();
            let hit = place
                .tags
                .iter()
                .chain(place.attributes.features())
                .any(|t| t.to_lowercase().contains(&feature));
            if !hit {
                return false;
            }
        }
        if let Some(category) = &f.category {
            if !place.category.eq_ignore_ascii_case(category) && !place.has_tag(category) {
                return false;
            }
        }
        // is_open is carried but not evaluated: no live hours data
        true
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Run a search against a [`Store`] backend.
pub async fn search<S: Store + ?Sized>(
    store: &S,
    query: &SearchQuery,
    limits: SearchLimits,
) -> Result<SearchPage> {
    let text = non_empty(query.text.as_deref()).map(|t| t.to_lowercase());
    let mut vertical = query.vertical;
    let mut city = non_empty(query.city.as_deref());
    let mut province = non_empty(query.province.as_deref());
    let mut filters = query.filters.clone();
    let mut text_filter = text.clone();
    let mut routed = None;

    if vertical.is_none() {
        if let Some(text) = &text {
            let intent = IntentRouter::new().parse_query(text, None);
            let extracted = intent.vertical.is_some()
                || intent.location.is_some()
                || !intent.filters.is_empty();
            if extracted {
                // the router consumed the text; matching it literally would
                // filter out nearly everything
                text_filter = None;
            }
            vertical = intent.vertical;
            if let Some(loc) = &intent.location {
                city = city.or_else(|| loc.city.clone());
                province = province.or_else(|| loc.province.clone());
            }
            filters.merge_missing(intent.filters.clone());
            routed = Some(intent);
        }
    }

    let predicate = Predicate {
        city,
        province,
        text: text_filter,
        tags: query
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        min_rating: query.min_rating,
        filters,
    };

    let targets: Vec<Vertical> = match vertical {
        Some(v) => vec![v],
        None => Vertical::ALL.to_vec(),
    };

    let scans = join_all(targets.iter().map(|v| store.places_in_vertical(*v))).await;
    let mut matched: Vec<UnifiedPlace> = Vec::new();
    for (v, scan) in targets.iter().zip(scans) {
        match scan {
            Ok(records) => matched.extend(
                records
                    .iter()
                    .map(UnifiedPlace::from_record)
                    .filter(|p| predicate.matches(p)),
            ),
            Err(e) => tracing::warn!(vertical = %v, error = %e, "vertical scan failed; skipping"),
        }
    }

    matched.sort_by(|a, b| order(a.rating, &a.id, b.rating, &b.id));
    let total = matched.len();

    let cursor = query.cursor.as_deref().and_then(SearchCursor::decode);
    let facets = if cursor.is_none() {
        Some(compute_facets(&matched))
    } else {
        None
    };

    let start = match &cursor {
        Some(c) => matched
            .iter()
            .position(|p| order(p.rating, &p.id, c.rating, &c.id) == Ordering::Greater)
            .unwrap_or(matched.len()),
        None => 0,
    };

    let limit = limits.clamp(query.limit);
    let end = (start + limit).min(matched.len());
    let records: Vec<UnifiedPlace> = matched.drain(start..end).collect();
    let next_cursor = if end < total {
        records.last().map(|p| SearchCursor::for_place(p).encode())
    } else {
        None
    };

    Ok(SearchPage {
        records,
        total,
        next_cursor,
        facets,
        vertical,
        intent: routed,
    })
}

fn compute_facets(places: &[UnifiedPlace]) -> Facets {
    let mut facets = Facets::default();
    for place in places {
        *facets.cities.entry(place.location.city.clone()).or_insert(0) += 1;
        let mut seen: Vec<&str> = Vec::new();
        for tag in &place.tags {
            if !seen.contains(&tag.as_str()) {
                seen.push(tag);
                *facets.tags.entry(tag.clone()).or_insert(0) += 1;
            }
        }
    }
    facets
}

/// Look a place up by id, probing every vertical in order when none is given.
///
/// A failing vertical is skipped while probing, as in [`search`]; with an
/// explicit `vertical` the store error is returned.
pub async fn get_record<S: Store + ?Sized>(
    store: &S,
    id: &str,
    vertical: Option<Vertical>,
) -> Result<Option<UnifiedPlace>> {
    if let Some(v) = vertical {
        let record = store.get_place(v, id).await?;
        return Ok(record.as_ref().map(UnifiedPlace::from_record));
    }
    for v in Vertical::ALL {
        match store.get_place(v, id).await {
            Ok(Some(record)) => return Ok(Some(UnifiedPlace::from_record(&record))),
            Ok(None) => {}
            Err(e) => tracing::warn!(vertical = %v, error = %e, "vertical lookup failed; skipping"),
        }
    }
    Ok(None)
}
