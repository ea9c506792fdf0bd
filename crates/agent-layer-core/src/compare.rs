//! Side-by-side comparison and next-action descriptors.

use anyhow::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::Vertical;
use crate::search::get_record;
use crate::store::Store;
use crate::unified::{PlaceAttributes, PlaceContact, PlaceLocation, UnifiedPlace};

pub const MIN_COMPARE: usize = 2;
pub const MAX_COMPARE: usize = 5;

/// Smallest rating spread worth reporting.
const RATING_SPREAD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    GetDetail,
    Compare,
    Book,
    Call,
    Visit,
    CreateLead,
    Navigate,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::GetDetail => "get_detail",
            ActionType::Compare => "compare",
            ActionType::Book => "book",
            ActionType::Call => "call",
            ActionType::Visit => "visit",
            ActionType::CreateLead => "create_lead",
            ActionType::Navigate => "navigate",
        }
    }
}

/// A suggested follow-up an agent can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub label: String,
    pub params: serde_json::Value,
    /// Always true today; reserved for capability gating.
    pub available: bool,
}

impl ActionDescriptor {
    pub fn new(action_type: ActionType, label: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            action_type,
            label: label.into(),
            params,
            available: true,
        }
    }
}

/// Actions for one place, in display order.
pub fn generate_actions(place: &UnifiedPlace) -> Vec<ActionDescriptor> {
    let mut actions = vec![ActionDescriptor::new(
        ActionType::GetDetail,
        "Get full details",
        json!({ "placeId": place.id, "vertical": place.vertical }),
    )];

    if let Some(phone) = &place.contact.phone {
        actions.push(ActionDescriptor::new(
            ActionType::Call,
            format!("Call {}", phone),
            json!({ "phone": phone }),
        ));
    }

    if let Some(url) = &place.contact.website {
        actions.push(ActionDescriptor::new(
            ActionType::Visit,
            "Visit website",
            json!({ "url": url }),
        ));
    }

    let (label, lead_type) = if place.vertical == Vertical::Clinic {
        ("Request appointment", "book")
    } else {
        ("Inquire availability", "contact")
    };
    actions.push(ActionDescriptor::new(
        ActionType::CreateLead,
        label,
        json!({ "placeId": place.id, "vertical": place.vertical, "type": lead_type }),
    ));

    if let Some(coords) = &place.location.coordinates {
        actions.push(ActionDescriptor::new(
            ActionType::Navigate,
            "Get directions",
            json!({ "lat": coords.lat, "lng": coords.lng, "address": place.location.address }),
        ));
    }

    actions
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparedPlace {
    pub id: String,
    pub name: String,
    pub vertical: Vertical,
    pub rating: Option<f64>,
    pub review_count: u32,
    pub location: PlaceLocation,
    pub contact: PlaceContact,
    pub attributes: PlaceAttributes,
}

impl From<&UnifiedPlace> for ComparedPlace {
    fn from(p: &UnifiedPlace) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            vertical: p.vertical,
            rating: p.rating,
            review_count: p.review_count,
            location: p.location.clone(),
            contact: p.contact.clone(),
            attributes: p.attributes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "camelCase")]
pub enum Difference {
    Rating { description: String, highest: String },
    WalkIn { description: String, places: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub places: Vec<ComparedPlace>,
    pub differences: Vec<Difference>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonOutcome {
    pub comparison: Option<Comparison>,
    /// The places that resolved, in request order.
    #[serde(skip)]
    pub valid: Vec<UnifiedPlace>,
    pub suggestions: Vec<String>,
}

/// Compare whatever resolved; unresolved ids are dropped silently.
pub fn compare(places: Vec<Option<UnifiedPlace>>) -> ComparisonOutcome {
    let valid: Vec<UnifiedPlace> = places.into_iter().flatten().collect();
    if valid.len() < MIN_COMPARE {
        return ComparisonOutcome {
            comparison: None,
            valid,
            suggestions: vec!["Need at least 2 valid places to compare".to_string()],
        };
    }

    let comparison = Comparison {
        places: valid.iter().map(ComparedPlace::from).collect(),
        differences: differences(&valid),
        recommendations: recommendations(&valid),
    };
    ComparisonOutcome {
        comparison: Some(comparison),
        valid,
        suggestions: Vec::new(),
    }
}

/// Resolve `ids` across all verticals, then [`compare`].
pub async fn compare_ids<S: Store + ?Sized>(store: &S, ids: &[String]) -> Result<ComparisonOutcome> {
    let lookups = join_all(ids.iter().map(|id| get_record(store, id, None))).await;
    let mut places = Vec::with_capacity(lookups.len());
    for (id, lookup) in ids.iter().zip(lookups) {
        match lookup {
            Ok(place) => places.push(place),
            Err(e) => {
                tracing::warn!(place_id = %id, error = %e, "compare lookup failed");
                places.push(None);
            }
        }
    }
    Ok(compare(places))
}

fn differences(places: &[UnifiedPlace]) -> Vec<Difference> {
    let mut out = Vec::new();

    let rated: Vec<(&UnifiedPlace, f64)> = places
        .iter()
        .filter_map(|p| p.rating.map(|r| (p, r)))
        .collect();
    if rated.len() > 1 {
        let max = rated.iter().map(|(_, r)| *r).fold(f64::MIN, f64::max);
        let min = rated.iter().map(|(_, r)| *r).fold(f64::MAX, f64::min);
        if max - min >= RATING_SPREAD - 1e-9 {
            let highest = rated
                .iter()
                .find(|(_, r)| *r == max)
                .map(|(p, _)| p.name.clone())
                .unwrap_or_default();
            out.push(Difference::Rating {
                description: format!("Rating varies from {:.1} to {:.1}", min, max),
                highest,
            });
        }
    }

    if places[0].vertical == Vertical::Clinic {
        let walk_ins: Vec<String> = places
            .iter()
            .filter(|p| p.attributes.as_clinic().is_some_and(|c| c.is_walk_in))
            .map(|p| p.name.clone())
            .collect();
        if !walk_ins.is_empty() && walk_ins.len() < places.len() {
            out.push(Difference::WalkIn {
                description: format!("{} of {} accept walk-ins", walk_ins.len(), places.len()),
                places: walk_ins,
            });
        }
    }

    out
}

fn recommendations(places: &[UnifiedPlace]) -> Vec<String> {
    let mut out = Vec::new();

    // first place wins ties in both rankings
    let best_rated = places
        .iter()
        .filter(|p| p.rating.is_some_and(|r| r > 0.0))
        .fold(None::<&UnifiedPlace>, |best, p| match best {
            Some(b) if b.rating >= p.rating => Some(b),
            _ => Some(p),
        });
    if let Some(best) = best_rated {
        if let Some(rating) = best.rating {
            out.push(format!("Best rated: {} ({}★)", best.name, rating));
        }
    }

    let most_reviewed = places.iter().fold(None::<&UnifiedPlace>, |best, p| match best {
        Some(b) if b.review_count >= p.review_count => Some(b),
        _ => Some(p),
    });
    if let Some(top) = most_reviewed.filter(|p| p.review_count > 0) {
        out.push(format!(
            "Most reviewed: {} ({} reviews)",
            top.name, top.review_count
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, PlaceRecord};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn make_place(id: &str, vertical: Vertical, rating: Option<f64>, reviews: u32, tags: &[&str]) -> UnifiedPlace {
        let now = Utc::now();
        let record = PlaceRecord {
            id: id.to_string(),
            name: format!("Place {}", id),
            slug: id.to_string(),
            vertical,
            province: "AB".to_string(),
            city: "edmonton".to_string(),
            neighborhood: None,
            address: Some("1 Main St".to_string()),
            coordinates: None,
            phone: None,
            website: None,
            booking_url: None,
            email: None,
            description: None,
            images: Vec::new(),
            rating,
            review_count: reviews,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            sources: Vec::new(),
            site_refs: BTreeMap::new(),
            raw_data: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        UnifiedPlace::from_record(&record)
    }

    fn types(actions: &[ActionDescriptor]) -> Vec<ActionType> {
        actions.iter().map(|a| a.action_type).collect()
    }

    #[test]
    fn test_actions_without_contact_info() {
        let place = make_place("a", Vertical::Playground, None, 0, &[]);
        let actions = generate_actions(&place);
        assert_eq!(types(&actions), vec![ActionType::GetDetail, ActionType::CreateLead]);
        assert_eq!(actions[1].label, "Inquire availability");
        assert!(actions.iter().all(|a| a.available));
    }

    #[test]
    fn test_actions_with_everything() {
        let mut place = make_place("a", Vertical::Clinic, None, 0, &[]);
        place.contact.phone = Some("780-555-0100".to_string());
        place.contact.website = Some("https://example.ca".to_string());
        place.location.coordinates = Some(Coordinates { lat: 53.5, lng: -113.5 });

        let actions = generate_actions(&place);
        assert_eq!(
            types(&actions),
            vec![
                ActionType::GetDetail,
                ActionType::Call,
                ActionType::Visit,
                ActionType::CreateLead,
                ActionType::Navigate,
            ]
        );
        assert_eq!(actions[1].label, "Call 780-555-0100");
        assert_eq!(actions[3].label, "Request appointment");
        assert_eq!(actions[3].params["type"], "book");
        assert_eq!(actions[4].params["address"], "1 Main St");
    }

    #[test]
    fn test_compare_needs_two_valid() {
        let outcome = compare(vec![Some(make_place("a", Vertical::Clinic, None, 0, &[])), None]);
        assert!(outcome.comparison.is_none());
        assert_eq!(outcome.suggestions, vec!["Need at least 2 valid places to compare"]);
    }

    #[test]
    fn test_rating_difference_threshold() {
        let outcome = compare(vec![
            Some(make_place("a", Vertical::Food, Some(4.0), 0, &[])),
            Some(make_place("b", Vertical::Food, Some(4.4), 0, &[])),
        ]);
        assert!(outcome.comparison.unwrap().differences.is_empty());

        let outcome = compare(vec![
            Some(make_place("a", Vertical::Food, Some(3.5), 0, &[])),
            Some(make_place("b", Vertical::Food, Some(4.0), 0, &[])),
            Some(make_place("c", Vertical::Food, None, 0, &[])),
        ]);
        let diffs = outcome.comparison.unwrap().differences;
        assert_eq!(
            diffs,
            vec![Difference::Rating {
                description: "Rating varies from 3.5 to 4.0".to_string(),
                highest: "Place b".to_string(),
            }]
        );
    }

    #[test]
    fn test_walk_in_partition() {
        let outcome = compare(vec![
            Some(make_place("a", Vertical::Clinic, None, 0, &["walk-in"])),
            Some(make_place("b", Vertical::Clinic, None, 0, &[])),
            Some(make_place("c", Vertical::Clinic, None, 0, &["walk-in"])),
        ]);
        let diffs = outcome.comparison.unwrap().differences;
        assert_eq!(
            diffs,
            vec![Difference::WalkIn {
                description: "2 of 3 accept walk-ins".to_string(),
                places: vec!["Place a".to_string(), "Place c".to_string()],
            }]
        );
    }

    #[test]
    fn test_recommendations_prefer_first_on_ties() {
        let outcome = compare(vec![
            Some(make_place("a", Vertical::Food, Some(4.5), 10, &[])),
            Some(make_place("b", Vertical::Food, Some(4.5), 10, &[])),
        ]);
        assert_eq!(
            outcome.comparison.unwrap().recommendations,
            vec!["Best rated: Place a (4.5★)", "Most reviewed: Place a (10 reviews)"]
        );
    }

    #[test]
    fn test_no_review_recommendation_without_reviews() {
        let outcome = compare(vec![
            Some(make_place("a", Vertical::Food, Some(4.0), 0, &[])),
            Some(make_place("b", Vertical::Food, None, 0, &[])),
        ]);
        assert_eq!(
            outcome.comparison.unwrap().recommendations,
            vec!["Best rated: Place a (4★)"]
        );
    }

    #[tokio::test]
    async fn test_compare_ids_skips_unknown() {
        let store = crate::store::memory::InMemoryStore::new();
        let outcome = compare_ids(&store, &["only-one-id".to_string()]).await.unwrap();
        assert!(outcome.comparison.is_none());
        assert!(outcome.valid.is_empty());
    }
}
