//! Unified place projection.
//!
//! Every read goes through [`UnifiedPlace::from_record`], which lifts a
//! stored [`PlaceRecord`] into one shape shared by search, comparison, and
//! action generation. Vertical-specific data lives in [`PlaceAttributes`],
//! a tagged union whose variant always matches the record's vertical.
//!
//! The projection is total: missing or oddly-typed raw fields fall back to
//! empty defaults instead of failing.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Coordinates, PlaceRecord, SourceRef, Vertical};

static AGE_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(?:\s*-\s*(\d+))?").expect("age range pattern"));

const COUNTRY: &str = "CA";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceLocation {
    pub address: Option<String>,
    pub city: String,
    pub province: String,
    pub neighborhood: Option<String>,
    pub country: String,
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceContact {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub booking_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Physician {
    pub name: String,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub accepting_new_patients: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicAttributes {
    pub is_walk_in: bool,
    pub accepting_new_patients: bool,
    pub services: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialties: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physicians: Option<Vec<Physician>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl Default for AgeRange {
    fn default() -> Self {
        Self {
            min: 0,
            max: Some(12),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaygroundAttributes {
    pub age_range: AgeRange,
    pub features: Vec<String>,
    pub party_packages: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission_fee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellnessAttributes {
    pub services: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepts_insurance: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_billing: Option<bool>,
}

/// Attributes for verticals without a dedicated schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralAttributes {
    pub features: Vec<String>,
}

/// Vertical-specific attributes, keyed by vertical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PlaceAttributes {
    Clinic(ClinicAttributes),
    Playground(PlaygroundAttributes),
    Wellness(WellnessAttributes),
    Travel(GeneralAttributes),
    Food(GeneralAttributes),
    Industrial(GeneralAttributes),
}

impl PlaceAttributes {
    pub fn as_clinic(&self) -> Option<&ClinicAttributes> {
        match self {
            PlaceAttributes::Clinic(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_playground(&self) -> Option<&PlaygroundAttributes> {
        match self {
            PlaceAttributes::Playground(p) => Some(p),
            _ => None,
        }
    }

    /// Feature list regardless of vertical (services for clinic/wellness).
    pub fn features(&self) -> &[String] {
        match self {
            PlaceAttributes::Clinic(c) => &c.services,
            PlaceAttributes::Playground(p) => &p.features,
            PlaceAttributes::Wellness(w) => &w.services,
            PlaceAttributes::Travel(g) | PlaceAttributes::Food(g) | PlaceAttributes::Industrial(g) => {
                &g.features
            }
        }
    }
}

/// The normalized, read-side view of a place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedPlace {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub vertical: Vertical,
    pub category: String,
    pub location: PlaceLocation,
    pub contact: PlaceContact,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub rating: Option<f64>,
    pub review_count: u32,
    pub tags: Vec<String>,
    pub attributes: PlaceAttributes,
    pub source: Option<SourceRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UnifiedPlace {
    pub fn from_record(record: &PlaceRecord) -> Self {
        let raw = &record.raw_data;
        let category = raw_string(raw, "category")
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| record.vertical.default_category().to_string());

        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            slug: record.slug.clone(),
            vertical: record.vertical,
            category,
            location: PlaceLocation {
                address: record.address.clone(),
                city: record.city.clone(),
                province: record.province.clone(),
                neighborhood: record.neighborhood.clone(),
                country: COUNTRY.to_string(),
                coordinates: record.coordinates,
            },
            contact: PlaceContact {
                phone: record.phone.clone(),
                email: record.email.clone().or_else(|| raw_string(raw, "email")),
                website: record.website.clone(),
                booking_url: record.booking_url.clone(),
            },
            description: record
                .description
                .clone()
                .or_else(|| raw_string(raw, "description")),
            images: record.images.clone(),
            rating: record.rating,
            review_count: record.review_count,
            tags: record.tags.clone(),
            attributes: derive_attributes(record),
            source: record.sources.first().cloned(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

fn derive_attributes(record: &PlaceRecord) -> PlaceAttributes {
    let raw = &record.raw_data;
    let has_tag = |tag: &str| record.tags.iter().any(|t| t.eq_ignore_ascii_case(tag));

    match record.vertical {
        Vertical::Clinic => {
            let description = record
                .description
                .clone()
                .or_else(|| raw_string(raw, "description"))
                .unwrap_or_default()
                .to_lowercase();
            let services = raw_strings(raw, "services").unwrap_or_else(|| raw_strings(raw, "features").unwrap_or_default());
            PlaceAttributes::Clinic(ClinicAttributes {
                is_walk_in: raw_bool(raw, "isWalkIn").unwrap_or_else(|| has_tag("walk-in")),
                accepting_new_patients: raw_bool(raw, "acceptingNewPatients")
                    .unwrap_or_else(|| description.contains("accepting new patients")),
                services,
                specialties: raw_strings(raw, "specialties"),
                physicians: raw
                    .get("physicians")
                    .and_then(|v| serde_json::from_value(v.clone()).ok()),
            })
        }
        Vertical::Playground => {
            let age_range = match raw.get("ageRange") {
                Some(Value::String(s)) => parse_age_range(s),
                Some(v @ Value::Object(_)) => serde_json::from_value(v.clone()).unwrap_or_default(),
                _ => AgeRange::default(),
            };
            PlaceAttributes::Playground(PlaygroundAttributes {
                age_range,
                features: raw_strings(raw, "features").unwrap_or_default(),
                party_packages: raw_bool(raw, "partyPackages")
                    .unwrap_or_else(|| has_tag("birthday-parties")),
                admission_fee: raw_string(raw, "admissionFee"),
                capacity: raw
                    .get("capacity")
                    .and_then(Value::as_u64)
                    .and_then(|c| u32::try_from(c).ok()),
            })
        }
        Vertical::Wellness => PlaceAttributes::Wellness(WellnessAttributes {
            services: raw_strings(raw, "services")
                .unwrap_or_else(|| raw_strings(raw, "features").unwrap_or_default()),
            accepts_insurance: raw_bool(raw, "acceptsInsurance"),
            direct_billing: raw_bool(raw, "directBilling"),
        }),
        Vertical::Travel => PlaceAttributes::Travel(general(raw)),
        Vertical::Food => PlaceAttributes::Food(general(raw)),
        Vertical::Industrial => PlaceAttributes::Industrial(general(raw)),
    }
}

fn general(raw: &Value) -> GeneralAttributes {
    GeneralAttributes {
        features: raw_strings(raw, "features").unwrap_or_default(),
    }
}

/// Parse an age range such as `"0-12 years"` or `"3+"`.
///
/// Text without a number ("All ages") means no lower bound and no cap.
pub fn parse_age_range(text: &str) -> AgeRange {
    let Some(caps) = AGE_RANGE.captures(text) else {
        return AgeRange { min: 0, max: None };
    };
    let min = caps
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    let max = caps.get(2).and_then(|m| m.as_str().parse().ok());
    AgeRange { min, max }
}

fn raw_string(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn raw_bool(raw: &Value, key: &str) -> Option<bool> {
    raw.get(key).and_then(Value::as_bool)
}

fn raw_strings(raw: &Value, key: &str) -> Option<Vec<String>> {
    raw.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}
