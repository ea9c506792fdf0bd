//! Raw connector records and the default raw → place transform.
//!
//! External sources hand back loosely-shaped JSON. [`RawPlace`] models the
//! fields every source shares and keeps anything else in `extra`, so the
//! whole object survives into `raw_data` for vertical attribute derivation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::ids::slugify;
use crate::models::{Coordinates, NewPlace, SourceKind, SourceRef, Vertical};

const DEFAULT_PROVINCE: &str = "AB";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A record as fetched from an external site, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlace {
    pub id: String,
    pub name: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<RawImage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<RawImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_fee: Option<String>,
    /// Source-specific fields not modeled above.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Map a raw record onto canonical place fields for `vertical`.
///
/// Tags are the raw tags (or the category when the source sent none),
/// then the category, then the features, de-duplicated in first-seen order.
pub fn default_transform(
    raw: &RawPlace,
    vertical: Vertical,
    fetched_at: DateTime<Utc>,
) -> Result<NewPlace, AgentError> {
    let name = raw.name.trim().to_string();
    let province = raw
        .province
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PROVINCE)
        .to_uppercase();

    let mut images = Vec::new();
    if let Some(url) = raw.image.as_ref().and_then(|i| i.url.clone()) {
        images.push(url);
    }
    images.extend(raw.images.iter().filter_map(|i| i.url.clone()));

    let mut tags: Vec<String> = Vec::new();
    let base_tags = match &raw.tags {
        Some(t) => t.clone(),
        None => vec![raw.category.clone()],
    };
    for tag in base_tags
        .into_iter()
        .chain(std::iter::once(raw.category.clone()))
        .chain(raw.features.iter().cloned())
    {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    let raw_data = serde_json::to_value(raw)
        .map_err(|e| AgentError::validation(format!("raw record is not serializable: {}", e)))?;

    let place = NewPlace {
        slug: slugify(&name),
        name,
        vertical,
        province,
        city: raw.city.trim().to_lowercase(),
        neighborhood: None,
        address: raw.address.clone(),
        coordinates: Coordinates::from_parts(raw.latitude, raw.longitude),
        phone: raw.phone.clone(),
        website: raw.website.clone(),
        booking_url: None,
        email: raw.email.clone(),
        description: raw.description.clone(),
        images,
        rating: raw.rating,
        review_count: raw.rating_count.unwrap_or(0),
        tags,
        sources: vec![SourceRef {
            kind: SourceKind::Partner,
            external_id: Some(raw.id.clone()),
            url: raw.website.clone(),
            fetched_at: Some(fetched_at),
        }],
        raw_data,
    };
    place.validate()?;
    Ok(place)
}
