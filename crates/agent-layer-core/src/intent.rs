//! Keyword intent router.
//!
//! Turns free text like `"walk-in clinics in edmonton"` into a
//! [`StructuredIntent`]: a vertical guess, a location guess, an intent type,
//! and a set of filters. Routing is a pure function of the text and the
//! keyword tables below. It never fails; anything it cannot resolve is left
//! unset and treated as unconstrained downstream.
//!
//! # Vertical scoring
//!
//! Every keyword found as a substring adds `1.0` to its vertical; a keyword
//! that also stands as a whole word adds another `0.5`. The vertical with
//! the strictly highest score wins. A tie at the top, or no hits at all,
//! leaves the vertical unresolved.
//!
//! # Location
//!
//! 1. Known Alberta cities (case-insensitive alternation).
//! 2. Otherwise the phrase after a standalone `in` (`"... in red deer"`).
//!
//! # Intent type
//!
//! Keyword families checked in the fixed order recommend, compare, book,
//! inquire; the first family with a hit wins, default `search`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::Vertical;

const VERTICAL_KEYWORDS: &[(Vertical, &[&str])] = &[
    (
        Vertical::Clinic,
        &[
            "clinic", "doctor", "physician", "medical", "health", "hospital", "urgent care",
            "walk-in", "patient", "medicine", "pediatric", "family doctor", "dentist", "physio",
            "physiotherapy", "chiropractor", "specialist",
        ],
    ),
    (
        Vertical::Playground,
        &[
            "playground", "play", "indoor play", "trampoline", "birthday party", "kids",
            "children", "family fun", "activity centre", "play centre", "soft play", "climbing",
            "slides", "toddler",
        ],
    ),
    (
        Vertical::Wellness,
        &[
            "wellness", "spa", "massage", "facial", "meditation", "yoga", "wellness centre",
            "relaxation", "therapy", "acupuncture", "holistic",
        ],
    ),
    (
        Vertical::Travel,
        &[
            "hotel", "motel", "stay", "accommodation", "travel", "tourism", "visit", "attraction",
            "tour", "vacation", "bnb",
        ],
    ),
    (
        Vertical::Food,
        &[
            "restaurant", "food", "cafe", "dining", "eat", "cuisine", "bakery", "coffee", "bar",
            "pub", "takeout",
        ],
    ),
    (
        Vertical::Industrial,
        &[
            "industrial", "automation", "controls", "manufacturing", "factory", "equipment",
            "machinery", "engineering", "b2b", "supplier",
        ],
    ),
];

const INTENT_KEYWORDS: &[(IntentType, &[&str])] = &[
    (
        IntentType::Recommend,
        &["recommend", "suggest", "best", "top", "good", "great", "favorite"],
    ),
    (
        IntentType::Compare,
        &["compare", "difference", "versus", "vs", "better than"],
    ),
    (
        IntentType::Book,
        &["book", "appointment", "schedule", "reserve", "reservation"],
    ),
    (
        IntentType::Inquire,
        &["contact", "reach", "call", "email", "inquiry", "question"],
    ),
];

const DEFAULT_PROVINCE: &str = "AB";

static GAZETTEER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(calgary|edmonton|red deer|lethbridge|medicine hat|fort mcmurray|sherwood park|st\.?\s*albert|airdrie|okotoks|cochrane|spruce grove)\b",
    )
    .expect("gazetteer pattern")
});

static IN_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\s)in\s+([a-z][a-z .'-]*)").expect("in-phrase pattern")
});

/// Words that end a location phrase captured after "in".
const PHRASE_STOPS: &[&str] = &[
    "area", "region", "nearby", "for", "with", "that", "near", "open", "accepting", "taking",
    "and", "or", "which", "who",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentType {
    Search,
    Recommend,
    Compare,
    Book,
    Inquire,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationGuess {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
}

/// Filters extracted from text or supplied by a caller.
///
/// Generic filters (`is_open`, `min_rating`) apply to every vertical; the
/// rest are only ever set by the router for their own vertical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_open: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_walk_in: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepting_new_patients: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_party_packages: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
}

impl IntentFilters {
    pub fn is_empty(&self) -> bool {
        *self == IntentFilters::default()
    }

    /// Fill every unset field from `other`. Fields already set win.
    pub fn merge_missing(&mut self, other: IntentFilters) {
        self.is_open = self.is_open.or(other.is_open);
        self.min_rating = self.min_rating.or(other.min_rating);
        self.is_walk_in = self.is_walk_in.or(other.is_walk_in);
        self.accepting_new_patients = self.accepting_new_patients.or(other.accepting_new_patients);
        self.category = self.category.take().or(other.category);
        self.has_party_packages = self.has_party_packages.or(other.has_party_packages);
        self.max_age = self.max_age.or(other.max_age);
        self.feature = self.feature.take().or(other.feature);
    }
}

/// Opaque caller context echoed back with the intent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredIntent {
    pub intent: IntentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical: Option<Vertical>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationGuess>,
    pub filters: IntentFilters,
    /// The lower-cased query text.
    pub query: String,
    pub context: IntentContext,
}

impl StructuredIntent {
    /// 0.7 for a resolved vertical, +0.15 for a location, +0.15 for any
    /// filter. Zero when the vertical is unresolved.
    pub fn confidence(&self) -> f64 {
        if self.vertical.is_none() {
            return 0.0;
        }
        let mut confidence = 0.7;
        if self.location.is_some() {
            confidence += 0.15;
        }
        if !self.filters.is_empty() {
            confidence += 0.15;
        }
        f64::min(confidence, 1.0)
    }
}

/// Stateless router over the built-in keyword tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentRouter;

impl IntentRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_query(&self, text: &str, context: Option<IntentContext>) -> StructuredIntent {
        let query = text.to_lowercase();
        let vertical = detect_vertical(&query);

        StructuredIntent {
            intent: detect_intent_type(&query),
            vertical,
            location: detect_location(&query),
            filters: extract_filters(&query, vertical),
            query,
            context: context.unwrap_or_default(),
        }
    }

    /// Canned follow-up queries for partially typed text.
    pub fn suggestions(&self, text: &str) -> Vec<String> {
        let normalized = text.to_lowercase();
        let mut suggestions = Vec::new();

        if normalized.contains("play") {
            suggestions.extend([
                "playgrounds in Edmonton",
                "indoor playgrounds Calgary",
                "birthday party venues",
            ]);
        }
        if normalized.contains("clinic") || normalized.contains("doctor") {
            suggestions.extend([
                "walk-in clinics Edmonton",
                "family doctors accepting new patients Calgary",
                "pediatric clinics near me",
            ]);
        }
        if normalized.contains("spa") || normalized.contains("massage") {
            suggestions.extend([
                "massage therapy Calgary",
                "wellness centres Edmonton",
                "spas with direct billing",
            ]);
        }

        suggestions.into_iter().map(str::to_string).collect()
    }
}

/// Score every vertical; `None` on zero or on a tie for first place.
pub fn detect_vertical(query: &str) -> Option<Vertical> {
    let padded = format!(" {} ", query);
    let mut best: Option<(Vertical, f64)> = None;
    let mut tied = false;

    for (vertical, keywords) in VERTICAL_KEYWORDS {
        let score = keywords.iter().fold(0.0, |acc, kw| {
            if !query.contains(kw) {
                return acc;
            }
            let whole_word = padded.contains(&format!(" {} ", kw));
            acc + if whole_word { 1.5 } else { 1.0 }
        });
        if score <= 0.0 {
            continue;
        }
        match best {
            Some((_, top)) if score < top => {}
            Some((_, top)) if score == top => tied = true,
            _ => {
                best = Some((*vertical, score));
                tied = false;
            }
        }
    }

    if tied {
        None
    } else {
        best.map(|(v, _)| v)
    }
}

pub fn detect_location(query: &str) -> Option<LocationGuess> {
    if let Some(m) = GAZETTEER.find(query) {
        let city = m
            .as_str()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        return Some(LocationGuess {
            city: Some(city),
            province: Some(DEFAULT_PROVINCE.to_string()),
        });
    }

    let caps = IN_PHRASE.captures(query)?;
    let phrase = caps.get(1)?.as_str();
    let words: Vec<&str> = phrase
        .split_whitespace()
        .take_while(|w| !PHRASE_STOPS.contains(w))
        .collect();
    let city = words
        .join(" ")
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    if city.is_empty() {
        return None;
    }
    Some(LocationGuess {
        city: Some(city),
        province: Some(DEFAULT_PROVINCE.to_string()),
    })
}

pub fn detect_intent_type(query: &str) -> IntentType {
    INTENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| query.contains(kw)))
        .map(|(intent, _)| *intent)
        .unwrap_or(IntentType::Search)
}

pub fn extract_filters(query: &str, vertical: Option<Vertical>) -> IntentFilters {
    let has = |needles: &[&str]| needles.iter().any(|n| query.contains(n));
    let mut filters = IntentFilters::default();

    if has(&["open now", "currently open"]) {
        filters.is_open = Some(true);
    }
    if has(&["highly rated", "4+ stars"]) {
        filters.min_rating = Some(4.0);
    }

    match vertical {
        Some(Vertical::Clinic) => {
            if has(&["walk in", "walk-in", "no appointment"]) {
                filters.is_walk_in = Some(true);
            }
            if has(&["accepting new patients", "taking new patients"]) {
                filters.accepting_new_patients = Some(true);
            }
            if has(&["pediatric", "children", "kids doctor"]) {
                filters.category = Some("pediatrics".to_string());
            }
        }
        Some(Vertical::Playground) => {
            if has(&["birthday", "party"]) {
                filters.has_party_packages = Some(true);
            }
            if has(&["toddler", "baby"]) {
                filters.max_age = Some(3);
            }
            if has(&["trampoline"]) {
                filters.feature = Some("trampoline".to_string());
            }
        }
        _ => {}
    }

    filters
}
