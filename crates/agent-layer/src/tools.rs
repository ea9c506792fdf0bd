//! Built-in agent tools.
//!
//! Every tool answers with the same envelope:
//!
//! ```json
//! {
//!   "data": ...,
//!   "meta": { "total": 12, "hasMore": true, "queryId": "search_...", "durationMs": 3 },
//!   "actions": [ { "type": "compare", "label": "...", "params": {...}, "available": true } ],
//!   "suggestions": ["..."]
//! }
//! ```
//!
//! Parameter objects are deserialized into typed structs; anything that
//! fails to parse or violates a bound is an [`AgentError::Validation`].

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

use agent_layer_core::compare::{
    compare_ids, generate_actions, ActionDescriptor, ActionType, MAX_COMPARE, MIN_COMPARE,
};
use agent_layer_core::ids::generate_id;
use agent_layer_core::intent::{IntentFilters, IntentRouter};
use agent_layer_core::lead::{LeadAction, LeadContact, LeadRequest, LeadTiming};
use agent_layer_core::search::{get_record, search, SearchQuery};
use agent_layer_core::{AgentError, Vertical};

use crate::traits::{Tool, ToolContext};

const MAX_QUERY_CHARS: usize = 200;
const MAX_PROVINCE_CHARS: usize = 8;

// ═══════════════════════════════════════════════════════════════════════
// Envelope
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
    pub query_id: String,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub data: Value,
    pub meta: ResponseMeta,
    pub actions: Vec<ActionDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

impl ToolResponse {
    fn new(data: Value, query_id: String, started: Instant) -> Self {
        Self {
            data,
            meta: ResponseMeta {
                total: None,
                has_more: None,
                query_id,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            actions: Vec::new(),
            suggestions: None,
        }
    }

    fn into_value(self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| AgentError::validation(format!("invalid parameters: {}", e)).into())
}

fn check_query(text: &str, field: &str) -> Result<()> {
    if text.chars().count() > MAX_QUERY_CHARS {
        return Err(AgentError::validation(format!(
            "{} must be at most {} characters",
            field, MAX_QUERY_CHARS
        ))
        .into());
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// agentlayer_search
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    #[serde(default, alias = "q")]
    query: Option<String>,
    #[serde(default)]
    vertical: Option<Vertical>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    province: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    min_rating: Option<f64>,
    #[serde(default)]
    filters: IntentFilters,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    cursor: Option<String>,
}

pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "agentlayer_search"
    }

    fn description(&self) -> &str {
        "Search places across all verticals. Free text is routed to a vertical, location, and filters."
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "maxLength": MAX_QUERY_CHARS, "description": "Natural language query, e.g. \"walk-in clinics in Edmonton\"" },
                "vertical": { "type": "string", "enum": ["clinic", "playground", "wellness", "travel", "food", "industrial"] },
                "city": { "type": "string" },
                "province": { "type": "string", "minLength": 1, "maxLength": MAX_PROVINCE_CHARS },
                "tags": { "type": "array", "items": { "type": "string" }, "description": "Every tag must match" },
                "minRating": { "type": "number", "minimum": 0, "maximum": 5 },
                "filters": {
                    "type": "object",
                    "properties": {
                        "isWalkIn": { "type": "boolean" },
                        "acceptingNewPatients": { "type": "boolean" },
                        "hasPartyPackages": { "type": "boolean" },
                        "maxAge": { "type": "integer", "minimum": 0 },
                        "feature": { "type": "string" },
                        "category": { "type": "string" },
                        "minRating": { "type": "number" },
                        "isOpen": { "type": "boolean" }
                    }
                },
                "limit": { "type": "integer", "minimum": 1, "maximum": 50, "default": 10 },
                "cursor": { "type": "string", "description": "nextCursor from a previous page" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let started = Instant::now();
        let p: SearchParams = parse_params(params)?;

        if let Some(q) = &p.query {
            check_query(q, "query")?;
        }
        if let Some(province) = &p.province {
            let len = province.trim().chars().count();
            if len == 0 || len > MAX_PROVINCE_CHARS {
                return Err(AgentError::validation(format!(
                    "province must be 1 to {} characters",
                    MAX_PROVINCE_CHARS
                ))
                .into());
            }
        }

        let query = SearchQuery {
            text: p.query.clone(),
            vertical: p.vertical,
            city: p.city,
            province: p.province,
            tags: p.tags,
            min_rating: p.min_rating,
            filters: p.filters,
            limit: p.limit.map(|l| l.max(1) as usize),
            cursor: p.cursor,
        };
        let page = search(ctx.store.as_ref(), &query, ctx.config.search.limits()).await?;

        let place_ids: Vec<&str> = page.records.iter().map(|r| r.id.as_str()).collect();
        let mut places = Vec::with_capacity(page.records.len());
        for place in &page.records {
            let mut value = serde_json::to_value(place)?;
            value["actions"] = serde_json::to_value(generate_actions(place))?;
            places.push(value);
        }

        let mut actions = Vec::new();
        if page.records.len() >= 2 {
            actions.push(ActionDescriptor::new(
                ActionType::Compare,
                format!("Compare {} places", page.records.len()),
                json!({ "placeIds": place_ids }),
            ));
        }
        actions.push(ActionDescriptor::new(
            ActionType::CreateLead,
            "Get matched with options",
            json!({ "placeIds": place_ids, "vertical": page.vertical, "type": LeadAction::Match }),
        ));

        let data = json!({
            "places": places,
            "nextCursor": page.next_cursor,
            "facets": page.facets,
            "intent": page.intent,
        });
        let mut resp = ToolResponse::new(data, generate_id("search", None), started);
        resp.meta.total = Some(page.total);
        resp.meta.has_more = Some(page.has_more());
        resp.actions = actions;
        resp.suggestions = Some(IntentRouter::new().suggestions(p.query.as_deref().unwrap_or("")));
        resp.into_value()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// agentlayer_get_place
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetPlaceParams {
    #[serde(alias = "id")]
    place_id: String,
    #[serde(default)]
    vertical: Option<Vertical>,
}

pub struct GetPlaceTool;

#[async_trait]
impl Tool for GetPlaceTool {
    fn name(&self) -> &str {
        "agentlayer_get_place"
    }

    fn description(&self) -> &str {
        "Get full details and next actions for one place"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "placeId": { "type": "string" },
                "vertical": { "type": "string", "description": "Skips probing every vertical when given" }
            },
            "required": ["placeId"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let started = Instant::now();
        let p: GetPlaceParams = parse_params(params)?;
        if p.place_id.trim().is_empty() {
            return Err(AgentError::validation("placeId must not be empty").into());
        }

        let query_id = format!("detail_{}", p.place_id);
        let place = get_record(ctx.store.as_ref(), &p.place_id, p.vertical).await?;

        let resp = match place {
            None => {
                let mut resp = ToolResponse::new(Value::Null, query_id, started);
                resp.suggestions = Some(vec!["Try searching with different criteria".to_string()]);
                resp
            }
            Some(place) => {
                let mut resp = ToolResponse::new(serde_json::to_value(&place)?, query_id, started);
                resp.actions = generate_actions(&place);
                resp.suggestions = Some(vec![
                    format!("See more {}s in {}", place.vertical, place.location.city),
                    format!("Compare with similar {}s", place.vertical),
                ]);
                resp
            }
        };
        resp.into_value()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// agentlayer_compare
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompareParams {
    place_ids: Vec<String>,
}

pub struct CompareTool;

#[async_trait]
impl Tool for CompareTool {
    fn name(&self) -> &str {
        "agentlayer_compare"
    }

    fn description(&self) -> &str {
        "Compare 2 to 5 places side by side with differences and recommendations"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "placeIds": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": MIN_COMPARE,
                    "maxItems": MAX_COMPARE
                }
            },
            "required": ["placeIds"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let started = Instant::now();
        let p: CompareParams = parse_params(params)?;
        if !(MIN_COMPARE..=MAX_COMPARE).contains(&p.place_ids.len()) {
            return Err(AgentError::validation(format!(
                "placeIds must contain {} to {} ids",
                MIN_COMPARE, MAX_COMPARE
            ))
            .into());
        }

        let query_id = format!("compare_{}", p.place_ids.join("_"));
        let outcome = compare_ids(ctx.store.as_ref(), &p.place_ids).await?;

        let mut resp = ToolResponse::new(
            json!({ "comparison": outcome.comparison }),
            query_id,
            started,
        );
        if outcome.comparison.is_some() {
            let ids: Vec<&str> = outcome.valid.iter().map(|pl| pl.id.as_str()).collect();
            resp.meta.total = Some(outcome.valid.len());
            resp.actions.push(ActionDescriptor::new(
                ActionType::CreateLead,
                "Request quotes from all",
                json!({ "placeIds": ids, "type": LeadAction::Shortlist }),
            ));
        }
        if !outcome.suggestions.is_empty() {
            resp.suggestions = Some(outcome.suggestions);
        }
        resp.into_value()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// agentlayer_create_lead
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLeadParams {
    #[serde(rename = "type")]
    action: LeadAction,
    vertical: Vertical,
    #[serde(default)]
    place_ids: Vec<String>,
    email: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    province: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    requirements: Option<String>,
    #[serde(default)]
    timing: Option<LeadTiming>,
}

pub struct CreateLeadTool;

#[async_trait]
impl Tool for CreateLeadTool {
    fn name(&self) -> &str {
        "agentlayer_create_lead"
    }

    fn description(&self) -> &str {
        "Capture a request to be matched, shortlisted, contacted, or booked"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": { "type": "string", "enum": ["match", "shortlist", "contact", "book"] },
                "vertical": { "type": "string", "enum": ["clinic", "playground", "wellness", "travel", "food", "industrial"] },
                "placeIds": { "type": "array", "items": { "type": "string" } },
                "email": { "type": "string", "format": "email" },
                "phone": { "type": "string" },
                "name": { "type": "string" },
                "province": { "type": "string" },
                "city": { "type": "string" },
                "message": { "type": "string" },
                "requirements": { "type": "string" },
                "timing": { "type": "string", "enum": ["asap", "this_week", "this_month", "flexible"] }
            },
            "required": ["type", "vertical", "email"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let started = Instant::now();
        let p: CreateLeadParams = parse_params(params)?;

        let request = LeadRequest {
            action: p.action,
            vertical: p.vertical,
            place_ids: p.place_ids,
            contact: LeadContact {
                name: p.name,
                email: p.email,
                phone: p.phone,
            },
            province: p
                .province
                .unwrap_or_else(|| ctx.config.search.default_province.clone()),
            city: p.city,
            message: p.message,
            requirements: p.requirements,
            timing: p.timing,
        };
        let receipt = ctx.leads.create(&request).await?;

        let data = json!({
            "leadId": receipt.id,
            "status": receipt.status,
            "priority": receipt.priority,
            "createdAt": receipt.created_at,
            "estimatedResponse": receipt.estimated_response,
        });
        let mut resp = ToolResponse::new(data, generate_id("lead_query", None), started);
        resp.actions.push(ActionDescriptor::new(
            ActionType::GetDetail,
            "Check lead status",
            json!({ "leadId": receipt.id }),
        ));
        resp.suggestions = Some(receipt.next_steps);
        resp.into_value()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// agentlayer_get_lead
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetLeadParams {
    #[serde(alias = "id")]
    lead_id: String,
}

pub struct GetLeadTool;

#[async_trait]
impl Tool for GetLeadTool {
    fn name(&self) -> &str {
        "agentlayer_get_lead"
    }

    fn description(&self) -> &str {
        "Check the status of a previously created lead"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "leadId": { "type": "string" }
            },
            "required": ["leadId"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let started = Instant::now();
        let p: GetLeadParams = parse_params(params)?;
        let lead = ctx.leads.get(&p.lead_id).await?;
        let data = match lead {
            Some(lead) => serde_json::to_value(&lead)?,
            None => Value::Null,
        };
        ToolResponse::new(data, p.lead_id, started).into_value()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// agentlayer_discover
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct DiscoverParams {
    #[serde(alias = "q")]
    query: String,
}

pub struct DiscoverTool;

#[async_trait]
impl Tool for DiscoverTool {
    fn name(&self) -> &str {
        "agentlayer_discover"
    }

    fn description(&self) -> &str {
        "Classify a free-text request into a vertical, location, and filters with a confidence score"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "maxLength": MAX_QUERY_CHARS }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value> {
        let started = Instant::now();
        let p: DiscoverParams = parse_params(params)?;
        if p.query.trim().is_empty() {
            return Err(AgentError::validation("query must not be empty").into());
        }
        check_query(&p.query, "query")?;

        let router = IntentRouter::new();
        let intent = router.parse_query(&p.query, None);
        let data = json!({
            "vertical": intent.vertical,
            "confidence": intent.confidence(),
            "intent": intent,
        });

        let mut resp = ToolResponse::new(data, generate_id("discover", None), started);
        if let Some(vertical) = intent.vertical {
            resp.actions.push(ActionDescriptor::new(
                ActionType::GetDetail,
                format!("Search {}s", vertical),
                json!({ "vertical": vertical, "query": p.query }),
            ));
        }
        resp.suggestions = Some(router.suggestions(&p.query));
        resp.into_value()
    }
}
