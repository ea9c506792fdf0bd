//! HTTP server.
//!
//! One axum router carries three surfaces over the same state:
//!
//! - the generic tool API (`/tools/list`, `POST /tools/{name}`);
//! - the MCP bridge (`POST /mcp` via rmcp, `GET /mcp/health`);
//! - a REST API under `/v1` for search, places, leads, and admin tasks.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/metrics` | Place and lead counts, cached for `metrics_ttl_secs` |
//! | `GET`  | `/tools/list` | Tool catalog with parameter schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `POST` | `/mcp` | MCP Streamable HTTP (JSON-RPC 2.0) |
//! | `GET`  | `/mcp/health` | Bridge status |
//! | `GET`  | `/v1/search` | Search (`q, vertical, city, province, tags, minRating, limit, cursor`) |
//! | `GET`  | `/v1/places/{id}` | One place (`?vertical=`) |
//! | `POST` | `/v1/compare` | Compare `{placeIds}` |
//! | `POST` | `/v1/discover` | Classify `{query}` |
//! | `POST` | `/v1/leads` | Create a lead |
//! | `GET`  | `/v1/leads/{id}` | Fetch a lead |
//! | `PATCH`| `/v1/leads/{id}` | Advance a lead's status |
//! | `GET`  | `/v1/admin/leads` | List leads, newest first |
//! | `GET`  | `/v1/admin/connectors` | Registered connectors |
//! | `POST` | `/v1/sync` | Run connectors `{sites?}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "placeIds must contain 2 to 5 ids" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `tool_error` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use agent_layer_core::lead::{LeadFilter, LeadPriority, LeadRequest, LeadStatus};
use agent_layer_core::store::Store;
use agent_layer_core::{AgentError, Vertical};

use crate::config::Config;
use crate::db;
use crate::leads::LeadService;
use crate::mcp::McpBridge;
use crate::notify::Notifier;
use crate::sqlite_store::SqliteStore;
use crate::sync::SyncOrchestrator;
use crate::tools::{CompareTool, DiscoverTool, GetPlaceTool, SearchTool};
use crate::traits::{ConnectorRegistry, Tool, ToolContext, ToolRegistry};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
    connectors: Arc<ConnectorRegistry>,
    orchestrator: SyncOrchestrator,
    mcp: McpBridge,
    metrics: Arc<MetricsCache>,
}

impl AppState {
    /// Wire every service around one store. `notifier` decides where lead
    /// notifications go; tests pass [`Notifier::channel`].
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn Store>,
        connectors: ConnectorRegistry,
        notifier: Notifier,
    ) -> Self {
        let ttl = Duration::from_secs(config.server.metrics_ttl_secs);
        let leads = LeadService::new(store.clone(), notifier);
        let ctx = ToolContext::new(store.clone(), config, leads);
        let tools = Arc::new(ToolRegistry::with_builtins());
        let connectors = Arc::new(connectors);
        Self {
            orchestrator: SyncOrchestrator::new(store, connectors.clone()),
            mcp: McpBridge::new(tools.clone(), ctx.clone()),
            metrics: Arc::new(MetricsCache::new(ttl)),
            ctx,
            tools,
            connectors,
        }
    }
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    let connectors = ConnectorRegistry::from_config(config);
    let notifier = Notifier::spawn(config.notifications.clone());

    let state = AppState::new(Arc::new(config.clone()), store, connectors, notifier);

    println!("Registered {} tools:", state.tools.len());
    for t in state.tools.tools() {
        println!("  POST /tools/{} ({})", t.name(), t.description());
    }

    let app = build_router(state);

    tracing::info!(bind = %bind_addr, "server starting");
    println!("agent-layer listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route_service("/mcp", state.mcp.clone().into_service())
        .route("/mcp/health", get(handle_mcp_health))
        .route("/v1/search", get(handle_search))
        .route("/v1/places/{id}", get(handle_get_place))
        .route("/v1/compare", post(handle_compare))
        .route("/v1/discover", post(handle_discover))
        .route("/v1/leads", post(handle_create_lead))
        .route("/v1/leads/{id}", get(handle_get_lead).patch(handle_update_lead))
        .route("/v1/admin/leads", get(handle_list_leads))
        .route("/v1/admin/connectors", get(handle_list_connectors))
        .route("/v1/sync", post(handle_sync))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        classify_error(err)
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

/// Map an error to a status by its [`AgentError`] kind, if it has one.
fn classify_error(err: anyhow::Error) -> AppError {
    let message = err.to_string();
    match err.downcast_ref::<AgentError>() {
        Some(AgentError::Validation(_)) => bad_request(message),
        Some(AgentError::NotFound { .. }) => not_found(message),
        Some(AgentError::InvalidTransition { .. }) | Some(AgentError::Conflict(_)) => {
            app_error(StatusCode::CONFLICT, "conflict", message)
        }
        None => {
            tracing::error!(error = %message, "request failed");
            app_error(StatusCode::INTERNAL_SERVER_ERROR, "tool_error", message)
        }
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| bad_request(format!("invalid request body: {}", e)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /metrics ============

/// Aggregates recomputed at most once per TTL window.
struct MetricsCache {
    ttl: Duration,
    cached: Mutex<Option<(Instant, Value)>>,
}

impl MetricsCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: Mutex::new(None),
        }
    }

    async fn get(&self, store: &dyn Store) -> Result<Value> {
        let mut cached = self.cached.lock().await;
        if let Some((at, value)) = cached.as_ref() {
            if at.elapsed() < self.ttl {
                return Ok(value.clone());
            }
        }
        let value = compute_metrics(store).await?;
        *cached = Some((Instant::now(), value.clone()));
        Ok(value)
    }
}

async fn compute_metrics(store: &dyn Store) -> Result<Value> {
    let places = store.place_counts().await?;
    let leads = store.lead_counts().await?;

    let places: BTreeMap<&str, usize> = places.iter().map(|(v, n)| (v.as_str(), *n)).collect();
    let leads: BTreeMap<&str, usize> = leads.iter().map(|(s, n)| (s.as_str(), *n)).collect();

    Ok(json!({
        "places": {
            "total": places.values().sum::<usize>(),
            "byVertical": places,
        },
        "leads": {
            "total": leads.values().sum::<usize>(),
            "byStatus": leads,
        },
        "generatedAt": Utc::now(),
    }))
}

async fn handle_metrics(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let metrics = state.metrics.get(state.ctx.store.as_ref()).await?;
    Ok(Json(metrics))
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    builtin: bool,
    parameters: Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            builtin: t.is_builtin(),
            parameters: t.parameters_schema(),
        })
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let params: Value = if body.is_empty() {
        json!({})
    } else {
        parse_body(&body)?
    };
    if !params.is_object() {
        return Err(bad_request("tool parameters must be a JSON object"));
    }

    let result = tool.execute(params, &state.ctx).await.map_err(|e| {
        let mut err = classify_error(e);
        err.message = format!("{}: {}", name, err.message);
        err
    })?;

    Ok(Json(json!({ "result": result })))
}

// ============ /mcp ============

async fn handle_mcp_health(State(state): State<AppState>) -> Json<Value> {
    Json(state.mcp.health())
}

// ============ /v1 ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    q: Option<String>,
    vertical: Option<String>,
    city: Option<String>,
    province: Option<String>,
    /// Comma-separated.
    tags: Option<String>,
    min_rating: Option<f64>,
    limit: Option<i64>,
    cursor: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(p): Query<SearchParams>,
) -> Result<Json<Value>, AppError> {
    let tags: Vec<String> = p
        .tags
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    let mut params = serde_json::Map::new();
    params.insert("tags".into(), json!(tags));
    let optional = [
        ("query", p.q.map(Value::from)),
        ("vertical", p.vertical.map(Value::from)),
        ("city", p.city.map(Value::from)),
        ("province", p.province.map(Value::from)),
        ("minRating", p.min_rating.map(Value::from)),
        ("limit", p.limit.map(Value::from)),
        ("cursor", p.cursor.map(Value::from)),
    ];
    for (key, value) in optional {
        if let Some(v) = value {
            params.insert(key.to_string(), v);
        }
    }

    let result = SearchTool.execute(Value::Object(params), &state.ctx).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct PlaceParams {
    vertical: Option<String>,
}

async fn handle_get_place(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(p): Query<PlaceParams>,
) -> Result<Json<Value>, AppError> {
    let mut params = json!({ "placeId": id });
    if let Some(v) = p.vertical {
        params["vertical"] = Value::from(v);
    }
    let result = GetPlaceTool.execute(params, &state.ctx).await?;
    if result["data"].is_null() {
        return Err(not_found(format!("place not found: {}", id)));
    }
    Ok(Json(result))
}

async fn handle_compare(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let params: Value = parse_body(&body)?;
    Ok(Json(CompareTool.execute(params, &state.ctx).await?))
}

async fn handle_discover(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let params: Value = parse_body(&body)?;
    Ok(Json(DiscoverTool.execute(params, &state.ctx).await?))
}

async fn handle_create_lead(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let mut raw: Value = parse_body(&body)?;
    if let Value::Object(map) = &mut raw {
        map.entry("province")
            .or_insert_with(|| Value::from(state.ctx.config.search.default_province.clone()));
    }
    let request: LeadRequest = serde_json::from_value(raw)
        .map_err(|e| bad_request(format!("invalid lead request: {}", e)))?;

    let receipt = state.ctx.leads.create(&request).await?;
    let body = serde_json::to_value(receipt).map_err(anyhow::Error::from)?;
    Ok((StatusCode::CREATED, Json(body)))
}

async fn handle_get_lead(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let lead = state
        .ctx
        .leads
        .get(&id)
        .await?
        .ok_or_else(|| not_found(format!("lead not found: {}", id)))?;
    Ok(Json(serde_json::to_value(lead).map_err(anyhow::Error::from)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdate {
    status: LeadStatus,
    #[serde(default)]
    assigned_to: Option<String>,
}

async fn handle_update_lead(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let update: StatusUpdate = parse_body(&body)?;
    let lead = state
        .ctx
        .leads
        .update_status(&id, update.status, update.assigned_to)
        .await?;
    Ok(Json(serde_json::to_value(lead).map_err(anyhow::Error::from)?))
}

#[derive(Debug, Deserialize)]
struct LeadListParams {
    status: Option<String>,
    vertical: Option<String>,
    priority: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn handle_list_leads(
    State(state): State<AppState>,
    Query(p): Query<LeadListParams>,
) -> Result<Json<Value>, AppError> {
    let mut filter = LeadFilter::default();
    filter.status = p
        .status
        .as_deref()
        .map(str::parse::<LeadStatus>)
        .transpose()
        .map_err(anyhow::Error::from)?;
    filter.vertical = p
        .vertical
        .as_deref()
        .map(str::parse::<Vertical>)
        .transpose()
        .map_err(anyhow::Error::from)?;
    filter.priority = p
        .priority
        .as_deref()
        .map(str::parse::<LeadPriority>)
        .transpose()
        .map_err(anyhow::Error::from)?;
    if let Some(limit) = p.limit {
        filter.limit = limit.clamp(1, 200);
    }
    filter.offset = p.offset.unwrap_or(0);

    let leads = state.ctx.leads.list(&filter).await?;
    Ok(Json(json!({
        "leads": leads,
        "count": leads.len(),
        "limit": filter.limit,
        "offset": filter.offset,
    })))
}

async fn handle_list_connectors(State(state): State<AppState>) -> Json<Value> {
    let connectors: Vec<Value> = state
        .connectors
        .connectors()
        .iter()
        .map(|c| {
            json!({
                "siteId": c.site_id(),
                "vertical": c.vertical(),
                "kind": c.kind(),
                "description": c.description(),
            })
        })
        .collect();
    Json(json!({ "connectors": connectors }))
}

#[derive(Debug, Default, Deserialize)]
struct SyncRequest {
    #[serde(default)]
    sites: Vec<String>,
}

async fn handle_sync(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, AppError> {
    let request: SyncRequest = if body.is_empty() {
        SyncRequest::default()
    } else {
        parse_body(&body)?
    };
    let filter = if request.sites.is_empty() {
        None
    } else {
        Some(request.sites.as_slice())
    };

    let results = state.orchestrator.sync_all(filter).await?;
    Ok(Json(json!({ "results": results })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error_by_kind() {
        let cases = [
            (anyhow::Error::from(AgentError::validation("bad")), StatusCode::BAD_REQUEST, "bad_request"),
            (anyhow::Error::from(AgentError::not_found("lead", "x")), StatusCode::NOT_FOUND, "not_found"),
            (anyhow::Error::from(AgentError::Conflict("slug".into())), StatusCode::CONFLICT, "conflict"),
            (anyhow::anyhow!("disk on fire"), StatusCode::INTERNAL_SERVER_ERROR, "tool_error"),
        ];
        for (err, status, code) in cases {
            let app = classify_error(err);
            assert_eq!(app.status, status);
            assert_eq!(app.code, code);
        }
    }

    #[tokio::test]
    async fn test_metrics_cache_holds_value_within_ttl() {
        use agent_layer_core::store::memory::InMemoryStore;

        let store = InMemoryStore::new();
        let cache = MetricsCache::new(Duration::from_secs(60));
        let first = cache.get(&store).await.unwrap();
        let second = cache.get(&store).await.unwrap();
        assert_eq!(first["generatedAt"], second["generatedAt"]);
        assert_eq!(first["places"]["total"], 0);
    }
}
