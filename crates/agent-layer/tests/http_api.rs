use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use agent_layer::config::Config;
use agent_layer::notify::Notifier;
use agent_layer::server::{build_router, AppState};
use agent_layer::sqlite_store::SqliteStore;
use agent_layer::traits::ConnectorRegistry;
use agent_layer::{db, migrate};
use agent_layer_core::lead::LeadRecord;
use agent_layer_core::store::Store;

struct TestApp {
    _tmp: TempDir,
    router: Router,
    _leads_rx: tokio::sync::mpsc::UnboundedReceiver<LeadRecord>,
}

async fn setup() -> TestApp {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path().join("data/agent-layer.sqlite"));
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();

    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));
    let connectors = ConnectorRegistry::from_config(&config);
    let (notifier, rx) = Notifier::channel();
    let state = AppState::new(Arc::new(config), store, connectors, notifier);

    TestApp {
        _tmp: tmp,
        router: build_router(state),
        _leads_rx: rx,
    }
}

async fn send(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::empty(),
    };
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let resp = app.router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn synced() -> TestApp {
    let app = setup().await;
    let (status, body) = send(&app, Method::POST, "/v1/sync", None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    app
}

#[tokio::test]
async fn test_health() {
    let app = setup().await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_sync_twice_updates_instead_of_creating() {
    let app = setup().await;
    let (_, first) = send(&app, Method::POST, "/v1/sync", Some(json!({}))).await;
    let results = first["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    let clinics = results
        .iter()
        .find(|r| r["siteId"] == "albertaclinics")
        .unwrap();
    assert_eq!(clinics["created"], 6);
    assert_eq!(clinics["updated"], 0);

    let (_, second) = send(
        &app,
        Method::POST,
        "/v1/sync",
        Some(json!({ "sites": ["albertaclinics"] })),
    )
    .await;
    let results = second["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["created"], 0);
    assert_eq!(results[0]["updated"], 6);
    assert!(results[0]["errors"].as_array().unwrap().is_empty());

    let (_, metrics) = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(metrics["places"]["total"], 14);
    assert_eq!(metrics["places"]["byVertical"]["clinic"], 6);
}

#[tokio::test]
async fn test_sync_unknown_site_is_bad_request() {
    let app = setup().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/sync",
        Some(json!({ "sites": ["nowhere"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_search_routes_free_text() {
    let app = synced().await;
    let (status, body) = send(
        &app,
        Method::GET,
        "/v1/search?q=walk-in%20clinics%20in%20edmonton",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"]["places"][0]["name"], "Whyte Avenue Medical Clinic");
    assert_eq!(body["data"]["intent"]["vertical"], "clinic");
}

#[tokio::test]
async fn test_search_pages_follow_cursor() {
    let app = synced().await;
    let mut seen = Vec::new();
    let mut uri = "/v1/search?vertical=clinic&limit=4".to_string();
    loop {
        let (status, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["total"], 6);
        for place in body["data"]["places"].as_array().unwrap() {
            seen.push(place["id"].as_str().unwrap().to_string());
        }
        match body["data"]["nextCursor"].as_str() {
            Some(cursor) => uri = format!("/v1/search?vertical=clinic&limit=4&cursor={}", cursor),
            None => break,
        }
    }
    assert_eq!(seen.len(), 6);
    let mut dedup = seen.clone();
    dedup.sort();
    dedup.dedup();
    assert_eq!(dedup.len(), 6);
}

#[tokio::test]
async fn test_search_rejects_bad_vertical() {
    let app = synced().await;
    let (status, body) = send(&app, Method::GET, "/v1/search?vertical=bakery", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_place_detail_and_compare() {
    let app = synced().await;
    let (_, page) = send(&app, Method::GET, "/v1/search?vertical=industrial", None).await;
    let ids: Vec<String> = page["data"]["places"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids.len(), 3);

    let (status, detail) = send(&app, Method::GET, &format!("/v1/places/{}", ids[0]), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["data"]["name"], "Alberta Controls Ltd");
    assert_eq!(detail["actions"][0]["type"], "get_detail");

    let (status, _) = send(&app, Method::GET, "/v1/places/place_missing_000000000000", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/compare",
        Some(json!({ "placeIds": [ids[0]] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("2 to 5"));

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/compare",
        Some(json!({ "placeIds": ids })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 3);
    assert_eq!(body["actions"][0]["label"], "Request quotes from all");
}

#[tokio::test]
async fn test_lead_lifecycle() {
    let app = setup().await;
    let (status, receipt) = send(
        &app,
        Method::POST,
        "/v1/leads",
        Some(json!({
            "type": "contact",
            "vertical": "clinic",
            "placeIds": ["place_edmonton_abc"],
            "contact": { "name": "Jo", "email": "jo@example.ca" },
            "city": "Edmonton"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", receipt);
    assert_eq!(receipt["status"], "accepted");
    assert_eq!(receipt["priority"], "high");
    let id = receipt["id"].as_str().unwrap().to_string();

    let (status, lead) = send(&app, Method::GET, &format!("/v1/leads/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lead["status"], "new");
    assert_eq!(lead["province"], "AB");

    let (status, lead) = send(
        &app,
        Method::PATCH,
        &format!("/v1/leads/{}", id),
        Some(json!({ "status": "qualified", "assignedTo": "sam" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lead["assignedTo"], "sam");

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/v1/leads/{}", id),
        Some(json!({ "status": "contacted" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    let (status, _) = send(&app, Method::GET, "/v1/leads/lead_000000000000", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, list) = send(&app, Method::GET, "/v1/admin/leads?status=qualified", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["count"], 1);

    let (status, _) = send(&app, Method::GET, "/v1/admin/leads?status=lost", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_lead_validation() {
    let app = setup().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/leads",
        Some(json!({ "type": "match", "vertical": "clinic", "contact": { "email": "nope" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_tool_api() {
    let app = synced().await;
    let (_, list) = send(&app, Method::GET, "/tools/list", None).await;
    let tools = list["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 6);
    assert!(tools.iter().all(|t| t["builtin"] == true));

    let (status, body) = send(
        &app,
        Method::POST,
        "/tools/agentlayer_search",
        Some(json!({ "query": "trampoline", "limit": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["result"]["meta"]["total"].as_u64().unwrap() >= 1);

    let (status, body) = send(&app, Method::POST, "/tools/agentlayer_nope", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = send(
        &app,
        Method::POST,
        "/tools/agentlayer_create_lead",
        Some(json!({ "type": "match", "vertical": "clinic" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("agentlayer_create_lead: "));
}

/// POST a JSON-RPC message to `/mcp`. The streamable transport may answer
/// with plain JSON or a one-event SSE stream; both are unwrapped here.
async fn rpc(app: &TestApp, message: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header("host", "localhost")
        .header("content-type", "application/json")
        .header("accept", "application/json, text/event-stream")
        .body(Body::from(message.to_string()))
        .unwrap();

    let resp = app.router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&bytes).to_string();

    if let Ok(value) = serde_json::from_str::<Value>(&text) {
        return (status, value);
    }
    let value = text
        .lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .filter_map(|d| serde_json::from_str::<Value>(d.trim()).ok())
        .find(|v| v.get("jsonrpc").is_some())
        .unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_mcp_endpoint() {
    let app = synced().await;

    let (status, init) = rpc(
        &app,
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": { "name": "http-test", "version": "0" }
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(init["result"]["serverInfo"]["name"], "agent-layer");

    let (_, list) = rpc(&app, json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" })).await;
    assert_eq!(list["result"]["tools"].as_array().unwrap().len(), 6);

    let (_, call) = rpc(
        &app,
        json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": { "name": "agentlayer_search", "arguments": { "query": "trampoline" } }
        }),
    )
    .await;
    let text = call["result"]["content"][0]["text"].as_str().unwrap();
    let inner: Value = serde_json::from_str(text).unwrap();
    assert!(inner["meta"]["total"].as_u64().unwrap() >= 1);

    let (_, failed) = rpc(
        &app,
        json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": { "name": "agentlayer_nope", "arguments": {} }
        }),
    )
    .await;
    assert_eq!(failed["error"]["code"], -32603);

    let (_, health) = send(&app, Method::GET, "/mcp/health", None).await;
    assert_eq!(health["tools"], 6);
}

#[tokio::test]
async fn test_admin_connectors() {
    let app = setup().await;
    let (_, body) = send(&app, Method::GET, "/v1/admin/connectors", None).await;
    let connectors = body["connectors"].as_array().unwrap();
    assert_eq!(connectors.len(), 3);
    assert_eq!(connectors[0]["siteId"], "edmontonplayground");
    assert_eq!(connectors[0]["kind"], "builtin");
}
