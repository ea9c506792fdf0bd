//! Extension traits for connectors and agent tools.
//!
//! Connectors feed places into the store; tools expose the directory to AI
//! agents. Both are trait objects held in explicit registries built at
//! startup and passed down to the sync orchestrator and the server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │           ConnectorRegistry              │
//! │  ┌──────────────────┐ ┌───────────────┐  │
//! │  │ Built-in samples │ │  JSON files   │  │
//! │  │ playground/clinic│ │ [connectors.  │  │
//! │  │ /industrial      │ │  json.<name>] │  │
//! │  └──────────────────┘ └───────────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     SyncOrchestrator → Store::upsert_by_site_ref
//! ```
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  agentlayer_search   agentlayer_get_place│
//! │  agentlayer_compare  agentlayer_discover │
//! │  agentlayer_create_lead / get_lead       │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     POST /tools/{name}  ·  POST /mcp tools/call
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use agent_layer_core::raw::{default_transform, RawPlace};
use agent_layer_core::store::Store;
use agent_layer_core::{NewPlace, Vertical};

use crate::config::Config;
use crate::leads::LeadService;

// ═══════════════════════════════════════════════════════════════════════
// Connector Trait
// ═══════════════════════════════════════════════════════════════════════

/// A source of raw place records for one vertical.
///
/// # Lifecycle
///
/// 1. The connector is registered via [`ConnectorRegistry::register`].
/// 2. [`fetch_all`](Connector::fetch_all) is called once per sync run.
/// 3. Every returned record goes through [`transform`](Connector::transform)
///    and is upserted under `(site_id, raw.id)`.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable identifier of the external site, recorded in place site refs.
    fn site_id(&self) -> &str;

    fn vertical(&self) -> Vertical;

    /// One-line description for `agent-layer sources`.
    fn description(&self) -> &str;

    /// Connector family shown in listings (`"builtin"`, `"json"`, ...).
    fn kind(&self) -> &str {
        "custom"
    }

    /// Fetch every raw record the source currently publishes.
    ///
    /// An error here aborts this connector's run only.
    async fn fetch_all(&self) -> Result<Vec<RawPlace>>;

    /// Map one raw record onto canonical place fields.
    fn transform(&self, raw: &RawPlace) -> Result<NewPlace> {
        Ok(default_transform(raw, self.vertical(), Utc::now())?)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// An operation agents can discover and call.
///
/// Registered tools are listed by `GET /tools/list` and the JSON-RPC
/// `tools/list` method, and invoked through `POST /tools/{name}` or
/// `tools/call`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Route and catalog name, e.g. `"agentlayer_search"`.
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Whether the tool ships with the service. Defaults to `false`.
    fn is_builtin(&self) -> bool {
        false
    }

    /// Whether the tool leaves stored state untouched. Defaults to `true`.
    fn is_read_only(&self) -> bool {
        true
    }

    /// JSON Schema for the parameters object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` is always a JSON object.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

// ═══════════════════════════════════════════════════════════════════════
// ToolContext
// ═══════════════════════════════════════════════════════════════════════

/// Everything a tool may touch while executing.
///
/// Built once by the server and shared by every invocation.
#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<dyn Store>,
    pub config: Arc<Config>,
    pub leads: LeadService,
}

impl ToolContext {
    pub fn new(store: Arc<dyn Store>, config: Arc<Config>, leads: LeadService) -> Self {
        Self {
            store,
            config,
            leads,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registries
// ═══════════════════════════════════════════════════════════════════════

/// Registry of connectors, in registration order.
pub struct ConnectorRegistry {
    connectors: Vec<Box<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: Vec::new(),
        }
    }

    /// Built-in sample connectors (unless disabled) followed by every
    /// `[connectors.json.<name>]` entry.
    pub fn from_config(config: &Config) -> Self {
        use crate::connector_json::JsonFileConnector;
        use crate::connector_sample::SampleConnector;

        let mut registry = Self::new();

        if config.connectors.builtin {
            for connector in SampleConnector::builtins(config) {
                registry.register(Box::new(connector));
            }
        }
        for (name, cfg) in &config.connectors.json {
            registry.register(Box::new(JsonFileConnector::new(name.clone(), cfg.clone())));
        }

        registry
    }

    pub fn register(&mut self, connector: Box<dyn Connector>) {
        self.connectors.push(connector);
    }

    pub fn connectors(&self) -> &[Box<dyn Connector>] {
        &self.connectors
    }

    /// Find a connector by site id.
    pub fn find(&self, site_id: &str) -> Option<&dyn Connector> {
        self.connectors
            .iter()
            .find(|c| c.site_id() == site_id)
            .map(|c| c.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of agent tools.
///
/// [`ToolRegistry::with_builtins`] loads the six `agentlayer_*` tools.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn with_builtins() -> Self {
        use crate::tools::{
            CompareTool, CreateLeadTool, DiscoverTool, GetLeadTool, GetPlaceTool, SearchTool,
        };

        let mut registry = Self::new();
        registry.register(Box::new(SearchTool));
        registry.register(Box::new(GetPlaceTool));
        registry.register(Box::new(CompareTool));
        registry.register(Box::new(CreateLeadTool));
        registry.register(Box::new(GetLeadTool));
        registry.register(Box::new(DiscoverTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
