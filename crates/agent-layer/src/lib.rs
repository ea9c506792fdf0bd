//! # Agent Layer
//!
//! **A place directory and lead-capture service for AI agents.**
//!
//! Agent Layer pulls listings for several verticals (clinics, playgrounds,
//! wellness, travel, food, industrial) from per-site connectors into one
//! SQLite store, and exposes them to agents through a tool catalog, a
//! JSON-RPC 2.0 endpoint, a REST API, and a CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Connectors  │──▶│    Sync     │──▶│  SQLite   │
//! │ sample/json │   │ orchestrator│   │  places   │
//! └─────────────┘   └─────────────┘   │  leads    │
//!                                     └────┬─────┘
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────────┐
//!                 │   CLI    │       │     HTTP     │
//!                 │          │       │ tools/mcp/v1 │
//!                 └──────────┘       └──────────────┘
//! ```
//!
//! Domain rules (intent routing, search, comparison, lead priority) live in
//! the `agent-layer-core` crate; this crate supplies storage, connectors,
//! notification delivery, and the outer surfaces.
//!
//! ## Quick Start
//!
//! ```bash
//! agent-layer init                                  # create database
//! agent-layer sync all                              # load every connector
//! agent-layer search "walk-in clinics in edmonton"
//! agent-layer serve                                 # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | `Store` implementation over SQLite |
//! | [`traits`] | `Connector` and `Tool` traits, registries |
//! | [`connector_sample`] | Built-in sample site connectors |
//! | [`connector_json`] | JSON file connector |
//! | [`sync`] | Sync orchestrator |
//! | [`leads`] | Lead capture service |
//! | [`notify`] | Out-of-band lead notifications |
//! | [`tools`] | Built-in `agentlayer_*` tools |
//! | [`mcp`] | MCP bridge over rmcp |
//! | [`server`] | HTTP server |
//! | [`sources`] | `sources` command |
//! | [`search`] | `search`, `compare`, `discover` commands |
//! | [`get`] | `get` command |

pub mod config;
pub mod connector_json;
pub mod connector_sample;
pub mod db;
pub mod get;
pub mod leads;
pub mod mcp;
pub mod migrate;
pub mod notify;
pub mod search;
pub mod server;
pub mod sources;
pub mod sqlite_store;
pub mod sync;
pub mod tools;
pub mod traits;
