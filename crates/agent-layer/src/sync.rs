//! Sync orchestration.
//!
//! Drives each registered connector through fetch → transform → upsert and
//! reports a [`SyncResult`] per connector. Connectors run one after another
//! and records are processed one at a time, so each report's error list
//! and duration belong to exactly one source.
//!
//! Failure handling:
//! - `fetch_all` fails → the run for that connector stops with a single
//!   `"Fetch failed: {cause}"` entry; other connectors are unaffected.
//! - a record fails to transform or upsert → `"{externalId}: {cause}"` is
//!   recorded and the loop moves on.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

use agent_layer_core::models::SyncResult;
use agent_layer_core::store::Store;
use agent_layer_core::AgentError;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;
use crate::traits::{Connector, ConnectorRegistry};

#[derive(Clone)]
pub struct SyncOrchestrator {
    store: Arc<dyn Store>,
    connectors: Arc<ConnectorRegistry>,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn Store>, connectors: Arc<ConnectorRegistry>) -> Self {
        Self { store, connectors }
    }

    /// Sync every connector, or only those whose site id is in `filter`.
    ///
    /// A filter naming no registered connector is a validation error.
    pub async fn sync_all(&self, filter: Option<&[String]>) -> Result<Vec<SyncResult>> {
        let selected: Vec<&dyn Connector> = match filter {
            Some(sites) if !sites.is_empty() => {
                let mut picked = Vec::new();
                for site in sites {
                    match self.connectors.find(site) {
                        Some(c) => picked.push(c),
                        None => {
                            return Err(AgentError::validation(format!(
                                "unknown connector '{}'; registered: {}",
                                site,
                                self.site_ids().join(", ")
                            ))
                            .into())
                        }
                    }
                }
                picked
            }
            _ => self.connectors.connectors().iter().map(|c| c.as_ref()).collect(),
        };

        let mut results = Vec::with_capacity(selected.len());
        for connector in selected {
            results.push(self.sync_one(connector).await);
        }
        Ok(results)
    }

    fn site_ids(&self) -> Vec<&str> {
        self.connectors
            .connectors()
            .iter()
            .map(|c| c.site_id())
            .collect()
    }

    /// Run a single connector. Never fails; problems land in `errors`.
    pub async fn sync_one(&self, connector: &dyn Connector) -> SyncResult {
        let started = Instant::now();
        let site_id = connector.site_id().to_string();
        let mut result = SyncResult {
            site_id: site_id.clone(),
            ..SyncResult::default()
        };

        match connector.fetch_all().await {
            Ok(records) => {
                for raw in &records {
                    let outcome = match connector.transform(raw) {
                        Ok(place) => self.store.upsert_by_site_ref(&site_id, &raw.id, place).await,
                        Err(e) => Err(e),
                    };
                    match outcome {
                        Ok(o) if o.created => result.created += 1,
                        Ok(_) => result.updated += 1,
                        Err(e) => {
                            tracing::debug!(site_id = %site_id, external_id = %raw.id, error = %e, "record failed");
                            result.errors.push(format!("{}: {}", raw.id, e));
                        }
                    }
                }
            }
            Err(e) => result.errors.push(format!("Fetch failed: {}", e)),
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            site_id = %site_id,
            created = result.created,
            updated = result.updated,
            errors = result.errors.len(),
            elapsed_ms = result.duration_ms,
            "sync finished"
        );
        result
    }
}

/// `agent-layer sync [all|<site_id>...]`.
pub async fn run_sync(config: &Config, sites: &[String]) -> Result<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool.clone()));
    let connectors = Arc::new(ConnectorRegistry::from_config(config));

    if connectors.is_empty() {
        println!("No connectors configured.");
        pool.close().await;
        return Ok(());
    }

    let filter: Vec<String> = sites
        .iter()
        .filter(|s| s.as_str() != "all")
        .cloned()
        .collect();
    let orchestrator = SyncOrchestrator::new(store, connectors);
    let results = orchestrator
        .sync_all(if filter.is_empty() { None } else { Some(&filter) })
        .await?;

    for result in &results {
        println!("sync {}", result.site_id);
        println!("  created: {}", result.created);
        println!("  updated: {}", result.updated);
        println!("  errors: {}", result.errors.len());
        for error in &result.errors {
            println!("    - {}", error);
        }
        println!("  duration: {}ms", result.duration_ms);
    }
    println!("ok");

    pool.close().await;
    Ok(())
}
