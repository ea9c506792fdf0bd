//! TOML configuration.
//!
//! Loaded once at startup by [`load_config`]. Only `[db] path` is required;
//! every other section has defaults. A handful of environment variables
//! override connector data URLs and the Slack webhook so secrets can stay
//! out of the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use agent_layer_core::search::SearchLimits;
use agent_layer_core::Vertical;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_province")]
    pub default_province: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            default_province: default_province(),
        }
    }
}

impl SearchConfig {
    pub fn limits(&self) -> SearchLimits {
        SearchLimits {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }
}

fn default_limit() -> usize {
    10
}
fn default_max_limit() -> usize {
    50
}
fn default_province() -> String {
    "AB".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_metrics_ttl")]
    pub metrics_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_ttl_secs: default_metrics_ttl(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}
fn default_metrics_ttl() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
    #[serde(default)]
    pub email_api_key: Option<String>,
    #[serde(default = "default_from_email")]
    pub from_email: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            slack_webhook_url: None,
            email_api_key: None,
            from_email: default_from_email(),
        }
    }
}

fn default_from_email() -> String {
    "leads@agentlayer.local".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConnectorsConfig {
    /// Register the bundled sample connectors.
    #[serde(default = "default_builtin")]
    pub builtin: bool,
    /// Per built-in site overrides, keyed by site id.
    #[serde(default)]
    pub sites: BTreeMap<String, SiteConfig>,
    /// Extra connectors reading raw records from JSON files, keyed by name.
    #[serde(default)]
    pub json: BTreeMap<String, JsonConnectorConfig>,
}

impl Default for ConnectorsConfig {
    fn default() -> Self {
        Self {
            builtin: default_builtin(),
            sites: BTreeMap::new(),
            json: BTreeMap::new(),
        }
    }
}

fn default_builtin() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SiteConfig {
    #[serde(default)]
    pub data_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JsonConnectorConfig {
    /// Site id recorded in place site refs. Defaults to the table key.
    #[serde(default)]
    pub site_id: Option<String>,
    pub vertical: Vertical,
    pub path: PathBuf,
}

/// Environment variables that override a built-in site's data URL.
const SITE_URL_ENV: &[(&str, &str)] = &[
    ("edmontonplayground", "EDMONTONPLAYGROUND_DATA_URL"),
    ("albertaclinics", "ALBERTACLINICS_DATA_URL"),
    ("abcontrol", "ABCONTROL_DATA_URL"),
];

impl Config {
    /// Data URL for a built-in site: environment first, then the file.
    pub fn site_data_url(&self, site_id: &str) -> Option<String> {
        let from_env = SITE_URL_ENV
            .iter()
            .find(|(id, _)| *id == site_id)
            .and_then(|(_, var)| std::env::var(var).ok())
            .filter(|v| !v.trim().is_empty());
        from_env.or_else(|| {
            self.connectors
                .sites
                .get(site_id)
                .and_then(|s| s.data_url.clone())
        })
    }

    /// Config for tests and in-memory runs.
    pub fn minimal(db_path: PathBuf) -> Self {
        Self {
            db: DbConfig { path: db_path },
            search: SearchConfig::default(),
            server: ServerConfig::default(),
            notifications: NotificationsConfig::default(),
            connectors: ConnectorsConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.db.path.as_os_str().is_empty() {
        anyhow::bail!("db.path must not be empty");
    }
    if config.search.default_limit == 0 {
        anyhow::bail!("search.default_limit must be > 0");
    }
    if config.search.max_limit < config.search.default_limit {
        anyhow::bail!("search.max_limit must be >= search.default_limit");
    }
    if config.search.default_province.trim().is_empty() {
        anyhow::bail!("search.default_province must not be empty");
    }

    for (name, json) in &config.connectors.json {
        if json.site_id.as_deref().is_some_and(|s| s.trim().is_empty()) {
            anyhow::bail!("connectors.json.{}.site_id must not be empty", name);
        }
    }

    if let Ok(url) = std::env::var("SLACK_WEBHOOK_URL") {
        if !url.trim().is_empty() {
            config.notifications.slack_webhook_url = Some(url);
        }
    }

    Ok(config)
}
