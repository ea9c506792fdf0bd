//! JSON file connector.
//!
//! Reads a JSON array of raw place records from disk. Useful for partner
//! exports and for seeding verticals the built-in samples don't cover.
//!
//! ```toml
//! [connectors.json.calgary-spas]
//! vertical = "wellness"
//! path = "./data/spas.json"
//! # site_id = "spas-partner"   # defaults to the table key
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;

use agent_layer_core::raw::RawPlace;
use agent_layer_core::Vertical;

use crate::config::JsonConnectorConfig;
use crate::traits::Connector;

pub struct JsonFileConnector {
    site_id: String,
    description: String,
    config: JsonConnectorConfig,
}

impl JsonFileConnector {
    pub fn new(name: String, config: JsonConnectorConfig) -> Self {
        let site_id = config.site_id.clone().unwrap_or(name);
        let description = format!("{} records from {}", config.vertical, config.path.display());
        Self {
            site_id,
            description,
            config,
        }
    }
}

#[async_trait]
impl Connector for JsonFileConnector {
    fn site_id(&self) -> &str {
        &self.site_id
    }

    fn vertical(&self) -> Vertical {
        self.config.vertical
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn kind(&self) -> &str {
        "json"
    }

    async fn fetch_all(&self) -> Result<Vec<RawPlace>> {
        let path = &self.config.path;
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let records: Vec<RawPlace> = serde_json::from_str(&content)
            .with_context(|| format!("{} is not an array of raw records", path.display()))?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_records_and_defaults_site_id() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("spas.json");
        std::fs::write(
            &path,
            r#"[{"id": "s1", "name": "Banff Springs Spa", "city": "Banff", "category": "spa", "services": ["massage"]}]"#,
        )
        .unwrap();

        let connector = JsonFileConnector::new(
            "spas".to_string(),
            JsonConnectorConfig {
                site_id: None,
                vertical: Vertical::Wellness,
                path,
            },
        );
        assert_eq!(connector.site_id(), "spas");

        let records = connector.fetch_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].extra["services"][0], "massage");

        let place = connector.transform(&records[0]).unwrap();
        assert_eq!(place.vertical, Vertical::Wellness);
        assert_eq!(place.city, "banff");
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_error() {
        let connector = JsonFileConnector::new(
            "gone".to_string(),
            JsonConnectorConfig {
                site_id: Some("partner".to_string()),
                vertical: Vertical::Food,
                path: "/nonexistent/records.json".into(),
            },
        );
        assert_eq!(connector.site_id(), "partner");
        let err = connector.fetch_all().await.unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
