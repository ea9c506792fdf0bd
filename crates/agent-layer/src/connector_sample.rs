//! Built-in sample connectors.
//!
//! Three partner sites ship with the service so a fresh install has data
//! to search:
//!
//! | Site id | Vertical | Bundled records |
//! |---------|----------|-----------------|
//! | `edmontonplayground` | playground | 5 |
//! | `albertaclinics` | clinic | 6 |
//! | `abcontrol` | industrial | 3 |
//!
//! When a data URL is configured (`[connectors.sites.<id>] data_url` or
//! the site's `*_DATA_URL` environment variable) the connector fetches a
//! JSON array of raw records from it first. Any HTTP or decode failure is
//! logged and the bundled records are used instead.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use agent_layer_core::raw::RawPlace;
use agent_layer_core::Vertical;

use crate::config::Config;
use crate::traits::Connector;

const FETCH_TIMEOUT_SECS: u64 = 30;

struct SampleSite {
    site_id: &'static str,
    vertical: Vertical,
    description: &'static str,
    bundled: &'static str,
}

static SITES: &[SampleSite] = &[
    SampleSite {
        site_id: "edmontonplayground",
        vertical: Vertical::Playground,
        description: "Indoor playgrounds in the Edmonton area",
        bundled: include_str!("../data/edmontonplayground.json"),
    },
    SampleSite {
        site_id: "albertaclinics",
        vertical: Vertical::Clinic,
        description: "Medical clinics and hospitals across Alberta",
        bundled: include_str!("../data/albertaclinics.json"),
    },
    SampleSite {
        site_id: "abcontrol",
        vertical: Vertical::Industrial,
        description: "Industrial and B2B service providers",
        bundled: include_str!("../data/abcontrol.json"),
    },
];

pub struct SampleConnector {
    site: &'static SampleSite,
    data_url: Option<String>,
}

impl SampleConnector {
    /// One connector per built-in site, with data URLs resolved from config.
    pub fn builtins(config: &Config) -> Vec<SampleConnector> {
        SITES
            .iter()
            .map(|site| SampleConnector {
                site,
                data_url: config.site_data_url(site.site_id),
            })
            .collect()
    }

    fn bundled(&self) -> Result<Vec<RawPlace>> {
        serde_json::from_str(self.site.bundled)
            .with_context(|| format!("bundled data for {} is malformed", self.site.site_id))
    }
}

async fn fetch_remote(url: &str) -> Result<Vec<RawPlace>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()?;

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("request to {} failed: {}", url, e))?;

    if !resp.status().is_success() {
        bail!("HTTP {}", resp.status());
    }

    let records: Vec<RawPlace> = resp.json().await.context("response is not a raw record array")?;
    Ok(records)
}

#[async_trait]
impl Connector for SampleConnector {
    fn site_id(&self) -> &str {
        self.site.site_id
    }

    fn vertical(&self) -> Vertical {
        self.site.vertical
    }

    fn description(&self) -> &str {
        self.site.description
    }

    fn kind(&self) -> &str {
        "builtin"
    }

    async fn fetch_all(&self) -> Result<Vec<RawPlace>> {
        if let Some(url) = &self.data_url {
            match fetch_remote(url).await {
                Ok(records) => return Ok(records),
                Err(e) => tracing::warn!(
                    site_id = self.site.site_id,
                    error = %e,
                    "data URL fetch failed; using bundled records"
                ),
            }
        }
        self.bundled()
    }
}
