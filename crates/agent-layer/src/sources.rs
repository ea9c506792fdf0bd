use anyhow::Result;

use crate::config::Config;
use crate::traits::ConnectorRegistry;

/// `agent-layer sources`: one line per registered connector.
pub fn list_sources(config: &Config) -> Result<()> {
    let registry = ConnectorRegistry::from_config(config);

    if registry.is_empty() {
        println!("No connectors configured.");
        return Ok(());
    }

    println!("{:<22} {:<11} {:<8} DESCRIPTION", "SITE", "VERTICAL", "KIND");
    for c in registry.connectors() {
        println!(
            "{:<22} {:<11} {:<8} {}",
            c.site_id(),
            c.vertical(),
            c.kind(),
            c.description()
        );
    }

    for (name, json) in &config.connectors.json {
        if !json.path.exists() {
            println!(
                "warning: connectors.json.{}: {} does not exist",
                name,
                json.path.display()
            );
        }
    }

    Ok(())
}
