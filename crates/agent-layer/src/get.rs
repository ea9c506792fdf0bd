//! Place retrieval by id.
//!
//! Used by the `agent-layer get` CLI command. The HTTP and tool surfaces
//! go through [`crate::tools::GetPlaceTool`] instead.

use anyhow::{bail, Result};

use agent_layer_core::compare::generate_actions;
use agent_layer_core::search::get_record;
use agent_layer_core::Vertical;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// CLI entry point: look the place up and print it.
pub async fn run_get(config: &Config, id: &str, vertical: Option<Vertical>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let place = get_record(&store, id, vertical).await?;
    pool.close().await;

    let place = match place {
        Some(p) => p,
        None => bail!("place not found: {}", id),
    };

    println!("--- Place ---");
    println!("id:          {}", place.id);
    println!("name:        {}", place.name);
    println!("vertical:    {}", place.vertical);
    println!("category:    {}", place.category);
    println!(
        "location:    {}, {} {}",
        place.location.address.as_deref().unwrap_or("(no address)"),
        place.location.city,
        place.location.province
    );
    if let Some(c) = &place.location.coordinates {
        println!("coordinates: {}, {}", c.lat, c.lng);
    }
    if let Some(phone) = &place.contact.phone {
        println!("phone:       {}", phone);
    }
    if let Some(website) = &place.contact.website {
        println!("website:     {}", website);
    }
    if let Some(rating) = place.rating {
        println!("rating:      {:.1} ({} reviews)", rating, place.review_count);
    }
    if !place.tags.is_empty() {
        println!("tags:        {}", place.tags.join(", "));
    }
    println!("updated_at:  {}", place.updated_at.format("%Y-%m-%dT%H:%M:%SZ"));
    println!();

    if let Some(desc) = &place.description {
        println!("--- Description ---");
        println!("{}", desc);
        println!();
    }

    println!("--- Attributes ---");
    println!("{}", serde_json::to_string_pretty(&place.attributes)?);
    println!();

    println!("--- Actions ---");
    for action in generate_actions(&place) {
        println!("{:<12} {}", action.action_type.as_str(), action.label);
    }

    Ok(())
}
