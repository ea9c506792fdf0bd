//! Search, compare, and discover from the command line.
//!
//! Thin wrappers over the core engines that open the configured database,
//! run one query, and print a human-readable listing.

use anyhow::Result;

use agent_layer_core::compare::{compare_ids, Difference};
use agent_layer_core::intent::IntentRouter;
use agent_layer_core::search::{search, SearchQuery};
use agent_layer_core::unified::UnifiedPlace;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// `agent-layer search`.
pub async fn run_search(config: &Config, query: SearchQuery) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let page = search(&store, &query, config.search.limits()).await?;

    if let Some(intent) = &page.intent {
        println!(
            "routed: vertical={} city={} confidence={:.2}",
            intent.vertical.map(|v| v.as_str()).unwrap_or("-"),
            intent
                .location
                .as_ref()
                .and_then(|l| l.city.as_deref())
                .unwrap_or("-"),
            intent.confidence()
        );
    }

    if page.records.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, place) in page.records.iter().enumerate() {
        print_place_line(i + 1, place);
    }

    println!("{} of {} shown", page.records.len(), page.total);
    if let Some(cursor) = &page.next_cursor {
        println!("next: --cursor {}", cursor);
    }

    pool.close().await;
    Ok(())
}

fn print_place_line(n: usize, place: &UnifiedPlace) {
    let rating = place
        .rating
        .map(|r| format!("{:.1}", r))
        .unwrap_or_else(|| "-".to_string());
    println!("{}. [{}] {} / {}", n, rating, place.vertical, place.name);
    println!("    city: {}, {}", place.location.city, place.location.province);
    if !place.tags.is_empty() {
        println!("    tags: {}", place.tags.join(", "));
    }
    println!("    id: {}", place.id);
    println!();
}

/// `agent-layer compare <id>...`.
pub async fn run_compare(config: &Config, ids: &[String]) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let outcome = compare_ids(&store, ids).await?;

    match &outcome.comparison {
        None => {
            for s in &outcome.suggestions {
                println!("{}", s);
            }
        }
        Some(comparison) => {
            println!("--- Places ({}) ---", outcome.valid.len());
            for (i, place) in outcome.valid.iter().enumerate() {
                print_place_line(i + 1, place);
            }

            println!("--- Differences ---");
            if comparison.differences.is_empty() {
                println!("(none)");
            }
            for diff in &comparison.differences {
                match diff {
                    Difference::Rating {
                        description,
                        highest,
                    } => println!("{} (highest: {})", description, highest),
                    Difference::WalkIn {
                        description,
                        places,
                    } => println!("{}: {}", description, places.join(", ")),
                }
            }
            println!();

            println!("--- Recommendations ---");
            for rec in &comparison.recommendations {
                println!("- {}", rec);
            }
        }
    }

    pool.close().await;
    Ok(())
}

/// `agent-layer discover <text>`. Needs no database.
pub fn run_discover(text: &str) -> Result<()> {
    let router = IntentRouter::new();
    let intent = router.parse_query(text, None);

    println!("intent:     {}", serde_json::to_string(&intent.intent)?);
    println!(
        "vertical:   {}",
        intent.vertical.map(|v| v.as_str()).unwrap_or("(unresolved)")
    );
    if let Some(loc) = &intent.location {
        println!(
            "location:   {} {}",
            loc.city.as_deref().unwrap_or("-"),
            loc.province.as_deref().unwrap_or("")
        );
    }
    if !intent.filters.is_empty() {
        println!("filters:    {}", serde_json::to_string(&intent.filters)?);
    }
    println!("confidence: {:.2}", intent.confidence());

    let suggestions = router.suggestions(text);
    if !suggestions.is_empty() {
        println!();
        println!("try:");
        for s in suggestions {
            println!("  {}", s);
        }
    }
    Ok(())
}
