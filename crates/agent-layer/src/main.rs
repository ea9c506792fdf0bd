//! # Agent Layer CLI (`agent-layer`)
//!
//! ## Usage
//!
//! ```bash
//! agent-layer --config ./config/agent-layer.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `agent-layer init` | Create the SQLite database and run schema migrations |
//! | `agent-layer sources` | List registered connectors |
//! | `agent-layer sync [all\|<site>...]` | Pull places from connectors |
//! | `agent-layer search "<text>"` | Search places |
//! | `agent-layer get <id>` | Show one place |
//! | `agent-layer compare <id>...` | Compare 2 to 5 places |
//! | `agent-layer discover "<text>"` | Show how a query is routed |
//! | `agent-layer leads list` | List leads, newest first |
//! | `agent-layer leads status <id> <status>` | Advance a lead |
//! | `agent-layer serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use agent_layer::{config, get, leads, migrate, search, server, sources, sync};
use agent_layer_core::lead::LeadStatus;
use agent_layer_core::search::SearchQuery;
use agent_layer_core::Vertical;

/// Agent Layer CLI: a place directory and lead-capture service for AI agents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/agent-layer.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "agent-layer",
    about = "Agent Layer: a place directory and lead-capture service for AI agents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/agent-layer.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file and the places, place_site_refs, and leads
    /// tables. Safe to run repeatedly.
    Init,

    /// List registered connectors.
    Sources,

    /// Pull places from connectors into the database.
    ///
    /// With no arguments, or `all`, every connector runs in registration
    /// order. Otherwise only the named site ids run.
    Sync {
        /// `all` or one or more site ids (see `agent-layer sources`).
        sites: Vec<String>,
    },

    /// Search places.
    ///
    /// Without `--vertical`, the text is routed to a vertical, location,
    /// and filters first.
    Search {
        /// Free-text query, e.g. "walk-in clinics in edmonton".
        query: String,

        #[arg(long)]
        vertical: Option<Vertical>,

        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        province: Option<String>,

        /// Required tag. Repeat for several; all must match.
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        min_rating: Option<f64>,

        #[arg(long)]
        limit: Option<usize>,

        /// `next` cursor printed by a previous page.
        #[arg(long)]
        cursor: Option<String>,
    },

    /// Show one place by id.
    Get {
        id: String,

        /// Skip probing every vertical.
        #[arg(long)]
        vertical: Option<Vertical>,
    },

    /// Compare 2 to 5 places side by side.
    Compare {
        #[arg(required = true, num_args = 2..=5)]
        ids: Vec<String>,
    },

    /// Show how free text is routed: vertical, location, filters, confidence.
    Discover { query: String },

    /// Inspect and advance leads.
    Leads {
        #[command(subcommand)]
        action: LeadsAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum LeadsAction {
    /// List leads, newest first.
    List {
        #[arg(long)]
        status: Option<LeadStatus>,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Move a lead forward: new, contacted, qualified, converted, closed.
    Status {
        id: String,
        status: LeadStatus,

        /// Who is handling the lead.
        #[arg(long = "assign")]
        assigned_to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agent_layer=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Discover { query } = &cli.command {
        search::run_discover(query)?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Sync { sites } => {
            sync::run_sync(&cfg, &sites).await?;
        }
        Commands::Search {
            query,
            vertical,
            city,
            province,
            tags,
            min_rating,
            limit,
            cursor,
        } => {
            let q = SearchQuery {
                text: Some(query),
                vertical,
                city,
                province,
                tags,
                min_rating,
                limit,
                cursor,
                ..SearchQuery::default()
            };
            search::run_search(&cfg, q).await?;
        }
        Commands::Get { id, vertical } => {
            get::run_get(&cfg, &id, vertical).await?;
        }
        Commands::Compare { ids } => {
            search::run_compare(&cfg, &ids).await?;
        }
        Commands::Leads { action } => match action {
            LeadsAction::List { status, limit } => {
                leads::run_list(&cfg, status, limit).await?;
            }
            LeadsAction::Status {
                id,
                status,
                assigned_to,
            } => {
                leads::run_status(&cfg, &id, status, assigned_to).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Discover { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}
