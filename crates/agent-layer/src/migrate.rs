use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS places (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            vertical TEXT NOT NULL,
            province TEXT NOT NULL,
            city TEXT NOT NULL,
            neighborhood TEXT,
            address TEXT,
            lat REAL,
            lng REAL,
            phone TEXT,
            website TEXT,
            booking_url TEXT,
            email TEXT,
            description TEXT,
            images_json TEXT NOT NULL DEFAULT '[]',
            rating REAL,
            review_count INTEGER NOT NULL DEFAULT 0,
            tags_json TEXT NOT NULL DEFAULT '[]',
            sources_json TEXT NOT NULL DEFAULT '[]',
            site_refs_json TEXT NOT NULL DEFAULT '{}',
            raw_json TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(slug, city)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexed lookup for the connector upsert path
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS place_site_refs (
            site_id TEXT NOT NULL,
            external_id TEXT NOT NULL,
            place_id TEXT NOT NULL,
            PRIMARY KEY (site_id, external_id),
            FOREIGN KEY (place_id) REFERENCES places(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leads (
            id TEXT PRIMARY KEY,
            action_type TEXT NOT NULL,
            vertical TEXT NOT NULL,
            province TEXT NOT NULL,
            city TEXT,
            contact_name TEXT,
            contact_email TEXT NOT NULL,
            contact_phone TEXT,
            place_ids_json TEXT NOT NULL DEFAULT '[]',
            message TEXT,
            requirements TEXT,
            payload_json TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL,
            priority TEXT NOT NULL,
            assigned_to TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_places_vertical ON places(vertical)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_site_refs_place ON place_site_refs(place_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_leads_created_at ON leads(created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
