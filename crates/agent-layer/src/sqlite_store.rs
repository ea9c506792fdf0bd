//! SQLite-backed [`Store`] implementation.
//!
//! Places live in one `places` table keyed by id with a `(slug, city)`
//! uniqueness constraint. `place_site_refs` indexes `(site_id,
//! external_id) → place_id` so the connector upsert path is a primary-key
//! lookup inside a transaction instead of a table scan. List-valued fields
//! are stored as JSON text. Timestamps are fixed-width RFC 3339 text with
//! nanoseconds, so they round-trip exactly and sort chronologically.
//!
//! Every write runs in a `BEGIN IMMEDIATE` transaction. The write lock is
//! taken up front, so concurrent writers queue on the busy timeout instead
//! of failing with `SQLITE_BUSY` on a read-to-write lock upgrade.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use agent_layer_core::lead::{LeadContact, LeadFilter, LeadRecord, LeadStatus};
use agent_layer_core::models::{Coordinates, UpsertOutcome};
use agent_layer_core::store::Store;
use agent_layer_core::{AgentError, NewPlace, PlaceRecord, Vertical};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }
}

fn to_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn ts_col(row: &SqliteRow, col: &str) -> Result<DateTime<Utc>> {
    let text: String = row.try_get(col)?;
    let parsed = DateTime::parse_from_rfc3339(&text)
        .with_context(|| format!("corrupt timestamp in column {}", col))?;
    Ok(parsed.with_timezone(&Utc))
}

fn json_col<T: serde::de::DeserializeOwned>(row: &SqliteRow, col: &str) -> Result<T> {
    let text: String = row.try_get(col)?;
    serde_json::from_str(&text).with_context(|| format!("corrupt JSON in column {}", col))
}

fn row_to_place(row: &SqliteRow) -> Result<PlaceRecord> {
    let vertical: String = row.try_get("vertical")?;
    let review_count: i64 = row.try_get("review_count")?;
    Ok(PlaceRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        vertical: vertical.parse::<Vertical>()?,
        province: row.try_get("province")?,
        city: row.try_get("city")?,
        neighborhood: row.try_get("neighborhood")?,
        address: row.try_get("address")?,
        coordinates: Coordinates::from_parts(row.try_get("lat")?, row.try_get("lng")?),
        phone: row.try_get("phone")?,
        website: row.try_get("website")?,
        booking_url: row.try_get("booking_url")?,
        email: row.try_get("email")?,
        description: row.try_get("description")?,
        images: json_col(row, "images_json")?,
        rating: row.try_get("rating")?,
        review_count: u32::try_from(review_count).unwrap_or(0),
        tags: json_col(row, "tags_json")?,
        sources: json_col(row, "sources_json")?,
        site_refs: json_col(row, "site_refs_json")?,
        raw_data: json_col(row, "raw_json")?,
        created_at: ts_col(row, "created_at")?,
        updated_at: ts_col(row, "updated_at")?,
    })
}

fn row_to_lead(row: &SqliteRow) -> Result<LeadRecord> {
    let action: String = row.try_get("action_type")?;
    let vertical: String = row.try_get("vertical")?;
    let status: String = row.try_get("status")?;
    let priority: String = row.try_get("priority")?;
    Ok(LeadRecord {
        id: row.try_get("id")?,
        action_type: action.parse()?,
        vertical: vertical.parse()?,
        province: row.try_get("province")?,
        city: row.try_get("city")?,
        contact: LeadContact {
            name: row.try_get("contact_name")?,
            email: row.try_get("contact_email")?,
            phone: row.try_get("contact_phone")?,
        },
        place_ids: json_col(row, "place_ids_json")?,
        message: row.try_get("message")?,
        requirements: row.try_get("requirements")?,
        payload: json_col(row, "payload_json")?,
        status: status.parse()?,
        priority: priority.parse()?,
        assigned_to: row.try_get("assigned_to")?,
        created_at: ts_col(row, "created_at")?,
        updated_at: ts_col(row, "updated_at")?,
    })
}

async fn fetch_place(conn: &mut SqliteConnection, id: &str) -> Result<Option<PlaceRecord>> {
    let row = sqlx::query("SELECT * FROM places WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(row_to_place).transpose()
}

async fn ensure_slug_free(conn: &mut SqliteConnection, place: &PlaceRecord) -> Result<()> {
    let taken: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM places WHERE slug = ? AND city = ? AND id != ?",
    )
    .bind(&place.slug)
    .bind(&place.city)
    .bind(&place.id)
    .fetch_one(conn)
    .await?;
    if taken > 0 {
        return Err(AgentError::Conflict(format!(
            "slug '{}' already exists in city '{}'",
            place.slug, place.city
        ))
        .into());
    }
    Ok(())
}

async fn write_place(conn: &mut SqliteConnection, place: &PlaceRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO places (id, name, slug, vertical, province, city, neighborhood, address,
                            lat, lng, phone, website, booking_url, email, description,
                            images_json, rating, review_count, tags_json, sources_json,
                            site_refs_json, raw_json, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            slug = excluded.slug,
            vertical = excluded.vertical,
            province = excluded.province,
            city = excluded.city,
            neighborhood = excluded.neighborhood,
            address = excluded.address,
            lat = excluded.lat,
            lng = excluded.lng,
            phone = excluded.phone,
            website = excluded.website,
            booking_url = excluded.booking_url,
            email = excluded.email,
            description = excluded.description,
            images_json = excluded.images_json,
            rating = excluded.rating,
            review_count = excluded.review_count,
            tags_json = excluded.tags_json,
            sources_json = excluded.sources_json,
            site_refs_json = excluded.site_refs_json,
            raw_json = excluded.raw_json,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&place.id)
    .bind(&place.name)
    .bind(&place.slug)
    .bind(place.vertical.as_str())
    .bind(&place.province)
    .bind(&place.city)
    .bind(&place.neighborhood)
    .bind(&place.address)
    .bind(place.coordinates.map(|c| c.lat))
    .bind(place.coordinates.map(|c| c.lng))
    .bind(&place.phone)
    .bind(&place.website)
    .bind(&place.booking_url)
    .bind(&place.email)
    .bind(&place.description)
    .bind(serde_json::to_string(&place.images)?)
    .bind(place.rating)
    .bind(i64::from(place.review_count))
    .bind(serde_json::to_string(&place.tags)?)
    .bind(serde_json::to_string(&place.sources)?)
    .bind(serde_json::to_string(&place.site_refs)?)
    .bind(serde_json::to_string(&place.raw_data)?)
    .bind(to_ts(place.created_at))
    .bind(to_ts(place.updated_at))
    .execute(&mut *conn)
    .await?;

    for (site_id, external_id) in &place.site_refs {
        sqlx::query(
            "INSERT OR REPLACE INTO place_site_refs (site_id, external_id, place_id) VALUES (?, ?, ?)",
        )
        .bind(site_id)
        .bind(external_id)
        .bind(&place.id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn places_in_vertical(&self, vertical: Vertical) -> Result<Vec<PlaceRecord>> {
        let rows = sqlx::query("SELECT * FROM places WHERE vertical = ?")
            .bind(vertical.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_place).collect()
    }

    async fn get_place(&self, vertical: Vertical, id: &str) -> Result<Option<PlaceRecord>> {
        let row = sqlx::query("SELECT * FROM places WHERE id = ? AND vertical = ?")
            .bind(id)
            .bind(vertical.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_place).transpose()
    }

    async fn find_place_by_slug(&self, slug: &str, city: &str) -> Result<Option<PlaceRecord>> {
        let row = sqlx::query("SELECT * FROM places WHERE slug = ? AND city = ?")
            .bind(slug)
            .bind(city)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_place).transpose()
    }

    async fn insert_place(&self, place: &PlaceRecord) -> Result<()> {
        let mut tx = self.begin_write().await?;
        if fetch_place(&mut tx, &place.id).await?.is_some() {
            return Err(AgentError::Conflict(format!("place id '{}' already exists", place.id)).into());
        }
        ensure_slug_free(&mut tx, place).await?;
        write_place(&mut tx, place).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_place(&self, place: &PlaceRecord) -> Result<()> {
        let mut tx = self.begin_write().await?;
        if fetch_place(&mut tx, &place.id).await?.is_none() {
            return Err(AgentError::not_found("place", place.id.clone()).into());
        }
        ensure_slug_free(&mut tx, place).await?;
        write_place(&mut tx, place).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_by_site_ref(
        &self,
        site_id: &str,
        external_id: &str,
        place: NewPlace,
    ) -> Result<UpsertOutcome> {
        place.validate()?;
        let now = Utc::now();
        let mut tx = self.begin_write().await?;

        let mut existing_id: Option<String> = sqlx::query_scalar(
            "SELECT place_id FROM place_site_refs WHERE site_id = ? AND external_id = ?",
        )
        .bind(site_id)
        .bind(external_id)
        .fetch_optional(&mut *tx)
        .await?;

        if existing_id.is_none() {
            existing_id = sqlx::query_scalar(
                "SELECT id FROM places WHERE vertical = ? AND slug = ? AND city = ?",
            )
            .bind(place.vertical.as_str())
            .bind(&place.slug)
            .bind(&place.city)
            .fetch_optional(&mut *tx)
            .await?;
        }

        if let Some(id) = existing_id {
            if let Some(mut record) = fetch_place(&mut tx, &id).await? {
                record.merge_from(place, site_id, external_id, now);
                ensure_slug_free(&mut tx, &record).await?;
                write_place(&mut tx, &record).await?;
                tx.commit().await?;
                return Ok(UpsertOutcome {
                    place_id: id,
                    created: false,
                });
            }
        }

        let record = place.into_record(site_id, external_id, now);
        ensure_slug_free(&mut tx, &record).await?;
        write_place(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(UpsertOutcome {
            place_id: record.id,
            created: true,
        })
    }

    async fn place_counts(&self) -> Result<BTreeMap<Vertical, usize>> {
        let rows = sqlx::query("SELECT vertical, COUNT(*) AS n FROM places GROUP BY vertical")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let vertical: String = row.try_get("vertical")?;
            let n: i64 = row.try_get("n")?;
            counts.insert(vertical.parse::<Vertical>()?, n as usize);
        }
        Ok(counts)
    }

    async fn insert_lead(&self, lead: &LeadRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO leads (id, action_type, vertical, province, city, contact_name,
                               contact_email, contact_phone, place_ids_json, message,
                               requirements, payload_json, status, priority, assigned_to,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&lead.id)
        .bind(lead.action_type.as_str())
        .bind(lead.vertical.as_str())
        .bind(&lead.province)
        .bind(&lead.city)
        .bind(&lead.contact.name)
        .bind(&lead.contact.email)
        .bind(&lead.contact.phone)
        .bind(serde_json::to_string(&lead.place_ids)?)
        .bind(&lead.message)
        .bind(&lead.requirements)
        .bind(serde_json::to_string(&lead.payload)?)
        .bind(lead.status.as_str())
        .bind(lead.priority.as_str())
        .bind(&lead.assigned_to)
        .bind(to_ts(lead.created_at))
        .bind(to_ts(lead.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_lead(&self, id: &str) -> Result<Option<LeadRecord>> {
        let row = sqlx::query("SELECT * FROM leads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_lead).transpose()
    }

    async fn update_lead(&self, lead: &LeadRecord) -> Result<()> {
        // priority, payload, and contact are immutable after creation
        let result = sqlx::query(
            "UPDATE leads SET status = ?, assigned_to = ?, updated_at = ? WHERE id = ?",
        )
        .bind(lead.status.as_str())
        .bind(&lead.assigned_to)
        .bind(to_ts(lead.updated_at))
        .bind(&lead.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AgentError::not_found("lead", lead.id.clone()).into());
        }
        Ok(())
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<LeadRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM leads
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR vertical = ?2)
              AND (?3 IS NULL OR priority = ?3)
            ORDER BY created_at DESC, id ASC
            LIMIT ?4 OFFSET ?5
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.vertical.map(|v| v.as_str()))
        .bind(filter.priority.map(|p| p.as_str()))
        .bind(i64::try_from(filter.limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(filter.offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_lead).collect()
    }

    async fn lead_counts(&self) -> Result<BTreeMap<LeadStatus, usize>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM leads GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            counts.insert(status.parse::<LeadStatus>()?, n as usize);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use agent_layer_core::ids::slugify;
    use agent_layer_core::lead::{LeadAction, LeadRequest};
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let config = Config::minimal(tmp.path().join("test.sqlite"));
        let pool = crate::db::connect(&config).await.unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn make_place(name: &str, city: &str, vertical: Vertical) -> NewPlace {
        NewPlace {
            name: name.to_string(),
            slug: slugify(name),
            vertical,
            province: "AB".to_string(),
            city: city.to_string(),
            neighborhood: None,
            address: Some("1 Main St".to_string()),
            coordinates: Coordinates::from_parts(Some(53.5), Some(-113.5)),
            phone: None,
            website: None,
            booking_url: None,
            email: None,
            description: None,
            images: vec!["https://img/a.jpg".to_string()],
            rating: Some(4.2),
            review_count: 12,
            tags: vec!["walk-in".to_string()],
            sources: Vec::new(),
            raw_data: serde_json::json!({"category": "family-medicine"}),
        }
    }

    #[tokio::test]
    async fn test_place_roundtrip_through_sqlite() {
        let (_tmp, store) = open_store().await;
        let out = store
            .upsert_by_site_ref("s1", "e1", make_place("Alpha", "calgary", Vertical::Clinic))
            .await
            .unwrap();
        assert!(out.created);

        let record = store
            .get_place(Vertical::Clinic, &out.place_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.name, "Alpha");
        assert_eq!(record.coordinates, Some(Coordinates { lat: 53.5, lng: -113.5 }));
        assert_eq!(record.tags, vec!["walk-in"]);
        assert_eq!(record.site_refs.get("s1").map(String::as_str), Some("e1"));
        assert_eq!(record.raw_data["category"], "family-medicine");
    }

    #[tokio::test]
    async fn test_upsert_twice_updates_in_place() {
        let (_tmp, store) = open_store().await;
        let first = store
            .upsert_by_site_ref("s1", "e1", make_place("Alpha", "calgary", Vertical::Clinic))
            .await
            .unwrap();
        let mut changed = make_place("Alpha", "calgary", Vertical::Clinic);
        changed.rating = Some(3.0);
        let second = store.upsert_by_site_ref("s1", "e1", changed).await.unwrap();

        assert!(!second.created);
        assert_eq!(first.place_id, second.place_id);
        let all = store.places_in_vertical(Vertical::Clinic).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].rating, Some(3.0));
    }

    #[tokio::test]
    async fn test_slug_conflict_is_typed() {
        let (_tmp, store) = open_store().await;
        store
            .upsert_by_site_ref("s1", "e1", make_place("Alpha", "calgary", Vertical::Clinic))
            .await
            .unwrap();
        let err = store
            .upsert_by_site_ref("s2", "e2", make_place("Alpha", "calgary", Vertical::Food))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AgentError>(),
            Some(AgentError::Conflict(_))
        ));
        let counts = store.place_counts().await.unwrap();
        assert_eq!(counts.get(&Vertical::Clinic), Some(&1));
        assert_eq!(counts.get(&Vertical::Food), None);
    }

    #[tokio::test]
    async fn test_lead_lifecycle_in_sqlite() {
        let (_tmp, store) = open_store().await;
        let req: LeadRequest = serde_json::from_value(serde_json::json!({
            "type": "contact",
            "vertical": "clinic",
            "placeIds": ["p1"],
            "contact": {"email": "pat@example.ca", "name": "Pat"}
        }))
        .unwrap();
        let mut lead = LeadRecord::from_request(&req, Utc::now()).unwrap();
        store.insert_lead(&lead).await.unwrap();

        lead.advance(LeadStatus::Contacted, Some("ops".to_string()), Utc::now())
            .unwrap();
        store.update_lead(&lead).await.unwrap();

        let loaded = store.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, LeadStatus::Contacted);
        assert_eq!(loaded.assigned_to.as_deref(), Some("ops"));
        assert_eq!(loaded.action_type, LeadAction::Contact);
        assert_eq!(loaded.place_ids, vec!["p1"]);
        assert_eq!(loaded.payload["contact"]["name"], "Pat");

        let filter = LeadFilter {
            status: Some(LeadStatus::New),
            ..LeadFilter::default()
        };
        assert!(store.list_leads(&filter).await.unwrap().is_empty());
        assert_eq!(store.list_leads(&LeadFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_all_land() {
        let (_tmp, store) = open_store().await;
        let store = std::sync::Arc::new(store);

        for round in 0..20 {
            let mut handles = Vec::new();
            for i in 0..4 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    let name = format!("Place {} {}", round, i);
                    store
                        .upsert_by_site_ref(
                            "s1",
                            &format!("e{}-{}", round, i),
                            make_place(&name, "calgary", Vertical::Clinic),
                        )
                        .await
                }));
            }
            for handle in handles {
                let outcome = handle.await.unwrap();
                assert!(outcome.is_ok(), "upsert failed: {:?}", outcome.err());
            }
        }

        let counts = store.place_counts().await.unwrap();
        assert_eq!(counts.get(&Vertical::Clinic), Some(&80));
    }

    #[tokio::test]
    async fn test_lead_timestamps_roundtrip_and_order() {
        let (_tmp, store) = open_store().await;
        let req: LeadRequest = serde_json::from_value(serde_json::json!({
            "type": "match",
            "vertical": "food",
            "contact": {"email": "x@y.ca"}
        }))
        .unwrap();

        let base = DateTime::parse_from_rfc3339("2026-03-01T10:00:00.000000100Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut ids = Vec::new();
        // same second, different sub-second instants
        for offset_ms in [0, 250, 500] {
            let created = base + chrono::Duration::milliseconds(offset_ms);
            let lead = LeadRecord::from_request(&req, created).unwrap();
            store.insert_lead(&lead).await.unwrap();
            ids.push((lead.id.clone(), created));
        }

        for (id, created) in &ids {
            let loaded = store.get_lead(id).await.unwrap().unwrap();
            assert_eq!(loaded.created_at, *created);
        }

        let listed: Vec<String> = store
            .list_leads(&LeadFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        let newest_first: Vec<String> = ids.iter().rev().map(|(id, _)| id.clone()).collect();
        assert_eq!(listed, newest_first);
    }

    #[tokio::test]
    async fn test_update_missing_lead_is_not_found() {
        let (_tmp, store) = open_store().await;
        let req: LeadRequest = serde_json::from_value(serde_json::json!({
            "type": "match",
            "vertical": "food",
            "contact": {"email": "x@y.ca"}
        }))
        .unwrap();
        let lead = LeadRecord::from_request(&req, Utc::now()).unwrap();
        let err = store.update_lead(&lead).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AgentError>(),
            Some(AgentError::NotFound { .. })
        ));
    }
}
