//! Database Connection Pool Module
//!
//! PostgreSQL-backed [`AssetStore`] and [`TagStore`] over a deadpool
//! connection pool.
//!
//! Assets are stored as JSONB documents next to the columns search needs
//! (`owner_id`, lower-cased name, tag values, and `sort_at`), so every
//! predicate, the ordering, and the pagination run in SQL. Tags carry a
//! `version` column for compare-and-set updates.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use pins_core::{
    new_asset_id, Asset, AssetFilter, AssetId, AssetPatch, CatalogError, CatalogResult, EntityKind,
    NewAsset, OwnerId, PageRequest, Paginated, StorageError, Tag, Timestamp,
};
use pins_storage::{AssetStore, TagStore, VersionedTag};
use serde_json::Value as JsonValue;
use tokio_postgres::{NoTls, Row};

use crate::error::{ApiError, ApiResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pins_assets (
    id          TEXT PRIMARY KEY,
    owner_id    TEXT NOT NULL,
    name_lower  TEXT NOT NULL,
    tags        TEXT[] NOT NULL DEFAULT '{}',
    sort_at     TIMESTAMPTZ NOT NULL,
    doc         JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS pins_assets_owner_idx ON pins_assets (owner_id);
CREATE INDEX IF NOT EXISTS pins_assets_sort_c_idx ON pins_assets (sort_at DESC, id COLLATE "C" DESC);
CREATE INDEX IF NOT EXISTS pins_assets_tags_idx ON pins_assets USING GIN (tags);

CREATE TABLE IF NOT EXISTS pins_tags (
    value       TEXT PRIMARY KEY,
    count       BIGINT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL,
    version     BIGINT NOT NULL
);
CREATE INDEX IF NOT EXISTS pins_tags_count_idx ON pins_tags (count DESC, value ASC);
"#;

// Shared by the count and page queries: $1 name, $2 tag, $3 owner.
const SEARCH_PREDICATE: &str = "($1::text IS NULL OR strpos(name_lower, $1) > 0) \
     AND ($2::text IS NULL OR $2 = ANY(tags)) \
     AND ($3::text IS NULL OR owner_id = $3)";

// Ties on sort_at break on id in byte order, matching `sort_most_recent_first`.
const SEARCH_ORDER: &str = "ORDER BY sort_at DESC, id COLLATE \"C\" DESC";

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host. `None` means run on the in-memory stores.
    pub host: Option<String>,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait for a pooled connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 5432,
            dbname: "pins".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("PINS_DB_HOST")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty()),
            port: std::env::var("PINS_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("PINS_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("PINS_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("PINS_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("PINS_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("PINS_DB_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.host.is_some()
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let host = self
            .host
            .clone()
            .ok_or_else(|| ApiError::invalid_input("PINS_DB_HOST is not set"))?;

        let mut cfg = Config::new();
        cfg.host = Some(host);
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// DATABASE CLIENT
// ============================================================================

/// Postgres-backed asset and tag store.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

fn backend(e: impl fmt::Display) -> CatalogError {
    CatalogError::backend(e.to_string())
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn asset_from_row(row: &Row) -> CatalogResult<Asset> {
    let doc: JsonValue = row.try_get("doc").map_err(backend)?;
    serde_json::from_value(doc).map_err(backend)
}

fn tag_from_row(row: &Row) -> CatalogResult<VersionedTag> {
    let count: i64 = row.try_get("count").map_err(backend)?;
    let version: i64 = row.try_get("version").map_err(backend)?;
    Ok(VersionedTag {
        tag: Tag {
            value: row.try_get("value").map_err(backend)?,
            count: u64::try_from(count).unwrap_or(0),
            created_at: row.try_get::<_, Timestamp>("created_at").map_err(backend)?,
            updated_at: row.try_get::<_, Timestamp>("updated_at").map_err(backend)?,
        },
        version: u64::try_from(version).unwrap_or(0),
    })
}

/// Column values derived from an asset document.
struct AssetColumns {
    doc: JsonValue,
    name_lower: String,
    tags: Vec<String>,
    sort_at: Timestamp,
}

impl AssetColumns {
    fn of(asset: &Asset) -> CatalogResult<Self> {
        Ok(Self {
            doc: serde_json::to_value(asset).map_err(backend)?,
            name_lower: asset.name.to_lowercase(),
            tags: asset.tags.iter().map(|t| t.value.clone()).collect(),
            sort_at: asset.recency(),
        })
    }
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Create tables and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA).await?;
        tracing::info!("Database schema ready");
        Ok(())
    }

    async fn get_conn(&self) -> CatalogResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to get database connection");
            backend(e)
        })
    }
}

#[async_trait]
impl AssetStore for DbClient {
    async fn create(&self, asset: NewAsset) -> CatalogResult<Asset> {
        let asset = asset.into_asset(new_asset_id());
        let columns = AssetColumns::of(&asset)?;
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO pins_assets (id, owner_id, name_lower, tags, sort_at, doc) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &asset.id.as_str(),
                &asset.owner_id.as_str(),
                &columns.name_lower,
                &columns.tags,
                &columns.sort_at,
                &columns.doc,
            ],
        )
        .await
        .map_err(|e| {
            CatalogError::Storage(StorageError::InsertFailed {
                entity: EntityKind::Asset,
                reason: e.to_string(),
            })
        })?;

        Ok(asset)
    }

    async fn get(&self, id: &AssetId) -> CatalogResult<Asset> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt("SELECT doc FROM pins_assets WHERE id = $1", &[&id.as_str()])
            .await
            .map_err(backend)?
            .ok_or_else(|| CatalogError::asset_not_found(id))?;
        asset_from_row(&row)
    }

    async fn update(
        &self,
        id: &AssetId,
        patch: AssetPatch,
        requester: &OwnerId,
    ) -> CatalogResult<Asset> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(backend)?;

        let row = tx
            .query_opt(
                "SELECT doc FROM pins_assets WHERE id = $1 FOR UPDATE",
                &[&id.as_str()],
            )
            .await
            .map_err(backend)?
            .ok_or_else(|| CatalogError::asset_not_found(id))?;
        let mut asset = asset_from_row(&row)?;

        if !asset.is_owned_by(requester) {
            return Err(CatalogError::Forbidden {
                asset_id: id.to_string(),
                requester: requester.to_string(),
            });
        }

        asset.apply(&patch);
        let columns = AssetColumns::of(&asset)?;
        tx.execute(
            "UPDATE pins_assets SET name_lower = $2, tags = $3, sort_at = $4, doc = $5 \
             WHERE id = $1",
            &[
                &id.as_str(),
                &columns.name_lower,
                &columns.tags,
                &columns.sort_at,
                &columns.doc,
            ],
        )
        .await
        .map_err(|e| {
            CatalogError::Storage(StorageError::UpdateFailed {
                entity: EntityKind::Asset,
                id: id.to_string(),
                reason: e.to_string(),
            })
        })?;
        tx.commit().await.map_err(backend)?;

        Ok(asset)
    }

    async fn increment_views(&self, id: &AssetId) -> CatalogResult<Asset> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "UPDATE pins_assets \
                 SET doc = jsonb_set(doc, '{views}', \
                     to_jsonb(COALESCE((doc->>'views')::bigint, 0) + 1)) \
                 WHERE id = $1 RETURNING doc",
                &[&id.as_str()],
            )
            .await
            .map_err(backend)?
            .ok_or_else(|| CatalogError::asset_not_found(id))?;
        asset_from_row(&row)
    }

    async fn search(
        &self,
        filter: &AssetFilter,
        page: PageRequest,
    ) -> CatalogResult<Paginated<Asset>> {
        let conn = self.get_conn().await?;
        let name = filter.name_contains.as_deref();
        let tag = filter.tag_equals.as_deref();
        let owner = filter.owner_id_equals.as_ref().map(OwnerId::as_str);

        let total: i64 = conn
            .query_one(
                &format!("SELECT COUNT(*) FROM pins_assets WHERE {}", SEARCH_PREDICATE),
                &[&name, &tag, &owner],
            )
            .await
            .map_err(backend)?
            .try_get(0)
            .map_err(backend)?;

        let limit = i64::from(page.limit());
        let offset = to_i64(page.offset());
        let rows = conn
            .query(
                &format!(
                    "SELECT doc FROM pins_assets WHERE {} {} LIMIT $4 OFFSET $5",
                    SEARCH_PREDICATE, SEARCH_ORDER
                ),
                &[&name, &tag, &owner, &limit, &offset],
            )
            .await
            .map_err(backend)?;

        let items = rows
            .iter()
            .map(asset_from_row)
            .collect::<CatalogResult<Vec<_>>>()?;
        Ok(Paginated::new(
            items,
            u64::try_from(total).unwrap_or(0),
            page,
        ))
    }

    async fn health_check(&self) -> CatalogResult<()> {
        let conn = self.get_conn().await?;
        conn.execute("SELECT 1", &[]).await.map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl TagStore for DbClient {
    async fn load(&self, value: &str) -> CatalogResult<Option<VersionedTag>> {
        let conn = self.get_conn().await?;
        conn.query_opt(
            "SELECT value, count, created_at, updated_at, version FROM pins_tags WHERE value = $1",
            &[&value],
        )
        .await
        .map_err(backend)?
        .as_ref()
        .map(tag_from_row)
        .transpose()
    }

    async fn insert_new(&self, tag: &Tag) -> CatalogResult<bool> {
        let conn = self.get_conn().await?;
        let inserted = conn
            .execute(
                "INSERT INTO pins_tags (value, count, created_at, updated_at, version) \
                 VALUES ($1, $2, $3, $4, 1) ON CONFLICT (value) DO NOTHING",
                &[&tag.value, &to_i64(tag.count), &tag.created_at, &tag.updated_at],
            )
            .await
            .map_err(backend)?;
        Ok(inserted == 1)
    }

    async fn replace_if_version(&self, tag: &Tag, expected_version: u64) -> CatalogResult<bool> {
        let conn = self.get_conn().await?;
        let updated = conn
            .execute(
                "UPDATE pins_tags SET count = $2, updated_at = $3, version = version + 1 \
                 WHERE value = $1 AND version = $4",
                &[
                    &tag.value,
                    &to_i64(tag.count),
                    &tag.updated_at,
                    &to_i64(expected_version),
                ],
            )
            .await
            .map_err(backend)?;
        Ok(updated == 1)
    }

    async fn top_by_count(&self, limit: usize, offset: usize) -> CatalogResult<Vec<Tag>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT value, count, created_at, updated_at, version FROM pins_tags \
                 ORDER BY count DESC, value COLLATE \"C\" ASC LIMIT $1 OFFSET $2",
                &[&to_i64(limit as u64), &to_i64(offset as u64)],
            )
            .await
            .map_err(backend)?;
        rows.iter()
            .map(|row| tag_from_row(row).map(|v| v.tag))
            .collect()
    }

    async fn range_by_value(
        &self,
        start: &str,
        end: &str,
        limit: usize,
    ) -> CatalogResult<Vec<Tag>> {
        let conn = self.get_conn().await?;
        // byte order, matching the in-memory BTreeMap
        let rows = conn
            .query(
                "SELECT value, count, created_at, updated_at, version FROM pins_tags \
                 WHERE value COLLATE \"C\" >= $1 AND value COLLATE \"C\" < $2 \
                 ORDER BY value COLLATE \"C\" ASC LIMIT $3",
                &[&start, &end, &to_i64(limit as u64)],
            )
            .await
            .map_err(backend)?;
        rows.iter()
            .map(|row| tag_from_row(row).map(|v| v.tag))
            .collect()
    }
}
