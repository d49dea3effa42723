//! PostgreSQL store backend (the normative one).
//!
//! Schema lives in `migrations/`. Mutations run in a single transaction so a
//! failed `Put`/`Drop` leaves no visible state change.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use lattice_proto::types::Version;

use crate::error::{LatticeError, Result};
use crate::resource::{content_hash, StoredResource};

use super::{EventCursor, EventRow, EventStatus, StoreBackend};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct CacheRow {
    id: Uuid,
    name: String,
    spec_type_url: String,
    spec_value: Vec<u8>,
    version_index: i64,
    sha256_hash: String,
}

impl CacheRow {
    fn into_stored(self, namespace: &str) -> StoredResource {
        let spec = if self.spec_type_url.is_empty() {
            None
        } else {
            Some(prost_types::Any {
                type_url: self.spec_type_url,
                value: self.spec_value,
            })
        };

        StoredResource {
            namespace: namespace.to_string(),
            id: self.id,
            name: self.name,
            spec,
            version_index: self.version_index,
            sha256_hash: self.sha256_hash,
        }
    }
}

#[derive(sqlx::FromRow)]
struct JoinedEventRow {
    seq: i64,
    id: Uuid,
    status: String,
    version_index: i64,
    before_index: Option<i64>,
    name: String,
    spec_type_url: String,
    spec_value: Vec<u8>,
    sha256_hash: String,
}

fn parse_status(status: &str) -> Result<EventStatus> {
    match status {
        "ACTIVE" => Ok(EventStatus::Active),
        "DROPPED" => Ok(EventStatus::Dropped),
        "DROP_BEFORE" => Ok(EventStatus::DropBefore),
        other => Err(LatticeError::Internal(format!(
            "unknown resource event status: {other}"
        ))),
    }
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded schema migrations. Unreadable or failing
    /// migrations are fatal for the process.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LatticeError::Config(format!("migration failed: {e}")))
    }
}

#[async_trait]
impl StoreBackend for PostgresStore {
    async fn put(
        &self,
        namespace: &str,
        id: Uuid,
        name: &str,
        spec: Option<prost_types::Any>,
    ) -> Result<Version> {
        let sha256_hash = content_hash(namespace, &id.to_string(), name, spec.as_ref());
        let (spec_type_url, spec_value) = spec
            .map(|any| (any.type_url, any.value))
            .unwrap_or_default();

        let mut tx = self.pool.begin().await?;

        let current = sqlx::query(
            r#"
            SELECT version_index, sha256_hash
            FROM resource_cache
            WHERE namespace = $1 AND id = $2
            FOR UPDATE
            "#,
        )
        .bind(namespace)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut version_index = Utc::now().timestamp();

        match current {
            Some(row) if row.get::<String, _>("sha256_hash") == sha256_hash => {
                version_index = row.get::<i64, _>("version_index");
            }
            _ => {
                sqlx::query(
                    r#"
                    INSERT INTO resource_cache (
                        namespace, id, version_index, name, spec_type_url, spec_value, sha256_hash
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (namespace, id) DO UPDATE SET
                        version_index = EXCLUDED.version_index,
                        name = EXCLUDED.name,
                        spec_type_url = EXCLUDED.spec_type_url,
                        spec_value = EXCLUDED.spec_value,
                        sha256_hash = EXCLUDED.sha256_hash
                    "#,
                )
                .bind(namespace)
                .bind(id)
                .bind(version_index)
                .bind(name)
                .bind(&spec_type_url)
                .bind(&spec_value)
                .bind(&sha256_hash)
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    r#"
                    INSERT INTO resource_events (namespace, id, status, version_index)
                    VALUES ($1, $2, 'ACTIVE', $3)
                    "#,
                )
                .bind(namespace)
                .bind(id)
                .bind(version_index)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        Ok(Version {
            sha256_hash,
            index: version_index,
            timestamp: Some(prost_types::Timestamp {
                seconds: version_index,
                nanos: 0,
            }),
        })
    }

    async fn get(&self, namespace: &str, id: Uuid) -> Result<StoredResource> {
        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT id, name, spec_type_url, spec_value, version_index, sha256_hash
            FROM resource_cache
            WHERE namespace = $1 AND id = $2
            "#,
        )
        .bind(namespace)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.into_stored(namespace)).ok_or_else(|| {
            LatticeError::NotFound(format!("resource {id} in namespace {namespace}"))
        })
    }

    async fn drop_resources(&self, namespace: &str, ids: &[Uuid]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let version_index = Utc::now().timestamp();

        for id in ids {
            sqlx::query(
                r#"
                INSERT INTO resource_events (namespace, id, status, version_index)
                VALUES ($1, $2, 'DROPPED', $3)
                "#,
            )
            .bind(namespace)
            .bind(id)
            .bind(version_index)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM resource_cache WHERE namespace = $1 AND id = $2")
                .bind(namespace)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn drop_before(&self, namespace: &str, before_index: i64) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let version_index = Utc::now().timestamp();

        let covered: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM resource_cache WHERE namespace = $1 AND version_index < $2",
        )
        .bind(namespace)
        .bind(before_index)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO resource_events (namespace, id, status, version_index, before_index)
            VALUES ($1, $2, 'DROP_BEFORE', $3, $4)
            "#,
        )
        .bind(namespace)
        .bind(Uuid::nil())
        .bind(version_index)
        .bind(before_index)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM resource_cache WHERE namespace = $1 AND version_index < $2")
            .bind(namespace)
            .bind(before_index)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(covered)
    }

    async fn snapshot_page(
        &self,
        namespace: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<StoredResource>> {
        let rows = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT id, name, spec_type_url, spec_value, version_index, sha256_hash
            FROM resource_cache
            WHERE namespace = $1
            ORDER BY version_index, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(namespace)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_stored(namespace))
            .collect())
    }

    async fn latest_cursor(&self, namespace: &str) -> Result<Option<EventCursor>> {
        let row = sqlx::query(
            r#"
            SELECT version_index, id
            FROM resource_events
            WHERE namespace = $1
            ORDER BY version_index DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(namespace)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| EventCursor {
            version_index: row.get("version_index"),
            id: row.get("id"),
        }))
    }

    async fn events_page(
        &self,
        namespace: &str,
        after: EventCursor,
        limit: i64,
    ) -> Result<Vec<EventRow>> {
        let rows = sqlx::query_as::<_, JoinedEventRow>(
            r#"
            SELECT
                e.seq, e.id, e.status, e.version_index, e.before_index,
                COALESCE(c.name, '') AS name,
                COALESCE(c.spec_type_url, '') AS spec_type_url,
                COALESCE(c.spec_value, ''::bytea) AS spec_value,
                COALESCE(c.sha256_hash, '') AS sha256_hash
            FROM resource_events e
            LEFT JOIN resource_cache c
                ON c.namespace = e.namespace AND c.id = e.id
            WHERE e.namespace = $1 AND (e.version_index, e.id) > ($2, $3)
            ORDER BY e.version_index, e.id, e.seq
            LIMIT $4
            "#,
        )
        .bind(namespace)
        .bind(after.version_index)
        .bind(after.id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let status = parse_status(&row.status)?;
                let spec = if row.spec_type_url.is_empty() {
                    None
                } else {
                    Some(prost_types::Any {
                        type_url: row.spec_type_url,
                        value: row.spec_value,
                    })
                };
                Ok(EventRow {
                    seq: row.seq,
                    id: row.id,
                    status,
                    version_index: row.version_index,
                    before_index: row.before_index,
                    name: row.name,
                    spec,
                    sha256_hash: row.sha256_hash,
                })
            })
            .collect()
    }

    async fn drop_before_covered(&self, namespace: &str, marker: &EventRow) -> Result<Vec<Uuid>> {
        let before_index = marker.before_index.ok_or_else(|| {
            LatticeError::Internal("drop-before marker without before_index".to_string())
        })?;

        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (id) id, status, version_index
            FROM resource_events
            WHERE namespace = $1 AND seq < $2 AND status <> 'DROP_BEFORE'
            ORDER BY id, seq DESC
            "#,
        )
        .bind(namespace)
        .bind(marker.seq)
        .fetch_all(&self.pool)
        .await?;

        let mut covered: Vec<Uuid> = rows
            .into_iter()
            .filter(|row| {
                row.get::<String, _>("status") == "ACTIVE"
                    && row.get::<i64, _>("version_index") < before_index
            })
            .map(|row| row.get("id"))
            .collect();
        covered.sort();
        Ok(covered)
    }
}
