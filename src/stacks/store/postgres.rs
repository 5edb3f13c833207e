//! PostgreSQL stack store implementation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::StackStore;
use crate::stacks::error::{StackError, StackResult};
use crate::stacks::resolver::SiteSpec;
use crate::stacks::types::{
    Outputs, ProjectName, SiteName, SiteStatus, StackHandle, StackRecord,
};

/// PostgreSQL-backed stack store.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and create a new store.
    ///
    /// The required tables are created if they don't exist.
    ///
    /// # Errors
    /// Returns a storage error if the connection or schema setup fails.
    pub async fn new(dsn: &str) -> StackResult<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await?;

        Self::from_pool(pool).await
    }

    /// Create a store from an existing connection pool.
    ///
    /// # Errors
    /// Returns a storage error if schema setup fails.
    pub async fn from_pool(pool: PgPool) -> StackResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> StackResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS projects (
                name TEXT PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS stacks (
                project TEXT NOT NULL,
                site TEXT NOT NULL,
                status TEXT NOT NULL,
                spec JSONB NOT NULL,
                outputs JSONB,
                plan_digest TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (project, site)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // stacks are written before their project is registered
        sqlx::query("ALTER TABLE stacks DROP CONSTRAINT IF EXISTS stacks_project_fkey")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn row_to_record(row: &PgRow) -> StackResult<StackRecord> {
        let project: String = row.try_get("project")?;
        let site: String = row.try_get("site")?;
        let status: String = row.try_get("status")?;
        let spec: serde_json::Value = row.try_get("spec")?;
        let outputs: Option<serde_json::Value> = row.try_get("outputs")?;
        let plan_digest: Option<String> = row.try_get("plan_digest")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        let status: SiteStatus = status.parse().map_err(StackError::storage)?;
        let spec: SiteSpec = serde_json::from_value(spec)
            .map_err(|e| StackError::storage(format!("failed to deserialise spec: {e}")))?;
        let outputs: Option<Outputs> = outputs
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StackError::storage(format!("failed to deserialise outputs: {e}")))?;

        Ok(StackRecord {
            // names were validated before they were written
            handle: StackHandle::new(
                ProjectName::new_unchecked(project),
                SiteName::new_unchecked(site),
            ),
            status,
            spec,
            outputs,
            plan_digest,
            created_at,
            updated_at,
        })
    }
}

#[async_trait]
impl StackStore for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, handle: &StackHandle) -> StackResult<Option<StackRecord>> {
        let row = sqlx::query(
            r"
            SELECT project, site, status, spec, outputs, plan_digest, created_at, updated_at
            FROM stacks
            WHERE project = $1 AND site = $2
            ",
        )
        .bind(handle.project().as_str())
        .bind(handle.site().as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn put(&self, record: &StackRecord) -> StackResult<()> {
        let spec = serde_json::to_value(&record.spec)
            .map_err(|e| StackError::storage(format!("failed to serialise spec: {e}")))?;
        let outputs = record
            .outputs
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StackError::storage(format!("failed to serialise outputs: {e}")))?;

        let mut tx = self.pool.begin().await?;

        if record.status == SiteStatus::Active {
            sqlx::query("INSERT INTO projects (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(record.handle.project().as_str())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r"
            INSERT INTO stacks
                (project, site, status, spec, outputs, plan_digest, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (project, site) DO UPDATE SET
                status = EXCLUDED.status,
                spec = EXCLUDED.spec,
                outputs = EXCLUDED.outputs,
                plan_digest = EXCLUDED.plan_digest,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(record.handle.project().as_str())
        .bind(record.handle.site().as_str())
        .bind(record.status.as_str())
        .bind(spec)
        .bind(outputs)
        .bind(record.plan_digest.as_deref())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn delete(&self, handle: &StackHandle) -> StackResult<bool> {
        let result = sqlx::query("DELETE FROM stacks WHERE project = $1 AND site = $2")
            .bind(handle.project().as_str())
            .bind(handle.site().as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_project(&self, project: &ProjectName) -> StackResult<Vec<StackRecord>> {
        let rows = sqlx::query(
            r"
            SELECT project, site, status, spec, outputs, plan_digest, created_at, updated_at
            FROM stacks
            WHERE project = $1
            ORDER BY site
            ",
        )
        .bind(project.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn project_exists(&self, project: &ProjectName) -> StackResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM projects WHERE name = $1)")
                .bind(project.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }
}
