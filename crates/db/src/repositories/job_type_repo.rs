//! Repository for the `job_types` table.

use sqlx::{FromRow, PgPool};
use snojobs_core::types::Timestamp;

use crate::error::StoreError;
use crate::models::job_type::{JobType, TypeProvenance};

const COLUMNS: &str = "key, name, schema, provenance, is_stale, created_at, updated_at";

/// Raw `job_types` row; `provenance` is stored as TEXT.
#[derive(Debug, FromRow)]
struct JobTypeRow {
    key: String,
    name: String,
    schema: Option<serde_json::Value>,
    provenance: String,
    is_stale: bool,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl TryFrom<JobTypeRow> for JobType {
    type Error = sqlx::Error;

    fn try_from(row: JobTypeRow) -> Result<Self, Self::Error> {
        let provenance = TypeProvenance::parse(&row.provenance).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown job type provenance: {}", row.provenance).into())
        })?;
        Ok(JobType {
            key: row.key,
            name: row.name,
            schema: row.schema,
            provenance,
            is_stale: row.is_stale,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Provides CRUD operations for job types.
pub struct JobTypeRepo;

impl JobTypeRepo {
    /// Find a type by key.
    pub async fn find_by_key(pool: &PgPool, key: &str) -> Result<Option<JobType>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_types WHERE key = $1");
        sqlx::query_as::<_, JobTypeRow>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await?
            .map(JobType::try_from)
            .transpose()
    }

    /// List every type, ordered by key.
    pub async fn list(pool: &PgPool) -> Result<Vec<JobType>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_types ORDER BY key");
        sqlx::query_as::<_, JobTypeRow>(&query)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(JobType::try_from)
            .collect()
    }

    /// Insert a type or replace every mutable column of an existing one.
    pub async fn upsert(pool: &PgPool, job_type: &JobType) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO job_types \
             (key, name, schema, provenance, is_stale, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (key) DO UPDATE \
             SET name = EXCLUDED.name, schema = EXCLUDED.schema, \
                 provenance = EXCLUDED.provenance, is_stale = EXCLUDED.is_stale, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(&job_type.key)
        .bind(&job_type.name)
        .bind(&job_type.schema)
        .bind(job_type.provenance.as_str())
        .bind(job_type.is_stale)
        .bind(job_type.created_at)
        .bind(job_type.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete a stale, worker-advertised type nothing references, in one
    /// statement. Returns `true` if a row was removed.
    ///
    /// A job inserted concurrently holds a key-share lock on the type row;
    /// the delete then trips `fk_jobs_job_type` and reports `false`.
    pub async fn purge_stale(pool: &PgPool, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM job_types t \
             WHERE t.key = $1 AND t.is_stale AND t.provenance = 'worker_advertised' \
               AND NOT EXISTS (SELECT 1 FROM jobs j WHERE j.job_type_key = t.key) \
               AND NOT EXISTS (SELECT 1 FROM job_runs r WHERE r.job_type_key = t.key)",
        )
        .bind(key)
        .execute(pool)
        .await;
        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(e) if StoreError::is_foreign_key_violation(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
