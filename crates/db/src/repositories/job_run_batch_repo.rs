//! Repository for `job_run_batches` and their ordered members.

use std::collections::HashMap;

use sqlx::{FromRow, PgPool};
use snojobs_core::types::{DbId, Timestamp};

use crate::models::batch::JobRunBatch;

const COLUMNS: &str = "id, created_at, closed_at";

#[derive(Debug, FromRow)]
struct BatchRow {
    id: DbId,
    created_at: Timestamp,
    closed_at: Option<Timestamp>,
}

#[derive(Debug, FromRow)]
struct MemberRow {
    batch_id: DbId,
    run_id: DbId,
}

/// Provides CRUD operations for run batches.
pub struct JobRunBatchRepo;

impl JobRunBatchRepo {
    /// Insert an empty, open batch. The id comes from `BIGSERIAL`.
    pub async fn create(pool: &PgPool) -> Result<JobRunBatch, sqlx::Error> {
        let query = format!("INSERT INTO job_run_batches DEFAULT VALUES RETURNING {COLUMNS}");
        let row = sqlx::query_as::<_, BatchRow>(&query)
            .fetch_one(pool)
            .await?;
        Ok(JobRunBatch {
            id: row.id,
            run_ids: Vec::new(),
            created_at: row.created_at,
            closed_at: row.closed_at,
        })
    }

    /// Append a run at the next position of a batch.
    pub async fn append_run(
        pool: &PgPool,
        batch_id: DbId,
        run_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO job_run_batch_members (batch_id, position, run_id) \
             SELECT $1, COALESCE(MAX(position), 0) + 1, $2 \
             FROM job_run_batch_members WHERE batch_id = $1",
        )
        .bind(batch_id)
        .bind(run_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find a batch with its members.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<JobRunBatch>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_run_batches WHERE id = $1");
        let row = sqlx::query_as::<_, BatchRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        match row {
            Some(row) => Ok(Self::with_members(pool, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Newest batches first. `LIMIT NULL` is unlimited in PostgreSQL, so a
    /// `None` limit returns the full history.
    pub async fn list_recent(
        pool: &PgPool,
        limit: Option<i64>,
    ) -> Result<Vec<JobRunBatch>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_run_batches ORDER BY id DESC LIMIT $1");
        let rows = sqlx::query_as::<_, BatchRow>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Self::with_members(pool, rows).await
    }

    /// Delete a batch no run was created in. Members reference runs, so a
    /// batch without runs has no members either.
    pub async fn delete_if_empty(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM job_run_batches b \
             WHERE b.id = $1 \
               AND NOT EXISTS (SELECT 1 FROM job_runs r WHERE r.batch_id = b.id)",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Stamp `closed_at` once. Returns `true` if this call closed the batch.
    pub async fn close(pool: &PgPool, id: DbId, at: Timestamp) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE job_run_batches SET closed_at = $2 WHERE id = $1 AND closed_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Load the ordered members for `rows`, preserving the order of `rows`.
    async fn with_members(
        pool: &PgPool,
        rows: Vec<BatchRow>,
    ) -> Result<Vec<JobRunBatch>, sqlx::Error> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<DbId> = rows.iter().map(|r| r.id).collect();
        let members = sqlx::query_as::<_, MemberRow>(
            "SELECT batch_id, run_id FROM job_run_batch_members \
             WHERE batch_id = ANY($1) \
             ORDER BY batch_id, position",
        )
        .bind(&ids)
        .fetch_all(pool)
        .await?;

        let mut by_batch: HashMap<DbId, Vec<DbId>> = HashMap::new();
        for member in members {
            by_batch.entry(member.batch_id).or_default().push(member.run_id);
        }

        Ok(rows
            .into_iter()
            .map(|row| JobRunBatch {
                run_ids: by_batch.remove(&row.id).unwrap_or_default(),
                id: row.id,
                created_at: row.created_at,
                closed_at: row.closed_at,
            })
            .collect())
    }
}
