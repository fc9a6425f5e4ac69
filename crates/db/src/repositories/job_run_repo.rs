//! Repository for the `job_runs` table.
//!
//! Status changes go through [`JobRunRepo::transition`], a compare-and-set
//! on `status_id`, so concurrent deliveries for the same run cannot both
//! win.

use sqlx::{FromRow, PgPool};
use snojobs_core::run_status::{RunStatus, StatusId};
use snojobs_core::types::{DbId, Timestamp};
use uuid::Uuid;

use crate::models::job_run::{CreateJobRun, JobRun, RunTransition};

/// Column list for `job_runs` queries.
const COLUMNS: &str = "\
    id, batch_id, job_id, job_name, job_type_key, schedule_id, subject, \
    status_id, parameters, result, error_message, \
    submitted_at, started_at, completed_at, updated_at";

/// Raw `job_runs` row; `status_id` is the SMALLINT lookup id.
#[derive(Debug, FromRow)]
struct JobRunRow {
    id: DbId,
    batch_id: DbId,
    job_id: DbId,
    job_name: String,
    job_type_key: String,
    schedule_id: Option<Uuid>,
    subject: String,
    status_id: StatusId,
    parameters: serde_json::Value,
    result: Option<serde_json::Value>,
    error_message: Option<String>,
    submitted_at: Timestamp,
    started_at: Option<Timestamp>,
    completed_at: Option<Timestamp>,
    updated_at: Timestamp,
}

impl TryFrom<JobRunRow> for JobRun {
    type Error = sqlx::Error;

    fn try_from(row: JobRunRow) -> Result<Self, Self::Error> {
        let status = RunStatus::from_id(row.status_id).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown run status id: {}", row.status_id).into())
        })?;
        Ok(JobRun {
            id: row.id,
            batch_id: row.batch_id,
            job_id: row.job_id,
            job_name: row.job_name,
            job_type_key: row.job_type_key,
            schedule_id: row.schedule_id,
            subject: row.subject,
            status,
            parameters: row.parameters,
            result: row.result,
            error_message: row.error_message,
            submitted_at: row.submitted_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}

/// Provides CRUD operations for job runs.
pub struct JobRunRepo;

impl JobRunRepo {
    /// Insert a run in `Submitted` status.
    pub async fn create(pool: &PgPool, input: &CreateJobRun) -> Result<JobRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO job_runs \
                 (batch_id, job_id, job_name, job_type_key, schedule_id, subject, \
                  status_id, parameters) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRunRow>(&query)
            .bind(input.batch_id)
            .bind(input.job_id)
            .bind(&input.job_name)
            .bind(&input.job_type_key)
            .bind(input.schedule_id)
            .bind(&input.subject)
            .bind(RunStatus::Submitted.id())
            .bind(&input.parameters)
            .fetch_one(pool)
            .await?
            .try_into()
    }

    /// Find a run by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<JobRun>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_runs WHERE id = $1");
        sqlx::query_as::<_, JobRunRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(JobRun::try_from)
            .transpose()
    }

    /// List the runs of a batch in submission order.
    pub async fn list_by_batch(pool: &PgPool, batch_id: DbId) -> Result<Vec<JobRun>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_runs WHERE batch_id = $1 ORDER BY id");
        sqlx::query_as::<_, JobRunRow>(&query)
            .bind(batch_id)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(JobRun::try_from)
            .collect()
    }

    /// Apply a status change only if the row still holds `transition.from`.
    ///
    /// Returns `None` when the guard did not match (another delivery won, or
    /// the run does not exist).
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        transition: &RunTransition,
    ) -> Result<Option<JobRun>, sqlx::Error> {
        let query = format!(
            "UPDATE job_runs \
             SET status_id = $3, updated_at = NOW(), \
                 started_at = CASE WHEN $5 AND started_at IS NULL THEN $4 ELSE started_at END, \
                 completed_at = CASE WHEN $6 THEN $4 ELSE completed_at END, \
                 result = CASE WHEN $6 THEN $7 ELSE result END, \
                 error_message = CASE WHEN $6 THEN $8 ELSE error_message END \
             WHERE id = $1 AND status_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRunRow>(&query)
            .bind(id)
            .bind(transition.from.id())
            .bind(transition.to.id())
            .bind(transition.at)
            .bind(transition.to == RunStatus::Running)
            .bind(transition.to.is_terminal())
            .bind(&transition.result)
            .bind(&transition.error_message)
            .fetch_optional(pool)
            .await?
            .map(JobRun::try_from)
            .transpose()
    }

    /// Number of runs referencing a job type.
    pub async fn count_by_type(pool: &PgPool, job_type_key: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM job_runs WHERE job_type_key = $1")
            .bind(job_type_key)
            .fetch_one(pool)
            .await
    }
}
