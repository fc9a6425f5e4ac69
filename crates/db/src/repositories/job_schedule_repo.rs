//! Repository for the `job_schedules` table.

use sqlx::{FromRow, PgPool};
use snojobs_core::types::{DbId, Timestamp};
use uuid::Uuid;

use crate::models::schedule::{CreateJobSchedule, JobSchedule, Trigger};

const COLUMNS: &str = "\
    id, job_id, owner, trigger_kind, cron_expr, fire_at, \
    is_enabled, created_at, updated_at";

/// Raw `job_schedules` row; the trigger is spread over three columns.
#[derive(Debug, FromRow)]
struct JobScheduleRow {
    id: Uuid,
    job_id: DbId,
    owner: String,
    trigger_kind: String,
    cron_expr: Option<String>,
    fire_at: Option<Timestamp>,
    is_enabled: bool,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl TryFrom<JobScheduleRow> for JobSchedule {
    type Error = sqlx::Error;

    fn try_from(row: JobScheduleRow) -> Result<Self, Self::Error> {
        let trigger = match (row.trigger_kind.as_str(), row.cron_expr, row.fire_at) {
            ("cron", Some(expression), _) => Trigger::Cron { expression },
            ("at", _, Some(fire_at)) => Trigger::At { fire_at },
            (kind, _, _) => {
                return Err(sqlx::Error::Decode(
                    format!("schedule {} has an incomplete {kind} trigger", row.id).into(),
                ))
            }
        };
        Ok(JobSchedule {
            id: row.id,
            job_id: row.job_id,
            owner: row.owner,
            trigger,
            is_enabled: row.is_enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Split a trigger into its `(cron_expr, fire_at)` columns.
fn trigger_columns(trigger: &Trigger) -> (Option<&str>, Option<Timestamp>) {
    match trigger {
        Trigger::Cron { expression } => (Some(expression.as_str()), None),
        Trigger::At { fire_at } => (None, Some(*fire_at)),
    }
}

/// Provides CRUD operations for job schedules.
pub struct JobScheduleRepo;

impl JobScheduleRepo {
    /// Insert a new, enabled schedule with a freshly generated id.
    pub async fn create(
        pool: &PgPool,
        input: &CreateJobSchedule,
    ) -> Result<JobSchedule, sqlx::Error> {
        let (cron_expr, fire_at) = trigger_columns(&input.trigger);
        let query = format!(
            "INSERT INTO job_schedules (id, job_id, owner, trigger_kind, cron_expr, fire_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobScheduleRow>(&query)
            .bind(Uuid::new_v4())
            .bind(input.job_id)
            .bind(&input.owner)
            .bind(input.trigger.kind())
            .bind(cron_expr)
            .bind(fire_at)
            .fetch_one(pool)
            .await?
            .try_into()
    }

    /// Find a schedule by id.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<JobSchedule>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_schedules WHERE id = $1");
        sqlx::query_as::<_, JobScheduleRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(JobSchedule::try_from)
            .transpose()
    }

    /// List schedules, optionally for a single job, oldest first.
    pub async fn list(
        pool: &PgPool,
        job_id: Option<DbId>,
    ) -> Result<Vec<JobSchedule>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM job_schedules \
             WHERE ($1::BIGINT IS NULL OR job_id = $1) \
             ORDER BY created_at"
        );
        sqlx::query_as::<_, JobScheduleRow>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(JobSchedule::try_from)
            .collect()
    }

    /// Enable or disable a schedule.
    pub async fn set_enabled(
        pool: &PgPool,
        id: Uuid,
        enabled: bool,
    ) -> Result<Option<JobSchedule>, sqlx::Error> {
        let query = format!(
            "UPDATE job_schedules SET is_enabled = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobScheduleRow>(&query)
            .bind(id)
            .bind(enabled)
            .fetch_optional(pool)
            .await?
            .map(JobSchedule::try_from)
            .transpose()
    }

    /// Replace a schedule's trigger.
    pub async fn update_trigger(
        pool: &PgPool,
        id: Uuid,
        trigger: &Trigger,
    ) -> Result<Option<JobSchedule>, sqlx::Error> {
        let (cron_expr, fire_at) = trigger_columns(trigger);
        let query = format!(
            "UPDATE job_schedules \
             SET trigger_kind = $2, cron_expr = $3, fire_at = $4, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobScheduleRow>(&query)
            .bind(id)
            .bind(trigger.kind())
            .bind(cron_expr)
            .bind(fire_at)
            .fetch_optional(pool)
            .await?
            .map(JobSchedule::try_from)
            .transpose()
    }

    /// Delete a schedule. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM job_schedules WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
