//! Repository for the `jobs` table.

use sqlx::PgPool;
use snojobs_core::types::DbId;

use crate::models::job::{CreateJob, Job};

/// Column list for `jobs` queries.
const COLUMNS: &str = "id, name, category, job_type_key, created_at, updated_at";

/// Provides CRUD operations for catalog jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job. Duplicate names violate `uq_jobs_name`.
    pub async fn create(pool: &PgPool, input: &CreateJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (name, category, job_type_key) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.name)
            .bind(&input.category)
            .bind(&input.job_type_key)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job by its unique name.
    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE name = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// List every job, ordered by name.
    pub async fn list(pool: &PgPool) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs ORDER BY name");
        sqlx::query_as::<_, Job>(&query).fetch_all(pool).await
    }

    /// List jobs of one category, ordered by name.
    pub async fn list_by_category(pool: &PgPool, category: &str) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE category = $1 ORDER BY name");
        sqlx::query_as::<_, Job>(&query)
            .bind(category)
            .fetch_all(pool)
            .await
    }

    /// Administrative rename. Returns `None` if no job has this ID.
    pub async fn rename(
        pool: &PgPool,
        id: DbId,
        new_name: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs SET name = $2, updated_at = NOW() WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(new_name)
            .fetch_optional(pool)
            .await
    }

    /// Number of jobs referencing a job type.
    pub async fn count_by_type(pool: &PgPool, job_type_key: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs WHERE job_type_key = $1")
            .bind(job_type_key)
            .fetch_one(pool)
            .await
    }
}
