//! Job catalog entries.

use serde::{Deserialize, Serialize};
use snojobs_core::types::{DbId, Timestamp};
use sqlx::FromRow;
use validator::Validate;

/// A row from the `jobs` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    /// Unique, renameable by administrators.
    pub name: String,
    pub category: String,
    pub job_type_key: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering a job.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateJob {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(length(min = 1, max = 128))]
    pub category: String,
    #[validate(length(min = 1, max = 128))]
    pub job_type_key: String,
}
