//! Job schedules: trigger configurations bound to a job.

use serde::{Deserialize, Serialize};
use snojobs_core::error::CoreError;
use snojobs_core::types::{DbId, Timestamp};
use snojobs_core::validation::validate_cron_expression;
use uuid::Uuid;

/// When a schedule should fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Recurring, evaluated by an external clock.
    Cron { expression: String },
    /// A single explicit point in time.
    At { fire_at: Timestamp },
}

impl Trigger {
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Trigger::Cron { expression } => validate_cron_expression(expression),
            Trigger::At { .. } => Ok(()),
        }
    }

    /// Discriminator stored in `job_schedules.trigger_kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Trigger::Cron { .. } => "cron",
            Trigger::At { .. } => "at",
        }
    }
}

/// A row from the `job_schedules` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSchedule {
    pub id: Uuid,
    pub job_id: DbId,
    /// Subject the schedule dispatches as; authorized at every firing.
    pub owner: String,
    pub trigger: Trigger,
    pub is_enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a schedule. New schedules start enabled.
#[derive(Debug, Clone)]
pub struct CreateJobSchedule {
    pub job_id: DbId,
    pub owner: String,
    pub trigger: Trigger,
}
