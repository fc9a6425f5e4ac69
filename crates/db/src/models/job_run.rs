//! Job runs: one concrete execution of a job.

use serde::Serialize;
use snojobs_core::run_status::RunStatus;
use snojobs_core::types::{DbId, Timestamp};
use uuid::Uuid;

/// A row from the `job_runs` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRun {
    pub id: DbId,
    pub batch_id: DbId,
    pub job_id: DbId,
    /// Job name at submission time. The job may be renamed later.
    pub job_name: String,
    /// Job type key at submission time; keeps the type from being purged.
    pub job_type_key: String,
    pub schedule_id: Option<Uuid>,
    /// Requester the run was authorized for.
    pub subject: String,
    pub status: RunStatus,
    pub parameters: serde_json::Value,
    /// Result payload, populated only on a terminal status.
    pub result: Option<serde_json::Value>,
    /// Error text, populated only on a terminal status.
    pub error_message: Option<String>,
    pub submitted_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

/// DTO for creating a run in `Submitted` status.
#[derive(Debug, Clone)]
pub struct CreateJobRun {
    pub batch_id: DbId,
    pub job_id: DbId,
    pub job_name: String,
    pub job_type_key: String,
    pub schedule_id: Option<Uuid>,
    pub subject: String,
    pub parameters: serde_json::Value,
}

/// A compare-and-set status change: applied only while the stored status
/// still equals `from`.
#[derive(Debug, Clone)]
pub struct RunTransition {
    pub from: RunStatus,
    pub to: RunStatus,
    /// When the change happened (worker timestamp, or local clock).
    pub at: Timestamp,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl JobRun {
    /// Apply `transition` in place, assuming its guard already matched.
    ///
    /// Entering `Running` stamps `started_at` once. A terminal status stamps
    /// `completed_at` and stores the result or error payload.
    pub fn apply(&mut self, transition: &RunTransition, now: Timestamp) {
        self.status = transition.to;
        self.updated_at = now;
        if transition.to == RunStatus::Running && self.started_at.is_none() {
            self.started_at = Some(transition.at);
        }
        if transition.to.is_terminal() {
            self.completed_at = Some(transition.at);
            self.result = transition.result.clone();
            self.error_message = transition.error_message.clone();
        }
    }
}
