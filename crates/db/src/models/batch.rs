//! Batches of runs submitted together.

use serde::Serialize;
use snojobs_core::types::{DbId, Timestamp};

/// A row from `job_run_batches` together with its ordered members from
/// `job_run_batch_members`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRunBatch {
    /// Monotonically increasing; never reused.
    pub id: DbId,
    /// Member run ids in submission order. Append-only.
    pub run_ids: Vec<DbId>,
    pub created_at: Timestamp,
    /// Set once every member run reached a terminal status. Informational.
    pub closed_at: Option<Timestamp>,
}

impl JobRunBatch {
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}
