//! Run tracker and batch query service.
//!
//! Read-only paths over the run and batch stores, plus the batch closure
//! check shared by the dispatch and response paths. Nothing here touches
//! the message transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use snojobs_core::error::CoreError;
use snojobs_core::limits::normalize_limit;
use snojobs_core::types::DbId;
use snojobs_db::models::batch::JobRunBatch;
use snojobs_db::models::job_run::JobRun;
use snojobs_db::store::{BatchStore, RunStore};
use snojobs_db::Storage;

use crate::error::{timed, OrchestratorResult};

pub struct RunTracker {
    store: Arc<dyn Storage>,
    timeout: Duration,
}

impl RunTracker {
    pub fn new(store: Arc<dyn Storage>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn get_run(&self, id: DbId) -> OrchestratorResult<JobRun> {
        timed(self.timeout, self.store.find_run(id))
            .await?
            .ok_or_else(|| CoreError::not_found("JobRun", id).into())
    }

    pub async fn get_batch(&self, id: DbId) -> OrchestratorResult<JobRunBatch> {
        timed(self.timeout, self.store.find_batch(id))
            .await?
            .ok_or_else(|| CoreError::not_found("JobRunBatch", id).into())
    }

    /// Most recent batches first.
    ///
    /// `None` or a limit below 1 returns every batch; otherwise exactly
    /// `min(limit, total)` batches, and the store is asked for no more.
    pub async fn get_last_n_batches(
        &self,
        limit: Option<i64>,
    ) -> OrchestratorResult<Vec<JobRunBatch>> {
        let limit = normalize_limit(limit);
        timed(self.timeout, self.store.find_recent_batches(limit)).await
    }

    /// Runs of a batch in submission order.
    pub async fn list_batch_runs(&self, batch_id: DbId) -> OrchestratorResult<Vec<JobRun>> {
        let batch = self.get_batch(batch_id).await?;
        let runs = timed(self.timeout, self.store.find_runs_by_batch(batch_id)).await?;

        let mut by_id: HashMap<DbId, JobRun> = runs.into_iter().map(|r| (r.id, r)).collect();
        Ok(batch
            .run_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect())
    }

    /// Close the batch if every member run is terminal.
    ///
    /// Returns `true` only for the call that actually closed it. The flag
    /// is informational; nothing is locked by it.
    pub async fn refresh_batch_closure(&self, batch_id: DbId) -> OrchestratorResult<bool> {
        let batch = self.get_batch(batch_id).await?;
        if batch.is_closed() || batch.run_ids.is_empty() {
            return Ok(false);
        }

        let runs = self.list_batch_runs(batch_id).await?;
        let all_terminal =
            runs.len() == batch.run_ids.len() && runs.iter().all(|r| r.status.is_terminal());
        if !all_terminal {
            return Ok(false);
        }

        let closed = timed(self.timeout, self.store.close_batch(batch_id, Utc::now())).await?;
        if closed {
            tracing::info!(batch_id, runs = runs.len(), "Batch closed");
        }
        Ok(closed)
    }
}
