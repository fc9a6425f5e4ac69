//! Storage ports.
//!
//! One async trait per entity. The orchestration services only ever talk
//! to these traits; [`MemoryStore`](crate::MemoryStore) and
//! [`PgStore`](crate::PgStore) are the two adapters.

use async_trait::async_trait;
use snojobs_core::types::{DbId, Timestamp};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::batch::JobRunBatch;
use crate::models::job::{CreateJob, Job};
use crate::models::job_run::{CreateJobRun, JobRun, RunTransition};
use crate::models::job_type::JobType;
use crate::models::schedule::{CreateJobSchedule, JobSchedule, Trigger};
use crate::models::whitelist::WhitelistEntry;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job. Fails with `StoreError::Conflict` on a duplicate name
    /// and `StoreError::MissingReference` if its job type does not exist.
    async fn create_job(&self, input: &CreateJob) -> StoreResult<Job>;
    async fn find_job_by_id(&self, id: DbId) -> StoreResult<Option<Job>>;
    async fn find_job_by_name(&self, name: &str) -> StoreResult<Option<Job>>;
    /// All jobs ordered by name.
    async fn find_all_jobs(&self) -> StoreResult<Vec<Job>>;
    /// Jobs in `category` ordered by name.
    async fn find_jobs_by_category(&self, category: &str) -> StoreResult<Vec<Job>>;
    /// Rename a job. `None` if the id is unknown; `Conflict` if taken.
    async fn rename_job(&self, id: DbId, new_name: &str) -> StoreResult<Option<Job>>;
    async fn count_jobs_by_type(&self, job_type_key: &str) -> StoreResult<i64>;
}

#[async_trait]
pub trait JobTypeStore: Send + Sync {
    async fn find_job_type(&self, key: &str) -> StoreResult<Option<JobType>>;
    /// All types ordered by key.
    async fn find_all_job_types(&self) -> StoreResult<Vec<JobType>>;
    /// Insert or fully replace the type with the same key.
    async fn save_job_type(&self, job_type: &JobType) -> StoreResult<()>;
    /// Atomically delete a stale, worker-advertised type that no job or run
    /// references. Returns `false` (and deletes nothing) if any of those
    /// conditions does not hold at the moment of deletion.
    async fn purge_stale_job_type(&self, key: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create_schedule(&self, input: &CreateJobSchedule) -> StoreResult<JobSchedule>;
    async fn find_schedule(&self, id: Uuid) -> StoreResult<Option<JobSchedule>>;
    /// All schedules ordered by creation time.
    async fn find_all_schedules(&self) -> StoreResult<Vec<JobSchedule>>;
    async fn find_schedules_by_job(&self, job_id: DbId) -> StoreResult<Vec<JobSchedule>>;
    async fn set_schedule_enabled(
        &self,
        id: Uuid,
        enabled: bool,
    ) -> StoreResult<Option<JobSchedule>>;
    async fn update_schedule_trigger(
        &self,
        id: Uuid,
        trigger: &Trigger,
    ) -> StoreResult<Option<JobSchedule>>;
    async fn delete_schedule(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Allocate an id and insert the run in `Submitted` status.
    async fn create_run(&self, input: &CreateJobRun) -> StoreResult<JobRun>;
    async fn find_run(&self, id: DbId) -> StoreResult<Option<JobRun>>;
    /// Runs of one batch in submission (id) order.
    async fn find_runs_by_batch(&self, batch_id: DbId) -> StoreResult<Vec<JobRun>>;
    /// Compare-and-set: apply `transition` only if the stored status still
    /// equals `transition.from`. Returns the updated run, or `None` when the
    /// run is unknown or the guard did not match.
    async fn transition_run(
        &self,
        id: DbId,
        transition: &RunTransition,
    ) -> StoreResult<Option<JobRun>>;
    async fn count_runs_by_type(&self, job_type_key: &str) -> StoreResult<i64>;
}

#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Allocate the next batch id and insert an empty, open batch.
    async fn create_batch(&self) -> StoreResult<JobRunBatch>;
    /// Append a run id to the end of a batch's member list.
    async fn append_run_to_batch(&self, batch_id: DbId, run_id: DbId) -> StoreResult<()>;
    async fn find_batch(&self, id: DbId) -> StoreResult<Option<JobRunBatch>>;
    /// Delete a batch that no run was ever created in. Returns `true` if
    /// the batch was removed.
    async fn delete_empty_batch(&self, id: DbId) -> StoreResult<bool>;
    /// Batches by id descending. With `Some(limit)` at most `limit` batch
    /// records are read.
    async fn find_recent_batches(&self, limit: Option<usize>) -> StoreResult<Vec<JobRunBatch>>;
    /// Set `closed_at` if not already set. Returns `true` if this call closed it.
    async fn close_batch(&self, id: DbId, at: Timestamp) -> StoreResult<bool>;
}

#[async_trait]
pub trait WhitelistStore: Send + Sync {
    /// Insert `(subject, category)` unless present. The flag is `true` when
    /// a new row was created.
    async fn insert_entry(
        &self,
        subject: &str,
        category: &str,
    ) -> StoreResult<(WhitelistEntry, bool)>;
    async fn delete_entry(&self, subject: &str, category: &str) -> StoreResult<bool>;
    async fn find_entry(
        &self,
        subject: &str,
        category: &str,
    ) -> StoreResult<Option<WhitelistEntry>>;
    /// Entries, optionally filtered by subject, ordered by id.
    async fn find_entries(&self, subject: Option<&str>) -> StoreResult<Vec<WhitelistEntry>>;
}

/// Every storage port behind one object, as injected into the services.
pub trait Storage:
    JobStore + JobTypeStore + ScheduleStore + RunStore + BatchStore + WhitelistStore
{
}

impl<T> Storage for T where
    T: JobStore + JobTypeStore + ScheduleStore + RunStore + BatchStore + WhitelistStore
{
}
