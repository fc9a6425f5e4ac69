//! PostgreSQL adapter for the storage ports.
//!
//! Thin delegation onto the repositories; every sqlx error passes through
//! [`StoreError::from_sqlx`] so unique violations surface as conflicts.

use async_trait::async_trait;
use snojobs_core::types::{DbId, Timestamp};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::batch::JobRunBatch;
use crate::models::job::{CreateJob, Job};
use crate::models::job_run::{CreateJobRun, JobRun, RunTransition};
use crate::models::job_type::JobType;
use crate::models::schedule::{CreateJobSchedule, JobSchedule, Trigger};
use crate::models::whitelist::WhitelistEntry;
use crate::repositories::{
    JobRepo, JobRunBatchRepo, JobRunRepo, JobScheduleRepo, JobTypeRepo, WhitelistRepo,
};
use crate::store::{BatchStore, JobStore, JobTypeStore, RunStore, ScheduleStore, WhitelistStore};
use crate::DbPool;

/// Storage backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, input: &CreateJob) -> StoreResult<Job> {
        JobRepo::create(&self.pool, input)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_job_by_id(&self, id: DbId) -> StoreResult<Option<Job>> {
        JobRepo::find_by_id(&self.pool, id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_job_by_name(&self, name: &str) -> StoreResult<Option<Job>> {
        JobRepo::find_by_name(&self.pool, name)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_all_jobs(&self) -> StoreResult<Vec<Job>> {
        JobRepo::list(&self.pool).await.map_err(StoreError::from_sqlx)
    }

    async fn find_jobs_by_category(&self, category: &str) -> StoreResult<Vec<Job>> {
        JobRepo::list_by_category(&self.pool, category)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn rename_job(&self, id: DbId, new_name: &str) -> StoreResult<Option<Job>> {
        JobRepo::rename(&self.pool, id, new_name)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn count_jobs_by_type(&self, job_type_key: &str) -> StoreResult<i64> {
        JobRepo::count_by_type(&self.pool, job_type_key)
            .await
            .map_err(StoreError::from_sqlx)
    }
}

#[async_trait]
impl JobTypeStore for PgStore {
    async fn find_job_type(&self, key: &str) -> StoreResult<Option<JobType>> {
        JobTypeRepo::find_by_key(&self.pool, key)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_all_job_types(&self) -> StoreResult<Vec<JobType>> {
        JobTypeRepo::list(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn save_job_type(&self, job_type: &JobType) -> StoreResult<()> {
        JobTypeRepo::upsert(&self.pool, job_type)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn purge_stale_job_type(&self, key: &str) -> StoreResult<bool> {
        JobTypeRepo::purge_stale(&self.pool, key)
            .await
            .map_err(StoreError::from_sqlx)
    }
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn create_schedule(&self, input: &CreateJobSchedule) -> StoreResult<JobSchedule> {
        JobScheduleRepo::create(&self.pool, input)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_schedule(&self, id: Uuid) -> StoreResult<Option<JobSchedule>> {
        JobScheduleRepo::find_by_id(&self.pool, id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_all_schedules(&self) -> StoreResult<Vec<JobSchedule>> {
        JobScheduleRepo::list(&self.pool, None)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_schedules_by_job(&self, job_id: DbId) -> StoreResult<Vec<JobSchedule>> {
        JobScheduleRepo::list(&self.pool, Some(job_id))
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn set_schedule_enabled(
        &self,
        id: Uuid,
        enabled: bool,
    ) -> StoreResult<Option<JobSchedule>> {
        JobScheduleRepo::set_enabled(&self.pool, id, enabled)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn update_schedule_trigger(
        &self,
        id: Uuid,
        trigger: &Trigger,
    ) -> StoreResult<Option<JobSchedule>> {
        JobScheduleRepo::update_trigger(&self.pool, id, trigger)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn delete_schedule(&self, id: Uuid) -> StoreResult<bool> {
        JobScheduleRepo::delete(&self.pool, id)
            .await
            .map_err(StoreError::from_sqlx)
    }
}

#[async_trait]
impl RunStore for PgStore {
    async fn create_run(&self, input: &CreateJobRun) -> StoreResult<JobRun> {
        JobRunRepo::create(&self.pool, input)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_run(&self, id: DbId) -> StoreResult<Option<JobRun>> {
        JobRunRepo::find_by_id(&self.pool, id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_runs_by_batch(&self, batch_id: DbId) -> StoreResult<Vec<JobRun>> {
        JobRunRepo::list_by_batch(&self.pool, batch_id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn transition_run(
        &self,
        id: DbId,
        transition: &RunTransition,
    ) -> StoreResult<Option<JobRun>> {
        JobRunRepo::transition(&self.pool, id, transition)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn count_runs_by_type(&self, job_type_key: &str) -> StoreResult<i64> {
        JobRunRepo::count_by_type(&self.pool, job_type_key)
            .await
            .map_err(StoreError::from_sqlx)
    }
}

#[async_trait]
impl BatchStore for PgStore {
    async fn create_batch(&self) -> StoreResult<JobRunBatch> {
        JobRunBatchRepo::create(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn append_run_to_batch(&self, batch_id: DbId, run_id: DbId) -> StoreResult<()> {
        JobRunBatchRepo::append_run(&self.pool, batch_id, run_id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_batch(&self, id: DbId) -> StoreResult<Option<JobRunBatch>> {
        JobRunBatchRepo::find_by_id(&self.pool, id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn delete_empty_batch(&self, id: DbId) -> StoreResult<bool> {
        JobRunBatchRepo::delete_if_empty(&self.pool, id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_recent_batches(&self, limit: Option<usize>) -> StoreResult<Vec<JobRunBatch>> {
        let limit = limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX));
        JobRunBatchRepo::list_recent(&self.pool, limit)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn close_batch(&self, id: DbId, at: Timestamp) -> StoreResult<bool> {
        JobRunBatchRepo::close(&self.pool, id, at)
            .await
            .map_err(StoreError::from_sqlx)
    }
}

#[async_trait]
impl WhitelistStore for PgStore {
    async fn insert_entry(
        &self,
        subject: &str,
        category: &str,
    ) -> StoreResult<(WhitelistEntry, bool)> {
        WhitelistRepo::insert(&self.pool, subject, category)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn delete_entry(&self, subject: &str, category: &str) -> StoreResult<bool> {
        WhitelistRepo::delete(&self.pool, subject, category)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_entry(
        &self,
        subject: &str,
        category: &str,
    ) -> StoreResult<Option<WhitelistEntry>> {
        WhitelistRepo::find(&self.pool, subject, category)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_entries(&self, subject: Option<&str>) -> StoreResult<Vec<WhitelistEntry>> {
        WhitelistRepo::list(&self.pool, subject)
            .await
            .map_err(StoreError::from_sqlx)
    }
}
