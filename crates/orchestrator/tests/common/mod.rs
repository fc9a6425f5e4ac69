//! Shared fixtures for the orchestrator integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use snojobs_core::channels::CHANNEL_JOB_REQUEST;
use snojobs_core::run_status::RunStatus;
use snojobs_core::types::{DbId, Timestamp};
use snojobs_db::models::batch::JobRunBatch;
use snojobs_db::models::job::{CreateJob, Job};
use snojobs_db::models::job_run::{CreateJobRun, JobRun, RunTransition};
use snojobs_db::models::job_type::JobType;
use snojobs_db::models::schedule::{CreateJobSchedule, JobSchedule, Trigger};
use snojobs_db::models::whitelist::WhitelistEntry;
use snojobs_db::store::{
    BatchStore, JobStore, JobTypeStore, RunStore, ScheduleStore, WhitelistStore,
};
use snojobs_db::{MemoryStore, StoreError, StoreResult};
use snojobs_events::messages::{RunRequest, RunResponse};
use snojobs_events::{Envelope, MessageBus, Publisher, TransportError};
use snojobs_orchestrator::{OrchestratorConfig, OrchestratorContext};
use tokio::sync::broadcast;
use uuid::Uuid;

pub const JOB: &str = "classify-123";
pub const CATEGORY: &str = "authoring";
pub const SUBJECT: &str = "alice";

/// A manager on the in-memory store with a fake worker subscribed to
/// `job.request`.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub bus: Arc<MessageBus>,
    pub worker: broadcast::Receiver<Envelope>,
    pub ctx: OrchestratorContext,
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        storage_timeout: Duration::from_secs(2),
        ..OrchestratorConfig::default()
    }
}

/// Harness with job [`JOB`] in [`CATEGORY`] and [`SUBJECT`] whitelisted.
pub async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MessageBus::default());
    let worker = bus
        .subscribe(CHANNEL_JOB_REQUEST)
        .expect("request channel exists");
    let ctx = OrchestratorContext::new(&test_config(), store.clone(), bus.clone());
    seed(&ctx).await;
    Harness {
        store,
        bus,
        worker,
        ctx,
    }
}

/// Context whose publisher always fails.
pub async fn failing_context() -> (
    Arc<MemoryStore>,
    Arc<FailingPublisher>,
    OrchestratorContext,
) {
    let store = Arc::new(MemoryStore::new());
    let publisher = Arc::new(FailingPublisher::default());
    let ctx = OrchestratorContext::new(&test_config(), store.clone(), publisher.clone());
    seed(&ctx).await;
    (store, publisher, ctx)
}

/// Seeded context over an [`InstrumentedStore`], with a fake worker
/// subscribed to `job.request`.
pub async fn instrumented_context(
    store: Arc<InstrumentedStore>,
) -> (OrchestratorContext, broadcast::Receiver<Envelope>) {
    let bus = Arc::new(MessageBus::default());
    let worker = bus
        .subscribe(CHANNEL_JOB_REQUEST)
        .expect("request channel exists");
    let ctx = OrchestratorContext::new(&test_config(), store, bus);
    seed(&ctx).await;
    (ctx, worker)
}

pub async fn seed(ctx: &OrchestratorContext) {
    ctx.catalog
        .define_job_type("classification", "Classification", None)
        .await
        .unwrap();
    ctx.catalog
        .register_job(CreateJob {
            name: JOB.into(),
            category: CATEGORY.into(),
            job_type_key: "classification".into(),
        })
        .await
        .unwrap();
    ctx.grant_access(SUBJECT, CATEGORY).await.unwrap();
}

/// Next request the fake worker received.
pub fn next_request(worker: &mut broadcast::Receiver<Envelope>) -> RunRequest {
    let envelope = worker.try_recv().expect("a run request was published");
    serde_json::from_value(envelope.payload).expect("run request decodes")
}

pub fn response(run_id: DbId, status: RunStatus) -> RunResponse {
    RunResponse {
        run_id,
        status,
        result: None,
        error: None,
        timestamp: Utc::now(),
    }
}

pub fn completed(run_id: DbId, result: serde_json::Value) -> RunResponse {
    RunResponse {
        result: Some(result),
        ..response(run_id, RunStatus::Completed)
    }
}

/// Publisher that rejects every message, counting attempts.
#[derive(Default)]
pub struct FailingPublisher {
    pub attempts: AtomicUsize,
}

impl FailingPublisher {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for FailingPublisher {
    async fn publish(
        &self,
        channel: &str,
        _payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Publish(format!("broker unavailable for {channel}")))
    }
}

// ---------------------------------------------------------------------------
// Instrumented store
// ---------------------------------------------------------------------------

/// Memory store with fault injection and read accounting.
///
/// - `create_run` fails once `run_budget` successful calls were made
/// - `find_entry` sleeps `lookup_delay` after reading
/// - recent-batch scans count the batch records they return
pub struct InstrumentedStore {
    pub inner: MemoryStore,
    run_budget: AtomicUsize,
    lookup_delay: Duration,
    batch_records_read: AtomicUsize,
}

impl Default for InstrumentedStore {
    fn default() -> Self {
        Self {
            inner: MemoryStore::new(),
            run_budget: AtomicUsize::new(usize::MAX),
            lookup_delay: Duration::ZERO,
            batch_records_read: AtomicUsize::new(0),
        }
    }
}

impl InstrumentedStore {
    /// Store whose `create_run` succeeds `budget` times, then fails.
    pub fn with_run_budget(budget: usize) -> Self {
        Self {
            run_budget: AtomicUsize::new(budget),
            ..Self::default()
        }
    }

    /// Store whose whitelist lookups take `delay`.
    pub fn with_lookup_delay(delay: Duration) -> Self {
        Self {
            lookup_delay: delay,
            ..Self::default()
        }
    }

    /// Batch records read by recent-batch scans since the last call.
    pub fn take_batch_reads(&self) -> usize {
        self.batch_records_read.swap(0, Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStore for InstrumentedStore {
    async fn create_job(&self, input: &CreateJob) -> StoreResult<Job> {
        self.inner.create_job(input).await
    }
    async fn find_job_by_id(&self, id: DbId) -> StoreResult<Option<Job>> {
        self.inner.find_job_by_id(id).await
    }
    async fn find_job_by_name(&self, name: &str) -> StoreResult<Option<Job>> {
        self.inner.find_job_by_name(name).await
    }
    async fn find_all_jobs(&self) -> StoreResult<Vec<Job>> {
        self.inner.find_all_jobs().await
    }
    async fn find_jobs_by_category(&self, category: &str) -> StoreResult<Vec<Job>> {
        self.inner.find_jobs_by_category(category).await
    }
    async fn rename_job(&self, id: DbId, new_name: &str) -> StoreResult<Option<Job>> {
        self.inner.rename_job(id, new_name).await
    }
    async fn count_jobs_by_type(&self, job_type_key: &str) -> StoreResult<i64> {
        self.inner.count_jobs_by_type(job_type_key).await
    }
}

#[async_trait]
impl JobTypeStore for InstrumentedStore {
    async fn find_job_type(&self, key: &str) -> StoreResult<Option<JobType>> {
        self.inner.find_job_type(key).await
    }
    async fn find_all_job_types(&self) -> StoreResult<Vec<JobType>> {
        self.inner.find_all_job_types().await
    }
    async fn save_job_type(&self, job_type: &JobType) -> StoreResult<()> {
        self.inner.save_job_type(job_type).await
    }
    async fn purge_stale_job_type(&self, key: &str) -> StoreResult<bool> {
        self.inner.purge_stale_job_type(key).await
    }
}

#[async_trait]
impl ScheduleStore for InstrumentedStore {
    async fn create_schedule(&self, input: &CreateJobSchedule) -> StoreResult<JobSchedule> {
        self.inner.create_schedule(input).await
    }
    async fn find_schedule(&self, id: Uuid) -> StoreResult<Option<JobSchedule>> {
        self.inner.find_schedule(id).await
    }
    async fn find_all_schedules(&self) -> StoreResult<Vec<JobSchedule>> {
        self.inner.find_all_schedules().await
    }
    async fn find_schedules_by_job(&self, job_id: DbId) -> StoreResult<Vec<JobSchedule>> {
        self.inner.find_schedules_by_job(job_id).await
    }
    async fn set_schedule_enabled(
        &self,
        id: Uuid,
        enabled: bool,
    ) -> StoreResult<Option<JobSchedule>> {
        self.inner.set_schedule_enabled(id, enabled).await
    }
    async fn update_schedule_trigger(
        &self,
        id: Uuid,
        trigger: &Trigger,
    ) -> StoreResult<Option<JobSchedule>> {
        self.inner.update_schedule_trigger(id, trigger).await
    }
    async fn delete_schedule(&self, id: Uuid) -> StoreResult<bool> {
        self.inner.delete_schedule(id).await
    }
}

#[async_trait]
impl RunStore for InstrumentedStore {
    async fn create_run(&self, input: &CreateJobRun) -> StoreResult<JobRun> {
        let granted = self
            .run_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !granted {
            return Err(StoreError::Corrupt("disk full".into()));
        }
        self.inner.create_run(input).await
    }
    async fn find_run(&self, id: DbId) -> StoreResult<Option<JobRun>> {
        self.inner.find_run(id).await
    }
    async fn find_runs_by_batch(&self, batch_id: DbId) -> StoreResult<Vec<JobRun>> {
        self.inner.find_runs_by_batch(batch_id).await
    }
    async fn transition_run(
        &self,
        id: DbId,
        transition: &RunTransition,
    ) -> StoreResult<Option<JobRun>> {
        self.inner.transition_run(id, transition).await
    }
    async fn count_runs_by_type(&self, job_type_key: &str) -> StoreResult<i64> {
        self.inner.count_runs_by_type(job_type_key).await
    }
}

#[async_trait]
impl BatchStore for InstrumentedStore {
    async fn create_batch(&self) -> StoreResult<JobRunBatch> {
        self.inner.create_batch().await
    }
    async fn append_run_to_batch(&self, batch_id: DbId, run_id: DbId) -> StoreResult<()> {
        self.inner.append_run_to_batch(batch_id, run_id).await
    }
    async fn find_batch(&self, id: DbId) -> StoreResult<Option<JobRunBatch>> {
        self.inner.find_batch(id).await
    }
    async fn delete_empty_batch(&self, id: DbId) -> StoreResult<bool> {
        self.inner.delete_empty_batch(id).await
    }
    async fn find_recent_batches(&self, limit: Option<usize>) -> StoreResult<Vec<JobRunBatch>> {
        let batches = self.inner.find_recent_batches(limit).await?;
        self.batch_records_read
            .fetch_add(batches.len(), Ordering::SeqCst);
        Ok(batches)
    }
    async fn close_batch(&self, id: DbId, at: Timestamp) -> StoreResult<bool> {
        self.inner.close_batch(id, at).await
    }
}

#[async_trait]
impl WhitelistStore for InstrumentedStore {
    async fn insert_entry(
        &self,
        subject: &str,
        category: &str,
    ) -> StoreResult<(WhitelistEntry, bool)> {
        self.inner.insert_entry(subject, category).await
    }
    async fn delete_entry(&self, subject: &str, category: &str) -> StoreResult<bool> {
        self.inner.delete_entry(subject, category).await
    }
    async fn find_entry(
        &self,
        subject: &str,
        category: &str,
    ) -> StoreResult<Option<WhitelistEntry>> {
        let entry = self.inner.find_entry(subject, category).await;
        if !self.lookup_delay.is_zero() {
            tokio::time::sleep(self.lookup_delay).await;
        }
        entry
    }
    async fn find_entries(&self, subject: Option<&str>) -> StoreResult<Vec<WhitelistEntry>> {
        self.inner.find_entries(subject).await
    }
}
