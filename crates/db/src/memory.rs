//! In-memory storage adapter.
//!
//! Each collection sits behind its own `tokio::sync::RwLock`; ids come from
//! atomic counters so concurrent creators never share an id. The
//! compare-and-set on run status happens under the runs write lock, which
//! serializes competing transitions for the same run.
//!
//! Paths that hold more than one lock take them in declaration order
//! (job types, jobs, runs, batches).

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use snojobs_core::run_status::RunStatus;
use snojobs_core::types::{DbId, Timestamp};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::batch::JobRunBatch;
use crate::models::job::{CreateJob, Job};
use crate::models::job_run::{CreateJobRun, JobRun, RunTransition};
use crate::models::job_type::{JobType, TypeProvenance};
use crate::models::schedule::{CreateJobSchedule, JobSchedule, Trigger};
use crate::models::whitelist::WhitelistEntry;
use crate::store::{
    BatchStore, JobStore, JobTypeStore, RunStore, ScheduleStore, WhitelistStore,
};

/// Embedded store keeping every entity in process memory.
#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<BTreeMap<DbId, Job>>,
    job_types: RwLock<BTreeMap<String, JobType>>,
    schedules: RwLock<HashMap<Uuid, JobSchedule>>,
    runs: RwLock<BTreeMap<DbId, JobRun>>,
    batches: RwLock<BTreeMap<DbId, JobRunBatch>>,
    whitelist: RwLock<BTreeMap<DbId, WhitelistEntry>>,
    next_job_id: AtomicI64,
    next_run_id: AtomicI64,
    next_batch_id: AtomicI64,
    next_entry_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(counter: &AtomicI64) -> DbId {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, input: &CreateJob) -> StoreResult<Job> {
        let job_types = self.job_types.read().await;
        if !job_types.contains_key(&input.job_type_key) {
            return Err(StoreError::MissingReference(format!(
                "Job type does not exist: {}",
                input.job_type_key
            )));
        }
        let mut jobs = self.jobs.write().await;
        if jobs.values().any(|j| j.name == input.name) {
            return Err(StoreError::Conflict(format!(
                "Job name already exists: {}",
                input.name
            )));
        }
        let now = Utc::now();
        let job = Job {
            id: Self::next_id(&self.next_job_id),
            name: input.name.clone(),
            category: input.category.clone(),
            job_type_key: input.job_type_key.clone(),
            created_at: now,
            updated_at: now,
        };
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_job_by_id(&self, id: DbId) -> StoreResult<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn find_job_by_name(&self, name: &str) -> StoreResult<Option<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.values().find(|j| j.name == name).cloned())
    }

    async fn find_all_jobs(&self) -> StoreResult<Vec<Job>> {
        let mut all: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn find_jobs_by_category(&self, category: &str) -> StoreResult<Vec<Job>> {
        let mut matching: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.category == category)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matching)
    }

    async fn rename_job(&self, id: DbId, new_name: &str) -> StoreResult<Option<Job>> {
        let mut jobs = self.jobs.write().await;
        if jobs.values().any(|j| j.name == new_name && j.id != id) {
            return Err(StoreError::Conflict(format!(
                "Job name already exists: {new_name}"
            )));
        }
        Ok(jobs.get_mut(&id).map(|job| {
            job.name = new_name.to_string();
            job.updated_at = Utc::now();
            job.clone()
        }))
    }

    async fn count_jobs_by_type(&self, job_type_key: &str) -> StoreResult<i64> {
        let jobs = self.jobs.read().await;
        Ok(jobs.values().filter(|j| j.job_type_key == job_type_key).count() as i64)
    }
}

// ---------------------------------------------------------------------------
// Job types
// ---------------------------------------------------------------------------

#[async_trait]
impl JobTypeStore for MemoryStore {
    async fn find_job_type(&self, key: &str) -> StoreResult<Option<JobType>> {
        Ok(self.job_types.read().await.get(key).cloned())
    }

    async fn find_all_job_types(&self) -> StoreResult<Vec<JobType>> {
        Ok(self.job_types.read().await.values().cloned().collect())
    }

    async fn save_job_type(&self, job_type: &JobType) -> StoreResult<()> {
        self.job_types
            .write()
            .await
            .insert(job_type.key.clone(), job_type.clone());
        Ok(())
    }

    async fn purge_stale_job_type(&self, key: &str) -> StoreResult<bool> {
        let mut job_types = self.job_types.write().await;
        let purgeable = job_types
            .get(key)
            .is_some_and(|t| t.is_stale && t.provenance == TypeProvenance::WorkerAdvertised);
        if !purgeable {
            return Ok(false);
        }

        let jobs = self.jobs.read().await;
        if jobs.values().any(|j| j.job_type_key == key) {
            return Ok(false);
        }
        let runs = self.runs.read().await;
        if runs.values().any(|r| r.job_type_key == key) {
            return Ok(false);
        }

        job_types.remove(key);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn create_schedule(&self, input: &CreateJobSchedule) -> StoreResult<JobSchedule> {
        let now = Utc::now();
        let schedule = JobSchedule {
            id: Uuid::new_v4(),
            job_id: input.job_id,
            owner: input.owner.clone(),
            trigger: input.trigger.clone(),
            is_enabled: true,
            created_at: now,
            updated_at: now,
        };
        self.schedules
            .write()
            .await
            .insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn find_schedule(&self, id: Uuid) -> StoreResult<Option<JobSchedule>> {
        Ok(self.schedules.read().await.get(&id).cloned())
    }

    async fn find_all_schedules(&self) -> StoreResult<Vec<JobSchedule>> {
        let mut all: Vec<JobSchedule> = self.schedules.read().await.values().cloned().collect();
        all.sort_by_key(|s| s.created_at);
        Ok(all)
    }

    async fn find_schedules_by_job(&self, job_id: DbId) -> StoreResult<Vec<JobSchedule>> {
        let mut matching: Vec<JobSchedule> = self
            .schedules
            .read()
            .await
            .values()
            .filter(|s| s.job_id == job_id)
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.created_at);
        Ok(matching)
    }

    async fn set_schedule_enabled(
        &self,
        id: Uuid,
        enabled: bool,
    ) -> StoreResult<Option<JobSchedule>> {
        let mut schedules = self.schedules.write().await;
        Ok(schedules.get_mut(&id).map(|s| {
            s.is_enabled = enabled;
            s.updated_at = Utc::now();
            s.clone()
        }))
    }

    async fn update_schedule_trigger(
        &self,
        id: Uuid,
        trigger: &Trigger,
    ) -> StoreResult<Option<JobSchedule>> {
        let mut schedules = self.schedules.write().await;
        Ok(schedules.get_mut(&id).map(|s| {
            s.trigger = trigger.clone();
            s.updated_at = Utc::now();
            s.clone()
        }))
    }

    async fn delete_schedule(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.schedules.write().await.remove(&id).is_some())
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run(&self, input: &CreateJobRun) -> StoreResult<JobRun> {
        let now = Utc::now();
        let run = JobRun {
            id: Self::next_id(&self.next_run_id),
            batch_id: input.batch_id,
            job_id: input.job_id,
            job_name: input.job_name.clone(),
            job_type_key: input.job_type_key.clone(),
            schedule_id: input.schedule_id,
            subject: input.subject.clone(),
            status: RunStatus::Submitted,
            parameters: input.parameters.clone(),
            result: None,
            error_message: None,
            submitted_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        };
        self.runs.write().await.insert(run.id, run.clone());
        Ok(run)
    }

    async fn find_run(&self, id: DbId) -> StoreResult<Option<JobRun>> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn find_runs_by_batch(&self, batch_id: DbId) -> StoreResult<Vec<JobRun>> {
        let runs = self.runs.read().await;
        Ok(runs
            .values()
            .filter(|r| r.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn transition_run(
        &self,
        id: DbId,
        transition: &RunTransition,
    ) -> StoreResult<Option<JobRun>> {
        let mut runs = self.runs.write().await;
        match runs.get_mut(&id) {
            Some(run) if run.status == transition.from => {
                run.apply(transition, Utc::now());
                Ok(Some(run.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn count_runs_by_type(&self, job_type_key: &str) -> StoreResult<i64> {
        let runs = self.runs.read().await;
        Ok(runs
            .values()
            .filter(|r| r.job_type_key == job_type_key)
            .count() as i64)
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[async_trait]
impl BatchStore for MemoryStore {
    async fn create_batch(&self) -> StoreResult<JobRunBatch> {
        let mut batches = self.batches.write().await;
        let batch = JobRunBatch {
            id: Self::next_id(&self.next_batch_id),
            run_ids: Vec::new(),
            created_at: Utc::now(),
            closed_at: None,
        };
        batches.insert(batch.id, batch.clone());
        Ok(batch)
    }

    async fn append_run_to_batch(&self, batch_id: DbId, run_id: DbId) -> StoreResult<()> {
        let mut batches = self.batches.write().await;
        let batch = batches
            .get_mut(&batch_id)
            .ok_or_else(|| StoreError::Corrupt(format!("Batch {batch_id} does not exist")))?;
        batch.run_ids.push(run_id);
        Ok(())
    }

    async fn find_batch(&self, id: DbId) -> StoreResult<Option<JobRunBatch>> {
        Ok(self.batches.read().await.get(&id).cloned())
    }

    async fn delete_empty_batch(&self, id: DbId) -> StoreResult<bool> {
        let runs = self.runs.read().await;
        if runs.values().any(|r| r.batch_id == id) {
            return Ok(false);
        }
        let mut batches = self.batches.write().await;
        match batches.get(&id) {
            Some(batch) if batch.run_ids.is_empty() => {
                batches.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_recent_batches(&self, limit: Option<usize>) -> StoreResult<Vec<JobRunBatch>> {
        let batches = self.batches.read().await;
        let newest_first = batches.values().rev().cloned();
        Ok(match limit {
            Some(n) => newest_first.take(n).collect(),
            None => newest_first.collect(),
        })
    }

    async fn close_batch(&self, id: DbId, at: Timestamp) -> StoreResult<bool> {
        let mut batches = self.batches.write().await;
        match batches.get_mut(&id) {
            Some(batch) if batch.closed_at.is_none() => {
                batch.closed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Whitelist
// ---------------------------------------------------------------------------

#[async_trait]
impl WhitelistStore for MemoryStore {
    async fn insert_entry(
        &self,
        subject: &str,
        category: &str,
    ) -> StoreResult<(WhitelistEntry, bool)> {
        let mut entries = self.whitelist.write().await;
        if let Some(existing) = entries
            .values()
            .find(|e| e.subject == subject && e.category == category)
        {
            return Ok((existing.clone(), false));
        }
        let entry = WhitelistEntry {
            id: Self::next_id(&self.next_entry_id),
            subject: subject.to_string(),
            category: category.to_string(),
            created_at: Utc::now(),
        };
        entries.insert(entry.id, entry.clone());
        Ok((entry, true))
    }

    async fn delete_entry(&self, subject: &str, category: &str) -> StoreResult<bool> {
        let mut entries = self.whitelist.write().await;
        let before = entries.len();
        entries.retain(|_, e| !(e.subject == subject && e.category == category));
        Ok(entries.len() < before)
    }

    async fn find_entry(
        &self,
        subject: &str,
        category: &str,
    ) -> StoreResult<Option<WhitelistEntry>> {
        let entries = self.whitelist.read().await;
        Ok(entries
            .values()
            .find(|e| e.subject == subject && e.category == category)
            .cloned())
    }

    async fn find_entries(&self, subject: Option<&str>) -> StoreResult<Vec<WhitelistEntry>> {
        let entries = self.whitelist.read().await;
        Ok(entries
            .values()
            .filter(|e| subject.map_or(true, |s| e.subject == s))
            .cloned()
            .collect())
    }
}
