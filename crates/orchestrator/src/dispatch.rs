//! Dispatch transport: the only place that creates job runs or appends to
//! batches.
//!
//! A submission resolves the job, consults the whitelist, persists the run
//! (and its batch) in `SUBMITTED`, and only then publishes the request on
//! `job.request`. Every member is appended to its batch before the first
//! request goes out, so a fast worker response can never observe a
//! partially assembled batch. No lock is held while publishing.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use snojobs_core::channels::{CHANNEL_JOB_CANCEL, CHANNEL_JOB_REQUEST};
use snojobs_core::error::CoreError;
use snojobs_core::run_status::RunStatus;
use snojobs_core::types::DbId;
use snojobs_db::models::job::Job;
use snojobs_db::models::job_run::{CreateJobRun, JobRun, RunTransition};
use snojobs_db::models::schedule::JobSchedule;
use snojobs_db::store::{BatchStore, JobStore, RunStore};
use snojobs_db::Storage;
use snojobs_events::messages::{CancelRequest, RunRequest};
use snojobs_events::{publish_message, Publisher, TransportError};
use uuid::Uuid;

use crate::error::{timed, OrchestratorError, OrchestratorResult};
use crate::tracker::RunTracker;
use crate::whitelist::WhitelistGuard;

/// One entry of a grouped submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub job_name: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Result of [`DispatchTransport::submit_many`].
#[derive(Debug, Clone)]
pub struct SubmittedBatch {
    pub batch_id: DbId,
    /// Runs in submission order. Runs whose request could not be published
    /// are already `FAILED_TO_DISPATCH`.
    pub runs: Vec<JobRun>,
}

impl SubmittedBatch {
    pub fn failed_to_dispatch(&self) -> impl Iterator<Item = &JobRun> {
        self.runs
            .iter()
            .filter(|r| r.status == RunStatus::FailedToDispatch)
    }
}

pub struct DispatchTransport {
    store: Arc<dyn Storage>,
    publisher: Arc<dyn Publisher>,
    whitelist: Arc<WhitelistGuard>,
    tracker: Arc<RunTracker>,
    timeout: Duration,
}

impl DispatchTransport {
    pub fn new(
        store: Arc<dyn Storage>,
        publisher: Arc<dyn Publisher>,
        whitelist: Arc<WhitelistGuard>,
        tracker: Arc<RunTracker>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            whitelist,
            tracker,
            timeout,
        }
    }

    /// Submit one run of `job_name` on behalf of `subject`, in a batch of
    /// its own.
    ///
    /// Fails with `UnknownJob` or `NotAuthorized` before anything is
    /// persisted. A publish failure returns [`OrchestratorError::Transport`]
    /// carrying the run, already moved to `FAILED_TO_DISPATCH`.
    pub async fn submit(
        &self,
        subject: &str,
        job_name: &str,
        parameters: serde_json::Value,
    ) -> OrchestratorResult<JobRun> {
        let job = self.resolve(job_name).await?;
        self.ensure_authorized(subject, &job).await?;
        self.dispatch_single(subject, &job, parameters, None).await
    }

    /// Submit several runs as one batch.
    ///
    /// Every job is resolved and authorized before anything is persisted.
    /// Publish failures are per run: the failed run becomes
    /// `FAILED_TO_DISPATCH` and the remaining runs are still sent. If the
    /// batch cannot be fully persisted nothing is sent, the runs already
    /// stored are failed and the storage error is returned.
    pub async fn submit_many(
        &self,
        subject: &str,
        requests: Vec<SubmitRequest>,
    ) -> OrchestratorResult<SubmittedBatch> {
        if requests.is_empty() {
            return Err(CoreError::Validation("At least one job must be submitted".into()).into());
        }

        let mut resolved = Vec::with_capacity(requests.len());
        for request in requests {
            let job = self.resolve(&request.job_name).await?;
            self.ensure_authorized(subject, &job).await?;
            resolved.push((job, request.parameters));
        }

        let batch = timed(self.timeout, self.store.create_batch()).await?;
        let mut runs = self.persist_members(batch.id, subject, resolved, None).await?;

        let mut failures = 0usize;
        for run in &mut runs {
            if let Err(e) = self.publish_request(run).await {
                *run = self.fail_dispatch(run, &e).await?;
                failures += 1;
            }
        }
        if failures > 0 {
            self.tracker.refresh_batch_closure(batch.id).await?;
        }

        tracing::info!(
            batch_id = batch.id,
            subject,
            runs = runs.len(),
            failures,
            "Batch submitted",
        );
        Ok(SubmittedBatch {
            batch_id: batch.id,
            runs,
        })
    }

    /// Dispatch one run for a schedule, as the schedule's owner.
    pub async fn submit_scheduled(
        &self,
        schedule: &JobSchedule,
        job: &Job,
        parameters: serde_json::Value,
    ) -> OrchestratorResult<JobRun> {
        self.ensure_authorized(&schedule.owner, job).await?;
        self.dispatch_single(&schedule.owner, job, parameters, Some(schedule.id))
            .await
    }

    /// Ask the worker to stop a run.
    ///
    /// Returns `false` without publishing when the run is already terminal.
    /// The run only becomes `CANCELLED` once the worker confirms on
    /// `job.response`.
    pub async fn request_cancel(&self, run_id: DbId) -> OrchestratorResult<bool> {
        let run = self.tracker.get_run(run_id).await?;
        if run.status.is_terminal() {
            tracing::debug!(run_id, status = %run.status, "Cancel ignored for terminal run");
            return Ok(false);
        }

        let message = CancelRequest { run_id };
        if let Err(source) =
            publish_message(self.publisher.as_ref(), CHANNEL_JOB_CANCEL, &message).await
        {
            tracing::error!(run_id, error = %source, "Failed to publish cancel request");
            return Err(OrchestratorError::Transport {
                run: Box::new(run),
                source,
            });
        }

        tracing::info!(run_id, "Cancel requested");
        Ok(true)
    }

    // -- internals -----------------------------------------------------------

    async fn resolve(&self, job_name: &str) -> OrchestratorResult<Job> {
        timed(self.timeout, self.store.find_job_by_name(job_name))
            .await?
            .ok_or_else(|| CoreError::UnknownJob(job_name.to_string()).into())
    }

    async fn ensure_authorized(&self, subject: &str, job: &Job) -> OrchestratorResult<()> {
        if self.whitelist.authorize(subject, job).await? {
            return Ok(());
        }
        tracing::warn!(
            subject,
            job = %job.name,
            category = %job.category,
            "Dispatch denied by whitelist",
        );
        Err(CoreError::NotAuthorized {
            subject: subject.to_string(),
            category: job.category.clone(),
        }
        .into())
    }

    async fn dispatch_single(
        &self,
        subject: &str,
        job: &Job,
        parameters: serde_json::Value,
        schedule_id: Option<Uuid>,
    ) -> OrchestratorResult<JobRun> {
        let batch = timed(self.timeout, self.store.create_batch()).await?;
        let run = self
            .persist_members(batch.id, subject, vec![(job.clone(), parameters)], schedule_id)
            .await?
            .pop()
            .ok_or_else(|| CoreError::Internal(format!("Batch {} has no run", batch.id)))?;

        if let Err(source) = self.publish_request(&run).await {
            let failed = self.fail_dispatch(&run, &source).await?;
            self.tracker.refresh_batch_closure(batch.id).await?;
            return Err(OrchestratorError::Transport {
                run: Box::new(failed),
                source,
            });
        }

        tracing::info!(
            run_id = run.id,
            batch_id = batch.id,
            job = %job.name,
            subject,
            "Run submitted",
        );
        Ok(run)
    }

    /// Create one run per member and append each to the batch, in order.
    ///
    /// On a storage failure the batch is abandoned before the error is
    /// returned: runs already created become `FAILED_TO_DISPATCH` and the
    /// batch is closed, or deleted if no run was created in it.
    async fn persist_members(
        &self,
        batch_id: DbId,
        subject: &str,
        members: Vec<(Job, serde_json::Value)>,
        schedule_id: Option<Uuid>,
    ) -> OrchestratorResult<Vec<JobRun>> {
        let mut runs: Vec<JobRun> = Vec::with_capacity(members.len());
        for (job, parameters) in members {
            let input = CreateJobRun {
                batch_id,
                job_id: job.id,
                job_name: job.name,
                job_type_key: job.job_type_key,
                schedule_id,
                subject: subject.to_string(),
                parameters,
            };
            let run = match timed(self.timeout, self.store.create_run(&input)).await {
                Ok(run) => run,
                Err(e) => return Err(self.abandon_batch(batch_id, &runs, e).await),
            };
            let run_id = run.id;
            runs.push(run);

            let appended = timed(self.timeout, self.store.append_run_to_batch(batch_id, run_id));
            if let Err(e) = appended.await {
                return Err(self.abandon_batch(batch_id, &runs, e).await);
            }
        }
        Ok(runs)
    }

    /// Undo a partially persisted batch, then hand back `error`.
    ///
    /// Storage is likely unhealthy at this point, so follow-up failures are
    /// logged and do not replace the original error.
    async fn abandon_batch(
        &self,
        batch_id: DbId,
        created: &[JobRun],
        error: OrchestratorError,
    ) -> OrchestratorError {
        tracing::error!(
            batch_id,
            created = created.len(),
            error = %error,
            "Failed to persist batch, abandoning it",
        );

        if created.is_empty() {
            let discarded = timed(self.timeout, self.store.delete_empty_batch(batch_id)).await;
            if let Err(e) = discarded {
                tracing::error!(batch_id, error = %e, "Failed to discard empty batch");
            }
            return error;
        }

        let reason = format!("Batch could not be persisted: {error}");
        let mut all_failed = true;
        for run in created {
            let transition = RunTransition {
                from: RunStatus::Submitted,
                to: RunStatus::FailedToDispatch,
                at: Utc::now(),
                result: None,
                error_message: Some(reason.clone()),
            };
            match timed(self.timeout, self.store.transition_run(run.id, &transition)).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::warn!(run_id = run.id, "Abandoned run was no longer SUBMITTED");
                }
                Err(e) => {
                    all_failed = false;
                    tracing::error!(run_id = run.id, error = %e, "Failed to fail abandoned run");
                }
            }
        }

        // Members are a prefix of `created`, all of which are now terminal.
        if all_failed {
            let closed = timed(self.timeout, self.store.close_batch(batch_id, Utc::now())).await;
            if let Err(e) = closed {
                tracing::error!(batch_id, error = %e, "Failed to close abandoned batch");
            }
        }
        error
    }

    async fn publish_request(&self, run: &JobRun) -> Result<(), TransportError> {
        let message = RunRequest {
            run_id: run.id,
            job_name: run.job_name.clone(),
            parameters: run.parameters.clone(),
        };
        publish_message(self.publisher.as_ref(), CHANNEL_JOB_REQUEST, &message).await
    }

    /// Move a freshly persisted run to `FAILED_TO_DISPATCH`.
    ///
    /// If the guard no longer matches (the request reached a worker after
    /// all and it already reported), the stored run is returned as is.
    async fn fail_dispatch(
        &self,
        run: &JobRun,
        error: &TransportError,
    ) -> OrchestratorResult<JobRun> {
        tracing::error!(run_id = run.id, error = %error, "Failed to publish run request");

        let transition = RunTransition {
            from: RunStatus::Submitted,
            to: RunStatus::FailedToDispatch,
            at: Utc::now(),
            result: None,
            error_message: Some(error.to_string()),
        };
        match timed(self.timeout, self.store.transition_run(run.id, &transition)).await? {
            Some(failed) => Ok(failed),
            None => self.tracker.get_run(run.id).await,
        }
    }
}
