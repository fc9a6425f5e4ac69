//! Schedule registry.
//!
//! Deciding when a trigger is due belongs to an external clock, which calls
//! [`ScheduleRegistry::fire_schedule`] to dispatch.

use std::sync::Arc;
use std::time::Duration;

use snojobs_core::error::CoreError;
use snojobs_core::validation::validate_identifier;
use snojobs_db::models::job_run::JobRun;
use snojobs_db::models::schedule::{CreateJobSchedule, JobSchedule, Trigger};
use snojobs_db::store::{JobStore, ScheduleStore};
use snojobs_db::Storage;
use uuid::Uuid;

use crate::dispatch::DispatchTransport;
use crate::error::{timed, OrchestratorResult};

pub struct ScheduleRegistry {
    store: Arc<dyn Storage>,
    dispatch: Arc<DispatchTransport>,
    timeout: Duration,
}

impl ScheduleRegistry {
    pub fn new(
        store: Arc<dyn Storage>,
        dispatch: Arc<DispatchTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            dispatch,
            timeout,
        }
    }

    /// Create an enabled schedule for `job_name`, dispatching as `owner`.
    pub async fn create_schedule(
        &self,
        job_name: &str,
        owner: &str,
        trigger: Trigger,
    ) -> OrchestratorResult<JobSchedule> {
        validate_identifier("Owner", owner)?;
        trigger.validate()?;
        let job = timed(self.timeout, self.store.find_job_by_name(job_name))
            .await?
            .ok_or_else(|| CoreError::not_found("Job", job_name))?;

        let schedule = timed(
            self.timeout,
            self.store.create_schedule(&CreateJobSchedule {
                job_id: job.id,
                owner: owner.to_string(),
                trigger,
            }),
        )
        .await?;
        tracing::info!(
            schedule_id = %schedule.id,
            job = %job.name,
            trigger = schedule.trigger.kind(),
            "Schedule created",
        );
        Ok(schedule)
    }

    pub async fn get_schedule(&self, id: Uuid) -> OrchestratorResult<JobSchedule> {
        timed(self.timeout, self.store.find_schedule(id))
            .await?
            .ok_or_else(|| CoreError::not_found("JobSchedule", id).into())
    }

    pub async fn enable(&self, id: Uuid) -> OrchestratorResult<JobSchedule> {
        self.set_enabled(id, true).await
    }

    pub async fn disable(&self, id: Uuid) -> OrchestratorResult<JobSchedule> {
        self.set_enabled(id, false).await
    }

    pub async fn update_trigger(
        &self,
        id: Uuid,
        trigger: Trigger,
    ) -> OrchestratorResult<JobSchedule> {
        trigger.validate()?;
        let schedule = timed(self.timeout, self.store.update_schedule_trigger(id, &trigger))
            .await?
            .ok_or_else(|| CoreError::not_found("JobSchedule", id))?;
        tracing::info!(schedule_id = %id, trigger = trigger.kind(), "Schedule trigger updated");
        Ok(schedule)
    }

    pub async fn delete_schedule(&self, id: Uuid) -> OrchestratorResult<()> {
        if !timed(self.timeout, self.store.delete_schedule(id)).await? {
            return Err(CoreError::not_found("JobSchedule", id).into());
        }
        tracing::info!(schedule_id = %id, "Schedule deleted");
        Ok(())
    }

    /// All schedules, or those of one job.
    pub async fn list_schedules(
        &self,
        job_name: Option<&str>,
    ) -> OrchestratorResult<Vec<JobSchedule>> {
        match job_name {
            Some(name) => {
                let job = timed(self.timeout, self.store.find_job_by_name(name))
                    .await?
                    .ok_or_else(|| CoreError::not_found("Job", name))?;
                timed(self.timeout, self.store.find_schedules_by_job(job.id)).await
            }
            None => timed(self.timeout, self.store.find_all_schedules()).await,
        }
    }

    /// Dispatch one run for an enabled schedule, as its owner, with empty
    /// parameters.
    pub async fn fire_schedule(&self, id: Uuid) -> OrchestratorResult<JobRun> {
        let schedule = self.get_schedule(id).await?;
        if !schedule.is_enabled {
            return Err(CoreError::Validation(format!("Schedule {id} is disabled")).into());
        }
        let job = timed(self.timeout, self.store.find_job_by_id(schedule.job_id))
            .await?
            .ok_or_else(|| CoreError::not_found("Job", schedule.job_id))?;

        tracing::debug!(schedule_id = %id, job = %job.name, "Firing schedule");
        self.dispatch
            .submit_scheduled(&schedule, &job, serde_json::json!({}))
            .await
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> OrchestratorResult<JobSchedule> {
        let schedule = timed(self.timeout, self.store.set_schedule_enabled(id, enabled))
            .await?
            .ok_or_else(|| CoreError::not_found("JobSchedule", id))?;
        tracing::info!(schedule_id = %id, enabled, "Schedule toggled");
        Ok(schedule)
    }
}
