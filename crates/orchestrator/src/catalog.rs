//! Job catalog: job definitions and job type metadata.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use snojobs_core::error::CoreError;
use snojobs_core::types::DbId;
use snojobs_core::validation::{validate_identifier, validate_job_name};
use snojobs_db::models::job::{CreateJob, Job};
use snojobs_db::models::job_type::{JobType, TypeProvenance};
use snojobs_db::store::{JobStore, JobTypeStore};
use snojobs_db::Storage;
use validator::Validate;

use crate::error::{timed, OrchestratorResult};

/// Registry of [`Job`] definitions and the [`JobType`]s they reference.
pub struct JobCatalog {
    store: Arc<dyn Storage>,
    timeout: Duration,
}

impl JobCatalog {
    pub fn new(store: Arc<dyn Storage>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Register a new job. The name must be unique and the type must exist.
    pub async fn register_job(&self, input: CreateJob) -> OrchestratorResult<Job> {
        input
            .validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        validate_job_name(&input.name)?;
        validate_identifier("category", &input.category)?;

        let job_type = timed(self.timeout, self.store.find_job_type(&input.job_type_key)).await?;
        if job_type.is_none() {
            return Err(CoreError::Validation(format!(
                "Unknown job type: {}",
                input.job_type_key
            ))
            .into());
        }

        let job = timed(self.timeout, self.store.create_job(&input)).await?;
        tracing::info!(
            job_id = job.id,
            name = %job.name,
            category = %job.category,
            job_type = %job.job_type_key,
            "Job registered",
        );
        Ok(job)
    }

    /// Find a job by name.
    pub async fn lookup_job(&self, name: &str) -> OrchestratorResult<Job> {
        timed(self.timeout, self.store.find_job_by_name(name))
            .await?
            .ok_or_else(|| CoreError::not_found("Job", name).into())
    }

    pub async fn find_job(&self, id: DbId) -> OrchestratorResult<Job> {
        timed(self.timeout, self.store.find_job_by_id(id))
            .await?
            .ok_or_else(|| CoreError::not_found("Job", id).into())
    }

    /// All jobs, or only those in `category`, ordered by name.
    pub async fn list_jobs(&self, category: Option<&str>) -> OrchestratorResult<Vec<Job>> {
        match category {
            Some(category) => timed(self.timeout, self.store.find_jobs_by_category(category)).await,
            None => timed(self.timeout, self.store.find_all_jobs()).await,
        }
    }

    /// Administrative rename. Runs reference the job by id, so their
    /// history stays attached.
    pub async fn rename_job(&self, old_name: &str, new_name: &str) -> OrchestratorResult<Job> {
        validate_job_name(new_name)?;
        let job = self.lookup_job(old_name).await?;
        if job.name == new_name {
            return Ok(job);
        }

        let renamed = timed(self.timeout, self.store.rename_job(job.id, new_name))
            .await?
            .ok_or_else(|| CoreError::not_found("Job", old_name))?;
        tracing::info!(job_id = renamed.id, from = %old_name, to = %new_name, "Job renamed");
        Ok(renamed)
    }

    /// Define (or redefine) a locally owned job type.
    ///
    /// A worker-advertised type with the same key is taken over: it becomes
    /// local, loses its stale marker and is no longer touched by metadata
    /// reconciliation.
    pub async fn define_job_type(
        &self,
        key: &str,
        name: &str,
        schema: Option<serde_json::Value>,
    ) -> OrchestratorResult<JobType> {
        validate_identifier("job type key", key)?;
        validate_identifier("job type name", name)?;

        let now = Utc::now();
        let job_type = match timed(self.timeout, self.store.find_job_type(key)).await? {
            Some(existing) => JobType {
                name: name.to_string(),
                schema,
                provenance: TypeProvenance::Local,
                is_stale: false,
                updated_at: now,
                ..existing
            },
            None => JobType::new(key, name, schema, TypeProvenance::Local, now),
        };

        timed(self.timeout, self.store.save_job_type(&job_type)).await?;
        tracing::info!(key = %job_type.key, "Local job type defined");
        Ok(job_type)
    }

    /// Every job type, stale ones included, ordered by key.
    pub async fn list_job_types(&self) -> OrchestratorResult<Vec<JobType>> {
        timed(self.timeout, self.store.find_all_job_types()).await
    }
}
