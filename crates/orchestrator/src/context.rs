use std::sync::Arc;

use snojobs_core::channels::{CHANNEL_JOB_METADATA, CHANNEL_JOB_RESPONSE};
use snojobs_core::types::DbId;
use snojobs_db::models::batch::JobRunBatch;
use snojobs_db::models::job_run::JobRun;
use snojobs_db::models::whitelist::WhitelistEntry;
use snojobs_db::Storage;
use snojobs_events::{ConsumerRegistry, MessageBus, Publisher, TransportError};

use crate::catalog::JobCatalog;
use crate::config::OrchestratorConfig;
use crate::dispatch::DispatchTransport;
use crate::error::OrchestratorResult;
use crate::listener::ResponseListener;
use crate::reconciler::MetadataReconciler;
use crate::schedule::ScheduleRegistry;
use crate::tracker::RunTracker;
use crate::whitelist::WhitelistGuard;

/// Every orchestration service, wired once at startup.
///
/// Cheaply cloneable; all services are behind `Arc`.
#[derive(Clone)]
pub struct OrchestratorContext {
    pub catalog: Arc<JobCatalog>,
    pub schedules: Arc<ScheduleRegistry>,
    pub whitelist: Arc<WhitelistGuard>,
    pub dispatch: Arc<DispatchTransport>,
    pub tracker: Arc<RunTracker>,
    pub listener: Arc<ResponseListener>,
    pub reconciler: Arc<MetadataReconciler>,
}

impl OrchestratorContext {
    pub fn new(
        config: &OrchestratorConfig,
        store: Arc<dyn Storage>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let timeout = config.storage_timeout;

        let catalog = Arc::new(JobCatalog::new(Arc::clone(&store), timeout));
        let whitelist = Arc::new(WhitelistGuard::new(
            Arc::clone(&store),
            timeout,
            config.whitelist_cache_capacity,
        ));
        let tracker = Arc::new(RunTracker::new(Arc::clone(&store), timeout));
        let dispatch = Arc::new(DispatchTransport::new(
            Arc::clone(&store),
            publisher,
            Arc::clone(&whitelist),
            Arc::clone(&tracker),
            timeout,
        ));
        let schedules = Arc::new(ScheduleRegistry::new(
            Arc::clone(&store),
            Arc::clone(&dispatch),
            timeout,
        ));
        let listener = Arc::new(ResponseListener::new(
            Arc::clone(&store),
            Arc::clone(&tracker),
            timeout,
        ));
        let reconciler = Arc::new(MetadataReconciler::new(store, timeout));

        Self {
            catalog,
            schedules,
            whitelist,
            dispatch,
            tracker,
            listener,
            reconciler,
        }
    }

    /// Subscribe the listener and reconciler to their channels.
    pub fn register_consumers(
        &self,
        bus: &MessageBus,
        registry: &mut ConsumerRegistry,
    ) -> Result<(), TransportError> {
        registry.register(bus, CHANNEL_JOB_RESPONSE, self.listener.clone())?;
        registry.register(bus, CHANNEL_JOB_METADATA, self.reconciler.clone())?;
        Ok(())
    }

    // -- caller-facing operations --------------------------------------------

    pub async fn submit(
        &self,
        subject: &str,
        job_name: &str,
        parameters: serde_json::Value,
    ) -> OrchestratorResult<JobRun> {
        self.dispatch.submit(subject, job_name, parameters).await
    }

    pub async fn get_run(&self, id: DbId) -> OrchestratorResult<JobRun> {
        self.tracker.get_run(id).await
    }

    pub async fn get_batch(&self, id: DbId) -> OrchestratorResult<JobRunBatch> {
        self.tracker.get_batch(id).await
    }

    /// Newest batches first; `None` or a limit below 1 lists them all.
    pub async fn list_recent_batches(
        &self,
        limit: Option<i64>,
    ) -> OrchestratorResult<Vec<JobRunBatch>> {
        self.tracker.get_last_n_batches(limit).await
    }

    pub async fn grant_access(
        &self,
        subject: &str,
        category: &str,
    ) -> OrchestratorResult<WhitelistEntry> {
        self.whitelist.grant(subject, category).await
    }

    pub async fn revoke_access(&self, subject: &str, category: &str) -> OrchestratorResult<bool> {
        self.whitelist.revoke(subject, category).await
    }
}
