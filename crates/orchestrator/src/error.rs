use std::future::Future;
use std::time::Duration;

use snojobs_core::error::CoreError;
use snojobs_db::models::job_run::JobRun;
use snojobs_db::{StoreError, StoreResult};
use snojobs_events::TransportError;

/// Errors returned by the orchestration services.
///
/// Wraps [`CoreError`] for domain failures and adds the infrastructure
/// variants the services can hit: storage, storage timeouts and publish
/// failures after a run was persisted.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A domain-level error from `snojobs_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A storage adapter failure.
    #[error("Storage error: {0}")]
    Store(#[source] StoreError),

    /// A storage call did not complete within the configured timeout.
    #[error("Storage call timed out after {0:?}")]
    StorageTimeout(Duration),

    /// The run was persisted but its request could not be published. The
    /// carried run is already `FAILED_TO_DISPATCH`.
    #[error("Failed to dispatch run {}: {source}", .run.id)]
    Transport {
        run: Box<JobRun>,
        source: TransportError,
    },
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl From<StoreError> for OrchestratorError {
    /// Uniqueness violations are domain conflicts and dangling references
    /// are validation failures; everything else stays an infrastructure
    /// error.
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => OrchestratorError::Core(CoreError::Conflict(msg)),
            StoreError::MissingReference(msg) => {
                OrchestratorError::Core(CoreError::Validation(msg))
            }
            other => OrchestratorError::Store(other),
        }
    }
}

impl OrchestratorError {
    /// The domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            OrchestratorError::Core(core) => Some(core),
            _ => None,
        }
    }
}

/// Await a storage call, failing with [`OrchestratorError::StorageTimeout`]
/// once `limit` elapses.
pub(crate) async fn timed<T, F>(limit: Duration, call: F) -> OrchestratorResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(OrchestratorError::from),
        Err(_) => Err(OrchestratorError::StorageTimeout(limit)),
    }
}
