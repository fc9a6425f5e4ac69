//! Response listener: applies worker reports from `job.response` to the run
//! state machine.
//!
//! Deliveries may be duplicated, reordered and handled concurrently. Every
//! change is a compare-and-set on the status just read; losing the race
//! reloads the run and re-evaluates, so a run never regresses and a
//! duplicate terminal report is a no-op.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use snojobs_core::run_status::state_machine::can_transition;
use snojobs_core::run_status::RunStatus;
use snojobs_db::models::job_run::RunTransition;
use snojobs_db::store::RunStore;
use snojobs_db::Storage;
use snojobs_events::messages::RunResponse;
use snojobs_events::MessageHandler;

use crate::error::{timed, OrchestratorResult};
use crate::tracker::RunTracker;

/// What became of one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// The run moved to this status.
    Applied(RunStatus),
    /// No run with that id.
    UnknownRun,
    /// The run was already terminal; typically a redelivery.
    AlreadyTerminal,
    /// The reported status is not ahead of the stored one.
    Stale,
    /// Workers may not report this status.
    Rejected,
}

pub struct ResponseListener {
    store: Arc<dyn Storage>,
    tracker: Arc<RunTracker>,
    timeout: Duration,
}

impl ResponseListener {
    pub fn new(store: Arc<dyn Storage>, tracker: Arc<RunTracker>, timeout: Duration) -> Self {
        Self {
            store,
            tracker,
            timeout,
        }
    }

    /// Apply one decoded response.
    pub async fn apply(&self, response: &RunResponse) -> OrchestratorResult<ResponseOutcome> {
        let run_id = response.run_id;
        if !response.status.is_worker_reportable() {
            tracing::warn!(
                run_id,
                status = %response.status,
                "Discarding response with a status workers may not report",
            );
            return Ok(ResponseOutcome::Rejected);
        }

        loop {
            let Some(run) = timed(self.timeout, self.store.find_run(run_id)).await? else {
                tracing::warn!(run_id, "Discarding response for unknown run");
                return Ok(ResponseOutcome::UnknownRun);
            };

            if run.status.is_terminal() {
                tracing::warn!(
                    run_id,
                    status = %run.status,
                    reported = %response.status,
                    "Discarding response for terminal run",
                );
                return Ok(ResponseOutcome::AlreadyTerminal);
            }
            if !can_transition(run.status, response.status) {
                tracing::warn!(
                    run_id,
                    status = %run.status,
                    reported = %response.status,
                    "Discarding stale response",
                );
                return Ok(ResponseOutcome::Stale);
            }

            let transition = RunTransition {
                from: run.status,
                to: response.status,
                at: response.timestamp,
                result: response.result.clone(),
                error_message: response.error.clone(),
            };
            let Some(updated) =
                timed(self.timeout, self.store.transition_run(run_id, &transition)).await?
            else {
                // Lost a race with a concurrent delivery; re-read and decide again.
                continue;
            };

            if updated.status.is_terminal() {
                tracing::info!(
                    run_id,
                    batch_id = updated.batch_id,
                    status = %updated.status,
                    "Run finished",
                );
                self.tracker.refresh_batch_closure(updated.batch_id).await?;
            } else {
                tracing::debug!(
                    run_id,
                    from = %transition.from,
                    to = %updated.status,
                    "Run status advanced",
                );
            }
            return Ok(ResponseOutcome::Applied(updated.status));
        }
    }
}

#[async_trait]
impl MessageHandler for ResponseListener {
    fn name(&self) -> &'static str {
        "response-listener"
    }

    async fn handle(&self, payload: serde_json::Value) {
        let response: RunResponse = match serde_json::from_value(payload) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable job response");
                return;
            }
        };
        if let Err(e) = self.apply(&response).await {
            tracing::error!(run_id = response.run_id, error = %e, "Failed to apply job response");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use snojobs_db::models::job_run::{CreateJobRun, JobRun};
    use snojobs_db::store::BatchStore;
    use snojobs_db::MemoryStore;
    use tracing_test::traced_test;

    use super::*;

    struct Fixture {
        store: Arc<MemoryStore>,
        listener: ResponseListener,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let tracker = Arc::new(RunTracker::new(store.clone(), Duration::from_secs(1)));
        let listener = ResponseListener::new(store.clone(), tracker, Duration::from_secs(1));
        Fixture { store, listener }
    }

    async fn submitted_run(store: &MemoryStore) -> JobRun {
        let batch = store.create_batch().await.unwrap();
        let run = store
            .create_run(&CreateJobRun {
                batch_id: batch.id,
                job_id: 1,
                job_name: "classify-123".into(),
                job_type_key: "classification".into(),
                schedule_id: None,
                subject: "alice".into(),
                parameters: serde_json::json!({}),
            })
            .await
            .unwrap();
        store.append_run_to_batch(batch.id, run.id).await.unwrap();
        run
    }

    fn response(run_id: i64, status: RunStatus) -> RunResponse {
        RunResponse {
            run_id,
            status,
            result: None,
            error: None,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    // -----------------------------------------------------------------------
    // Outcomes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn forward_report_is_applied() {
        let f = fixture();
        let run = submitted_run(&f.store).await;
        let outcome = f.listener.apply(&response(run.id, RunStatus::Running)).await.unwrap();
        assert_eq!(outcome, ResponseOutcome::Applied(RunStatus::Running));

        let stored = f.store.find_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.started_at, Some(response(run.id, RunStatus::Running).timestamp));
    }

    #[tokio::test]
    async fn unknown_run_is_discarded() {
        let f = fixture();
        let outcome = f.listener.apply(&response(404, RunStatus::Completed)).await.unwrap();
        assert_eq!(outcome, ResponseOutcome::UnknownRun);
    }

    #[tokio::test]
    async fn behind_or_equal_status_is_stale() {
        let f = fixture();
        let run = submitted_run(&f.store).await;
        f.listener.apply(&response(run.id, RunStatus::Running)).await.unwrap();

        assert_eq!(
            f.listener.apply(&response(run.id, RunStatus::Dispatched)).await.unwrap(),
            ResponseOutcome::Stale
        );
        assert_eq!(
            f.listener.apply(&response(run.id, RunStatus::Running)).await.unwrap(),
            ResponseOutcome::Stale
        );
    }

    #[tokio::test]
    async fn worker_cannot_report_transport_statuses() {
        let f = fixture();
        let run = submitted_run(&f.store).await;
        for status in [RunStatus::Submitted, RunStatus::FailedToDispatch] {
            assert_eq!(
                f.listener.apply(&response(run.id, status)).await.unwrap(),
                ResponseOutcome::Rejected
            );
        }
        let stored = f.store.find_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Submitted);
    }

    #[tokio::test]
    async fn terminal_report_closes_single_run_batch() {
        let f = fixture();
        let run = submitted_run(&f.store).await;
        let mut failed = response(run.id, RunStatus::Failed);
        failed.error = Some("classifier crashed".into());

        f.listener.apply(&failed).await.unwrap();

        let stored = f.store.find_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("classifier crashed"));
        assert_eq!(stored.completed_at, Some(failed.timestamp));
        assert!(f.store.find_batch(run.batch_id).await.unwrap().unwrap().is_closed());
    }

    // -----------------------------------------------------------------------
    // Anomaly logging
    // -----------------------------------------------------------------------

    /// Passes if some captured line is a WARN record carrying `message`.
    fn warned(lines: &[&str], message: &str) -> Result<(), String> {
        if lines.iter().any(|l| l.contains("WARN") && l.contains(message)) {
            Ok(())
        } else {
            Err(format!("no WARN line containing {message:?}"))
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn duplicate_terminal_delivery_warns() {
        let f = fixture();
        let run = submitted_run(&f.store).await;
        f.listener.apply(&response(run.id, RunStatus::Completed)).await.unwrap();
        f.listener.apply(&response(run.id, RunStatus::Completed)).await.unwrap();

        logs_assert(|lines: &[&str]| warned(lines, "Discarding response for terminal run"));
    }

    #[tokio::test]
    #[traced_test]
    async fn out_of_order_delivery_warns() {
        let f = fixture();
        let run = submitted_run(&f.store).await;
        f.listener.apply(&response(run.id, RunStatus::Running)).await.unwrap();
        f.listener.apply(&response(run.id, RunStatus::Dispatched)).await.unwrap();

        logs_assert(|lines: &[&str]| warned(lines, "Discarding stale response"));
    }

    // -----------------------------------------------------------------------
    // Handler
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn undecodable_payload_is_ignored() {
        let f = fixture();
        let run = submitted_run(&f.store).await;
        f.listener
            .handle(serde_json::json!({"runId": run.id, "status": "EXPLODED"}))
            .await;
        let stored = f.store.find_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Submitted);
    }

    #[tokio::test]
    async fn handler_applies_decoded_payload() {
        let f = fixture();
        let run = submitted_run(&f.store).await;
        f.listener
            .handle(serde_json::json!({
                "runId": run.id,
                "status": "COMPLETED",
                "result": "ok",
                "timestamp": "2026-03-01T12:00:00Z"
            }))
            .await;
        let stored = f.store.find_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert_eq!(stored.result, Some(serde_json::json!("ok")));
    }
}
