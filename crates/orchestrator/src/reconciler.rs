//! Metadata reconciler: merges worker-advertised job types into the catalog.
//!
//! Union-merge by key. New keys are added, known worker-advertised keys are
//! refreshed and un-staled, and worker-advertised keys missing from a
//! message are marked stale. A type that was already stale before the
//! message and is still missing is purged once nothing references it; the
//! purge checks references and deletes in one storage call, so a job
//! registered concurrently either lands first and keeps the type alive or
//! finds the type gone. Withdrawing a type that is still referenced is a
//! reconciliation conflict and is logged as one. Locally defined types are
//! never touched. Passes are serialized.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use snojobs_db::models::job_type::{JobType, TypeProvenance};
use snojobs_db::store::{JobStore, JobTypeStore, RunStore};
use snojobs_db::Storage;
use snojobs_events::messages::{AdvertisedJobType, MetadataMessage};
use snojobs_events::MessageHandler;
use tokio::sync::Mutex;

use crate::error::{timed, OrchestratorResult};

/// Keys affected by one reconcile pass, each list sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub refreshed: Vec<String>,
    pub marked_stale: Vec<String>,
    pub purged: Vec<String>,
    /// Stale types kept because a job or run still references them.
    pub retained: Vec<String>,
    /// Withdrawn types that a job or run still references.
    pub conflicts: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.refreshed.is_empty()
            && self.marked_stale.is_empty()
            && self.purged.is_empty()
    }
}

pub struct MetadataReconciler {
    store: Arc<dyn Storage>,
    timeout: Duration,
    lock: Mutex<()>,
}

impl MetadataReconciler {
    pub fn new(store: Arc<dyn Storage>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            lock: Mutex::new(()),
        }
    }

    /// Reconcile the catalog against one worker advertisement.
    pub async fn reconcile(
        &self,
        message: &MetadataMessage,
    ) -> OrchestratorResult<ReconcileReport> {
        let _guard = self.lock.lock().await;
        let now = Utc::now();
        let mut report = ReconcileReport::default();

        // Last advertisement wins for repeated keys.
        let mut advertised: BTreeMap<&str, &AdvertisedJobType> = BTreeMap::new();
        for job_type in &message.job_types {
            if job_type.key.trim().is_empty() {
                tracing::warn!(
                    name = %job_type.name,
                    "Ignoring advertised job type without a key",
                );
                continue;
            }
            advertised.insert(job_type.key.as_str(), job_type);
        }

        let existing = timed(self.timeout, self.store.find_all_job_types()).await?;
        let known: HashSet<&str> = existing.iter().map(|t| t.key.as_str()).collect();

        for (key, adv) in &advertised {
            if known.contains(key) {
                continue;
            }
            let job_type = JobType::new(
                *key,
                adv.name.clone(),
                adv.schema.clone(),
                TypeProvenance::WorkerAdvertised,
                now,
            );
            timed(self.timeout, self.store.save_job_type(&job_type)).await?;
            report.added.push(key.to_string());
        }

        for current in &existing {
            if current.provenance == TypeProvenance::Local {
                if advertised.contains_key(current.key.as_str()) {
                    tracing::debug!(
                        key = %current.key,
                        "Advertised key is locally defined, keeping local definition",
                    );
                }
                continue;
            }

            match advertised.get(current.key.as_str()) {
                Some(adv) => {
                    let unchanged = current.name == adv.name && current.schema == adv.schema;
                    if unchanged && !current.is_stale {
                        continue;
                    }
                    let refreshed = JobType {
                        name: adv.name.clone(),
                        schema: adv.schema.clone(),
                        is_stale: false,
                        updated_at: now,
                        ..current.clone()
                    };
                    timed(self.timeout, self.store.save_job_type(&refreshed)).await?;
                    report.refreshed.push(current.key.clone());
                }
                None if !current.is_stale => {
                    let stale = JobType {
                        is_stale: true,
                        updated_at: now,
                        ..current.clone()
                    };
                    timed(self.timeout, self.store.save_job_type(&stale)).await?;
                    report.marked_stale.push(current.key.clone());

                    if self.is_referenced(&current.key).await? {
                        tracing::warn!(
                            key = %current.key,
                            "ReconciliationConflict: withdrawn job type is still referenced",
                        );
                        report.conflicts.push(current.key.clone());
                    }
                }
                None => {
                    let purged =
                        timed(self.timeout, self.store.purge_stale_job_type(&current.key)).await?;
                    if purged {
                        report.purged.push(current.key.clone());
                        continue;
                    }

                    let now_stored =
                        timed(self.timeout, self.store.find_job_type(&current.key)).await?;
                    let still_stale = now_stored.is_some_and(|t| {
                        t.is_stale && t.provenance == TypeProvenance::WorkerAdvertised
                    });
                    if still_stale {
                        tracing::warn!(
                            key = %current.key,
                            "ReconciliationConflict: stale job type still referenced, kept",
                        );
                        report.retained.push(current.key.clone());
                        report.conflicts.push(current.key.clone());
                    } else {
                        tracing::debug!(
                            key = %current.key,
                            "Job type changed during reconciliation, leaving it",
                        );
                    }
                }
            }
        }

        if report.is_noop() {
            tracing::debug!(advertised = advertised.len(), "Job type metadata unchanged");
        } else {
            tracing::info!(
                added = report.added.len(),
                refreshed = report.refreshed.len(),
                marked_stale = report.marked_stale.len(),
                purged = report.purged.len(),
                retained = report.retained.len(),
                conflicts = report.conflicts.len(),
                "Job type metadata reconciled",
            );
        }
        Ok(report)
    }

    async fn is_referenced(&self, key: &str) -> OrchestratorResult<bool> {
        let jobs = timed(self.timeout, self.store.count_jobs_by_type(key)).await?;
        if jobs > 0 {
            return Ok(true);
        }
        let runs = timed(self.timeout, self.store.count_runs_by_type(key)).await?;
        Ok(runs > 0)
    }
}

#[async_trait]
impl MessageHandler for MetadataReconciler {
    fn name(&self) -> &'static str {
        "metadata-reconciler"
    }

    async fn handle(&self, payload: serde_json::Value) {
        let message: MetadataMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable job metadata");
                return;
            }
        };
        if let Err(e) = self.reconcile(&message).await {
            tracing::error!(error = %e, "Job type reconciliation failed");
        }
    }
}
