//! Job type metadata, either defined locally or advertised by workers.

use serde::{Deserialize, Serialize};
use snojobs_core::types::Timestamp;

/// Where a job type definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeProvenance {
    /// Registered by an operator; never touched by reconciliation.
    Local,
    /// Learned from a worker's `job.metadata` advertisement.
    WorkerAdvertised,
}

impl TypeProvenance {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeProvenance::Local => "local",
            TypeProvenance::WorkerAdvertised => "worker_advertised",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "local" => Some(TypeProvenance::Local),
            "worker_advertised" => Some(TypeProvenance::WorkerAdvertised),
            _ => None,
        }
    }
}

/// A row from the `job_types` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobType {
    /// Primary key.
    pub key: String,
    pub name: String,
    /// Optional parameter schema descriptor, stored opaquely.
    pub schema: Option<serde_json::Value>,
    pub provenance: TypeProvenance,
    /// Set when a worker stopped advertising this type.
    pub is_stale: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobType {
    /// A fresh, non-stale type stamped with `now`.
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        schema: Option<serde_json::Value>,
        provenance: TypeProvenance,
        now: Timestamp,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            schema,
            provenance,
            is_stale: false,
            created_at: now,
            updated_at: now,
        }
    }
}
