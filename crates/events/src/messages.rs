//! Payloads exchanged with workers on the `job.*` channels.
//!
//! All payloads are JSON objects with camelCase field names. Parsing is
//! strict about required fields so malformed deliveries are rejected at the
//! edge; callers log and discard them.

use serde::{Deserialize, Serialize};
use snojobs_core::run_status::RunStatus;
use snojobs_core::types::{DbId, Timestamp};

/// `job.request`: ask a worker to execute a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub run_id: DbId,
    pub job_name: String,
    pub parameters: serde_json::Value,
}

/// `job.response`: a worker's report on a run's progress or outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub run_id: DbId,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

/// One job type as advertised by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertisedJobType {
    pub name: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
}

/// `job.metadata`: the complete set of job types a worker can execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataMessage {
    pub job_types: Vec<AdvertisedJobType>,
}

/// `job.cancel`: best-effort request to stop a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub run_id: DbId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_completed_response_with_result() {
        let json = serde_json::json!({
            "runId": 42,
            "status": "COMPLETED",
            "result": "ok",
            "timestamp": "2026-03-01T12:00:00Z"
        });
        let msg: RunResponse = serde_json::from_value(json).unwrap();
        assert_eq!(msg.run_id, 42);
        assert_eq!(msg.status, RunStatus::Completed);
        assert_eq!(msg.result, Some(serde_json::json!("ok")));
        assert!(msg.error.is_none());
    }

    #[test]
    fn parse_failed_response_with_error() {
        let json = serde_json::json!({
            "runId": 7,
            "status": "FAILED",
            "error": "classifier crashed",
            "timestamp": "2026-03-01T12:00:00Z"
        });
        let msg: RunResponse = serde_json::from_value(json).unwrap();
        assert_eq!(msg.status, RunStatus::Failed);
        assert_eq!(msg.error.as_deref(), Some("classifier crashed"));
    }

    #[test]
    fn response_with_unknown_status_is_rejected() {
        let json = serde_json::json!({
            "runId": 7,
            "status": "EXPLODED",
            "timestamp": "2026-03-01T12:00:00Z"
        });
        assert!(serde_json::from_value::<RunResponse>(json).is_err());
    }

    #[test]
    fn response_without_run_id_is_rejected() {
        let json = serde_json::json!({
            "status": "RUNNING",
            "timestamp": "2026-03-01T12:00:00Z"
        });
        assert!(serde_json::from_value::<RunResponse>(json).is_err());
    }

    #[test]
    fn request_serializes_camel_case() {
        let req = RunRequest {
            run_id: 3,
            job_name: "classify-123".into(),
            parameters: serde_json::json!({"branch": "MAIN"}),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["runId"], 3);
        assert_eq!(json["jobName"], "classify-123");
        assert_eq!(json["parameters"]["branch"], "MAIN");
    }

    #[test]
    fn parse_metadata_with_optional_schema() {
        let json = serde_json::json!({
            "jobTypes": [
                {"name": "Classification", "key": "classification",
                 "schema": {"type": "object"}},
                {"name": "Report", "key": "report"}
            ]
        });
        let msg: MetadataMessage = serde_json::from_value(json).unwrap();
        assert_eq!(msg.job_types.len(), 2);
        assert!(msg.job_types[0].schema.is_some());
        assert!(msg.job_types[1].schema.is_none());
    }
}
