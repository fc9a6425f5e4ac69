//! Job run status and its forward-only state machine.
//!
//! Statuses are ordered by *stage*: `Submitted < Dispatched < Running <
//! terminal`. A run may skip stages but may never move back to an earlier
//! one, and nothing leaves a terminal status. The database stores the
//! SMALLINT id returned by [`RunStatus::id`], matching the seed rows of
//! `job_run_statuses`.

use serde::{Deserialize, Serialize};

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// Lifecycle status of a single job run.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Submitted = 1,
    Dispatched = 2,
    Running = 3,
    Completed = 4,
    Failed = 5,
    Cancelled = 6,
    /// The request could not be published; set by the transport only.
    FailedToDispatch = 7,
}

impl RunStatus {
    /// Every status, in id order.
    pub const ALL: [RunStatus; 7] = [
        RunStatus::Submitted,
        RunStatus::Dispatched,
        RunStatus::Running,
        RunStatus::Completed,
        RunStatus::Failed,
        RunStatus::Cancelled,
        RunStatus::FailedToDispatch,
    ];

    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Resolve a database status ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// Position in the transition order. All terminal statuses share the
    /// last stage.
    pub fn stage(self) -> u8 {
        match self {
            RunStatus::Submitted => 0,
            RunStatus::Dispatched => 1,
            RunStatus::Running => 2,
            RunStatus::Completed
            | RunStatus::Failed
            | RunStatus::Cancelled
            | RunStatus::FailedToDispatch => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.stage() == 3
    }

    /// Whether a worker is allowed to report this status over `job.response`.
    ///
    /// `Submitted` is only ever assigned locally and `FailedToDispatch`
    /// belongs to the transport.
    pub fn is_worker_reportable(self) -> bool {
        !matches!(self, RunStatus::Submitted | RunStatus::FailedToDispatch)
    }

    /// Wire / log name, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Submitted => "SUBMITTED",
            RunStatus::Dispatched => "DISPATCHED",
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "CANCELLED",
            RunStatus::FailedToDispatch => "FAILED_TO_DISPATCH",
        }
    }
}

impl From<RunStatus> for StatusId {
    fn from(value: RunStatus) -> Self {
        value as StatusId
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub mod state_machine {
    use super::RunStatus;

    /// Check whether a run currently in `from` may move to `to`.
    ///
    /// Terminal runs never move. `FailedToDispatch` is reachable only from
    /// `Submitted`. Every other move must strictly advance the stage.
    pub fn can_transition(from: RunStatus, to: RunStatus) -> bool {
        if from.is_terminal() {
            return false;
        }
        if to == RunStatus::FailedToDispatch {
            return from == RunStatus::Submitted;
        }
        to.stage() > from.stage()
    }

    /// Validate a state transition, returning an error message for invalid ones.
    pub fn validate_transition(from: RunStatus, to: RunStatus) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!("Invalid transition: {from} -> {to}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::state_machine::*;
    use super::*;

    // -----------------------------------------------------------------------
    // Forward transitions
    // -----------------------------------------------------------------------

    #[test]
    fn submitted_to_dispatched() {
        assert!(can_transition(RunStatus::Submitted, RunStatus::Dispatched));
    }

    #[test]
    fn submitted_may_skip_to_running() {
        assert!(can_transition(RunStatus::Submitted, RunStatus::Running));
    }

    #[test]
    fn submitted_may_skip_to_completed() {
        assert!(can_transition(RunStatus::Submitted, RunStatus::Completed));
    }

    #[test]
    fn dispatched_to_running() {
        assert!(can_transition(RunStatus::Dispatched, RunStatus::Running));
    }

    #[test]
    fn running_to_each_terminal() {
        assert!(can_transition(RunStatus::Running, RunStatus::Completed));
        assert!(can_transition(RunStatus::Running, RunStatus::Failed));
        assert!(can_transition(RunStatus::Running, RunStatus::Cancelled));
    }

    #[test]
    fn submitted_to_failed_to_dispatch() {
        assert!(can_transition(
            RunStatus::Submitted,
            RunStatus::FailedToDispatch
        ));
    }

    // -----------------------------------------------------------------------
    // Regressions and terminal states
    // -----------------------------------------------------------------------

    #[test]
    fn running_to_dispatched_invalid() {
        assert!(!can_transition(RunStatus::Running, RunStatus::Dispatched));
    }

    #[test]
    fn same_status_is_not_a_transition() {
        for status in RunStatus::ALL {
            assert!(!can_transition(status, status), "{status} -> {status}");
        }
    }

    #[test]
    fn terminal_statuses_have_no_transitions() {
        for from in RunStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in RunStatus::ALL {
                assert!(!can_transition(from, to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn failed_to_dispatch_only_from_submitted() {
        assert!(!can_transition(
            RunStatus::Dispatched,
            RunStatus::FailedToDispatch
        ));
        assert!(!can_transition(
            RunStatus::Running,
            RunStatus::FailedToDispatch
        ));
    }

    #[test]
    fn no_transition_ever_lowers_the_stage() {
        for from in RunStatus::ALL {
            for to in RunStatus::ALL {
                if can_transition(from, to) {
                    assert!(to.stage() > from.stage(), "{from} -> {to}");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    #[test]
    fn validate_transition_err_names_both_statuses() {
        let err = validate_transition(RunStatus::Completed, RunStatus::Running).unwrap_err();
        assert!(err.contains("COMPLETED"));
        assert!(err.contains("RUNNING"));
    }

    #[test]
    fn status_ids_round_trip() {
        for status in RunStatus::ALL {
            assert_eq!(RunStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(RunStatus::from_id(99), None);
    }

    #[test]
    fn wire_name_matches_serde() {
        let json = serde_json::to_string(&RunStatus::FailedToDispatch).unwrap();
        assert_eq!(json, "\"FAILED_TO_DISPATCH\"");
        let parsed: RunStatus = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(parsed, RunStatus::Running);
    }

    #[test]
    fn workers_cannot_report_local_statuses() {
        assert!(!RunStatus::Submitted.is_worker_reportable());
        assert!(!RunStatus::FailedToDispatch.is_worker_reportable());
        assert!(RunStatus::Cancelled.is_worker_reportable());
    }
}
