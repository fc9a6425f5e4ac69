//! Well-known message channel names.
//!
//! Workers subscribe and publish on these exact topic strings, so they are
//! part of the wire contract and must not change.

/// Run requests published by the manager for workers to execute.
pub const CHANNEL_JOB_REQUEST: &str = "job.request";

/// Run-state updates (progress and completion) reported by workers.
pub const CHANNEL_JOB_RESPONSE: &str = "job.response";

/// Job type catalogs advertised by workers at startup or periodically.
pub const CHANNEL_JOB_METADATA: &str = "job.metadata";

/// Best-effort cancellation requests published by the manager.
pub const CHANNEL_JOB_CANCEL: &str = "job.cancel";
