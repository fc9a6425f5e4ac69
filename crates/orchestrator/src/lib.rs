//! Job orchestration services for the terminology authoring platform.
//!
//! The manager dispatches runs to remote workers over the `job.*` channels
//! and tracks them to completion:
//!
//! - [`catalog`]: job definitions and job types.
//! - [`schedule`]: schedules bound to jobs, fired by an external clock.
//! - [`whitelist`]: the permit/deny gate consulted before dispatch.
//! - [`dispatch`]: creates runs and batches and publishes run requests.
//! - [`listener`]: applies worker responses to the run state machine.
//! - [`reconciler`]: merges worker-advertised job types into the catalog.
//! - [`tracker`]: run and batch queries.
//!
//! [`OrchestratorContext`] wires them together once at startup.

pub mod catalog;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod reconciler;
pub mod schedule;
pub mod tracker;
pub mod whitelist;

pub use config::OrchestratorConfig;
pub use context::OrchestratorContext;
pub use error::{OrchestratorError, OrchestratorResult};
