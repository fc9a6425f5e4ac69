//! Domain vocabulary shared by every `snojobs` crate.
//!
//! This crate has zero internal dependencies so the storage adapters, the
//! message transport and the orchestration services can all depend on it.

pub mod channels;
pub mod error;
pub mod limits;
pub mod run_status;
pub mod types;
pub mod validation;
