//! Domain model structs and DTOs.
//!
//! Each submodule contains the entity struct (serialisable, as handed to
//! callers) and, where the entity is created from outside input, a create
//! DTO.

pub mod batch;
pub mod job;
pub mod job_run;
pub mod job_type;
pub mod schedule;
pub mod whitelist;
