//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument. [`PgStore`](crate::PgStore)
//! adapts them to the storage ports.

pub mod job_repo;
pub mod job_run_batch_repo;
pub mod job_run_repo;
pub mod job_schedule_repo;
pub mod job_type_repo;
pub mod whitelist_repo;

pub use job_repo::JobRepo;
pub use job_run_batch_repo::JobRunBatchRepo;
pub use job_run_repo::JobRunRepo;
pub use job_schedule_repo::JobScheduleRepo;
pub use job_type_repo::JobTypeRepo;
pub use whitelist_repo::WhitelistRepo;
