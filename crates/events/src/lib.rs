//! Message transport for the job orchestration core.
//!
//! This crate provides the building blocks the manager uses to talk to
//! remote workers:
//!
//! - [`MessageBus`]: in-process publish/subscribe hub with one
//!   `tokio::sync::broadcast` channel per well-known topic.
//! - [`Publisher`]: the outbound port the dispatch path publishes through.
//! - [`messages`]: typed payloads for the `job.*` channels.
//! - [`ConsumerRegistry`]: explicit registration of [`MessageHandler`]s
//!   against named channels, run on a bounded task pool.

pub mod bus;
pub mod consumer;
pub mod error;
pub mod messages;
pub mod publisher;

pub use bus::{Envelope, MessageBus};
pub use consumer::{ConsumerRegistry, MessageHandler};
pub use error::TransportError;
pub use publisher::{publish_message, Publisher};
