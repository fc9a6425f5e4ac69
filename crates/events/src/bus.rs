//! In-process message bus backed by `tokio::sync::broadcast` channels.
//!
//! [`MessageBus`] owns one broadcast channel per well-known topic (see
//! [`snojobs_core::channels`]). It is designed to be shared via
//! `Arc<MessageBus>` across the application and stands in for an external
//! broker in single-process deployments and tests.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use snojobs_core::channels::{
    CHANNEL_JOB_CANCEL, CHANNEL_JOB_METADATA, CHANNEL_JOB_REQUEST, CHANNEL_JOB_RESPONSE,
};
use snojobs_core::types::Timestamp;
use tokio::sync::broadcast;

use crate::error::TransportError;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A message as carried on a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Topic name, e.g. `"job.response"`.
    pub channel: String,

    /// JSON payload; decoded by the consumer.
    pub payload: serde_json::Value,

    /// When the message was published (UTC).
    pub published_at: Timestamp,
}

// ---------------------------------------------------------------------------
// MessageBus
// ---------------------------------------------------------------------------

/// Default buffer capacity per channel.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Topics every bus carries.
const CHANNELS: [&str; 4] = [
    CHANNEL_JOB_REQUEST,
    CHANNEL_JOB_RESPONSE,
    CHANNEL_JOB_METADATA,
    CHANNEL_JOB_CANCEL,
];

/// In-process fan-out bus with a fixed set of named channels.
///
/// When a channel's buffer is full, the oldest un-consumed messages are
/// dropped and slow receivers observe `RecvError::Lagged`.
pub struct MessageBus {
    senders: HashMap<&'static str, broadcast::Sender<Envelope>>,
}

impl MessageBus {
    /// Create a bus with a specific per-channel capacity.
    pub fn new(capacity: usize) -> Self {
        let senders = CHANNELS
            .into_iter()
            .map(|name| (name, broadcast::channel(capacity).0))
            .collect();
        Self { senders }
    }

    /// Publish a payload to every current subscriber of `channel`.
    ///
    /// Returns the number of subscribers reached. Publishing to a channel
    /// nobody listens on is an error: the message would be lost.
    pub fn publish(
        &self,
        channel: &str,
        payload: serde_json::Value,
    ) -> Result<usize, TransportError> {
        let sender = self
            .senders
            .get(channel)
            .ok_or_else(|| TransportError::UnknownChannel(channel.to_string()))?;

        let envelope = Envelope {
            channel: channel.to_string(),
            payload,
            published_at: Utc::now(),
        };

        sender
            .send(envelope)
            .map_err(|_| TransportError::NoSubscribers(channel.to_string()))
    }

    /// Subscribe to every message published on `channel` from now on.
    pub fn subscribe(
        &self,
        channel: &str,
    ) -> Result<broadcast::Receiver<Envelope>, TransportError> {
        self.senders
            .get(channel)
            .map(broadcast::Sender::subscribe)
            .ok_or_else(|| TransportError::UnknownChannel(channel.to_string()))
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
