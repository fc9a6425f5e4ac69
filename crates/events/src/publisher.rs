//! Outbound publishing port.

use async_trait::async_trait;
use serde::Serialize;

use crate::bus::MessageBus;
use crate::error::TransportError;

/// Anything that can put a JSON payload onto a named channel.
///
/// [`MessageBus`] implements it in-process; a broker client would implement
/// it for multi-process deployments. Implementations must not block on the
/// receiving side: publishing is fire-and-forget.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &str, payload: serde_json::Value)
        -> Result<(), TransportError>;
}

#[async_trait]
impl Publisher for MessageBus {
    async fn publish(
        &self,
        channel: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        MessageBus::publish(self, channel, payload).map(|_| ())
    }
}

/// Serialize `message` and publish it on `channel`.
pub async fn publish_message<T: Serialize + Sync>(
    publisher: &dyn Publisher,
    channel: &str,
    message: &T,
) -> Result<(), TransportError> {
    let payload = serde_json::to_value(message)?;
    publisher.publish(channel, payload).await
}
