/// Failures publishing onto or subscribing to a channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Nobody is listening, so the message would be lost.
    #[error("No subscribers on channel {0}")]
    NoSubscribers(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// Raised by external broker adapters.
    #[error("Publish failed: {0}")]
    Publish(String),
}
