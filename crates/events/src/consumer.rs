//! Channel consumers.
//!
//! Handlers are registered explicitly against a channel name on a
//! [`ConsumerRegistry`]. [`ConsumerRegistry::spawn`] starts one receive loop
//! per registration; each received message is handled on its own Tokio task,
//! with at most `max_concurrency` handlers in flight per channel. Handlers
//! therefore run concurrently, including for redelivered duplicates, and
//! must serialize their own per-entity state changes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::{Envelope, MessageBus};
use crate::error::TransportError;

/// A consumer of one channel's payloads.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Process one payload. Failures are the handler's to log; nothing is
    /// reported back to the transport.
    async fn handle(&self, payload: serde_json::Value);
}

/// Handler registrations waiting to be started.
pub struct ConsumerRegistry {
    max_concurrency: usize,
    registrations: Vec<Registration>,
}

struct Registration {
    channel: String,
    receiver: broadcast::Receiver<Envelope>,
    handler: Arc<dyn MessageHandler>,
}

impl ConsumerRegistry {
    /// `max_concurrency` bounds in-flight handlers per channel (minimum 1).
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            registrations: Vec::new(),
        }
    }

    /// Subscribe `handler` to `channel`.
    ///
    /// The subscription is taken immediately, so messages published after
    /// this call are buffered even before [`spawn`](Self::spawn).
    pub fn register(
        &mut self,
        bus: &MessageBus,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), TransportError> {
        let receiver = bus.subscribe(channel)?;
        tracing::info!(channel, handler = handler.name(), "Registered message handler");
        self.registrations.push(Registration {
            channel: channel.to_string(),
            receiver,
            handler,
        });
        Ok(())
    }

    /// Start every registered consumer loop.
    ///
    /// Each loop exits when `cancel` fires or its channel closes, after
    /// waiting for its in-flight handlers to finish.
    pub fn spawn(self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let max_concurrency = self.max_concurrency;
        self.registrations
            .into_iter()
            .map(|registration| {
                tokio::spawn(consume(registration, max_concurrency, cancel.clone()))
            })
            .collect()
    }
}

/// Receive loop for one registration.
async fn consume(registration: Registration, max_concurrency: usize, cancel: CancellationToken) {
    let Registration {
        channel,
        mut receiver,
        handler,
    } = registration;
    let permits = Arc::new(Semaphore::new(max_concurrency));

    tracing::info!(channel = %channel, handler = handler.name(), "Consumer started");

    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(channel = %channel, "Consumer cancelled");
                break;
            }
            received = receiver.recv() => match received {
                Ok(envelope) => envelope,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        channel = %channel,
                        skipped = n,
                        "Consumer lagged, some messages were not handled"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!(channel = %channel, "Channel closed, consumer shutting down");
                    break;
                }
            },
        };

        let permit = match Arc::clone(&permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            handler.handle(envelope.payload).await;
            drop(permit);
        });
    }

    // Drain: every permit back means every spawned handler finished.
    let total = u32::try_from(max_concurrency).unwrap_or(u32::MAX);
    if permits.acquire_many(total).await.is_ok() {
        tracing::debug!(channel = %channel, "Consumer drained");
    }
}
