//! Non-blocking notification dispatcher.
//!
//! Engine operations enqueue events with `try_send` after their unit has
//! committed. A single worker task drains the bounded queue into the
//! [`NotificationSink`]. A full or closed queue turns into a
//! [`Warning::NotificationDropped`] on the operation's result; sink failures are
//! only logged and counted.

use crate::metrics::NotificationMetrics;
use raffle_core::notification::{NotificationEvent, NotificationSink};
use raffle_core::outcome::Warning;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Handle for enqueueing notification events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Notifier {
    sender: mpsc::Sender<NotificationEvent>,
}

impl Notifier {
    /// Spawn the delivery worker on the current runtime.
    ///
    /// The worker ends once every `Notifier` clone is dropped and the queue is
    /// drained; await the returned handle to flush on shutdown.
    #[must_use]
    pub fn spawn(sink: Arc<dyn NotificationSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<NotificationEvent>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let event_type = event.event_type();
                match sink.deliver(event).await {
                    Ok(()) => {
                        NotificationMetrics::record("delivered");
                        tracing::debug!(event_type, "Notification delivered");
                    },
                    Err(error) => {
                        NotificationMetrics::record("failed");
                        tracing::warn!(event_type, error = %error, "Notification delivery failed");
                    },
                }
            }
            tracing::debug!("Notification worker stopped");
        });
        (Self { sender }, worker)
    }

    /// Enqueue an event without waiting.
    ///
    /// Returns the warning to attach to the caller's result when the event was
    /// dropped.
    pub fn notify(&self, event: NotificationEvent) -> Option<Warning> {
        let event_type = event.event_type();
        match self.sender.try_send(event) {
            Ok(()) => {
                NotificationMetrics::record("queued");
                None
            },
            Err(err) => {
                let reason = match err {
                    TrySendError::Full(_) => "notification queue is full",
                    TrySendError::Closed(_) => "notification worker has stopped",
                };
                NotificationMetrics::record("dropped");
                tracing::warn!(event_type, reason, "Notification dropped");
                Some(Warning::NotificationDropped {
                    event_type: event_type.to_string(),
                    reason: reason.to_string(),
                })
            },
        }
    }
}
