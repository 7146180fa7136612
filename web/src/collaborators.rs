//! Production collaborators wired by the server: a filesystem blob store and a
//! notification sink that writes events to the log.

use raffle_core::error::BlobError;
use raffle_core::notification::{NotificationEvent, NotificationSink, NotifyError};
use raffle_core::types::{ActorId, ProofRef};
use raffle_core::BlobStore;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use uuid::Uuid;

/// Largest accepted payment proof.
pub const MAX_PROOF_BYTES: usize = 10 * 1024 * 1024;

/// Writes payment proofs under `root/<owner>/<uuid>.<ext>`.
///
/// The returned locator is the path relative to `root`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Store files below `root`; directories are created on demand.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BlobStore for FsBlobStore {
    fn put(
        &self,
        owner: ActorId,
        bytes: Vec<u8>,
        extension: String,
    ) -> Pin<Box<dyn Future<Output = Result<ProofRef, BlobError>> + Send + '_>> {
        Box::pin(async move {
            if bytes.is_empty() {
                return Err(BlobError::Rejected("empty upload".to_string()));
            }
            if bytes.len() > MAX_PROOF_BYTES {
                return Err(BlobError::Rejected(format!(
                    "upload exceeds {MAX_PROOF_BYTES} bytes"
                )));
            }

            let relative = format!("{owner}/{}.{extension}", Uuid::new_v4());
            let path = self.root.join(&relative);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BlobError::Storage(format!("{}: {e}", parent.display())))?;
            }
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| BlobError::Storage(format!("{}: {e}", path.display())))?;

            tracing::debug!(path = %path.display(), size = bytes.len(), "Payment proof written");
            Ok(ProofRef::new(relative))
        })
    }
}

/// Sink that records every event as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(
        &self,
        event: NotificationEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            let payload =
                serde_json::to_string(&event).map_err(|e| NotifyError(e.to_string()))?;
            tracing::info!(event_type = event.event_type(), %payload, "Notification");
            Ok(())
        })
    }
}
