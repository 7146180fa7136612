//! Payment-proof blob storage.

use crate::error::BlobError;
use crate::types::{ActorId, ProofRef};
use std::future::Future;
use std::pin::Pin;

/// Stores an uploaded payment proof and returns a dereferenceable locator.
///
/// The engine keeps only the locator; how bytes are stored is up to the
/// implementation.
pub trait BlobStore: Send + Sync {
    /// Store `bytes` for `owner` with the given file extension.
    ///
    /// # Errors
    ///
    /// [`BlobError::Rejected`] for unacceptable payloads, [`BlobError::Storage`]
    /// when the backend fails.
    fn put(
        &self,
        owner: ActorId,
        bytes: Vec<u8>,
        extension: String,
    ) -> Pin<Box<dyn Future<Output = Result<ProofRef, BlobError>> + Send + '_>>;
}
