//! Contracts of the external collaborators the workflow engine calls.
//!
//! None of these are owned by the core: blob storage, email delivery,
//! event publication and the TTL key-value store are provided by
//! adapter crates and injected into the services.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::FinvoiceResult;

// ---------------------------------------------------------------------------
// Blob storage
// ---------------------------------------------------------------------------

/// Location of a file written by a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Path relative to the store root; this is what gets persisted.
    pub relative_path: String,
    /// Generated unique file name (last path component).
    pub generated_name: String,
}

pub trait BlobStore: Send + Sync {
    /// Largest payload, in bytes, the store accepts.
    fn max_file_size(&self) -> u64;

    fn save(
        &self,
        content: &[u8],
        original_name: &str,
        folder: &str,
    ) -> impl Future<Output = FinvoiceResult<StoredBlob>> + Send;

    /// Resolve a stored relative path to an absolute path on disk.
    /// Fails with `NotFound` when the file no longer exists.
    fn resolve(&self, relative_path: &str) -> impl Future<Output = FinvoiceResult<PathBuf>> + Send;

    /// Remove a stored file. Removing a missing file is not an error.
    fn delete(&self, relative_path: &str) -> impl Future<Output = FinvoiceResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

impl Email {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Outbound email. No delivery guarantee is surfaced to the caller.
pub trait Mailer: Send + Sync {
    fn send(&self, email: Email) -> impl Future<Output = FinvoiceResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// At-least-once, best-effort event publication.
///
/// Implementations must fail fast while disconnected instead of waiting
/// for the broker to come back.
pub trait EventPublisher: Send + Sync {
    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> impl Future<Output = FinvoiceResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// Key-value store with expiry
// ---------------------------------------------------------------------------

/// Single-round-trip SET/GET/DEL with per-key expiry.
///
/// Each operation is atomic at the store level; callers never lock.
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value, until
    /// `ttl` elapses.
    fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = FinvoiceResult<()>> + Send;

    /// `None` when the key is absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = FinvoiceResult<Option<String>>> + Send;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = FinvoiceResult<()>> + Send;
}
