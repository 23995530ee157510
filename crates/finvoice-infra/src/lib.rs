//! Implementations of the collaborator contracts defined in
//! `finvoice-core`.

pub mod blob;
pub mod kv;
pub mod mail;

pub use blob::{BlobConfig, LocalBlobStore};
pub use kv::MemoryKeyValueStore;
pub use mail::{OutboundMailer, SmtpConfig, SmtpMailer, TracingMailer};
