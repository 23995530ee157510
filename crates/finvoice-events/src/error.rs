//! Publisher error types.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    /// The actor has no live broker connection right now.
    #[error("not connected to the message broker")]
    Disconnected,

    #[error("publish timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("publish queue is full")]
    QueueFull,

    /// The publisher has been shut down.
    #[error("publisher closed")]
    Closed,

    #[error("payload serialization failed: {0}")]
    Serialize(String),

    #[error("broker error: {0}")]
    Broker(String),
}
