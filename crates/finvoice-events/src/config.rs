use std::time::Duration;

/// Reconnection and back-pressure settings for the publisher actor.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Delay before the first reconnect attempt; doubles per failure.
    pub reconnect_interval: Duration,
    /// Upper bound for the reconnect delay.
    pub max_reconnect_interval: Duration,
    /// How long one publish may wait for the broker before failing.
    pub publish_timeout: Duration,
    /// Commands buffered for the actor; a full queue fails the publish.
    pub queue_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_interval: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(5),
            queue_capacity: 1024,
        }
    }
}
