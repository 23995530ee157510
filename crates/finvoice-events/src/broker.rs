//! Seam between the publisher actor and a concrete message broker.

use crate::error::PublishError;

/// Opens channels to a broker. Called by the actor on every
/// (re)connect attempt.
pub trait Broker: Send + Sync + 'static {
    type Channel: BrokerChannel;

    fn connect(&self) -> impl Future<Output = Result<Self::Channel, PublishError>> + Send;
}

/// A live, exclusively owned publishing channel.
pub trait BrokerChannel: Send + 'static {
    fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), PublishError>> + Send;

    /// `false` once the broker side has gone away.
    fn is_connected(&self) -> bool;

    fn close(self) -> impl Future<Output = ()> + Send;
}
