//! AMQP 0-9-1 binding (RabbitMQ) for the publisher actor.

use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, warn};

use crate::broker::{Broker, BrokerChannel};
use crate::error::PublishError;

const PERSISTENT: u8 = 2;

/// Connects to `uri` and declares `exchange` as a durable topic
/// exchange on every (re)connect.
#[derive(Debug, Clone)]
pub struct AmqpBroker {
    uri: String,
    exchange: String,
}

impl AmqpBroker {
    pub fn new(uri: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            exchange: exchange.into(),
        }
    }
}

pub struct AmqpChannel {
    connection: Connection,
    channel: Channel,
}

fn broker_err(e: lapin::Error) -> PublishError {
    PublishError::Broker(e.to_string())
}

impl Broker for AmqpBroker {
    type Channel = AmqpChannel;

    async fn connect(&self) -> Result<AmqpChannel, PublishError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .map_err(broker_err)?;
        let channel = connection.create_channel().await.map_err(broker_err)?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(broker_err)?;
        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(broker_err)?;

        debug!(exchange = %self.exchange, "AMQP exchange declared");
        Ok(AmqpChannel {
            connection,
            channel,
        })
    }
}

impl BrokerChannel for AmqpChannel {
    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(PERSISTENT),
            )
            .await
            .map_err(broker_err)?
            .await
            .map_err(broker_err)?;

        if confirm.is_nack() {
            return Err(PublishError::Broker("message was nacked by the broker".into()));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn close(self) {
        if let Err(e) = self.connection.close(200, "publisher closing").await {
            warn!(error = %e, "Error closing AMQP connection");
        }
    }
}
