//! The publisher actor and its handle.
//!
//! The actor task exclusively owns the broker channel. Reconnect
//! attempts run on their own task so publish requests keep being
//! answered (with [`PublishError::Disconnected`]) while the broker is
//! unreachable.

use std::sync::Arc;
use std::time::Duration;

use finvoice_core::error::{FinvoiceError, FinvoiceResult};
use finvoice_core::external::EventPublisher;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerChannel};
use crate::config::PublisherConfig;
use crate::error::PublishError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

enum Command {
    Publish {
        exchange: String,
        routing_key: String,
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<(), PublishError>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running publisher actor.
#[derive(Clone)]
pub struct PublisherHandle {
    tx: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
}

/// Spawn the actor and start connecting in the background.
pub fn spawn_publisher<B: Broker>(broker: B, config: PublisherConfig) -> PublisherHandle {
    let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
    let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

    let actor = Actor {
        broker: Arc::new(broker),
        delay: config.reconnect_interval,
        config,
        rx,
        state: state_tx,
        channel: None,
        attempt: None,
        next_attempt: Some(Instant::now()),
    };
    tokio::spawn(actor.run());

    PublisherHandle { tx, state }
}

impl PublisherHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Resolves once the actor reports `state`, or with `Closed` if the
    /// actor has stopped.
    pub async fn wait_for(&self, state: ConnectionState) -> Result<(), PublishError> {
        let mut rx = self.state.clone();
        rx.wait_for(|s| *s == state)
            .await
            .map(|_| ())
            .map_err(|_| PublishError::Closed)
    }

    /// Hand a message to the actor and wait for the broker's answer.
    /// Never waits for queue space or for a reconnect.
    pub async fn publish_bytes(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .try_send(Command::Publish {
                exchange: exchange.to_owned(),
                routing_key: routing_key.to_owned(),
                payload,
                reply,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => PublishError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
            })?;
        response.await.map_err(|_| PublishError::Closed)?
    }

    pub async fn publish_json(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError> {
        let bytes =
            serde_json::to_vec(payload).map_err(|e| PublishError::Serialize(e.to_string()))?;
        self.publish_bytes(exchange, routing_key, bytes).await
    }

    /// Close the broker channel and stop the actor. Later publishes fail
    /// with `Closed`.
    pub async fn close(&self) {
        let (reply, done) = oneshot::channel();
        if self.tx.send(Command::Close { reply }).await.is_ok() {
            let _ = done.await;
        }
    }
}

impl EventPublisher for PublisherHandle {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> FinvoiceResult<()> {
        self.publish_json(exchange, routing_key, &payload)
            .await
            .map_err(|e| FinvoiceError::Collaborator(e.to_string()))
    }
}

struct Actor<B: Broker> {
    broker: Arc<B>,
    config: PublisherConfig,
    rx: mpsc::Receiver<Command>,
    state: watch::Sender<ConnectionState>,
    channel: Option<B::Channel>,
    /// In-flight connect attempt.
    attempt: Option<JoinHandle<Result<B::Channel, PublishError>>>,
    /// When the next connect attempt is due while disconnected.
    next_attempt: Option<Instant>,
    /// Current reconnect delay.
    delay: Duration,
}

impl<B: Broker> Actor<B> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Publish { exchange, routing_key, payload, reply }) => {
                        let result = self.publish(&exchange, &routing_key, &payload).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Close { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        return;
                    }
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },
                result = await_attempt(&mut self.attempt) => {
                    self.attempt = None;
                    self.on_connect_result(result);
                }
                () = await_deadline(self.next_attempt) => {
                    self.next_attempt = None;
                    self.start_connect();
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn start_connect(&mut self) {
        self.set_state(ConnectionState::Connecting);
        let broker = Arc::clone(&self.broker);
        self.attempt = Some(tokio::spawn(async move { broker.connect().await }));
        debug!("Connecting to message broker");
    }

    fn on_connect_result(&mut self, result: Result<B::Channel, PublishError>) {
        match result {
            Ok(channel) => {
                self.channel = Some(channel);
                self.delay = self.config.reconnect_interval;
                self.set_state(ConnectionState::Connected);
                info!("Connected to message broker");
            }
            Err(e) => {
                warn!(error = %e, retry_in = ?self.delay, "Message broker connection failed");
                self.schedule_reconnect(self.delay);
                self.delay = (self.delay * 2).min(self.config.max_reconnect_interval);
            }
        }
    }

    fn schedule_reconnect(&mut self, after: Duration) {
        self.set_state(ConnectionState::Disconnected);
        self.next_attempt = Some(Instant::now() + after);
    }

    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        let Some(channel) = self.channel.as_mut() else {
            return Err(PublishError::Disconnected);
        };

        let outcome = if channel.is_connected() {
            match timeout(
                self.config.publish_timeout,
                channel.publish(exchange, routing_key, payload),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(PublishError::Timeout(self.config.publish_timeout)),
            }
        } else {
            Err(PublishError::Disconnected)
        };

        if let Err(e) = &outcome {
            warn!(%exchange, %routing_key, error = %e, "Publish failed, dropping broker connection");
            if let Some(channel) = self.channel.take() {
                channel.close().await;
            }
            self.schedule_reconnect(Duration::ZERO);
        } else {
            debug!(%exchange, %routing_key, "Event published");
        }
        outcome
    }

    async fn shutdown(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            attempt.abort();
        }
        self.next_attempt = None;
        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Event publisher closed");
    }
}

/// Resolves with the outcome of the in-flight connect attempt; never
/// resolves when there is none.
async fn await_attempt<C>(
    attempt: &mut Option<JoinHandle<Result<C, PublishError>>>,
) -> Result<C, PublishError> {
    match attempt {
        Some(handle) => match handle.await {
            Ok(result) => result,
            Err(e) => Err(PublishError::Broker(format!("connect task failed: {e}"))),
        },
        None => std::future::pending().await,
    }
}

async fn await_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
