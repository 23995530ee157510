//! Finvoice Events — best-effort event publication.
//!
//! A single actor task owns the broker connection and moves it through
//! `Disconnected -> Connecting -> Connected`. Callers talk to it through
//! a cloneable [`PublisherHandle`]; while the actor is not connected a
//! publish fails immediately instead of waiting for the broker.

pub mod amqp;
pub mod broker;
pub mod config;
pub mod error;
pub mod publisher;

pub use amqp::{AmqpBroker, AmqpChannel};
pub use broker::{Broker, BrokerChannel};
pub use config::PublisherConfig;
pub use error::PublishError;
pub use publisher::{ConnectionState, PublisherHandle, spawn_publisher};
