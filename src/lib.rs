//! RabbitMQ connection core and event producers for the order service.
//!
//! The [`rabbitmq::ConnectionManager`] owns the process-wide connection and
//! channel; [`rabbitmq::Publisher`] publishes persistent JSON messages to
//! durable topic exchanges through it. [`producers`] holds the concrete
//! order-placed and order-ready event streams.

pub mod config;
pub mod models;
pub mod producers;
pub mod rabbitmq;

pub use config::Config;
pub use models::{OrderPlaced, OrderReady};
pub use rabbitmq::{BrokerError, ConnectionManager, PublishError, Publisher};
