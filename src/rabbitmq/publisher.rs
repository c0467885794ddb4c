use std::collections::HashSet;
use std::sync::Arc;

use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, ExchangeKind,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::connection::ConnectionManager;
use super::errors::BrokerError;

#[derive(Debug, Error)]
pub enum PublishError {
    /// The payload serialized to JSON `null`; nothing was sent to the broker.
    #[error("payload is required")]
    PayloadRequired,

    /// Any failure on the publish path: serialization, channel acquisition,
    /// exchange declaration, or the write itself, with the original failure
    /// embedded so callers can log one coherent diagnostic.
    #[error("failed to publish to exchange '{exchange}': {reason}")]
    Failed { exchange: String, reason: String },
}

impl PublishError {
    fn failed(exchange: &str, reason: impl std::fmt::Display) -> Self {
        PublishError::Failed {
            exchange: exchange.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Exchanges already declared on the current channel. Declarations are
/// channel-scoped: the cache starts fresh whenever the channel is replaced.
#[derive(Default)]
struct ExchangeCache {
    declared: HashSet<String>,
}

impl ExchangeCache {
    fn needs_declare(&self, exchange: &str) -> bool {
        !self.declared.contains(exchange)
    }

    fn record(&mut self, exchange: &str) {
        self.declared.insert(exchange.to_string());
    }
}

struct CachedChannel {
    channel: Channel,
    exchanges: ExchangeCache,
}

/// Publishes JSON messages to durable topic exchanges, declaring each
/// exchange at most once per channel instance.
///
/// The channel comes from the [`ConnectionManager`] and is cached here until
/// it goes stale, at which point the next publish fetches a fresh one and
/// re-declares on it.
pub struct Publisher {
    manager: Arc<ConnectionManager>,
    cache: Mutex<Option<CachedChannel>>,
}

impl Publisher {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            cache: Mutex::new(None),
        }
    }

    /// Serializes `payload` to JSON and publishes it to `exchange` under
    /// `routing_key` with persistent delivery.
    ///
    /// A payload that serializes to `null` is rejected up front, before any
    /// broker interaction. Every other failure is reported as a single
    /// [`PublishError::Failed`] wrapping the underlying cause.
    pub async fn publish<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &T,
    ) -> Result<(), PublishError> {
        let body = serde_json::to_vec(payload).map_err(|e| PublishError::failed(exchange, e))?;
        if body.as_slice() == b"null" {
            return Err(PublishError::PayloadRequired);
        }

        let channel = self
            .ready_channel(exchange)
            .await
            .map_err(|e| PublishError::failed(exchange, e))?;

        let properties = BasicProperties::default()
            .with_message_id(Uuid::new_v4().to_string().into())
            .with_content_type("application/json".into())
            .with_timestamp(chrono::Utc::now().timestamp() as u64)
            .with_delivery_mode(2); // persistent

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(|e| PublishError::failed(exchange, e))?;

        info!(exchange, routing_key, "message published");
        Ok(())
    }

    /// Returns a live channel with `exchange` declared on it, refreshing the
    /// cached channel (and resetting the declare cache) when it has gone
    /// stale.
    async fn ready_channel(&self, exchange: &str) -> Result<Channel, BrokerError> {
        let mut guard = self.cache.lock().await;

        let stale = guard
            .as_ref()
            .map_or(true, |cached| !cached.channel.status().connected());
        if stale {
            let channel = self.manager.acquire_channel().await?;
            *guard = Some(CachedChannel {
                channel,
                exchanges: ExchangeCache::default(),
            });
        }

        let cached = guard
            .as_mut()
            .ok_or_else(|| BrokerError::ChannelError("channel not available".to_string()))?;

        if cached.exchanges.needs_declare(exchange) {
            cached
                .channel
                .exchange_declare(
                    exchange,
                    ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..ExchangeDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    BrokerError::ChannelError(format!(
                        "failed to declare exchange '{}': {}",
                        exchange, e
                    ))
                })?;
            debug!(exchange, "exchange declared");
            cached.exchanges.record(exchange);
        }

        Ok(cached.channel.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_is_declared_once_per_cache() {
        let mut cache = ExchangeCache::default();
        assert!(cache.needs_declare("topic_exc"));

        cache.record("topic_exc");
        assert!(!cache.needs_declare("topic_exc"));
        assert!(cache.needs_declare("order_ready_exch"));
    }

    #[test]
    fn fresh_cache_requires_declaration_again() {
        let mut cache = ExchangeCache::default();
        cache.record("topic_exc");

        // A replaced channel gets a new cache, as declarations do not carry
        // over between channel instances.
        let cache = ExchangeCache::default();
        assert!(cache.needs_declare("topic_exc"));
    }

    #[test]
    fn failed_error_embeds_the_cause() {
        let err = PublishError::failed("topic_exc", "broker unreachable");
        assert_eq!(
            err.to_string(),
            "failed to publish to exchange 'topic_exc': broker unreachable"
        );
    }

    #[test]
    fn payload_required_has_its_own_message() {
        assert_eq!(
            PublishError::PayloadRequired.to_string(),
            "payload is required"
        );
    }
}
