//! The order service's two outbound event streams.

use crate::models::{OrderPlaced, OrderReady};
use crate::rabbitmq::{PublishError, Publisher};

pub const ORDER_EXCHANGE: &str = "topic_exc";
pub const ORDER_PLACED_KEY: &str = "order.placed";

pub const ORDER_READY_EXCHANGE: &str = "order_ready_exch";
pub const ORDER_READY_KEY: &str = "order.ready";

/// Publishes an order-creation event for downstream processing.
pub async fn send_order(publisher: &Publisher, order: &OrderPlaced) -> Result<(), PublishError> {
    publisher
        .publish(ORDER_EXCHANGE, ORDER_PLACED_KEY, order)
        .await
}

/// Notifies that a placed order is ready for pickup.
pub async fn send_order_ready(
    publisher: &Publisher,
    order: &OrderReady,
) -> Result<(), PublishError> {
    publisher
        .publish(ORDER_READY_EXCHANGE, ORDER_READY_KEY, order)
        .await
}
