// src/rabbitmq/errors.rs

use thiserror::Error;

/// Errors surfaced by the connection manager.
///
/// Clone is required so that one connect attempt's failure can be handed to
/// every caller that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("RabbitMQ connection error: {0}")]
    ConnectionError(String),

    #[error("RabbitMQ channel error: {0}")]
    ChannelError(String),

    #[error("broker state lock poisoned")]
    LockError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_embed_the_cause() {
        let err = BrokerError::ConnectionError("broker unreachable".to_string());
        assert_eq!(
            err.to_string(),
            "RabbitMQ connection error: broker unreachable"
        );

        let err = BrokerError::ChannelError("channel negotiation failed".to_string());
        assert!(err.to_string().contains("channel negotiation failed"));
    }
}
