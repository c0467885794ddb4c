//! Process-wide RabbitMQ connection manager.
//!
//! Owns a single connection and a single channel, created lazily on first
//! demand. Concurrent callers that arrive while an attempt is in flight all
//! wait on the same attempt and observe the same outcome; nobody triggers a
//! second connect against the broker. Broker-initiated close/error events
//! clear the cached handles so the next acquisition reconnects from scratch.
//! There is no background reconnect and no retry policy here: a failed
//! attempt is reported to its callers and the manager simply tries again the
//! next time someone asks.

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lapin::{Channel, Connection, ConnectionProperties};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::errors::BrokerError;

type ConnectOutcome = Result<Arc<Connection>, BrokerError>;
type ChannelOutcome = Result<Channel, BrokerError>;

enum ConnectionState {
    Disconnected,
    /// An attempt is in flight; followers wait on the receiver for its result.
    Connecting(watch::Receiver<Option<ConnectOutcome>>),
    Connected {
        connection: Arc<Connection>,
        generation: u64,
    },
}

enum ChannelState {
    Absent,
    Creating(watch::Receiver<Option<ChannelOutcome>>),
    Ready(Channel),
}

pub struct ConnectionManager {
    url: String,
    connection: Arc<Mutex<ConnectionState>>,
    channel: Arc<Mutex<ChannelState>>,
    generation: AtomicU64,
}

impl ConnectionManager {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            connection: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            channel: Arc::new(Mutex::new(ChannelState::Absent)),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the live connection, connecting lazily if needed.
    ///
    /// Exactly one connect call runs against the broker at a time; callers
    /// that arrive while it is outstanding get the same connection or the
    /// same error. The handle is ephemeral: hold it for the operation at
    /// hand, not across invalidations.
    pub async fn acquire_connection(&self) -> ConnectOutcome {
        let rx = {
            let mut state = self.connection.lock().map_err(|_| BrokerError::LockError)?;
            match &mut *state {
                ConnectionState::Connected { connection, .. }
                    if connection.status().connected() =>
                {
                    return Ok(connection.clone());
                }
                ConnectionState::Connecting(rx) => rx.clone(),
                // Disconnected, or a cached connection the broker has since
                // dropped: this caller becomes the initiator.
                _ => {
                    let (tx, rx) = watch::channel(None);
                    *state = ConnectionState::Connecting(rx);
                    drop(state);
                    return self.run_connect(tx).await;
                }
            }
        };
        self.await_connect(rx).await
    }

    /// Returns the live channel, creating one (and the connection under it)
    /// lazily if needed. Creation failures do not alter connection state.
    pub async fn acquire_channel(&self) -> ChannelOutcome {
        let rx = {
            let mut state = self.channel.lock().map_err(|_| BrokerError::LockError)?;
            match &mut *state {
                ChannelState::Ready(channel) if channel.status().connected() => {
                    return Ok(channel.clone());
                }
                ChannelState::Creating(rx) => rx.clone(),
                _ => {
                    let (tx, rx) = watch::channel(None);
                    *state = ChannelState::Creating(rx);
                    drop(state);
                    return self.run_create_channel(tx).await;
                }
            }
        };
        self.await_create_channel(rx).await
    }

    /// Best-effort teardown: closes the cached channel, then the cached
    /// connection, logging failures instead of propagating them, and leaves
    /// both slots cleared. Idempotent; a no-op when nothing is cached.
    pub async fn shutdown(&self) {
        let channel = match self.channel.lock() {
            Ok(mut state) => mem::replace(&mut *state, ChannelState::Absent),
            Err(_) => ChannelState::Absent,
        };
        let connection = match self.connection.lock() {
            Ok(mut state) => mem::replace(&mut *state, ConnectionState::Disconnected),
            Err(_) => ConnectionState::Disconnected,
        };

        if let ChannelState::Ready(channel) = channel {
            if let Err(e) = channel.close(0, "shutting down").await {
                warn!(error = %e, "failed to close channel during shutdown");
            }
        }
        if let ConnectionState::Connected { connection, .. } = connection {
            if let Err(e) = connection.close(0, "shutting down").await {
                warn!(error = %e, "failed to close connection during shutdown");
            } else {
                info!("RabbitMQ connection closed");
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .map(|state| {
                matches!(
                    &*state,
                    ConnectionState::Connected { connection, .. }
                        if connection.status().connected()
                )
            })
            .unwrap_or(false)
    }

    async fn run_connect(&self, tx: watch::Sender<Option<ConnectOutcome>>) -> ConnectOutcome {
        info!(url = %self.url, "connecting to RabbitMQ");
        let result = match Connection::connect(&self.url, ConnectionProperties::default()).await {
            Ok(connection) => {
                let connection = Arc::new(connection);
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                self.watch_connection(&connection, generation);
                if let Ok(mut state) = self.connection.lock() {
                    *state = ConnectionState::Connected {
                        connection: connection.clone(),
                        generation,
                    };
                }
                info!("RabbitMQ connection established");
                Ok(connection)
            }
            Err(e) => {
                let err = BrokerError::ConnectionError(e.to_string());
                error!(error = %err, "failed to connect to RabbitMQ");
                if let Ok(mut state) = self.connection.lock() {
                    *state = ConnectionState::Disconnected;
                }
                Err(err)
            }
        };
        // Wake every follower, success and failure alike.
        let _ = tx.send(Some(result.clone()));
        result
    }

    async fn await_connect(
        &self,
        mut rx: watch::Receiver<Option<ConnectOutcome>>,
    ) -> ConnectOutcome {
        let received = rx
            .wait_for(|outcome| outcome.is_some())
            .await
            .map(|outcome| outcome.clone());
        match received {
            Ok(outcome) => match outcome {
                Some(result) => result,
                None => Err(BrokerError::ConnectionError(
                    "connect attempt produced no result".to_string(),
                )),
            },
            Err(_) => {
                // The initiator was dropped before reporting. Reset the slot,
                // if it is still ours, so the next caller retries.
                if let Ok(mut state) = self.connection.lock() {
                    if matches!(&*state, ConnectionState::Connecting(cur) if cur.same_channel(&rx))
                    {
                        *state = ConnectionState::Disconnected;
                    }
                }
                Err(BrokerError::ConnectionError(
                    "connect attempt was abandoned".to_string(),
                ))
            }
        }
    }

    async fn run_create_channel(
        &self,
        tx: watch::Sender<Option<ChannelOutcome>>,
    ) -> ChannelOutcome {
        let result = match self.acquire_connection().await {
            Ok(connection) => connection
                .create_channel()
                .await
                .map_err(|e| BrokerError::ChannelError(e.to_string())),
            Err(e) => Err(e),
        };
        match &result {
            Ok(channel) => {
                debug!(id = channel.id(), "channel opened");
                if let Ok(mut state) = self.channel.lock() {
                    *state = ChannelState::Ready(channel.clone());
                }
            }
            Err(e) => {
                error!(error = %e, "failed to open channel");
                if let Ok(mut state) = self.channel.lock() {
                    *state = ChannelState::Absent;
                }
            }
        }
        let _ = tx.send(Some(result.clone()));
        result
    }

    async fn await_create_channel(
        &self,
        mut rx: watch::Receiver<Option<ChannelOutcome>>,
    ) -> ChannelOutcome {
        let received = rx
            .wait_for(|outcome| outcome.is_some())
            .await
            .map(|outcome| outcome.clone());
        match received {
            Ok(outcome) => match outcome {
                Some(result) => result,
                None => Err(BrokerError::ChannelError(
                    "channel attempt produced no result".to_string(),
                )),
            },
            Err(_) => {
                if let Ok(mut state) = self.channel.lock() {
                    if matches!(&*state, ChannelState::Creating(cur) if cur.same_channel(&rx)) {
                        *state = ChannelState::Absent;
                    }
                }
                Err(BrokerError::ChannelError(
                    "channel attempt was abandoned".to_string(),
                ))
            }
        }
    }

    /// Registers the broker-error hook that invalidates the cached handles.
    ///
    /// The generation tag keeps a late event from a replaced connection from
    /// tearing down its successor; the channel slot is only cleared when it
    /// holds a ready channel, so an in-flight creation keeps sole ownership
    /// of its slot.
    fn watch_connection(&self, connection: &Arc<Connection>, generation: u64) {
        let conn_slot = Arc::clone(&self.connection);
        let chan_slot = Arc::clone(&self.channel);
        connection.on_error(move |e| {
            error!(error = %e, "RabbitMQ connection error, dropping cached handles");
            let Ok(mut conn) = conn_slot.lock() else {
                return;
            };
            let ours = matches!(
                &*conn,
                ConnectionState::Connected { generation: current, .. } if *current == generation
            );
            if ours {
                *conn = ConnectionState::Disconnected;
                if let Ok(mut chan) = chan_slot.lock() {
                    if matches!(&*chan, ChannelState::Ready(_)) {
                        *chan = ChannelState::Absent;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_disconnected() {
        let manager = ConnectionManager::new("amqp://rabbitmq:5672");
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn shutdown_without_resources_is_a_no_op() {
        let manager = ConnectionManager::new("amqp://rabbitmq:5672");
        manager.shutdown().await;
        manager.shutdown().await;
        assert!(!manager.is_connected());
    }
}
