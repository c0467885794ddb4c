use std::sync::Arc;

use tracing::{error, info};

use order_events::{Config, ConnectionManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup tracing for logging
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let manager = Arc::new(ConnectionManager::new(&config.rabbitmq_url));

    // Warm the connection eagerly; a failure here is only logged, the next
    // acquisition retries from scratch.
    if let Err(e) = manager.acquire_connection().await {
        error!(error = %e, "initial RabbitMQ connection failed");
    }

    info!("order event service running, press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    manager.shutdown().await;

    Ok(())
}
