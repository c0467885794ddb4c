// src/config.rs
use dotenv::dotenv;
use std::env;

/// Broker URL used when `RABBITMQ_URL` is not set; matches the service name
/// the broker runs under in the compose setup.
const DEFAULT_RABBITMQ_URL: &str = "amqp://rabbitmq:5672";

#[derive(Clone, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
}

impl Config {
    /// Loads configuration from the environment, reading a `.env` file if
    /// one is present. Missing values fall back to defaults rather than
    /// failing.
    pub fn from_env() -> Self {
        dotenv().ok();
        let rabbitmq_url =
            env::var("RABBITMQ_URL").unwrap_or_else(|_| DEFAULT_RABBITMQ_URL.to_string());
        Config { rabbitmq_url }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Default and override live in one test because the process environment
    // is shared across the test threads.
    #[test]
    fn url_defaults_and_honors_environment() {
        env::remove_var("RABBITMQ_URL");
        let config = Config::from_env();
        assert_eq!(config.rabbitmq_url, "amqp://rabbitmq:5672");

        env::set_var("RABBITMQ_URL", "amqp://broker.internal:5672");
        let config = Config::from_env();
        assert_eq!(config.rabbitmq_url, "amqp://broker.internal:5672");
        env::remove_var("RABBITMQ_URL");
    }
}
