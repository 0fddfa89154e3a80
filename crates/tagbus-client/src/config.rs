//! Client configuration.

use std::time::Duration;
use tagbus_proto::TopicScheme;
use uuid::Uuid;

/// Databus client configuration.
#[derive(Debug, Clone)]
pub struct DatabusConfig {
    /// MQTT broker URL (e.g., `tcp://ie-databus:1883`)
    pub broker: String,

    /// Broker username
    pub username: String,

    /// Broker password
    pub password: String,

    /// MQTT client id
    pub client_id: String,

    /// Keep-alive interval
    pub keep_alive: Duration,

    /// Request channel capacity for the MQTT client
    pub channel_capacity: usize,

    /// Topic scheme of the connector to follow
    pub scheme: TopicScheme,

    /// Connection name used for the initial write topic
    pub write_connection: String,
}

impl Default for DatabusConfig {
    fn default() -> Self {
        Self {
            broker: "tcp://ie-databus:1883".to_string(),
            username: "edge".to_string(),
            password: "edge".to_string(),
            client_id: format!("tagbus-{}", Uuid::new_v4().simple()),
            keep_alive: Duration::from_secs(30),
            channel_capacity: 100,
            scheme: TopicScheme::default(),
            write_connection: "Connection_1".to_string(),
        }
    }
}

impl DatabusConfig {
    /// Create a configuration with the given broker credentials and default
    /// everything else.
    #[must_use]
    pub fn with_credentials(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TAGBUS_BROKER`: MQTT broker URL
    /// - `TAGBUS_USERNAME` / `TAGBUS_PASSWORD`: broker credentials
    /// - `TAGBUS_CLIENT_ID`: MQTT client id
    /// - `TAGBUS_KEEP_ALIVE_SECS`: keep-alive interval in seconds
    /// - `TAGBUS_PREFIX` / `TAGBUS_PROVIDER` / `TAGBUS_CONNECTION`: topic
    ///   scheme segments
    /// - `TAGBUS_WRITE_CONNECTION`: connection name for the write topic
    ///
    /// # Errors
    ///
    /// Returns error if a numeric variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(broker) = std::env::var("TAGBUS_BROKER") {
            config.broker = broker;
        }

        if let Ok(username) = std::env::var("TAGBUS_USERNAME") {
            config.username = username;
        }

        if let Ok(password) = std::env::var("TAGBUS_PASSWORD") {
            config.password = password;
        }

        if let Ok(client_id) = std::env::var("TAGBUS_CLIENT_ID") {
            config.client_id = client_id;
        }

        if let Ok(secs) = std::env::var("TAGBUS_KEEP_ALIVE_SECS") {
            let secs: u64 = secs.parse().map_err(|_| ConfigError::InvalidValue {
                var: "TAGBUS_KEEP_ALIVE_SECS",
                value: secs.clone(),
            })?;
            config.keep_alive = Duration::from_secs(secs);
        }

        if let Ok(prefix) = std::env::var("TAGBUS_PREFIX") {
            config.scheme.prefix = prefix;
        }

        if let Ok(provider) = std::env::var("TAGBUS_PROVIDER") {
            config.scheme.provider = provider;
        }

        if let Ok(connection) = std::env::var("TAGBUS_CONNECTION") {
            config.scheme.connection = connection;
        }

        if let Ok(write_connection) = std::env::var("TAGBUS_WRITE_CONNECTION") {
            config.write_connection = write_connection;
        }

        Ok(config)
    }
}

/// Errors that can occur loading configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value
    #[error("invalid value for {var}: '{value}'")]
    InvalidValue {
        /// The variable name
        var: &'static str,
        /// The offending value
        value: String,
    },
}
