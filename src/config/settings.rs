use std::time::Duration;

use serde::Deserialize;

use crate::broker::BrokerOptions;
use crate::utils::error::ConfigurationError;

/// Top-level configuration settings for the application.
///
/// The broker endpoint and entity names have no defaults; commands that need
/// them fail with `ConfigurationError::Missing` when they are absent.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub entities: EntitySettings,
    pub server: ServerSettings,
    pub consumer: ConsumerSettings,
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
}

/// Where the demo programs reach the broker.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectionSettings {
    pub endpoint: Option<String>,
}

/// Names of the queue, topic and topic subscriptions.
#[derive(Debug, Deserialize, Clone)]
pub struct EntitySettings {
    pub queue: Option<String>,
    pub topic: Option<String>,
    pub subscriptions: Vec<String>,
}

/// Address the broker service binds to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsumerSettings {
    /// Upper bound on a single receive call. `0` waits indefinitely.
    pub receive_timeout_secs: u64,
}

/// Delivery parameters applied by the broker service.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub lock_duration_secs: u64,
    pub max_delivery_count: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub connection: Option<PartialConnectionSettings>,
    pub entities: Option<PartialEntitySettings>,
    pub server: Option<PartialServerSettings>,
    pub consumer: Option<PartialConsumerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialConnectionSettings {
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialEntitySettings {
    pub queue: Option<String>,
    pub topic: Option<String>,
    pub subscriptions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialConsumerSettings {
    pub receive_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub lock_duration_secs: Option<u64>,
    pub max_delivery_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings { endpoint: None },
            entities: EntitySettings {
                queue: None,
                topic: None,
                subscriptions: vec!["s1".to_string(), "s2".to_string()],
            },
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            consumer: ConsumerSettings {
                receive_timeout_secs: 30,
            },
            broker: BrokerSettings {
                lock_duration_secs: 30,
                max_delivery_count: 10,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    pub fn endpoint(&self) -> Result<&str, ConfigurationError> {
        required("connection.endpoint", self.connection.endpoint.as_deref())
    }

    pub fn queue_name(&self) -> Result<&str, ConfigurationError> {
        required("entities.queue", self.entities.queue.as_deref())
    }

    pub fn topic_name(&self) -> Result<&str, ConfigurationError> {
        required("entities.topic", self.entities.topic.as_deref())
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        match self.consumer.receive_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn broker_options(&self) -> BrokerOptions {
        BrokerOptions {
            lock_duration: Duration::from_secs(self.broker.lock_duration_secs),
            max_delivery_count: self.broker.max_delivery_count,
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn required<'a>(key: &str, value: Option<&'a str>) -> Result<&'a str, ConfigurationError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigurationError::Missing(key.to_string()))
}
