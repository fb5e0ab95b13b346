mod settings;

use config::{Config, Environment, File};

use crate::utils::error::ConfigurationError;
use settings::PartialSettings;

pub use settings::{
    BrokerSettings, ConnectionSettings, ConsumerSettings, EntitySettings, LoggingSettings,
    ServerSettings, Settings,
};

pub const DEFAULT_CONFIG_PATH: &str = "config/default";
pub const ENV_PREFIX: &str = "PERSONBUS";

/// Loads `.env` if present, then the default config file and environment
/// variables, merged over default values.
pub fn load_config() -> Result<Settings, ConfigurationError> {
    let _ = dotenvy::dotenv();
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Loads settings from `path` (optional) overlaid with `PERSONBUS_*`
/// environment variables, e.g. `PERSONBUS_CONNECTION__ENDPOINT`.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigurationError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("entities.subscriptions")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    Ok(merge(partial))
}

fn merge(partial: PartialSettings) -> Settings {
    let default = Settings::default();

    Settings {
        connection: ConnectionSettings {
            endpoint: partial
                .connection
                .as_ref()
                .and_then(|c| c.endpoint.clone())
                .or(default.connection.endpoint),
        },
        entities: EntitySettings {
            queue: partial
                .entities
                .as_ref()
                .and_then(|e| e.queue.clone())
                .or(default.entities.queue),
            topic: partial
                .entities
                .as_ref()
                .and_then(|e| e.topic.clone())
                .or(default.entities.topic),
            subscriptions: partial
                .entities
                .as_ref()
                .and_then(|e| e.subscriptions.clone())
                .unwrap_or(default.entities.subscriptions),
        },
        server: ServerSettings {
            host: partial
                .server
                .as_ref()
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: partial
                .server
                .as_ref()
                .and_then(|s| s.port)
                .unwrap_or(default.server.port),
        },
        consumer: ConsumerSettings {
            receive_timeout_secs: partial
                .consumer
                .as_ref()
                .and_then(|c| c.receive_timeout_secs)
                .unwrap_or(default.consumer.receive_timeout_secs),
        },
        broker: BrokerSettings {
            lock_duration_secs: partial
                .broker
                .as_ref()
                .and_then(|b| b.lock_duration_secs)
                .unwrap_or(default.broker.lock_duration_secs),
            max_delivery_count: partial
                .broker
                .as_ref()
                .and_then(|b| b.max_delivery_count)
                .unwrap_or(default.broker.max_delivery_count),
        },
        logging: LoggingSettings {
            level: partial
                .logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    }
}
