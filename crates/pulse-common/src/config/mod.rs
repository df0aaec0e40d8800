//! Configuration structs

mod app_config;

pub use app_config::{
    AppConfig, AppSettings, CallConfig, ConfigError, CorsConfig, DatabaseConfig, Environment,
    MailboxConfig, PresenceConfig, RedisConfig, ServerConfig,
};
