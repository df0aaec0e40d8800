//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub server: ServerConfig,
    pub redis: Option<RedisConfig>,
    pub database: Option<DatabaseConfig>,
    pub presence: PresenceConfig,
    pub mailbox: MailboxConfig,
    pub calls: CallConfig,
    pub cors: CorsConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Listener configuration (socket gateway and HTTP surface share one port)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database configuration; absent means the in-memory directory is used
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration; absent means the in-memory store is used
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: u32,
}

/// Presence timing
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// How often each binding refreshes its online marker
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// TTL of the online marker
    #[serde(default = "default_user_timeout")]
    pub user_timeout_secs: u64,
    #[serde(default = "default_status_batch_interval")]
    pub status_batch_interval_secs: u64,
    #[serde(default = "default_status_batch_capacity")]
    pub status_batch_capacity: usize,
}

impl PresenceConfig {
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    #[must_use]
    pub fn status_batch_interval(&self) -> Duration {
        Duration::from_secs(self.status_batch_interval_secs)
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            user_timeout_secs: default_user_timeout(),
            status_batch_interval_secs: default_status_batch_interval(),
            status_batch_capacity: default_status_batch_capacity(),
        }
    }
}

/// Offline mailbox bounds
#[derive(Debug, Clone, Deserialize)]
pub struct MailboxConfig {
    #[serde(default = "default_mailbox_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_mailbox_ttl")]
    pub ttl_secs: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            max_messages: default_mailbox_max_messages(),
            ttl_secs: default_mailbox_ttl(),
        }
    }
}

/// Call registry settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallConfig {
    /// Unanswered calls are ended after this many seconds; `None` disables expiry
    #[serde(default)]
    pub ring_timeout_secs: Option<u64>,
}

impl CallConfig {
    #[must_use]
    pub fn ring_timeout(&self) -> Option<Duration> {
        self.ring_timeout_secs.map(Duration::from_secs)
    }
}

/// CORS configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

// Default value functions
fn default_app_name() -> String {
    "pulse".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_redis_max_connections() -> u32 {
    10
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_user_timeout() -> u64 {
    60
}

fn default_status_batch_interval() -> u64 {
    5
}

fn default_status_batch_capacity() -> usize {
    1024
}

fn default_mailbox_max_messages() -> usize {
    1000
}

fn default_mailbox_ttl() -> u64 {
    86_400 // 24 hours
}

/// Read an optional variable, failing on values that do not parse
fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        _ => Ok(None),
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|s| !s.trim().is_empty())
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is present but cannot be parsed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let heartbeat_interval_secs =
            parse_var(&lookup, "HEARTBEAT_INTERVAL_SECS")?.unwrap_or_else(default_heartbeat_interval);
        let user_timeout_secs =
            parse_var(&lookup, "USER_TIMEOUT_SECS")?.unwrap_or_else(default_user_timeout);
        if heartbeat_interval_secs == 0 || heartbeat_interval_secs >= user_timeout_secs {
            return Err(ConfigError::InvalidValue(
                "HEARTBEAT_INTERVAL_SECS",
                format!("{heartbeat_interval_secs} must be non-zero and below USER_TIMEOUT_SECS"),
            ));
        }

        let status_batch_interval_secs: u64 = parse_var(&lookup, "STATUS_BATCH_INTERVAL_SECS")?
            .unwrap_or_else(default_status_batch_interval);
        if status_batch_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "STATUS_BATCH_INTERVAL_SECS",
                "0".to_string(),
            ));
        }

        let redis = match non_empty(&lookup, "REDIS_URL") {
            Some(url) => Some(RedisConfig {
                url,
                max_connections: parse_var(&lookup, "REDIS_MAX_CONNECTIONS")?
                    .unwrap_or_else(default_redis_max_connections),
            }),
            None => None,
        };

        let database = match non_empty(&lookup, "DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")?
                    .unwrap_or_else(default_max_connections),
                min_connections: parse_var(&lookup, "DATABASE_MIN_CONNECTIONS")?
                    .unwrap_or_else(default_min_connections),
            }),
            None => None,
        };

        Ok(Self {
            app: AppSettings {
                name: non_empty(&lookup, "APP_NAME").unwrap_or_else(default_app_name),
                env: lookup("APP_ENV")
                    .and_then(|s| Environment::parse(&s))
                    .unwrap_or_default(),
            },
            server: ServerConfig {
                host: non_empty(&lookup, "HOST").unwrap_or_else(default_host),
                port: parse_var(&lookup, "PORT")?.unwrap_or_else(default_port),
            },
            redis,
            database,
            presence: PresenceConfig {
                heartbeat_interval_secs,
                user_timeout_secs,
                status_batch_interval_secs,
                status_batch_capacity: parse_var(&lookup, "STATUS_BATCH_CAPACITY")?
                    .unwrap_or_else(default_status_batch_capacity),
            },
            mailbox: MailboxConfig {
                max_messages: parse_var(&lookup, "MAILBOX_MAX_MESSAGES")?
                    .unwrap_or_else(default_mailbox_max_messages),
                ttl_secs: parse_var(&lookup, "MAILBOX_TTL_SECS")?
                    .unwrap_or_else(default_mailbox_ttl),
            },
            calls: CallConfig {
                ring_timeout_secs: parse_var(&lookup, "CALL_RING_TIMEOUT_SECS")?,
            },
            cors: CorsConfig {
                allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                    .map(|s| {
                        s.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
