//! Configuration management for the webhook relay.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use relay_core::{InboundSecret, OutboundSecret};
use relay_delivery::{ClientConfig, DestinationConfig, RetryPolicy};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};

const CONFIG_FILE: &str = "relay.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`relay.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Secrets are never serialized and render redacted in `Debug`.
///
/// # Example
///
/// ```no_run
/// use relay_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
/// println!("Listening on {}:{}", config.host, config.port);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Database
    /// PostgreSQL connection URL.
    ///
    /// Environment variable: `DATABASE_URL`
    #[serde(default = "default_database_url", alias = "DATABASE_URL")]
    pub database_url: String,
    /// Maximum number of database connections in the pool.
    ///
    /// Environment variable: `DATABASE_MAX_CONNECTIONS`
    #[serde(default = "default_max_connections", alias = "DATABASE_MAX_CONNECTIONS")]
    pub database_max_connections: u32,

    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    // Inbound
    /// Path providers post events to; also the signed path.
    ///
    /// Environment variable: `INGEST_PATH`
    #[serde(default = "default_ingest_path", alias = "INGEST_PATH")]
    pub ingest_path: String,
    /// Secret shared with the provider. Required.
    ///
    /// Environment variable: `INBOUND_SECRET`
    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret", alias = "INBOUND_SECRET")]
    pub inbound_secret: Option<SecretString>,
    /// Accepted clock skew for `X-Timestamp`.
    ///
    /// Environment variable: `TIMESTAMP_TOLERANCE_SECONDS`
    #[serde(default = "default_tolerance", alias = "TIMESTAMP_TOLERANCE_SECONDS")]
    pub timestamp_tolerance_seconds: i64,

    // Destination
    /// Destination URL. Forwarding is skipped while unset.
    ///
    /// Environment variable: `DESTINATION_URL`
    #[serde(default, alias = "DESTINATION_URL")]
    pub destination_url: Option<String>,
    /// Secret used to sign envelopes for the destination.
    ///
    /// Environment variable: `OUTBOUND_SECRET`
    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret", alias = "OUTBOUND_SECRET")]
    pub outbound_secret: Option<SecretString>,
    /// Bearer token for the destination.
    ///
    /// Environment variable: `DESTINATION_TOKEN`
    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret", alias = "DESTINATION_TOKEN")]
    pub destination_token: Option<SecretString>,
    /// Value sent in `X-Device-ID`.
    ///
    /// Environment variable: `DEVICE_ID`
    #[serde(default = "default_device_id", alias = "DEVICE_ID")]
    pub device_id: String,
    /// Source identifier written into envelopes.
    ///
    /// Environment variable: `EVENT_SOURCE`
    #[serde(default = "default_event_source", alias = "EVENT_SOURCE")]
    pub event_source: String,

    // Retry
    /// Maximum forwarding attempts per event.
    ///
    /// Environment variable: `MAX_RETRY_ATTEMPTS`
    #[serde(default = "default_retry_attempts", alias = "MAX_RETRY_ATTEMPTS")]
    pub max_retry_attempts: u32,
    /// Backoff multiplier in milliseconds.
    ///
    /// Environment variable: `RETRY_BASE_DELAY_MS`
    #[serde(default = "default_base_delay_ms", alias = "RETRY_BASE_DELAY_MS")]
    pub retry_base_delay_ms: u64,
    /// Backoff exponent base.
    ///
    /// Environment variable: `RETRY_BACKOFF_BASE`
    #[serde(default = "default_backoff_base", alias = "RETRY_BACKOFF_BASE")]
    pub retry_backoff_base: u32,
    /// Upper bound of the random jitter in milliseconds.
    ///
    /// Environment variable: `RETRY_MAX_JITTER_MS`
    #[serde(default = "default_max_jitter_ms", alias = "RETRY_MAX_JITTER_MS")]
    pub retry_max_jitter_ms: u64,
    /// Ceiling for any single wait in milliseconds.
    ///
    /// Environment variable: `RETRY_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms", alias = "RETRY_MAX_DELAY_MS")]
    pub retry_max_delay_ms: u64,

    // Client
    /// Timeout of a single forwarding request in seconds.
    ///
    /// Environment variable: `DELIVERY_TIMEOUT_SECONDS`
    #[serde(default = "default_delivery_timeout", alias = "DELIVERY_TIMEOUT_SECONDS")]
    pub delivery_timeout_seconds: u64,

    // Retention
    /// How long fingerprints block duplicates.
    ///
    /// Environment variable: `REPLAY_RETENTION_HOURS`
    #[serde(default = "default_replay_retention", alias = "REPLAY_RETENTION_HOURS")]
    pub replay_retention_hours: u64,
    /// How long outcome records are kept.
    ///
    /// Environment variable: `OUTCOME_RETENTION_DAYS`
    #[serde(default = "default_outcome_retention", alias = "OUTCOME_RETENTION_DAYS")]
    pub outcome_retention_days: u64,
    /// Interval between retention sweeps in seconds.
    ///
    /// Environment variable: `RETENTION_SWEEP_INTERVAL_SECONDS`
    #[serde(default = "default_sweep_interval", alias = "RETENTION_SWEEP_INTERVAL_SECONDS")]
    pub retention_sweep_interval_seconds: u64,

    // Admin
    /// Bearer token for the admin read surface. Admin routes refuse every
    /// request while unset.
    ///
    /// Environment variable: `ADMIN_TOKEN`
    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret", alias = "ADMIN_TOKEN")]
    pub admin_token: Option<SecretString>,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

/// Inbound verification settings.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Secret shared with the provider.
    pub secret: InboundSecret,
    /// Accepted clock skew in seconds.
    pub tolerance_seconds: i64,
}

/// Retention windows for the two durable stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    /// Fingerprint lifetime.
    pub replay: Duration,
    /// Outcome record lifetime.
    pub outcomes: Duration,
    /// Time between sweeps.
    pub sweep_interval: Duration,
}

impl Config {
    /// Load configuration from defaults, config file, and environment
    /// variable overrides.
    ///
    /// # Errors
    ///
    /// Fails if a source cannot be parsed or validation fails.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Inbound verification secret.
    ///
    /// # Errors
    ///
    /// Fails if the secret is unset or shorter than 32 bytes.
    pub fn inbound_secret(&self) -> Result<InboundSecret> {
        let secret = self.inbound_secret.as_ref().context("INBOUND_SECRET must be set")?;
        InboundSecret::new(secret.expose_secret()).map_err(Into::into)
    }

    /// Convert to verifier configuration.
    ///
    /// # Errors
    ///
    /// Fails if the inbound secret is unset or too short.
    pub fn to_verifier_config(&self) -> Result<VerifierConfig> {
        Ok(VerifierConfig {
            secret: self.inbound_secret()?,
            tolerance_seconds: self.timestamp_tolerance_seconds,
        })
    }

    /// Outbound signing secret, if configured.
    ///
    /// # Errors
    ///
    /// Fails if the secret is set but shorter than 32 bytes.
    pub fn outbound_secret(&self) -> Result<Option<OutboundSecret>> {
        self.outbound_secret
            .as_ref()
            .map(|s| OutboundSecret::new(s.expose_secret()).map_err(Into::into))
            .transpose()
    }

    /// Convert to destination configuration.
    ///
    /// # Errors
    ///
    /// Fails if the outbound secret is invalid.
    pub fn to_destination_config(&self) -> Result<DestinationConfig> {
        Ok(DestinationConfig {
            url: self.destination_url.clone().filter(|u| !u.trim().is_empty()),
            outbound_secret: self.outbound_secret()?,
            bearer_token: self.destination_token.as_ref().map(|t| t.expose_secret().to_string()),
            device_id: self.device_id.clone(),
        })
    }

    /// Convert to client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.delivery_timeout_seconds),
            ..ClientConfig::default()
        }
    }

    /// Convert to retry policy.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            backoff_base: self.retry_backoff_base,
            max_jitter: Duration::from_millis(self.retry_max_jitter_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    /// Convert to retention configuration.
    pub fn to_retention_config(&self) -> RetentionConfig {
        RetentionConfig {
            replay: Duration::from_secs(self.replay_retention_hours * 3600),
            outcomes: Duration::from_secs(self.outcome_retention_days * 86_400),
            sweep_interval: Duration::from_secs(self.retention_sweep_interval_seconds),
        }
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Fails if host and port do not form a socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Get database URL with password masked for logging.
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let mut masked = self.database_url.clone();
                masked.replace_range(colon_pos + 1..at_pos, "***");
                return masked;
            }
        }
        self.database_url.clone()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.database_max_connections == 0 {
            anyhow::bail!("database max_connections must be greater than 0");
        }

        if !self.ingest_path.starts_with('/') {
            anyhow::bail!("ingest_path must start with '/'");
        }

        if matches!(self.ingest_path.as_str(), "/health" | "/live")
            || self.ingest_path.starts_with("/admin")
        {
            anyhow::bail!("ingest_path collides with a built-in route");
        }

        self.inbound_secret()?;
        self.outbound_secret()?;

        if self.timestamp_tolerance_seconds <= 0 {
            anyhow::bail!("timestamp_tolerance_seconds must be greater than 0");
        }

        if self.max_retry_attempts == 0 {
            anyhow::bail!("max_retry_attempts must be greater than 0");
        }

        if self.retry_backoff_base == 0 {
            anyhow::bail!("retry_backoff_base must be greater than 0");
        }

        if self.replay_retention_hours == 0 {
            anyhow::bail!("replay_retention_hours must be greater than 0");
        }

        if self.retention_sweep_interval_seconds == 0 {
            anyhow::bail!("retention_sweep_interval_seconds must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            database_max_connections: default_max_connections(),
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            ingest_path: default_ingest_path(),
            inbound_secret: None,
            timestamp_tolerance_seconds: default_tolerance(),
            destination_url: None,
            outbound_secret: None,
            destination_token: None,
            device_id: default_device_id(),
            event_source: default_event_source(),
            max_retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_backoff_base: default_backoff_base(),
            retry_max_jitter_ms: default_max_jitter_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            delivery_timeout_seconds: default_delivery_timeout(),
            replay_retention_hours: default_replay_retention(),
            outcome_retention_days: default_outcome_retention(),
            retention_sweep_interval_seconds: default_sweep_interval(),
            admin_token: None,
            rust_log: default_log_level(),
        }
    }
}

fn default_database_url() -> String {
    "postgresql://localhost/webhook_relay".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_ingest_path() -> String {
    "/webhook/entry".to_string()
}

fn default_tolerance() -> i64 {
    60
}

fn default_device_id() -> String {
    "webhook-relay".to_string()
}

fn default_event_source() -> String {
    "webhook-gateway".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_base() -> u32 {
    2
}

fn default_max_jitter_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_delivery_timeout() -> u64 {
    30
}

fn default_replay_retention() -> u64 {
    24
}

fn default_outcome_retention() -> u64 {
    7
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Reads an optional secret, treating an empty value as unset.
fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()).map(SecretString::from))
}
