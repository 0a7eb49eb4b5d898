use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::simulator::DEFAULT_SEND_INTERVAL;
use crate::transport::{AckLevel, DEFAULT_DIAL_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
use crate::utils::error::ConfigError;

/// Top-level configuration for a fleet run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: CredentialSettings,
    pub broker: BrokerSettings,
    pub fleet: FleetSettings,
    pub log_level: String,
}

/// Paths of the PEM files making up the mutual-TLS identity.
#[derive(Debug, Clone)]
pub struct CredentialSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_cert_path: PathBuf,
}

/// Where and how readings are published.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub host_url: String,
    pub topic: String,
    pub partition: Option<u32>,
    pub acks: AckLevel,
    pub dial_timeout: Duration,
    pub write_timeout: Duration,
}

/// Size and cadence of the simulated fleet.
#[derive(Debug, Clone)]
pub struct FleetSettings {
    pub size: usize,
    pub device_prefix: String,
    pub send_interval: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub fail_fast: bool,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            size: 100,
            device_prefix: "sensor".to_string(),
            send_interval: DEFAULT_SEND_INTERVAL,
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
            fail_fast: false,
        }
    }
}

/// Flat view of every source; keys match the environment variable names
/// once lowercased.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub ca_cert_path: Option<PathBuf>,
    pub host_url: Option<String>,
    pub host: Option<String>,
    pub topic: Option<String>,
    pub partition: Option<u32>,
    pub acks: Option<u8>,
    pub dial_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub fleet_size: Option<usize>,
    pub device_prefix: Option<String>,
    pub send_interval_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub fail_fast: Option<bool>,
    pub log_level: Option<String>,
}

impl Settings {
    /// Fills gaps with defaults and rejects missing or out-of-range values.
    pub fn from_partial(partial: PartialSettings) -> Result<Self, ConfigError> {
        let default = FleetSettings::default();

        let credentials = CredentialSettings {
            cert_path: required_path(partial.cert_path, "CERT_PATH")?,
            key_path: required_path(partial.key_path, "KEY_PATH")?,
            ca_cert_path: required_path(partial.ca_cert_path, "CA_CERT_PATH")?,
        };

        let host_url = partial
            .host_url
            .filter(|h| !h.trim().is_empty())
            .or(partial.host.filter(|h| !h.trim().is_empty()))
            .ok_or(ConfigError::Missing("HOST_URL"))?;
        let topic = partial
            .topic
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("TOPIC"))?;
        let acks = match partial.acks {
            None => AckLevel::default(),
            Some(level) => AckLevel::from_level(level).ok_or_else(|| ConfigError::Invalid {
                key: "ACKS",
                reason: format!("{level} is not 0 or 1"),
            })?,
        };

        let broker = BrokerSettings {
            host_url,
            topic,
            partition: partial.partition,
            acks,
            dial_timeout: millis(partial.dial_timeout_ms, DEFAULT_DIAL_TIMEOUT, "DIAL_TIMEOUT_MS")?,
            write_timeout: millis(partial.write_timeout_ms, DEFAULT_WRITE_TIMEOUT, "WRITE_TIMEOUT_MS")?,
        };

        let size = partial.fleet_size.unwrap_or(default.size);
        if size == 0 {
            return Err(ConfigError::Invalid {
                key: "FLEET_SIZE",
                reason: "fleet must have at least one device".to_string(),
            });
        }

        let fleet = FleetSettings {
            size,
            device_prefix: partial
                .device_prefix
                .filter(|p| !p.is_empty())
                .unwrap_or(default.device_prefix),
            send_interval: millis(partial.send_interval_ms, default.send_interval, "SEND_INTERVAL_MS")?,
            max_retries: partial.max_retries.unwrap_or(default.max_retries),
            retry_backoff: millis(partial.retry_backoff_ms, default.retry_backoff, "RETRY_BACKOFF_MS")?,
            fail_fast: partial.fail_fast.unwrap_or(default.fail_fast),
        };

        Ok(Settings {
            credentials,
            broker,
            fleet,
            log_level: partial.log_level.unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn required_path(value: Option<PathBuf>, key: &'static str) -> Result<PathBuf, ConfigError> {
    value
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn millis(value: Option<u64>, default: Duration, key: &'static str) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(0) => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        Some(ms) => Ok(Duration::from_millis(ms)),
    }
}
