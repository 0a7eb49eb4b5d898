//! The `error` module defines the error types used across `sensorfleet`.
//!
//! Every stage of the pipeline owns one enum, so a failure always says where
//! it happened: loading credentials, dialing the broker, publishing a record,
//! encoding a reading, or reading configuration. `SimulatorError` adds the
//! device identity on top of the stage errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Startup failures while assembling the mutual-TLS credential bundle.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to load client certificate {cert:?} with key {key:?}: {reason}")]
    CredentialLoad {
        cert: PathBuf,
        key: PathBuf,
        reason: String,
    },

    #[error("failed to load trusted roots from {path:?}: {reason}")]
    TrustStore { path: PathBuf, reason: String },
}

/// Failures while dialing the broker or parsing its address.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid broker endpoint {address:?}: {reason}")]
    InvalidEndpoint { address: String, reason: String },

    #[error("dial to {addr} timed out after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },

    #[error("kafka connection to {addr} failed: {source}")]
    Kafka {
        addr: String,
        #[source]
        source: rskafka::client::error::Error,
    },
}

/// What a producer reports when a single record is not accepted.
#[derive(Debug, Error)]
pub enum ProduceError {
    #[error(transparent)]
    Kafka(#[from] rskafka::client::error::Error),

    #[error("broker rejected the record: {0}")]
    Rejected(String),

    #[error("connection closed by broker")]
    Closed,
}

/// Failures of a single publish on an open session.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish of {key} to topic {topic} timed out after {timeout:?}")]
    Timeout {
        topic: String,
        key: String,
        timeout: Duration,
    },

    #[error("publish of {key} to topic {topic} failed: {source}")]
    Transport {
        topic: String,
        key: String,
        #[source]
        source: ProduceError,
    },

    #[error("session is not open")]
    NotOpen,
}

impl PublishError {
    /// True when the publish deadline elapsed before the broker answered.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PublishError::Timeout { .. })
    }
}

/// Failures of the message codec.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("reading from {device} has non-finite value {value}")]
    NonFinite { device: String, value: f64 },

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// A device simulator stopped because one of its stages failed.
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("{device}: connect failed: {source}")]
    Connect {
        device: String,
        #[source]
        source: ConnectError,
    },

    #[error("{device}: publish failed: {source}")]
    Publish {
        device: String,
        #[source]
        source: PublishError,
    },

    #[error("{device}: encoding failed: {source}")]
    Encoding {
        device: String,
        #[source]
        source: EncodingError,
    },
}

impl SimulatorError {
    pub fn device(&self) -> &str {
        match self {
            SimulatorError::Connect { device, .. }
            | SimulatorError::Publish { device, .. }
            | SimulatorError::Encoding { device, .. } => device,
        }
    }
}

/// Anything that prevents the fleet from starting at all.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Endpoint(#[from] ConnectError),
}

/// Invalid or incomplete configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
