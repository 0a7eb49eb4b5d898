//! Publisher session
//!
//! A `Session` owns exactly one producer for one topic partition. Its
//! lifecycle is open -> many publishes -> close:
//! - `open` dials through a `Connector` and fails with `ConnectError`
//! - `publish` sends one keyed record under a fresh deadline and, at
//!   `AckLevel::Broker`, waits for the broker's acknowledgement
//! - `close` settles outstanding unacknowledged sends and releases the
//!   producer; calling it again is a no-op
//!
//! `publish` never retries. Callers decide what a failure means.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rskafka::record::Record;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::transport::endpoint::Endpoint;
use crate::transport::producer::{Connector, Producer};
use crate::utils::error::{ConnectError, PublishError};

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How much confirmation `publish` waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckLevel {
    /// Hand the record to a background send and return.
    None,
    /// Return once the broker acknowledged the record.
    #[default]
    Broker,
}

impl AckLevel {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(AckLevel::None),
            1 => Some(AckLevel::Broker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub write_timeout: Duration,
    pub acks: AckLevel,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            acks: AckLevel::default(),
        }
    }
}

pub struct Session {
    endpoint: Endpoint,
    options: SessionOptions,
    producer: Option<Arc<dyn Producer>>,
    unacked: JoinSet<()>,
}

impl Session {
    pub async fn open(
        connector: &dyn Connector,
        endpoint: Endpoint,
        options: SessionOptions,
    ) -> Result<Self, ConnectError> {
        let producer = connector.connect(&endpoint).await?;
        Ok(Self {
            endpoint,
            options,
            producer: Some(producer),
            unacked: JoinSet::new(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.producer.is_some()
    }

    /// Publishes one payload and returns the record key it was sent under.
    ///
    /// When `key` is `None` a fresh UUID is used.
    pub async fn publish(
        &mut self,
        payload: &[u8],
        key: Option<&str>,
    ) -> Result<String, PublishError> {
        let producer = Arc::clone(self.producer.as_ref().ok_or(PublishError::NotOpen)?);
        let key = key
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let record = Record {
            key: Some(key.clone().into_bytes()),
            value: Some(payload.to_vec()),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };
        let deadline = self.options.write_timeout;
        let topic = self.endpoint.topic().to_string();

        match self.options.acks {
            AckLevel::Broker => match timeout(deadline, producer.produce(record)).await {
                Ok(Ok(())) => Ok(key),
                Ok(Err(source)) => Err(PublishError::Transport { topic, key, source }),
                Err(_) => Err(PublishError::Timeout {
                    topic,
                    key,
                    timeout: deadline,
                }),
            },
            AckLevel::None => {
                while self.unacked.try_join_next().is_some() {}

                let id = key.clone();
                self.unacked.spawn(async move {
                    match timeout(deadline, producer.produce(record)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!(%topic, key = %id, "unacknowledged send failed: {e}"),
                        Err(_) => warn!(%topic, key = %id, "unacknowledged send timed out"),
                    }
                });
                Ok(key)
            }
        }
    }

    /// Settles background sends and releases the producer. Idempotent.
    pub async fn close(&mut self) {
        let Some(producer) = self.producer.take() else {
            return;
        };

        if !self.unacked.is_empty() {
            let deadline = self.options.write_timeout;
            let unacked = &mut self.unacked;
            let settle = async { while unacked.join_next().await.is_some() {} };
            if timeout(deadline, settle).await.is_err() {
                debug!(pending = self.unacked.len(), "abandoning unacknowledged sends");
                self.unacked.abort_all();
            }
        }

        producer.close().await;
        debug!(addr = %self.endpoint.bootstrap(), "session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.producer.is_some() {
            // dropping the producer still tears the connection down
            warn!(
                addr = %self.endpoint.bootstrap(),
                "session dropped without close"
            );
        }
    }
}
