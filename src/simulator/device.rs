//! Device simulator
//!
//! One simulated sensor. It walks the states
//! `Idle -> Connected -> {Publishing <-> Sleeping} -> Terminated`:
//! - the session is opened once; a failed open terminates the device
//! - every tick generates a fresh `Reading`, encodes it and publishes it,
//!   waiting for the ack before the next reading is generated
//! - a failed publish terminates the device unless the `RetryPolicy` allows
//!   reconnect-and-resend attempts with exponential backoff
//! - cancellation is observed while connecting (including reconnects),
//!   sleeping and backing off
//!
//! Whatever the exit path, `run` closes the session before returning.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::telemetry::{Reading, encode};
use crate::transport::{Connector, Endpoint, Session, SessionOptions};
use crate::utils::error::SimulatorError;

pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Idle,
    Connected,
    Publishing,
    Sleeping,
    Terminated,
}

/// How many times a failed publish is retried before the device gives up.
///
/// The default (`max_retries == 0`) stops the device on its first failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `backoff * 2^(attempt-1)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor)
    }
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub device_id: String,
    pub endpoint: Endpoint,
    pub interval: Duration,
    pub session: SessionOptions,
    pub retry: RetryPolicy,
}

/// What a device did before it terminated.
#[derive(Debug)]
pub struct DeviceReport {
    pub device_id: String,
    pub published: u64,
    pub error: Option<SimulatorError>,
}

enum Delivery {
    Sent,
    Cancelled,
}

pub struct DeviceSimulator {
    config: DeviceConfig,
    connector: Arc<dyn Connector>,
    shutdown: CancellationToken,
    state: DeviceState,
    published: u64,
}

impl DeviceSimulator {
    pub fn new(
        config: DeviceConfig,
        connector: Arc<dyn Connector>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            connector,
            shutdown,
            state: DeviceState::Idle,
            published: 0,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Drives the device until cancellation or a fatal error.
    pub async fn run(mut self) -> DeviceReport {
        let mut session = None;
        let result = self.drive(&mut session).await;

        if let Some(mut session) = session.take() {
            session.close().await;
        }
        self.transition(DeviceState::Terminated);

        match &result {
            Ok(()) => info!(
                device = %self.config.device_id,
                published = self.published,
                "device stopped"
            ),
            Err(e) => error!(published = self.published, "device terminated: {e}"),
        }

        DeviceReport {
            device_id: self.config.device_id,
            published: self.published,
            error: result.err(),
        }
    }

    async fn drive(&mut self, slot: &mut Option<Session>) -> Result<(), SimulatorError> {
        let shutdown = self.shutdown.clone();

        let session = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            opened = self.open_session() => opened?,
        };
        *slot = Some(session);

        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let reading = Reading::generate(&self.config.device_id);
            let payload = encode(&reading).map_err(|source| SimulatorError::Encoding {
                device: self.config.device_id.clone(),
                source,
            })?;
            let key = reading.key();

            if let Delivery::Cancelled = self.deliver(slot, &payload, &key).await? {
                return Ok(());
            }
            self.published += 1;
            info!(
                device = %self.config.device_id,
                %key,
                payload = %String::from_utf8_lossy(&payload),
                "sent message"
            );

            self.transition(DeviceState::Sleeping);
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = sleep(self.config.interval) => {}
            }
        }
    }

    /// Publishes one payload, reconnecting and resending under the retry
    /// policy. The same key is reused for every attempt.
    async fn deliver(
        &mut self,
        slot: &mut Option<Session>,
        payload: &[u8],
        key: &str,
    ) -> Result<Delivery, SimulatorError> {
        let mut attempt = 0;
        loop {
            match self.attempt(slot, payload, key).await {
                Ok(delivery) => return Ok(delivery),
                Err(e) if attempt < self.config.retry.max_retries => {
                    attempt += 1;
                    let delay = self.config.retry.delay(attempt);
                    warn!(attempt, ?delay, "{e}; retrying");

                    if let Some(mut session) = slot.take() {
                        session.close().await;
                    }
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return Ok(Delivery::Cancelled),
                        _ = sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &mut self,
        slot: &mut Option<Session>,
        payload: &[u8],
        key: &str,
    ) -> Result<Delivery, SimulatorError> {
        let shutdown = self.shutdown.clone();
        let session = match slot.take() {
            Some(session) => session,
            None => tokio::select! {
                _ = shutdown.cancelled() => return Ok(Delivery::Cancelled),
                opened = self.open_session() => opened?,
            },
        };
        let session = slot.insert(session);

        self.transition(DeviceState::Publishing);
        session
            .publish(payload, Some(key))
            .await
            .map(|_| Delivery::Sent)
            .map_err(|source| SimulatorError::Publish {
                device: self.config.device_id.clone(),
                source,
            })
    }

    async fn open_session(&mut self) -> Result<Session, SimulatorError> {
        let session = Session::open(
            self.connector.as_ref(),
            self.config.endpoint.clone(),
            self.config.session.clone(),
        )
        .await
        .map_err(|source| SimulatorError::Connect {
            device: self.config.device_id.clone(),
            source,
        })?;
        self.transition(DeviceState::Connected);
        Ok(session)
    }

    fn transition(&mut self, next: DeviceState) {
        if self.state != next {
            debug!(device = %self.config.device_id, from = ?self.state, to = ?next, "state change");
            self.state = next;
        }
    }
}
