//! Fleet coordinator
//!
//! Starts one `DeviceSimulator` task per device and waits for all of them.
//! Devices share nothing but the connector and its TLS configuration. A failing
//! device only stops itself unless `fail_fast` is set, in which case its
//! failure cancels the rest of the fleet.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::credentials::CredentialBundle;
use crate::simulator::device::{DeviceConfig, DeviceReport, DeviceSimulator, RetryPolicy};
use crate::transport::{Connector, Dialer, Endpoint, SessionOptions};
use crate::utils::error::StartupError;

#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub size: usize,
    pub device_prefix: String,
    pub endpoint: Endpoint,
    pub interval: Duration,
    pub session: SessionOptions,
    pub retry: RetryPolicy,
    pub fail_fast: bool,
}

/// `sensor-1`, `sensor-2`, ... for the default prefix.
pub fn device_id(prefix: &str, n: usize) -> String {
    format!("{prefix}-{n}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFailure {
    pub device_id: String,
    pub error: String,
}

/// Outcome of a fleet run.
#[derive(Debug, Default)]
pub struct FleetReport {
    pub devices: usize,
    pub published: BTreeMap<String, u64>,
    pub failures: Vec<DeviceFailure>,
}

impl FleetReport {
    pub fn total_published(&self) -> u64 {
        self.published.values().sum()
    }

    /// True when every device stopped without an error.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, device: DeviceReport) {
        if let Some(e) = &device.error {
            self.failures.push(DeviceFailure {
                device_id: device.device_id.clone(),
                error: e.to_string(),
            });
        }
        self.published.insert(device.device_id, device.published);
    }
}

pub struct Fleet {
    config: FleetConfig,
    connector: Arc<dyn Connector>,
}

impl Fleet {
    pub fn new(config: FleetConfig, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    /// Loads credentials and resolves the endpoint. Nothing is dialed here,
    /// so any error means no device ever connected.
    pub fn from_settings(settings: &Settings) -> Result<Self, StartupError> {
        let creds = &settings.credentials;
        let bundle = CredentialBundle::load(&creds.cert_path, &creds.key_path, &creds.ca_cert_path)?;
        let endpoint = Endpoint::parse(
            &settings.broker.host_url,
            settings.broker.topic.clone(),
            settings.broker.partition,
        )?;
        let dialer = Dialer::new(&bundle).with_timeout(settings.broker.dial_timeout);

        let config = FleetConfig {
            size: settings.fleet.size,
            device_prefix: settings.fleet.device_prefix.clone(),
            endpoint,
            interval: settings.fleet.send_interval,
            session: SessionOptions {
                write_timeout: settings.broker.write_timeout,
                acks: settings.broker.acks,
            },
            retry: RetryPolicy {
                max_retries: settings.fleet.max_retries,
                backoff: settings.fleet.retry_backoff,
            },
            fail_fast: settings.fleet.fail_fast,
        };
        Ok(Self::new(config, Arc::new(dialer)))
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    fn device_config(&self, n: usize) -> DeviceConfig {
        DeviceConfig {
            device_id: device_id(&self.config.device_prefix, n),
            endpoint: self.config.endpoint.clone(),
            interval: self.config.interval,
            session: self.config.session.clone(),
            retry: self.config.retry.clone(),
        }
    }

    /// Runs every device until `shutdown` is cancelled or each one has
    /// terminated on its own.
    pub async fn run(self, shutdown: CancellationToken) -> FleetReport {
        let mut workers = JoinSet::new();
        let mut names = HashMap::new();

        for n in 1..=self.config.size {
            let device = DeviceSimulator::new(
                self.device_config(n),
                Arc::clone(&self.connector),
                shutdown.child_token(),
            );
            let name = device.device_id().to_string();
            let handle = workers.spawn(device.run());
            names.insert(handle.id(), name);
        }
        info!(
            devices = self.config.size,
            bootstrap = %self.config.endpoint.bootstrap(),
            topic = self.config.endpoint.topic(),
            "fleet started"
        );

        let mut report = FleetReport {
            devices: self.config.size,
            ..Default::default()
        };

        while let Some(joined) = workers.join_next().await {
            let failed = match joined {
                Ok(device) => {
                    let failed = device.error.is_some();
                    report.record(device);
                    failed
                }
                Err(e) => {
                    let device_id = names
                        .get(&e.id())
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string());
                    error!(device = %device_id, "device task aborted: {e}");
                    report.failures.push(DeviceFailure {
                        device_id: device_id.clone(),
                        error: e.to_string(),
                    });
                    report.published.entry(device_id).or_insert(0);
                    true
                }
            };

            if failed && self.config.fail_fast && !shutdown.is_cancelled() {
                warn!("device failure with fail_fast set; stopping fleet");
                shutdown.cancel();
            }
        }

        info!(
            published = report.total_published(),
            failures = report.failures.len(),
            "fleet stopped"
        );
        report
    }
}
