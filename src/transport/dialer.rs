use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rskafka::client::ClientBuilder;
use rskafka::client::partition::UnknownTopicHandling;
use rustls::ClientConfig;
use tokio::time::timeout;
use tracing::debug;

use crate::credentials::CredentialBundle;
use crate::transport::endpoint::Endpoint;
use crate::transport::producer::{Connector, KafkaProducer, Producer};
use crate::utils::error::ConnectError;

/// Bound on bootstrap, metadata lookup and the partition leader connection.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Produces mutually-authenticated Kafka producers.
///
/// Cloning is cheap: every clone shares the bundle's TLS configuration.
#[derive(Clone)]
pub struct Dialer {
    tls: Arc<ClientConfig>,
    timeout: Duration,
}

impl Dialer {
    pub fn new(bundle: &CredentialBundle) -> Self {
        Self {
            tls: bundle.client_config(),
            timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Bootstraps a Kafka client through `endpoint` and opens the leader of
    /// its partition. rskafka retries refused connections and failed
    /// handshakes internally, so those surface as `DialTimeout`.
    pub async fn dial(&self, endpoint: &Endpoint) -> Result<KafkaProducer, ConnectError> {
        match timeout(self.timeout, self.open(endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::DialTimeout {
                addr: endpoint.bootstrap(),
                timeout: self.timeout,
            }),
        }
    }

    async fn open(&self, endpoint: &Endpoint) -> Result<KafkaProducer, ConnectError> {
        let addr = endpoint.bootstrap();
        let kafka = |source| ConnectError::Kafka {
            addr: addr.clone(),
            source,
        };

        // the bootstrap host doubles as the TLS server name
        let client = ClientBuilder::new(vec![addr.clone()])
            .tls_config(Arc::clone(&self.tls))
            .build()
            .await
            .map_err(kafka)?;

        let partition = client
            .partition_client(
                endpoint.topic().to_string(),
                endpoint.partition_index(),
                UnknownTopicHandling::Error,
            )
            .await
            .map_err(kafka)?;

        debug!(
            %addr,
            topic = endpoint.topic(),
            partition = endpoint.partition_index(),
            "connected to broker"
        );
        Ok(KafkaProducer::new(partition, endpoint.clone()))
    }
}

#[async_trait]
impl Connector for Dialer {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Producer>, ConnectError> {
        let producer = self.dial(endpoint).await?;
        Ok(Arc::new(producer))
    }
}
