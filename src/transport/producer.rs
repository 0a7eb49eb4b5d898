//! Producer seam
//!
//! A `Connector` turns an `Endpoint` into a `Producer` bound to one topic
//! partition. `Session` only talks to these two traits; the Kafka `Dialer`
//! is the production implementation.

use std::sync::Arc;

use async_trait::async_trait;
use rskafka::client::partition::{Compression, PartitionClient};
use rskafka::record::Record;
use tracing::debug;

use crate::transport::endpoint::Endpoint;
use crate::utils::error::{ConnectError, ProduceError};

/// Sends records to the partition it was opened for.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Resolves once the broker acknowledged the record.
    async fn produce(&self, record: Record) -> Result<(), ProduceError>;

    /// Releases the broker connection. Called once per session.
    async fn close(&self) {}
}

/// Opens producers.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Producer>, ConnectError>;
}

/// A producer over one rskafka partition client.
pub struct KafkaProducer {
    client: PartitionClient,
    endpoint: Endpoint,
}

impl KafkaProducer {
    pub(crate) fn new(client: PartitionClient, endpoint: Endpoint) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn produce(&self, record: Record) -> Result<(), ProduceError> {
        let offsets = self
            .client
            .produce(vec![record], Compression::NoCompression)
            .await?;
        debug!(
            topic = self.endpoint.topic(),
            partition = self.endpoint.partition_index(),
            ?offsets,
            "record acknowledged"
        );
        Ok(())
    }

    async fn close(&self) {
        // connections go away with the last handle on the client
        debug!(addr = %self.endpoint.bootstrap(), "kafka producer released");
    }
}
