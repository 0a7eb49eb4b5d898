//! Test fixtures: a throwaway PKI, an in-memory broker behind the
//! `Connector` seam, and a mutual-TLS listener that counts handshakes.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose};
use rskafka::record::Record;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::config::{BrokerSettings, CredentialSettings, FleetSettings, Settings};
use crate::credentials::CredentialBundle;
use crate::telemetry::{Reading, decode};
use crate::transport::{AckLevel, Connector, Endpoint, Producer};
use crate::utils::error::{ConnectError, ProduceError};

struct Issued {
    cert_pem: String,
    key_pem: String,
}

fn issue_ca(name: &str) -> (Certificate, KeyPair) {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name.push(DnType::CommonName, name);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    let cert = params.self_signed(&key).unwrap();
    (cert, key)
}

fn issue_leaf(name: &str, issuer: &Certificate, issuer_key: &KeyPair) -> Issued {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
    params.distinguished_name.push(DnType::CommonName, name);
    let cert = params.signed_by(&key, issuer, issuer_key).unwrap();
    Issued {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    }
}

/// A CA, a `localhost` server cert and a client cert it signed, plus the
/// same pair signed by an unrelated CA. PEM files live in a temp dir.
pub struct TestPki {
    dir: TempDir,
    ca_pem: String,
    server: Issued,
    foreign_server: Issued,
}

impl TestPki {
    pub fn generate() -> Self {
        let (ca, ca_key) = issue_ca("sensorfleet test ca");
        let (foreign_ca, foreign_key) = issue_ca("unrelated ca");

        let server = issue_leaf("localhost", &ca, &ca_key);
        let client = issue_leaf("fleet-client", &ca, &ca_key);
        let foreign_server = issue_leaf("localhost", &foreign_ca, &foreign_key);
        let foreign_client = issue_leaf("fleet-client", &foreign_ca, &foreign_key);

        let pki = Self {
            dir: TempDir::new().unwrap(),
            ca_pem: ca.pem(),
            server,
            foreign_server,
        };
        pki.write("ca.pem", &pki.ca_pem);
        pki.write("client.pem", &client.cert_pem);
        pki.write("client.key", &client.key_pem);
        pki.write("foreign-client.pem", &foreign_client.cert_pem);
        pki.write("foreign-client.key", &foreign_client.key_pem);
        pki
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn bundle(&self) -> CredentialBundle {
        CredentialBundle::load(self.path("client.pem"), self.path("client.key"), self.path("ca.pem"))
            .unwrap()
    }

    /// Client identity the broker does not trust.
    pub fn foreign_bundle(&self) -> CredentialBundle {
        CredentialBundle::load(
            self.path("foreign-client.pem"),
            self.path("foreign-client.key"),
            self.path("ca.pem"),
        )
        .unwrap()
    }

    /// Settings for a small, fast fleet against `broker_url`.
    pub fn settings(&self, broker_url: &str, size: usize, interval: Duration) -> Settings {
        Settings {
            credentials: CredentialSettings {
                cert_path: self.path("client.pem"),
                key_path: self.path("client.key"),
                ca_cert_path: self.path("ca.pem"),
            },
            broker: BrokerSettings {
                host_url: broker_url.to_string(),
                topic: "readings".to_string(),
                partition: None,
                acks: AckLevel::Broker,
                dial_timeout: Duration::from_secs(5),
                write_timeout: Duration::from_secs(5),
            },
            fleet: FleetSettings {
                size,
                send_interval: interval,
                ..Default::default()
            },
            log_level: "debug".to_string(),
        }
    }

    fn server_config(&self, server: &Issued) -> Arc<ServerConfig> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut ca_reader = self.ca_pem.as_bytes();
        let mut roots = RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut ca_reader) {
            roots.add(cert.unwrap()).unwrap();
        }
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .unwrap();

        let mut cert_reader = server.cert_pem.as_bytes();
        let chain = rustls_pemfile::certs(&mut cert_reader)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let mut key_reader = server.key_pem.as_bytes();
        let key = rustls_pemfile::private_key(&mut key_reader).unwrap().unwrap();

        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_client_cert_verifier(verifier)
            .with_single_cert(chain, key)
            .unwrap();
        Arc::new(config)
    }
}

/// How the in-memory broker answers produce requests.
#[derive(Debug, Clone, Default)]
pub enum Behaviour {
    /// Record and acknowledge everything.
    #[default]
    Ack,
    /// Record but never acknowledge.
    Silent,
    /// Refuse every record.
    Reject,
    /// Acknowledge `after` records from `device`, then fail every later one
    /// as if the connection dropped.
    DropDevice { device: String, after: usize },
    /// Refuse every connection.
    Unreachable,
    /// Fail the first record as if the connection dropped, then hang every
    /// later connection attempt.
    FailThenStall,
}

#[derive(Debug, Clone)]
pub struct Received {
    pub topic: String,
    pub partition: i32,
    pub key: String,
    pub payload: String,
}

impl Received {
    pub fn reading(&self) -> Reading {
        decode(self.payload.as_bytes()).expect("payload should decode")
    }
}

#[derive(Default)]
struct BrokerState {
    received: Mutex<Vec<Received>>,
    connections: AtomicUsize,
    closes: AtomicUsize,
}

/// Stands in for a Kafka cluster. Every `connect` is one session.
pub struct MemoryBroker {
    behaviour: Behaviour,
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            state: Arc::new(BrokerState::default()),
        })
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::parse("broker.test:9093", "readings", None).unwrap()
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn readings_from(&self, device: &str) -> Vec<Reading> {
        self.received()
            .iter()
            .map(Received::reading)
            .filter(|r| r.device_id == device)
            .collect()
    }

    /// Connection attempts that got past refusal, stalled ones included.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Producer releases, counted on every call.
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn Producer>, ConnectError> {
        if let Behaviour::Unreachable = self.behaviour {
            return Err(ConnectError::DialTimeout {
                addr: endpoint.bootstrap(),
                timeout: Duration::ZERO,
            });
        }
        let previous = self.state.connections.fetch_add(1, Ordering::SeqCst);
        if let Behaviour::FailThenStall = self.behaviour {
            if previous > 0 {
                std::future::pending::<()>().await;
            }
        }
        Ok(Arc::new(MemoryProducer {
            behaviour: self.behaviour.clone(),
            state: Arc::clone(&self.state),
            topic: endpoint.topic().to_string(),
            partition: endpoint.partition_index(),
        }))
    }
}

struct MemoryProducer {
    behaviour: Behaviour,
    state: Arc<BrokerState>,
    topic: String,
    partition: i32,
}

#[async_trait]
impl Producer for MemoryProducer {
    async fn produce(&self, record: Record) -> Result<(), ProduceError> {
        let payload = String::from_utf8(record.value.unwrap_or_default()).unwrap();
        let key = String::from_utf8(record.key.unwrap_or_default()).unwrap();

        if let Behaviour::FailThenStall = self.behaviour {
            return Err(ProduceError::Closed);
        }

        if let Behaviour::DropDevice { device, after } = &self.behaviour {
            let sender = decode(payload.as_bytes()).map(|r| r.device_id).unwrap_or_default();
            if &sender == device {
                let seen = self
                    .state
                    .received
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|r| decode(r.payload.as_bytes()).is_ok_and(|d| &d.device_id == device))
                    .count();
                if seen >= *after {
                    return Err(ProduceError::Closed);
                }
            }
        }

        self.state.received.lock().unwrap().push(Received {
            topic: self.topic.clone(),
            partition: self.partition,
            key,
            payload,
        });

        match &self.behaviour {
            Behaviour::Silent => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Behaviour::Reject => Err(ProduceError::Rejected("topic is read-only".to_string())),
            _ => Ok(()),
        }
    }

    async fn close(&self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Accepts mutual-TLS connections and then stays silent, so a Kafka client
/// gets through the handshake but never through bootstrap.
pub struct TlsListener {
    addr: SocketAddr,
    handshakes: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl TlsListener {
    pub async fn start(pki: &TestPki) -> Self {
        Self::serve(pki.server_config(&pki.server)).await
    }

    /// A listener whose certificate chains to a CA the client does not trust.
    pub async fn start_untrusted(pki: &TestPki) -> Self {
        Self::serve(pki.server_config(&pki.foreign_server)).await
    }

    async fn serve(config: Arc<ServerConfig>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = TlsAcceptor::from(config);
        let handshakes = Arc::new(AtomicUsize::new(0));

        let task = {
            let handshakes = handshakes.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let acceptor = acceptor.clone();
                    let handshakes = handshakes.clone();
                    tokio::spawn(async move {
                        let Ok(tls) = acceptor.accept(stream).await else {
                            return;
                        };
                        handshakes.fetch_add(1, Ordering::SeqCst);
                        // hold the connection open without answering
                        let _held = tls;
                        std::future::pending::<()>().await;
                    });
                }
            })
        };

        Self {
            addr,
            handshakes,
            task,
        }
    }

    /// `localhost:<port>`, matching the server certificate's name.
    pub fn bootstrap(&self) -> String {
        format!("localhost:{}", self.addr.port())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::parse(&self.bootstrap(), "readings", None).unwrap()
    }

    /// Connections that completed the mutual-TLS handshake.
    pub fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }
}

impl Drop for TlsListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Accepts TCP connections and never speaks, so TLS handshakes hang.
pub async fn stalling_listener() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    (addr, task)
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
