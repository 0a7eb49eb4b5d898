use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, InconsistentKeys, RootCertStore};
use tracing::info;

use crate::utils::error::CredentialError;

/// The client identity and trusted roots used for every broker connection.
///
/// Loaded once at startup. The assembled TLS client configuration lives
/// behind an `Arc` and is handed to every dialer, so the whole fleet shares
/// one immutable copy.
#[derive(Debug)]
pub struct CredentialBundle {
    client_config: Arc<ClientConfig>,
    trusted_roots: usize,
    chain_len: usize,
}

impl CredentialBundle {
    /// Loads the client certificate/key pair and the CA bundle from PEM files.
    ///
    /// Only reads files. Fails with `CredentialLoad` when the pair cannot be
    /// parsed or does not match, and with `TrustStore` when the CA file is
    /// unreadable or holds no usable certificate.
    pub fn load<C, K, CA>(cert: C, key: K, ca: CA) -> Result<Self, CredentialError>
    where
        C: AsRef<Path>,
        K: AsRef<Path>,
        CA: AsRef<Path>,
    {
        let (cert, key, ca) = (cert.as_ref(), key.as_ref(), ca.as_ref());
        let load_err = |reason: String| CredentialError::CredentialLoad {
            cert: cert.to_path_buf(),
            key: key.to_path_buf(),
            reason,
        };

        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let chain = certs_from_pem_file(cert).map_err(load_err)?;
        let key_der = key_from_pem_file(key).map_err(load_err)?;
        let signing_key = provider
            .key_provider
            .load_private_key(key_der.clone_key())
            .map_err(|e| load_err(e.to_string()))?;
        match CertifiedKey::new(chain.clone(), signing_key).keys_match() {
            // keys whose public half the provider cannot expose are trusted as-is
            Ok(()) | Err(rustls::Error::InconsistentKeys(InconsistentKeys::Unknown)) => {}
            Err(e) => return Err(load_err(e.to_string())),
        }

        let roots = roots_from_pem_file(ca)?;
        let trusted_roots = roots.len();
        let chain_len = chain.len();

        let client_config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| load_err(e.to_string()))?
            .with_root_certificates(roots)
            .with_client_auth_cert(chain, key_der)
            .map_err(|e| load_err(e.to_string()))?;

        info!(
            cert = %cert.display(),
            ca = %ca.display(),
            trusted_roots,
            "loaded client credentials"
        );

        Ok(Self {
            client_config: Arc::new(client_config),
            trusted_roots,
            chain_len,
        })
    }

    /// Shared TLS client configuration: presents the client certificate and
    /// verifies peers against the trusted roots.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.client_config)
    }

    /// Number of CA certificates in the trust store.
    pub fn trusted_roots(&self) -> usize {
        self.trusted_roots
    }

    /// Number of certificates in the presented client chain.
    pub fn chain_len(&self) -> usize {
        self.chain_len
    }
}

fn open(path: &Path) -> Result<BufReader<File>, String> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| format!("unable to open {}: {e}", path.display()))
}

fn certs_from_pem_file(path: &Path) -> Result<Vec<CertificateDer<'static>>, String> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("unable to read certificates: {e}"))?;
    if certs.is_empty() {
        return Err("no certificate found".to_string());
    }
    Ok(certs)
}

fn key_from_pem_file(path: &Path) -> Result<PrivateKeyDer<'static>, String> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| format!("unable to read private key: {e}"))?
        .ok_or_else(|| "no private key found".to_string())
}

fn roots_from_pem_file(path: &Path) -> Result<RootCertStore, CredentialError> {
    let trust_err = |reason: String| CredentialError::TrustStore {
        path: PathBuf::from(path),
        reason,
    };

    let mut reader = open(path).map_err(trust_err)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| trust_err(format!("unable to read certificates: {e}")))?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(trust_err(format!(
            "no parseable CA certificate ({ignored} rejected)"
        )));
    }
    Ok(roots)
}
