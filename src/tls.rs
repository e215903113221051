/// Loads the TLS material used for the shared listener, Raft peer dials
/// and client channels. Mutual TLS everywhere: servers verify client
/// certificates against the CA, clients present their certificate.
use std::{
  fs::{self, File},
  io::{self, BufReader},
  path::{Path, PathBuf},
  sync::{Arc, Once},
};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct TlsConfig {
  pub cert_file: PathBuf,
  pub key_file: PathBuf,
  pub ca_file: PathBuf,
}

/// Multiple rustls crypto providers end up linked in (tonic's TLS
/// feature brings ring, the default elsewhere is aws-lc-rs), so one
/// must be installed process-wide before any config is built.
fn install_crypto_provider() {
  static INSTALL: Once = Once::new();

  INSTALL.call_once(|| {
    let _ = rustls::crypto::ring::default_provider().install_default();
  });
}

/// Builds the rustls server config for the shared listener: our
/// certificate plus client-certificate verification against the CA.
pub fn setup_server_config(config: &TlsConfig) -> Result<Arc<rustls::ServerConfig>> {
  install_crypto_provider();

  let certs = load_certs(&config.cert_file)?;
  let key = load_key(&config.key_file)?;
  let roots = load_root_store(&config.ca_file)?;

  let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
    .build()
    .map_err(|e| Error::Tls(e.to_string()))?;

  let server_config = rustls::ServerConfig::builder()
    .with_client_cert_verifier(verifier)
    .with_single_cert(certs, key)
    .map_err(|e| Error::Tls(e.to_string()))?;

  Ok(Arc::new(server_config))
}

/// Builds the rustls client config used when dialing peers for Raft
/// replication.
pub fn setup_client_config(config: &TlsConfig) -> Result<Arc<rustls::ClientConfig>> {
  install_crypto_provider();

  let roots = load_root_store(&config.ca_file)?;
  let certs = load_certs(&config.cert_file)?;
  let key = load_key(&config.key_file)?;

  let client_config = rustls::ClientConfig::builder()
    .with_root_certificates(roots)
    .with_client_auth_cert(certs, key)
    .map_err(|e| Error::Tls(e.to_string()))?;

  Ok(Arc::new(client_config))
}

/// Builds the tonic client TLS config used by RPC clients and the
/// resolver.
pub fn setup_tonic_client_config(config: &TlsConfig) -> Result<tonic::transport::ClientTlsConfig> {
  install_crypto_provider();

  let ca = fs::read(&config.ca_file)?;
  let cert = fs::read(&config.cert_file)?;
  let key = fs::read(&config.key_file)?;

  Ok(
    tonic::transport::ClientTlsConfig::new()
      .ca_certificate(tonic::transport::Certificate::from_pem(ca))
      .identity(tonic::transport::Identity::from_pem(cert, key)),
  )
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
  let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(path)?))
    .collect::<io::Result<Vec<_>>>()?;

  if certs.is_empty() {
    return Err(Error::Tls(format!("no certificates in {}", path.display())));
  }

  Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
  rustls_pemfile::private_key(&mut BufReader::new(File::open(path)?))?
    .ok_or_else(|| Error::Tls(format!("no private key in {}", path.display())))
}

fn load_root_store(path: &Path) -> Result<RootCertStore> {
  let mut roots = RootCertStore::empty();

  for cert in load_certs(path)? {
    roots.add(cert).map_err(|e| Error::Tls(e.to_string()))?;
  }

  Ok(roots)
}
