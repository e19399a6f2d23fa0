// src/server/tls.rs

//! Builds TLS acceptors from PEM files or a caller-provided rustls configuration.

use crate::errors::{ServerError, ServerResult};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::{
    self,
    pki_types::{CertificateDer, PrivateKeyDer},
};
use tracing::info;

/// Loads a certificate chain and private key and builds an acceptor without
/// client authentication.
pub fn acceptor_from_pem(cert_path: &Path, key_path: &Path) -> ServerResult<TlsAcceptor> {
    info!(
        "Loading TLS certificate from '{}' and key from '{}'.",
        cert_path.display(),
        key_path.display()
    );
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;
    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn open(path: &Path) -> ServerResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ServerError::CertificateRead {
            path: path.display().to_string(),
            source,
        })
}

/// Loads TLS certificates from a PEM file.
pub fn load_certs(path: &Path) -> ServerResult<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ServerError::CertificateRead {
            path: path.display().to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(ServerError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

/// Loads the first private key found in a PEM file.
pub fn load_key(path: &Path) -> ServerResult<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| ServerError::CertificateRead {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| ServerError::NoPrivateKey(path.display().to_string()))
}
