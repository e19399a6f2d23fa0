// tests/integration/tls_test.rs

use super::test_helpers::*;
use gracewell::ServerError;
use gracewell::server::tls;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{self, RootCertStore, pki_types::ServerName};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn cert_path() -> PathBuf {
    fixture("cert.pem")
}

fn key_path() -> PathBuf {
    fixture("key.pem")
}

fn connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    for cert in tls::load_certs(&cert_path()).unwrap() {
        roots.add(cert).unwrap();
    }
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

async fn connect_tls(addr: std::net::SocketAddr) -> BufReader<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await.unwrap();
    let name = ServerName::try_from("localhost").unwrap();
    BufReader::new(connector().connect(name, tcp).await.unwrap())
}

fn temp_file_with(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_listen_and_serve_tls() {
    let server = local_server(echo_handler(), Duration::from_secs(1));
    let handle = tokio::spawn({
        let server = server.clone();
        async move { server.listen_and_serve_tls(cert_path(), key_path()).await }
    });
    let addr = wait_for_addr(&server).await;
    assert!(!server.is_stopped());

    let mut client = connect_tls(addr).await;
    assert_eq!(roundtrip(&mut client, "secret").await, "secret");

    server.shutdown();
    assert_eq!(read_line(&mut client).await, "BYE");
    join_server(handle).await.unwrap();
    assert!(server.is_stopped());
}

#[tokio::test]
async fn test_listen_and_serve_tls_config() {
    let certs = tls::load_certs(&cert_path()).unwrap();
    let key = tls::load_key(&key_path()).unwrap();
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();

    let server = local_server(echo_handler(), Duration::from_secs(1));
    let handle = tokio::spawn({
        let server = server.clone();
        async move { server.listen_and_serve_tls_config(Arc::new(config)).await }
    });
    let addr = wait_for_addr(&server).await;

    let mut client = connect_tls(addr).await;
    assert_eq!(roundtrip(&mut client, "configured").await, "configured");

    server.stop(Duration::ZERO);
    join_server(handle).await.unwrap();
}

#[tokio::test]
async fn test_failed_handshake_does_not_stop_server() {
    let server = local_server(echo_handler(), Duration::from_secs(1));
    let handle = tokio::spawn({
        let server = server.clone();
        async move { server.listen_and_serve_tls(cert_path(), key_path()).await }
    });
    let addr = wait_for_addr(&server).await;

    // Speak plain text to a TLS listener; the handshake fails and the socket is closed.
    let mut plain = TcpStream::connect(addr).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(&mut plain, b"GET / HTTP/1.0\r\n\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let _ = tokio::time::timeout(STARTUP_TIMEOUT, plain.read_to_end(&mut buf)).await;

    assert!(server.is_serving());
    let mut client = connect_tls(addr).await;
    assert_eq!(roundtrip(&mut client, "still here").await, "still here");

    server.stop(Duration::ZERO);
    join_server(handle).await.unwrap();
}

#[tokio::test]
async fn test_missing_certificate_file() {
    let server = local_server(echo_handler(), Duration::from_secs(1));
    let err = server
        .listen_and_serve_tls("/nonexistent/cert.pem", key_path())
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::CertificateRead { .. }), "unexpected error: {err}");
    assert!(server.is_stopped());
}

#[tokio::test]
async fn test_certificate_file_without_certificates() {
    let garbage = temp_file_with("this is not a certificate\n");
    let server = local_server(echo_handler(), Duration::from_secs(1));
    let err = server
        .listen_and_serve_tls(garbage.path(), key_path())
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::NoCertificates(_)), "unexpected error: {err}");
    assert!(server.is_stopped());
}

#[tokio::test]
async fn test_key_file_without_key() {
    let server = local_server(echo_handler(), Duration::from_secs(1));
    let err = server
        .listen_and_serve_tls(cert_path(), cert_path())
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::NoPrivateKey(_)), "unexpected error: {err}");
    assert!(server.is_stopped());
    assert!(server.local_addr().is_none());
}

#[test]
fn test_acceptor_from_pem() {
    assert!(tls::acceptor_from_pem(&cert_path(), &key_path()).is_ok());
}
