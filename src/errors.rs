// src/errors.rs

//! Defines the error type returned by the server lifecycle operations.

use std::net::SocketAddr;
use thiserror::Error;

/// Failures reported by [`GracefulServer`](crate::server::GracefulServer).
///
/// Everything except [`ServerError::Accept`] is raised before the accept loop
/// starts, so the server is still stopped when the caller sees it.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read listener address: {0}")]
    LocalAddr(#[source] std::io::Error),

    #[error("Failed to read TLS file '{path}': {source}")]
    CertificateRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No certificates found in '{0}'")]
    NoCertificates(String),

    #[error("No private key found in key file '{0}'")]
    NoPrivateKey(String),

    #[error("Invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),

    /// The listener failed while accepting; the loop was terminated.
    #[error("Listener on {addr} failed: {source}")]
    Accept {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server is already serving")]
    AlreadyServing,

    /// A start was attempted while the previous cycle was still draining.
    #[error("Server is still draining its previous connections")]
    Draining,
}

/// Type alias for results of server operations.
pub type ServerResult<T> = std::result::Result<T, ServerError>;
