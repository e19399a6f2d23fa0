// src/server/context.rs

use super::handler::ConnectionHandler;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tokio_rustls::TlsAcceptor;

/// Everything one run of the accept loop needs, assembled by the start call.
pub(super) struct LoopContext<H: ConnectionHandler> {
    pub listener: TcpListener,
    pub local_addr: SocketAddr,
    pub acceptor: Option<TlsAcceptor>,
    pub handler: Arc<H>,
    /// Carries the grace timeout of the first accepted stop request.
    pub stop_rx: watch::Receiver<Option<Duration>>,
    pub connection_permits: Option<Arc<Semaphore>>,
    /// Used to drain after a listener fault, when nobody asked for a stop.
    pub default_grace: Duration,
}
