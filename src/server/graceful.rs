// src/server/graceful.rs

//! Defines `GracefulServer`, a TCP/TLS server whose lifecycle can be observed
//! and stopped from other tasks.

use super::connection_loop;
use super::context::LoopContext;
use super::drain::{DrainProgress, StopSignal};
use super::handler::ConnectionHandler;
use super::lifecycle::LifecycleState;
use super::tls;
use crate::config::Config;
use crate::errors::{ServerError, ServerResult};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Notify, Semaphore, watch};
use tokio_rustls::{TlsAcceptor, rustls};
use tracing::{debug, info};

/// A server that tracks whether it is serving and stops gracefully.
///
/// Every start method runs the accept loop on the calling task and only
/// returns once the loop has ended and open connections have been drained.
/// To keep the caller free, spawn the start call and keep the server in an
/// `Arc` so another task can call [`stop`](Self::stop):
///
/// ```ignore
/// let server = Arc::new(GracefulServer::new(8080, handler, Duration::from_secs(10)));
/// let serving = tokio::spawn({
///     let server = server.clone();
///     async move { server.listen_and_serve().await }
/// });
/// // ...later, e.g. after an exit signal:
/// server.stop(Duration::from_secs(5));
/// serving.await??;
/// ```
///
/// A start call that returns `Ok(())` was ended by `stop`; listener faults come
/// back as [`ServerError::Accept`].
pub struct GracefulServer<H: ConnectionHandler> {
    host: String,
    port: u16,
    handler: Arc<H>,
    grace_timeout: Duration,
    tls_files: Option<(PathBuf, PathBuf)>,
    connection_permits: Option<Arc<Semaphore>>,
    state: LifecycleState,
    /// Set from the start of a cycle until its drain is published. Only touched
    /// under the lifecycle lock.
    loop_active: AtomicBool,
    started: Notify,
    local_addr: Mutex<Option<SocketAddr>>,
    stop_tx: watch::Sender<Option<Duration>>,
    drain_tx: watch::Sender<DrainProgress>,
}

impl<H: ConnectionHandler> GracefulServer<H> {
    /// Creates a stopped server that will listen on all interfaces on `port`.
    pub fn new(port: u16, handler: H, grace_timeout: Duration) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port,
            handler: Arc::new(handler),
            grace_timeout,
            tls_files: None,
            connection_permits: None,
            state: LifecycleState::new(),
            loop_active: AtomicBool::new(false),
            started: Notify::new(),
            local_addr: Mutex::new(None),
            stop_tx: watch::Sender::new(None),
            drain_tx: watch::Sender::new(DrainProgress::default()),
        }
    }

    /// Creates a stopped server from a loaded [`Config`]. TLS settings are used
    /// by [`serve_configured`](Self::serve_configured).
    pub fn from_config(config: &Config, handler: H) -> Self {
        let mut server = Self::new(config.port, handler, config.grace_timeout).with_host(&config.host);
        if let Some(max) = config.max_connections {
            server = server.with_max_connections(max);
        }
        if config.tls.enabled {
            server.tls_files = Some((
                PathBuf::from(&config.tls.cert_path),
                PathBuf::from(&config.tls.key_path),
            ));
        }
        server
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Limits how many connections are served at once. Further clients wait in
    /// the listen backlog until a slot frees up.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.connection_permits = Some(Arc::new(Semaphore::new(max)));
        self
    }

    /// The configured listen address as `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn grace_timeout(&self) -> Duration {
        self.grace_timeout
    }

    /// The address actually bound while serving. Useful when the port is `0`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn is_serving(&self) -> bool {
        self.state.is_serving()
    }

    pub fn is_stopped(&self) -> bool {
        self.state.is_stopped()
    }

    /// Returns true after a stop while the previous cycle is still draining.
    /// No new start is accepted until this turns false.
    pub fn is_draining(&self) -> bool {
        self.state
            .transition(|serving| !*serving && self.loop_active.load(Ordering::SeqCst))
    }

    /// Resolves once a start call has entered the accept loop, immediately if
    /// one already has.
    ///
    /// [`stop`](Self::stop) does nothing before that point, so a caller that
    /// spawns the start call waits here before it may need to stop it.
    pub async fn wait_serving(&self) {
        let notified = self.started.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_serving() {
            return;
        }
        notified.await;
    }

    /// Binds the configured port and serves plain TCP.
    pub async fn listen_and_serve(&self) -> ServerResult<()> {
        let listener = self.bind().await?;
        self.run(listener, None).await
    }

    /// Binds the configured port and serves TLS with a PEM certificate chain
    /// and private key.
    pub async fn listen_and_serve_tls(
        &self,
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> ServerResult<()> {
        let acceptor = tls::acceptor_from_pem(cert_path.as_ref(), key_path.as_ref())?;
        let listener = self.bind().await?;
        self.run(listener, Some(acceptor)).await
    }

    /// Binds the configured port and serves TLS with a prepared rustls configuration.
    pub async fn listen_and_serve_tls_config(
        &self,
        config: Arc<rustls::ServerConfig>,
    ) -> ServerResult<()> {
        let listener = self.bind().await?;
        self.run(listener, Some(TlsAcceptor::from(config))).await
    }

    /// Serves plain TCP on a listener the caller already bound.
    pub async fn serve(&self, listener: TcpListener) -> ServerResult<()> {
        self.run(listener, None).await
    }

    /// Serves TLS on a listener the caller already bound.
    pub async fn serve_tls(&self, listener: TcpListener, acceptor: TlsAcceptor) -> ServerResult<()> {
        self.run(listener, Some(acceptor)).await
    }

    /// Serves with or without TLS, depending on the configuration the server
    /// was built from.
    pub async fn serve_configured(&self) -> ServerResult<()> {
        match &self.tls_files {
            Some((cert, key)) => self.listen_and_serve_tls(cert, key).await,
            None => self.listen_and_serve().await,
        }
    }

    /// Stops accepting new connections and gives open ones up to `grace` to
    /// finish before they are aborted.
    ///
    /// Returns immediately; use [`stop_signal`](Self::stop_signal) or the start
    /// call itself to wait for the drain. Calling it on a stopped server, or
    /// more than once, does nothing.
    pub fn stop(&self, grace: Duration) {
        let requested = self.state.transition(|serving| {
            if !*serving {
                return false;
            }
            *serving = false;
            self.stop_tx.send_replace(Some(grace));
            true
        });
        if requested {
            info!("Stopping server on {}.", self.addr());
        } else {
            debug!("Stop requested for {}, but it is not serving.", self.addr());
        }
    }

    /// [`stop`](Self::stop) with the grace timeout the server was built with.
    pub fn shutdown(&self) {
        self.stop(self.grace_timeout);
    }

    /// Returns a notification that resolves once the running (or next) serve
    /// cycle has fully drained.
    pub fn stop_signal(&self) -> StopSignal {
        StopSignal::new(self.drain_tx.subscribe())
    }

    async fn bind(&self) -> ServerResult<TcpListener> {
        TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr(),
                source,
            })
    }

    async fn run(&self, listener: TcpListener, acceptor: Option<TlsAcceptor>) -> ServerResult<()> {
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let stop_rx = self.state.transition(|serving| {
            if *serving {
                return Err(ServerError::AlreadyServing);
            }
            if self.loop_active.load(Ordering::SeqCst) {
                return Err(ServerError::Draining);
            }
            *serving = true;
            self.loop_active.store(true, Ordering::SeqCst);
            self.stop_tx.send_replace(None);
            *self.local_addr.lock() = Some(local_addr);
            Ok(self.stop_tx.subscribe())
        })?;
        self.started.notify_waiters();

        info!(
            "Server listening on {local_addr}{}.",
            if acceptor.is_some() { " (TLS)" } else { "" }
        );

        let ctx = LoopContext {
            listener,
            local_addr,
            acceptor,
            handler: self.handler.clone(),
            stop_rx,
            connection_permits: self.connection_permits.clone(),
            default_grace: self.grace_timeout,
        };
        let (report, result) = connection_loop::run(ctx).await;

        // The report must be out before the next cycle can start.
        self.state.transition(|serving| {
            *serving = false;
            *self.local_addr.lock() = None;
            self.drain_tx.send_modify(|progress| {
                progress.completed += 1;
                progress.last = report;
            });
            self.loop_active.store(false, Ordering::SeqCst);
        });

        result
    }
}
