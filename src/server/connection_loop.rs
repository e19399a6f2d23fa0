// src/server/connection_loop.rs

//! Contains the accept loop and the drain that follows it.

use super::context::LoopContext;
use super::drain::ShutdownReport;
use super::handler::{Connection, ConnectionHandler};
use super::stream::AnyStream;
use crate::errors::{ServerError, ServerResult};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio::task::{JoinError, JoinSet};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Pause after the process runs out of file descriptors, before accepting again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections until a stop request arrives or the listener fails,
/// then drains the connections that are still open.
pub(super) async fn run<H: ConnectionHandler>(
    ctx: LoopContext<H>,
) -> (ShutdownReport, ServerResult<()>) {
    let LoopContext {
        listener,
        local_addr,
        acceptor,
        handler,
        mut stop_rx,
        connection_permits,
        default_grace,
    } = ctx;

    let mut connections = JoinSet::new();
    let (shutdown_tx, _) = broadcast::channel(1);
    let mut connection_id: u64 = 0;

    let exit: Result<Duration, io::Error> = loop {
        tokio::select! {
            biased;

            res = stop_rx.changed() => {
                match res {
                    Ok(()) => {
                        if let Some(grace) = *stop_rx.borrow_and_update() {
                            info!("Stop requested for {local_addr}, grace timeout {grace:?}.");
                            break Ok(grace);
                        }
                    }
                    // The server owns the sender, so this only happens while it is torn down.
                    Err(_) => break Ok(default_grace),
                }
            }

            Some(res) = connections.join_next() => log_join_result(res),

            res = accept(&listener, connection_permits.as_ref()) => {
                match res {
                    Ok((socket, peer, permit)) => {
                        connection_id = connection_id.wrapping_add(1);
                        debug!("Accepted connection {connection_id} from {peer}.");
                        let conn = PendingConnection {
                            socket,
                            peer,
                            id: connection_id,
                            shutdown_rx: shutdown_tx.subscribe(),
                            _permit: permit,
                        };
                        let handler = handler.clone();
                        let acceptor = acceptor.clone();
                        connections.spawn(conn.serve(handler, acceptor));
                    }
                    Err(e) if is_connection_error(&e) => {
                        debug!("Connection dropped before it was accepted: {e}");
                    }
                    Err(e) if is_resource_exhausted(&e) => {
                        warn!("Failed to accept connection on {local_addr}: {e}. Backing off.");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => {
                        error!("Listener on {local_addr} failed: {e}");
                        break Err(e);
                    }
                }
            }
        }
    };

    drop(listener);

    let grace = match &exit {
        Ok(grace) => *grace,
        Err(_) => default_grace,
    };
    let report = drain(&mut connections, &shutdown_tx, grace).await;
    info!(
        "Server on {local_addr} stopped: {} drained, {} force-closed in {:?}.",
        report.drained, report.force_closed, report.elapsed
    );

    let result = exit
        .map(|_| ())
        .map_err(|source| ServerError::Accept {
            addr: local_addr,
            source,
        });
    (report, result)
}

/// Tells the handlers to wind down and waits up to `grace` for them. Whatever
/// is still running afterwards is aborted.
async fn drain(
    connections: &mut JoinSet<()>,
    shutdown_tx: &broadcast::Sender<()>,
    grace: Duration,
) -> ShutdownReport {
    let started = Instant::now();
    if !connections.is_empty() {
        info!("Draining {} open connections.", connections.len());
    }
    // No receivers simply means no connection is open.
    let _ = shutdown_tx.send(());

    let mut drained = 0;
    let finished = tokio::time::timeout(grace, async {
        while let Some(res) = connections.join_next().await {
            log_join_result(res);
            drained += 1;
        }
    })
    .await
    .is_ok();

    let force_closed = connections.len();
    if !finished {
        warn!("Grace timeout of {grace:?} elapsed, aborting {force_closed} connections.");
        connections.shutdown().await;
    }

    ShutdownReport {
        drained,
        force_closed,
        elapsed: started.elapsed(),
    }
}

/// A socket accepted by the loop but not yet handed to the handler.
struct PendingConnection {
    socket: TcpStream,
    peer: SocketAddr,
    id: u64,
    shutdown_rx: broadcast::Receiver<()>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl PendingConnection {
    async fn serve<H: ConnectionHandler>(self, handler: Arc<H>, acceptor: Option<TlsAcceptor>) {
        let PendingConnection {
            socket,
            peer,
            id,
            shutdown_rx,
            _permit,
        } = self;

        let stream = match acceptor {
            Some(acceptor) => match acceptor.accept(socket).await {
                Ok(tls_stream) => {
                    debug!("TLS handshake successful for {peer}");
                    AnyStream::Tls(Box::new(tls_stream))
                }
                Err(e) => {
                    warn!("TLS handshake error for {peer}: {e}");
                    return;
                }
            },
            None => AnyStream::Tcp(socket),
        };

        let conn = Connection {
            stream,
            peer,
            id,
            shutdown_rx,
        };
        if let Err(e) = handler.handle(conn).await {
            warn!("Connection from {peer} terminated unexpectedly: {e}");
        }
    }
}

async fn accept(
    listener: &TcpListener,
    permits: Option<&Arc<Semaphore>>,
) -> io::Result<(TcpStream, SocketAddr, Option<OwnedSemaphorePermit>)> {
    let permit = match permits {
        Some(permits) => Some(
            permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| io::Error::other("connection limit closed"))?,
        ),
        None => None,
    };
    let (socket, peer) = listener.accept().await?;
    Ok((socket, peer, permit))
}

fn log_join_result(res: Result<(), JoinError>) {
    if let Err(e) = res
        && e.is_panic()
    {
        error!("A connection handler panicked: {e:?}");
    }
}

/// Errors that concern one incoming connection rather than the listener.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

#[cfg(unix)]
fn is_resource_exhausted(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOBUFS) | Some(libc::ENOMEM)
    )
}

#[cfg(not(unix))]
fn is_resource_exhausted(_e: &io::Error) -> bool {
    false
}
