// src/server/handler.rs

//! The seam between the accept loop and whatever protocol runs on a connection.

use super::stream::AnyStream;
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// One accepted connection, handed to a [`ConnectionHandler`].
pub struct Connection {
    pub stream: AnyStream,
    pub peer: SocketAddr,
    /// Sequence number of the connection within the current serve cycle.
    pub id: u64,
    /// Fires once when the server begins draining.
    pub shutdown_rx: broadcast::Receiver<()>,
}

impl Connection {
    /// Resolves when the server starts its graceful shutdown.
    ///
    /// Handlers select on this next to their reads to finish the current unit
    /// of work and close instead of waiting for the next request.
    pub async fn shutdown_requested(&mut self) {
        // Both a received notice and a closed channel mean the loop is gone.
        let _ = self.shutdown_rx.recv().await;
    }
}

/// Serves a single connection. Errors are logged by the server and never stop it.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle(&self, conn: Connection) -> anyhow::Result<()>;
}

/// Adapter returned by [`handler_fn`].
pub struct HandlerFn<F>(F);

/// Wraps an async closure as a [`ConnectionHandler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> ConnectionHandler for HandlerFn<F>
where
    F: Fn(Connection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, conn: Connection) -> anyhow::Result<()> {
        (self.0)(conn).await
    }
}
