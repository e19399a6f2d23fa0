// src/server/mod.rs

//! The graceful server: listener setup, the accept loop, and its lifecycle state.

mod connection_loop;
mod context;
mod drain;
mod graceful;
mod handler;
mod lifecycle;
mod stream;
pub mod tls;

pub use drain::{ShutdownReport, StopSignal};
pub use graceful::GracefulServer;
pub use handler::{Connection, ConnectionHandler, HandlerFn, handler_fn};
pub use lifecycle::LifecycleState;
pub use stream::AnyStream;
