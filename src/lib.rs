// src/lib.rs

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod parallel;
pub mod server;
pub mod signal;

// Re-export
pub use crate::errors::{ServerError, ServerResult};
pub use crate::parallel::{parallel, parallel_async};
pub use crate::server::{GracefulServer, LifecycleState};
