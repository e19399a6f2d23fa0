// src/main.rs

//! A line-echo server that shows the graceful lifecycle end to end.

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use gracewell::config::Config;
use gracewell::server::{Connection, GracefulServer, handler_fn};
use gracewell::signal;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

const DEFAULT_CONFIG_PATH: &str = "gracewell.toml";

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("gracewell version {VERSION}");
        return Ok(());
    }

    // A missing default config file is fine; an explicitly named one must exist.
    let explicit_config = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1));
    let mut config = match explicit_config {
        Some(path) => load_config(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(DEFAULT_CONFIG_PATH),
        None => Config::default(),
    };

    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        match args.get(port_index + 1).map(|s| s.parse::<u16>()) {
            Some(Ok(port)) => config.port = port,
            Some(Err(_)) => {
                eprintln!("Invalid port number: {}", args[port_index + 1]);
                std::process::exit(1);
            }
            None => {
                eprintln!("--port flag requires a value");
                std::process::exit(1);
            }
        }
    }

    let initial_log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, _reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    info!("Starting gracewell echo server {VERSION}.");

    let server = Arc::new(GracefulServer::from_config(&config, handler_fn(echo)));
    let drained = server.stop_signal();

    let mut serving = tokio::spawn({
        let server = server.clone();
        async move { server.serve_configured().await }
    });

    // A stop before the accept loop is entered would be lost, so signals are
    // only awaited once the server is serving.
    tokio::select! {
        _ = server.wait_serving() => {}
        res = &mut serving => {
            res??;
            return Ok(());
        }
    }

    tokio::select! {
        res = signal::wait_for_exit_signal() => {
            match res {
                Ok(sig) => info!("Shutting down after {sig}."),
                Err(e) => error!("Failed to listen for exit signals: {e}. Shutting down."),
            }
            server.shutdown();
        }
        res = &mut serving => {
            // The listener failed on its own; it has already drained.
            res??;
            return Ok(());
        }
    }

    serving.await??;
    if let Some(report) = drained.wait().await {
        info!(
            "Bye: {} connections drained, {} force-closed.",
            report.drained, report.force_closed
        );
    }
    Ok(())
}

fn load_config(path: &str) -> Config {
    match Config::from_file(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{path}\": {e:#}");
            std::process::exit(1);
        }
    }
}

/// Echoes every line back until the client leaves or the server drains.
async fn echo(mut conn: Connection) -> Result<()> {
    let peer = conn.peer;
    let mut framed = Framed::new(conn.stream, LinesCodec::new_with_max_length(64 * 1024));
    loop {
        tokio::select! {
            biased;
            _ = conn.shutdown_rx.recv() => {
                framed.send("BYE server is shutting down").await?;
                return Ok(());
            }
            line = framed.next() => match line {
                Some(line) => framed.send(line?).await?,
                None => {
                    info!("{peer} disconnected.");
                    return Ok(());
                }
            },
        }
    }
}
