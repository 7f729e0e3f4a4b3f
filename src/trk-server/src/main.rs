// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod forward;
mod listener;
mod session;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

use trk_app::{init_logging, ConfigFile};
use trk_core::{DynResult, SampleGate};

use config::ServerConfig;
use forward::SinkClient;
use listener::ListenerContext;
use session::SessionTable;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - tracker ingestion daemon");
const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(version = env!("CARGO_PKG_VERSION"), about = PKG_DESCRIPTION)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// IP address for the tracker TCP listener
    #[arg(short = 'l', long = "listen")]
    listen: Option<IpAddr>,
    /// Port for the tracker TCP listener
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_toml());
        return Ok(());
    }

    let (cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let listen_ip = cli.listen.unwrap_or(cfg.listen.listen);
    let listen_port = cli.port.unwrap_or(cfg.listen.port);
    let listen_addr = SocketAddr::from((listen_ip, listen_port));

    let sink = SinkClient::new(&cfg.sink)
        .map_err(|e| format!("Failed to build sink client: {}", e))?;
    let forward_stats = sink.stats();

    let allowed_devices = cfg.devices.allow_set();
    if !allowed_devices.is_empty() {
        info!("Device allow-list active ({} entries)", allowed_devices.len());
    }

    let ctx = Arc::new(ListenerContext {
        sessions: SessionTable::new(),
        gate: SampleGate::new((&cfg.sampling).into()),
        sink,
        allowed_devices,
        idle_timeout: Duration::from_secs(cfg.listen.idle_timeout_secs),
        ack_position_frames: cfg.listen.ack_position_frames,
    });

    info!(
        "Starting trk-server (listen: {}, sink: {})",
        listen_addr, cfg.sink.url
    );

    // A listener that cannot bind is a startup failure, not something to
    // limp through.
    let tcp = TcpListener::bind(listen_addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", listen_addr, e))?;
    info!("Listening on {}", listen_addr);

    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();

    let serve_ctx = Arc::clone(&ctx);
    task_handles.push(tokio::spawn(async move {
        if let Err(e) = listener::serve(tcp, serve_ctx).await {
            error!("Listener error: {:?}", e);
        }
    }));

    let stats_ctx = Arc::clone(&ctx);
    task_handles.push(tokio::spawn(async move {
        let mut tick = tokio::time::interval(STATS_INTERVAL);
        tick.tick().await; // immediate first tick carries no data
        loop {
            tick.tick().await;
            info!(
                "Ingest stats: sessions={}, devices={}, {}",
                stats_ctx.sessions.active_count(),
                stats_ctx.gate.tracked_devices(),
                forward_stats.summary()
            );
        }
    }));

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");

    for handle in &task_handles {
        handle.abort();
    }
    for handle in task_handles {
        let _ = handle.await;
    }
    Ok(())
}
