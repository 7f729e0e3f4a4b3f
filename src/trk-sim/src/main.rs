// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Tracker fleet simulator.
//!
//! Opens one connection per simulated device, logs in, then walks the
//! Rosario → Córdoba route sending position frames at a fixed interval.
//! Useful against a local trk-server without hardware on the bench.

mod config;

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, info, warn};

use trk_app::{init_logging, ConfigFile};
use trk_core::{geo, DynResult};
use trk_protocol::encode;

use config::{parse_device_id, SimConfig};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - tracker fleet simulator");

/// Route endpoints: Rosario → Córdoba.
const ROUTE_START: (f64, f64) = (-32.716774, -60.727609);
const ROUTE_END: (f64, f64) = (-31.466840, -64.101087);

const RECONNECT_MAX_SECS: u64 = 60;

#[derive(Debug, Parser)]
#[command(version = env!("CARGO_PKG_VERSION"), about = PKG_DESCRIPTION)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Server host to connect to
    #[arg(long = "host")]
    host: Option<String>,
    /// Server port
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
    /// Seconds between position reports
    #[arg(short = 'i', long = "interval")]
    interval_secs: Option<u64>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    let cfg = if let Some(ref path) = cli.config {
        SimConfig::load_from_file(path)?
    } else {
        SimConfig::load_from_default_paths()?.0
    };

    init_logging(cli.log_level.as_deref());

    let host = cli.host.unwrap_or_else(|| cfg.host.clone());
    let port = cli.port.unwrap_or(cfg.port);
    let interval = Duration::from_secs(cli.interval_secs.unwrap_or(cfg.interval_secs).max(1));

    info!(
        "Simulating {} device(s) against {}:{} every {}s",
        cfg.devices.len(),
        host,
        port,
        interval.as_secs()
    );

    let mut handles = Vec::new();
    for device_hex in &cfg.devices {
        let id = parse_device_id(device_hex)?;
        let label = device_hex.clone();
        let host = host.clone();
        let max_speed = cfg.max_speed_kmh;
        handles.push(tokio::spawn(async move {
            run_vehicle(id, label, host, port, interval, max_speed).await;
        }));
        // Stagger connection attempts a little.
        time::sleep(Duration::from_millis(500)).await;
    }

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

/// One simulated vehicle: connect, log in, report until the connection
/// drops, then reconnect with backoff.
async fn run_vehicle(
    id: [u8; 8],
    label: String,
    host: String,
    port: u16,
    interval: Duration,
    max_speed_kmh: u8,
) {
    let mut backoff_secs: u64 = 1;
    loop {
        match drive_route(id, &label, &host, port, interval, max_speed_kmh).await {
            Ok(()) => return,
            Err(e) => {
                warn!("{}: {}; reconnecting in {}s", label, e, backoff_secs);
                time::sleep(Duration::from_secs(backoff_secs)).await;
                backoff_secs = (backoff_secs * 2).min(RECONNECT_MAX_SECS);
            }
        }
    }
}

async fn drive_route(
    id: [u8; 8],
    label: &str,
    host: &str,
    port: u16,
    interval: Duration,
    max_speed_kmh: u8,
) -> DynResult<()> {
    let stream = TcpStream::connect((host, port)).await?;
    let (mut read_half, mut write_half) = stream.into_split();

    // Acks are read and discarded so the receive buffer never fills.
    let drain = tokio::spawn(async move {
        let mut sink = [0u8; 256];
        while matches!(read_half.read(&mut sink).await, Ok(n) if n > 0) {}
    });

    let mut serial: u16 = 1;
    write_half.write_all(&encode::encode_login(id, serial)).await?;
    info!("{}: connected and logged in", label);

    // Start near the route origin with a small scatter.
    let (mut lat, mut lng) = {
        let mut rng = rand::thread_rng();
        (
            ROUTE_START.0 + rng.gen_range(-0.01..0.01),
            ROUTE_START.1 + rng.gen_range(-0.01..0.01),
        )
    };

    loop {
        time::sleep(interval).await;

        let (last_lat, last_lng) = (lat, lng);
        {
            let mut rng = rand::thread_rng();
            let pull = rng.gen_range(0.0001..0.001);
            lat += (ROUTE_END.0 - lat) * pull;
            lng += (ROUTE_END.1 - lng) * pull;
        }

        let step_km = geo::haversine_km(last_lat, last_lng, lat, lng);
        let speed_kmh = (step_km * 3600.0 / interval.as_secs_f64())
            .min(f64::from(max_speed_kmh)) as u8;
        let course_deg =
            ((lng - last_lng).atan2(lat - last_lat).to_degrees().rem_euclid(360.0)) as u16;

        serial = serial.wrapping_add(1);
        let frame = encode::encode_position(
            id,
            Utc::now(),
            lat,
            lng,
            speed_kmh,
            course_deg,
            0.0,
            serial,
        );
        write_half.write_all(&frame).await?;
        debug!(
            "{}: sent {:.4},{:.4} at {} km/h (course {})",
            label, lat, lng, speed_kmh, course_deg
        );

        if drain.is_finished() {
            return Err("server closed the connection".into());
        }
    }
}
