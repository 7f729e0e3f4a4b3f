// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! TCP listener and per-connection protocol loop.
//!
//! One tokio task per accepted socket. Each task owns its session
//! exclusively: read, delimit, decode, acknowledge, and hand accepted
//! fixes to the sink. A malformed frame never closes the connection;
//! an unauthorized login always does.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use trk_core::SampleGate;
use trk_protocol::{decode, encode, extract_frame, DecodedPacket, Frame};

use crate::forward::SinkClient;
use crate::session::SessionTable;

/// Everything a connection handler needs, owned by the listener and
/// shared across handler tasks.
pub struct ListenerContext {
    pub sessions: SessionTable,
    pub gate: SampleGate,
    pub sink: SinkClient,
    /// Lowercase device ids admitted at login; empty admits all.
    pub allowed_devices: HashSet<String>,
    pub idle_timeout: Duration,
    pub ack_position_frames: bool,
}

/// Accept connections forever, spawning one handler task per socket.
pub async fn serve(listener: TcpListener, ctx: Arc<ListenerContext>) -> std::io::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Tracker connected: {}", peer);

        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, peer, ctx).await {
                warn!("Connection {} error: {}", peer, e);
            }
        });
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ListenerContext>,
) -> std::io::Result<()> {
    let session_id = ctx.sessions.open(peer);
    let result = drive_session(&mut socket, peer, session_id, &ctx).await;
    if let Some(session) = ctx.sessions.close(session_id) {
        match session.device_id {
            Some(device) => info!("Connection closed: {} (device {})", peer, device),
            None => info!("Connection closed: {} (never logged in)", peer),
        }
    }
    result
}

/// Whether the packet loop should keep the connection open.
enum PacketFlow {
    Continue,
    Close,
}

async fn drive_session(
    socket: &mut TcpStream,
    peer: SocketAddr,
    session_id: Uuid,
    ctx: &ListenerContext,
) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(1024);
    let mut bound: Option<String> = None;

    loop {
        match timeout(ctx.idle_timeout, socket.read_buf(&mut buf)).await {
            Ok(Ok(0)) => {
                debug!("Tracker {} closed the connection", peer);
                return Ok(());
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!(
                    "Tracker {} idle for {}s, closing",
                    peer,
                    ctx.idle_timeout.as_secs()
                );
                return Ok(());
            }
        }
        ctx.sessions.touch(session_id);

        while let Some(frame) = extract_frame(&mut buf) {
            // Best-effort verification: a bad checksum drops the frame
            // loudly but keeps the session alive.
            if let Err(e) = frame.verify_checksum() {
                warn!("Tracker {}: {} in frame {}", peer, e, frame.hex());
                continue;
            }

            let packet = match decode(&frame) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Tracker {}: dropping frame: {}", peer, e);
                    continue;
                }
            };

            match handle_packet(socket, peer, session_id, &frame, packet, &mut bound, ctx).await? {
                PacketFlow::Continue => {}
                PacketFlow::Close => return Ok(()),
            }
        }
    }
}

async fn handle_packet(
    socket: &mut TcpStream,
    peer: SocketAddr,
    session_id: Uuid,
    frame: &Frame,
    packet: DecodedPacket,
    bound: &mut Option<String>,
    ctx: &ListenerContext,
) -> std::io::Result<PacketFlow> {
    match packet {
        DecodedPacket::Login { device_id } => {
            if !ctx.allowed_devices.is_empty() && !ctx.allowed_devices.contains(&device_id) {
                warn!("Unauthorized device {} from {}, closing", device_id, peer);
                return Ok(PacketFlow::Close);
            }
            match bound.replace(device_id.clone()) {
                Some(previous) if previous != device_id => {
                    info!(
                        "Tracker {} re-logged in as {} (was {})",
                        peer, device_id, previous
                    );
                }
                Some(_) => debug!("Tracker {} repeated login as {}", peer, device_id),
                None => info!("Tracker {} logged in as {}", peer, device_id),
            }
            ctx.sessions.bind_device(session_id, &device_id);
            send_ack(socket, frame.serial()).await?;
        }

        DecodedPacket::Position(fix) => {
            match bound.as_deref() {
                None => {
                    // Never forward data we cannot attribute to a device.
                    warn!("Tracker {}: position before login, dropping", peer);
                }
                Some(device) if fix.device_id != device => {
                    warn!(
                        "Tracker {}: frame claims device {} but session is bound to {}, dropping",
                        peer, fix.device_id, device
                    );
                }
                Some(device) => {
                    let verdict = ctx.gate.evaluate(&fix);
                    if verdict.accepted() {
                        info!(
                            "Fix accepted for {} ({}): {:.6},{:.6} at {} km/h",
                            device, verdict, fix.lat, fix.lng, fix.speed_kmh
                        );
                        ctx.sink.forward(&fix).await;
                    } else {
                        debug!("Fix for {} sampled out ({})", device, verdict);
                    }
                }
            }
            if ctx.ack_position_frames {
                send_ack(socket, frame.serial()).await?;
            }
        }

        DecodedPacket::Heartbeat => {
            debug!("Heartbeat from {}", peer);
            send_ack(socket, frame.serial()).await?;
        }

        DecodedPacket::LbsOnly => {
            debug!("LBS-only report from {}, acknowledged without position", peer);
            send_ack(socket, frame.serial()).await?;
        }

        DecodedPacket::Alarm => {
            warn!(
                "Alarm frame from {} (device {})",
                peer,
                bound.as_deref().unwrap_or("unbound")
            );
            send_ack(socket, frame.serial()).await?;
        }
    }
    Ok(PacketFlow::Continue)
}

async fn send_ack(socket: &mut TcpStream, serial: u16) -> std::io::Result<()> {
    socket.write_all(&encode::encode_ack(serial)).await?;
    socket.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkConfig;
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;
    use trk_core::SamplingConfig;

    fn test_context(sink_url: String) -> Arc<ListenerContext> {
        let sink_cfg = SinkConfig {
            url: sink_url,
            retry_attempts: 1,
            retry_delay_ms: 1,
            timeout_secs: 2,
            ..Default::default()
        };
        Arc::new(ListenerContext {
            sessions: SessionTable::new(),
            gate: SampleGate::new(SamplingConfig::default()),
            sink: SinkClient::new(&sink_cfg).expect("sink client"),
            allowed_devices: HashSet::new(),
            idle_timeout: Duration::from_secs(5),
            ack_position_frames: false,
        })
    }

    /// Minimal HTTP sink: answers every POST with 201 and reports the
    /// request body.
    async fn mock_sink(listener: TcpListener, body_tx: mpsc::Sender<String>) {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut data = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                data.extend_from_slice(&chunk[..n]);
                if let Some(body) = complete_request_body(&data) {
                    let _ = body_tx.send(body).await;
                    let _ = socket
                        .write_all(b"HTTP/1.1 201 Created\r\ncontent-length: 0\r\n\r\n")
                        .await;
                    break;
                }
            }
        }
    }

    fn complete_request_body(data: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(data);
        let (head, body) = text.split_once("\r\n\r\n")?;
        let content_length = head.lines().find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })?;
        (body.len() >= content_length).then(|| body[..content_length].to_string())
    }

    #[tokio::test]
    #[ignore = "requires TCP bind permissions"]
    async fn login_then_position_acks_and_forwards() {
        let sink_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind sink");
        let sink_addr = sink_listener.local_addr().expect("sink addr");
        let (body_tx, mut body_rx) = mpsc::channel(4);
        let sink = tokio::spawn(mock_sink(sink_listener, body_tx));

        let ctx = test_context(format!("http://{}/api/v1/tracker/data", sink_addr));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(serve(listener, Arc::clone(&ctx)));

        let mut client = TcpStream::connect(addr).await.expect("connect");
        let id = [0xAA, 0xBB, 0xCC, 0xDD, 0x00, 0x00, 0x00, 0x00];
        client
            .write_all(&encode::encode_login(id, 1))
            .await
            .expect("write login");

        let mut ack = [0u8; 10];
        client.read_exact(&mut ack).await.expect("read ack");
        assert_eq!(&ack[..4], &[0x78, 0x78, 0x05, 0x01]);
        assert_eq!(u16::from_be_bytes([ack[4], ack[5]]), 1);

        let at = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).single().expect("time");
        client
            .write_all(&encode::encode_position(id, at, -32.7, -60.7, 50, 90, 10.0, 2))
            .await
            .expect("write position");

        let body = tokio::time::timeout(Duration::from_secs(5), body_rx.recv())
            .await
            .expect("sink called")
            .expect("body");
        let value: serde_json::Value = serde_json::from_str(&body).expect("json");
        assert_eq!(value["device_id"], "aabbccdd");
        assert_eq!(value["speed"], 50);

        assert_eq!(ctx.sessions.active_count(), 1);
        server.abort();
        sink.abort();
        let _ = server.await;
        let _ = sink.await;
    }

    #[tokio::test]
    #[ignore = "requires TCP bind permissions"]
    async fn unauthorized_login_closes_the_connection() {
        let mut ctx = test_context("http://127.0.0.1:1/ingest".to_string());
        Arc::get_mut(&mut ctx)
            .expect("sole owner")
            .allowed_devices
            .insert("0011223344556677".to_string());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(serve(listener, Arc::clone(&ctx)));

        let mut client = TcpStream::connect(addr).await.expect("connect");
        let id = [0xAA, 0xBB, 0xCC, 0xDD, 0x00, 0x00, 0x00, 0x00];
        client
            .write_all(&encode::encode_login(id, 1))
            .await
            .expect("write login");

        // Peer closes without an ack.
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
            .await
            .expect("no timeout")
            .expect("read");
        assert_eq!(n, 0, "expected EOF, got {n} bytes");

        server.abort();
        let _ = server.await;
    }

    #[tokio::test]
    #[ignore = "requires TCP bind permissions"]
    async fn position_before_login_is_dropped_but_connection_survives() {
        let ctx = test_context("http://127.0.0.1:1/ingest".to_string());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(serve(listener, Arc::clone(&ctx)));

        let mut client = TcpStream::connect(addr).await.expect("connect");
        let id = [0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x00];
        let at = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).single().expect("time");
        client
            .write_all(&encode::encode_position(id, at, 1.0, 2.0, 10, 0, 0.0, 1))
            .await
            .expect("write position");

        // A heartbeat afterwards is still acknowledged: the bad fix did
        // not close the session.
        client
            .write_all(&encode::encode_heartbeat(9))
            .await
            .expect("write heartbeat");
        let mut ack = [0u8; 10];
        client.read_exact(&mut ack).await.expect("read ack");
        assert_eq!(u16::from_be_bytes([ack[4], ack[5]]), 9);

        server.abort();
        let _ = server.await;
    }
}
