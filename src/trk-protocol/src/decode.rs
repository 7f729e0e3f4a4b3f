// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Decoding of delimited frames into [`DecodedPacket`].
//!
//! Field offsets are fixed per packet kind, so decoding is slicing and
//! masking only; it runs for every inbound packet of every connected
//! device and must not allocate beyond the returned struct.

use chrono::{DateTime, TimeZone, Utc};

use trk_core::Fix;

use crate::frame::{
    Frame, FrameError, HeaderKind, PROTO_ALARM, PROTO_HEARTBEAT, PROTO_LBS, PROTO_LOGIN,
    PROTO_POSITION,
};

/// One packet, decoded. The connection handler dispatches on this
/// exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPacket {
    Login { device_id: String },
    Position(Fix),
    Heartbeat,
    LbsOnly,
    Alarm,
}

/// Minimum total frame length for a login packet.
pub const MIN_LOGIN_FRAME: usize = 14;
/// Minimum total frame length for the standard position packet.
pub const MIN_POSITION_FRAME: usize = 30;
/// Total length at which the flags/altitude tail is present.
const FULL_POSITION_FRAME: usize = 38;

/// Raw coordinate fields are in units of 1/30000 of a minute of arc.
const COORD_MINUTE_SCALE: f64 = 30000.0;

/// Decode one frame into its packet kind.
///
/// Extended-header frames are alarm-class regardless of protocol id.
pub fn decode(frame: &Frame) -> Result<DecodedPacket, FrameError> {
    if frame.kind() == HeaderKind::Extended {
        return Ok(DecodedPacket::Alarm);
    }
    match frame.protocol_id() {
        PROTO_LOGIN => decode_login(frame),
        PROTO_POSITION => decode_position(frame),
        PROTO_HEARTBEAT => Ok(DecodedPacket::Heartbeat),
        PROTO_LBS => Ok(DecodedPacket::LbsOnly),
        PROTO_ALARM => Ok(DecodedPacket::Alarm),
        other => Err(FrameError::UnknownProtocol(other)),
    }
}

fn decode_login(frame: &Frame) -> Result<DecodedPacket, FrameError> {
    let data = frame.as_bytes();
    if data.len() < MIN_LOGIN_FRAME {
        return Err(too_short(frame));
    }
    Ok(DecodedPacket::Login {
        device_id: device_id_hex(&data[4..12]),
    })
}

fn decode_position(frame: &Frame) -> Result<DecodedPacket, FrameError> {
    let data = frame.as_bytes();
    if data.len() < MIN_POSITION_FRAME {
        return Err(too_short(frame));
    }

    let device_id = device_id_hex(&data[4..12]);
    let timestamp = decode_datetime(&data[12..18], frame)?;

    let lat_raw = i32::from_be_bytes([data[18], data[19], data[20], data[21]]);
    let lng_raw = i32::from_be_bytes([data[22], data[23], data[24], data[25]]);
    let lat = coord_degrees(lat_raw).clamp(-90.0, 90.0);
    let lng = coord_degrees(lng_raw).clamp(-180.0, 180.0);

    let speed_kmh = data[26];
    // Low 10 bits of the course/status word carry the course.
    let course_deg = (u16::from_be_bytes([data[27], data[28]]) & 0x03FF) % 360;

    let (altitude_m, accuracy_m) = if data.len() >= FULL_POSITION_FRAME {
        let flags = data[29];
        let accuracy_m = if flags & 0x80 != 0 { 3 } else { 15 };
        // Altitude is carried in decimeters.
        let altitude_m = f64::from(u16::from_be_bytes([data[30], data[31]])) / 10.0;
        (altitude_m, accuracy_m)
    } else {
        (0.0, 0)
    };

    Ok(DecodedPacket::Position(Fix {
        device_id,
        lat,
        lng,
        speed_kmh,
        course_deg,
        altitude_m,
        accuracy_m,
        timestamp,
    }))
}

/// Terminal-id bytes as a lowercase hex key.
///
/// Trailing zero bytes are id-field padding and are stripped so short
/// ids compare stably; an all-zero field keeps its full hex form.
fn device_id_hex(id: &[u8]) -> String {
    let trimmed = match id.iter().rposition(|&b| b != 0) {
        Some(last) => &id[..=last],
        None => id,
    };
    crate::frame::hex_string(trimmed)
}

/// Six-byte device clock: year-since-2000, month, day, hour, minute,
/// second. Individual fields are clamped into range to tolerate
/// malformed clocks; a date that still does not exist (e.g. Feb 30) is a
/// field error.
fn decode_datetime(b: &[u8], frame: &Frame) -> Result<DateTime<Utc>, FrameError> {
    let year = 2000 + i32::from(b[0]);
    let month = u32::from(b[1].clamp(1, 12));
    let day = u32::from(b[2].clamp(1, 31));
    let hour = u32::from(b[3].min(23));
    let minute = u32::from(b[4].min(59));
    let second = u32::from(b[5].min(59));

    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .ok_or_else(|| {
            FrameError::FieldOutOfRange(format!("nonexistent date in frame {}", frame.hex()))
        })
}

fn coord_degrees(raw: i32) -> f64 {
    let minutes = f64::from(raw) / COORD_MINUTE_SCALE;
    let degrees = (minutes / 60.0).trunc();
    degrees + (minutes - degrees * 60.0) / 60.0
}

fn too_short(frame: &Frame) -> FrameError {
    FrameError::TooShort {
        protocol: frame.protocol_id(),
        frame_hex: frame.hex(),
    }
}
