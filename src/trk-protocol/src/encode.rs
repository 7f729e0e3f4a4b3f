// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Outbound frame builders.
//!
//! `encode_ack` is the server's only outbound frame. The login, position
//! and heartbeat builders are the device side of the protocol, used by
//! the simulator and by the codec tests.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::crc;
use crate::frame::{PROTO_HEARTBEAT, PROTO_LOGIN, PROTO_POSITION, START_STANDARD, STOP};

/// Generic acknowledgement: `7878 05 01 <serial> <crc> 0D0A`.
///
/// The same structure acknowledges login, heartbeat, LBS and alarm
/// frames; only the echoed serial differs.
pub fn encode_ack(serial: u16) -> Vec<u8> {
    let mut body = vec![PROTO_LOGIN];
    push_u16_be(&mut body, serial);
    finish_standard(body)
}

/// Device login frame carrying the 8-byte terminal id.
pub fn encode_login(device_id: [u8; 8], serial: u16) -> Vec<u8> {
    let mut body = vec![PROTO_LOGIN];
    body.extend_from_slice(&device_id);
    push_u16_be(&mut body, serial);
    finish_standard(body)
}

/// Device heartbeat frame.
pub fn encode_heartbeat(serial: u16) -> Vec<u8> {
    let mut body = vec![PROTO_HEARTBEAT];
    push_u16_be(&mut body, serial);
    finish_standard(body)
}

/// Full-variant position frame (with the flags/altitude tail, high
/// precision flag set).
#[allow(clippy::too_many_arguments)]
pub fn encode_position(
    device_id: [u8; 8],
    at: DateTime<Utc>,
    lat: f64,
    lng: f64,
    speed_kmh: u8,
    course_deg: u16,
    altitude_m: f64,
    serial: u16,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(31);
    body.push(PROTO_POSITION);
    body.extend_from_slice(&device_id);

    body.push((at.year() - 2000).clamp(0, 255) as u8);
    body.push(at.month() as u8);
    body.push(at.day() as u8);
    body.push(at.hour() as u8);
    body.push(at.minute() as u8);
    body.push(at.second() as u8);

    body.extend_from_slice(&coord_raw(lat).to_be_bytes());
    body.extend_from_slice(&coord_raw(lng).to_be_bytes());

    body.push(speed_kmh);
    push_u16_be(&mut body, course_deg % 360);

    body.push(0x80); // high-precision flag
    push_u16_be(&mut body, (altitude_m * 10.0).clamp(0.0, 65535.0) as u16);

    push_u16_be(&mut body, serial);
    finish_standard(body)
}

/// Degrees to the wire's 1/30000-minute units.
fn coord_raw(degrees: f64) -> i32 {
    (degrees * 60.0 * 30000.0).round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

/// Wrap `protocol-id + payload + serial` into a standard frame: length
/// byte, checksum over the body, stop marker.
fn finish_standard(body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 7);
    out.extend_from_slice(&START_STANDARD);
    out.push((body.len() + 2) as u8);
    out.extend_from_slice(&body);
    push_u16_be(&mut out, crc::checksum(&body));
    out.extend_from_slice(&STOP);
    out
}

fn push_u16_be(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ack_has_the_documented_shape() {
        let ack = encode_ack(0x0042);
        assert_eq!(ack.len(), 10);
        assert_eq!(&ack[..4], &[0x78, 0x78, 0x05, 0x01]);
        assert_eq!(&ack[4..6], &[0x00, 0x42]);
        assert_eq!(&ack[8..], &[0x0D, 0x0A]);
    }

    #[test]
    fn ack_is_a_pure_function_of_the_serial() {
        for serial in [0u16, 1, 0x00FF, 0xABCD, 0xFFFF] {
            let ack = encode_ack(serial);
            assert_eq!(ack, encode_ack(serial));
            // Serial round-trips out of the fixed offset.
            assert_eq!(u16::from_be_bytes([ack[4], ack[5]]), serial);
            // Recomputing the checksum over protocol-id..serial
            // reproduces the stamped bytes.
            let crc = crc::checksum(&ack[3..6]);
            assert_eq!(&ack[6..8], &crc.to_be_bytes());
        }
    }

    #[test]
    fn login_frame_meets_the_login_minimum() {
        let frame = encode_login([0u8; 8], 1);
        assert_eq!(frame.len(), 18);
        assert!(frame.len() >= crate::decode::MIN_LOGIN_FRAME);
    }

    #[test]
    fn position_frame_carries_the_declared_length() {
        let at = Utc.with_ymd_and_hms(2026, 8, 7, 10, 0, 0).unwrap();
        let frame = encode_position(*b"\x11\x11\x11\x11\0\0\0\0", at, -32.7, -60.7, 50, 90, 0.0, 2);
        assert_eq!(frame.len(), 38);
        // Length byte counts protocol-id through checksum.
        assert_eq!(usize::from(frame[2]), frame.len() - 5);
    }
}
