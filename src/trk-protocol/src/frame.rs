// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Frame delimiting and validation.
//!
//! Wire layout: `start(2) length protocol-id payload... serial(2) crc(2)
//! 0x0D0A`. Standard frames start with `0x7878` and carry a one-byte
//! length; extended (alarm-class) frames start with `0x7979` and carry a
//! two-byte length. The length counts protocol-id through checksum.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use crate::crc;

pub const START_STANDARD: [u8; 2] = [0x78, 0x78];
pub const START_EXTENDED: [u8; 2] = [0x79, 0x79];
pub const STOP: [u8; 2] = [0x0D, 0x0A];

pub const PROTO_LOGIN: u8 = 0x01;
pub const PROTO_LBS: u8 = 0x12;
pub const PROTO_HEARTBEAT: u8 = 0x13;
pub const PROTO_POSITION: u8 = 0x22;
pub const PROTO_ALARM: u8 = 0x94;

/// Smallest declared length that can hold protocol-id + serial + checksum.
const MIN_DECLARED_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame too short for protocol 0x{protocol:02x}: {frame_hex}")]
    TooShort { protocol: u8, frame_hex: String },

    #[error("field out of range: {0}")]
    FieldOutOfRange(String),

    #[error("checksum mismatch (declared 0x{declared:04x}, computed 0x{computed:04x})")]
    ChecksumMismatch { declared: u16, computed: u16 },

    #[error("unknown protocol id 0x{0:02x}")]
    UnknownProtocol(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// `0x7878`, one-byte length field.
    Standard,
    /// `0x7979`, two-byte length field; treated as alarm-class.
    Extended,
}

impl HeaderKind {
    /// Bytes before the protocol id: start marker plus length field.
    fn header_len(self) -> usize {
        match self {
            HeaderKind::Standard => 3,
            HeaderKind::Extended => 4,
        }
    }
}

/// One complete, delimited frame as read off the socket, markers included.
#[derive(Debug, Clone)]
pub struct Frame {
    kind: HeaderKind,
    data: Bytes,
}

impl Frame {
    pub fn kind(&self) -> HeaderKind {
        self.kind
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn protocol_id(&self) -> u8 {
        self.data[self.kind.header_len()]
    }

    /// The checksummed region: protocol-id through serial.
    pub fn checksum_region(&self) -> &[u8] {
        &self.data[self.kind.header_len()..self.data.len() - 4]
    }

    /// Checksum as declared on the wire (big-endian before the stop marker).
    pub fn declared_checksum(&self) -> u16 {
        let n = self.data.len();
        u16::from_be_bytes([self.data[n - 4], self.data[n - 3]])
    }

    /// Frame serial number, from the two bytes starting six bytes before
    /// the end of the frame. Echoed back in acknowledgements.
    pub fn serial(&self) -> u16 {
        let n = self.data.len();
        u16::from_be_bytes([self.data[n - 6], self.data[n - 5]])
    }

    /// Best-effort checksum verification.
    pub fn verify_checksum(&self) -> Result<(), FrameError> {
        let computed = crc::checksum(self.checksum_region());
        let declared = self.declared_checksum();
        if computed == declared {
            Ok(())
        } else {
            Err(FrameError::ChecksumMismatch { declared, computed })
        }
    }

    /// Lowercase hex dump of the whole frame, for log messages.
    pub fn hex(&self) -> String {
        hex_string(&self.data)
    }
}

pub fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Pull the next complete frame out of `buf`.
///
/// Leading garbage (anything before a start marker, or a marker whose
/// declared frame fails the stop-marker check) is discarded and scanning
/// resumes, so one corrupt run never wedges the connection. Returns
/// `None` when the buffer does not yet hold a complete frame.
pub fn extract_frame(buf: &mut BytesMut) -> Option<Frame> {
    loop {
        let Some(pos) = find_start(buf) else {
            // No marker; keep the last byte in case it is half of one.
            if buf.len() > 1 {
                let drop = buf.len() - 1;
                buf.advance(drop);
            }
            return None;
        };
        if pos > 0 {
            buf.advance(pos);
        }

        let kind = if buf[..2] == START_STANDARD {
            HeaderKind::Standard
        } else {
            HeaderKind::Extended
        };
        let header_len = kind.header_len();
        if buf.len() < header_len {
            return None;
        }

        let declared = match kind {
            HeaderKind::Standard => usize::from(buf[2]),
            HeaderKind::Extended => usize::from(u16::from_be_bytes([buf[2], buf[3]])),
        };
        if declared < MIN_DECLARED_LEN {
            // Marker bytes inside garbage; resync past them.
            buf.advance(2);
            continue;
        }

        let total = header_len + declared + 2;
        if buf.len() < total {
            return None;
        }
        if buf[total - 2..total] != STOP {
            buf.advance(2);
            continue;
        }

        let data = buf.split_to(total).freeze();
        return Some(Frame { kind, data });
    }
}

fn find_start(buf: &[u8]) -> Option<usize> {
    buf.windows(2)
        .position(|w| w == START_STANDARD || w == START_EXTENDED)
}
