// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! GT06 wire codec.
//!
//! Stateless building blocks for the tracker protocol: frame extraction
//! from a raw TCP stream, the frame checksum, decoding of the known
//! packet kinds into [`DecodedPacket`], and encoding of outbound frames
//! (acknowledgements, plus the login/position builders used by the
//! simulator and the tests).

pub mod crc;
pub mod decode;
pub mod encode;
pub mod frame;

pub use decode::{decode, DecodedPacket};
pub use frame::{extract_frame, Frame, FrameError, HeaderKind};
