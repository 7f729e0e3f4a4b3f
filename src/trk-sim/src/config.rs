// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for trk-sim.
//!
//! Config is loaded from the `[trk-sim]` section of `trk-rs.toml`.

use serde::{Deserialize, Serialize};

use trk_app::ConfigFile;

/// Simulator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Server to connect to
    pub host: String,
    /// Server port
    pub port: u16,
    /// Device ids to simulate, as hex of the 8-byte terminal-id field
    /// (short ids are zero-padded on the wire)
    pub devices: Vec<String>,
    /// Seconds between position reports
    pub interval_secs: u64,
    /// Speed cap for the simulated vehicles, km/h
    pub max_speed_kmh: u8,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5023,
            devices: vec![
                "36377367".to_string(),
                "31313131".to_string(),
                "38393939".to_string(),
            ],
            interval_secs: 10,
            max_speed_kmh: 90,
        }
    }
}

impl ConfigFile for SimConfig {
    fn section_key() -> &'static str {
        "trk-sim"
    }
}

/// Parse a hex device id into the 8-byte wire field, zero-padded.
pub fn parse_device_id(hex: &str) -> Result<[u8; 8], String> {
    if hex.is_empty() || hex.len() % 2 != 0 || hex.len() > 16 {
        return Err(format!(
            "device id must be 1..=8 bytes of even-length hex: {hex:?}"
        ));
    }
    let mut id = [0u8; 8];
    for (i, pair) in hex.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(pair).map_err(|_| format!("invalid hex: {hex:?}"))?;
        id[i] = u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex: {hex:?}"))?;
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_id_with_padding() {
        assert_eq!(
            parse_device_id("aabbccdd").expect("parse"),
            [0xAA, 0xBB, 0xCC, 0xDD, 0, 0, 0, 0]
        );
    }

    #[test]
    fn parses_full_width_id() {
        assert_eq!(
            parse_device_id("0011223344556677").expect("parse"),
            [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]
        );
    }

    #[test]
    fn rejects_odd_length_and_junk() {
        assert!(parse_device_id("abc").is_err());
        assert!(parse_device_id("").is_err());
        assert!(parse_device_id("zz").is_err());
        assert!(parse_device_id("00112233445566778899").is_err());
    }
}
