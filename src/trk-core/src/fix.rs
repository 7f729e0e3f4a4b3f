// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Shared position-report type produced by the codec and consumed by the
//! sampling gate and the sink forwarder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single decoded position report.
///
/// Serializes to the sink ingest contract verbatim, so the forwarder can
/// POST a `Fix` without an intermediate wire struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// Stable device key: lowercase hex of the terminal-id field bytes.
    pub device_id: String,
    /// Latitude in decimal degrees, clamped to [-90, 90].
    pub lat: f64,
    /// Longitude in decimal degrees, clamped to [-180, 180].
    pub lng: f64,
    /// Speed in km/h as reported by the device (one byte on the wire).
    #[serde(rename = "speed")]
    pub speed_kmh: u8,
    /// Course over ground in degrees, normalized to 0..=359.
    #[serde(rename = "course")]
    pub course_deg: u16,
    /// Altitude in meters; 0 when the frame variant does not carry it.
    #[serde(rename = "altitude")]
    pub altitude_m: f64,
    /// Reported horizontal accuracy in meters; 0 when not carried.
    #[serde(rename = "accuracy")]
    pub accuracy_m: u16,
    /// Device clock at the moment of the fix (UTC).
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_to_sink_contract_field_names() {
        let fix = Fix {
            device_id: "aabbccdd".to_string(),
            lat: -32.716774,
            lng: -60.727609,
            speed_kmh: 42,
            course_deg: 180,
            altitude_m: 12.5,
            accuracy_m: 3,
            timestamp: Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap(),
        };

        let value = serde_json::to_value(&fix).expect("serialize");
        let obj = value.as_object().expect("object");
        for key in [
            "device_id",
            "lat",
            "lng",
            "speed",
            "course",
            "altitude",
            "accuracy",
            "timestamp",
        ] {
            assert!(obj.contains_key(key), "missing field {key}");
        }
        assert_eq!(obj["speed"], 42);
        assert_eq!(obj["timestamp"], "2026-08-07T12:00:00Z");
    }
}
