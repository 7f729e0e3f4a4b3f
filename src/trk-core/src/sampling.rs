// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Movement-based sampling of incoming fixes.
//!
//! Trackers report every few seconds even while parked; storing every
//! sample would flood the sink with near-identical rows. The gate keeps
//! the last *accepted* fix per device and admits a new one only when the
//! vehicle moved, enough time passed, or the vehicle just came to a stop.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::fix::Fix;
use crate::geo;

/// Distance/time thresholds for the sampling decision.
#[derive(Debug, Clone, Copy)]
pub struct SamplingConfig {
    /// Minimum movement, in kilometers, that always admits a fix.
    pub min_distance_km: f64,
    /// Maximum age, in seconds, after which a fix is admitted regardless
    /// of movement.
    pub min_interval_secs: i64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            min_distance_km: 0.03,
            min_interval_secs: 300,
        }
    }
}

/// Outcome of a sampling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleVerdict {
    /// No baseline for this device yet.
    First,
    /// Moved at least the distance threshold since the last accepted fix.
    Moved,
    /// Interval threshold elapsed since the last accepted fix.
    Refreshed,
    /// Speed dropped to zero from a previously nonzero speed.
    Stopped,
    /// Stationary-looking, recent; suppressed.
    Duplicate,
}

impl SampleVerdict {
    /// Whether the fix should be forwarded.
    pub fn accepted(&self) -> bool {
        !matches!(self, SampleVerdict::Duplicate)
    }
}

impl fmt::Display for SampleVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SampleVerdict::First => "first fix",
            SampleVerdict::Moved => "moved",
            SampleVerdict::Refreshed => "interval elapsed",
            SampleVerdict::Stopped => "stop transition",
            SampleVerdict::Duplicate => "duplicate in place",
        };
        f.write_str(s)
    }
}

/// What the gate remembers about the last accepted fix of a device.
#[derive(Debug, Clone)]
struct Baseline {
    lat: f64,
    lng: f64,
    speed_kmh: u8,
    timestamp: DateTime<Utc>,
}

impl From<&Fix> for Baseline {
    fn from(fix: &Fix) -> Self {
        Self {
            lat: fix.lat,
            lng: fix.lng,
            speed_kmh: fix.speed_kmh,
            timestamp: fix.timestamp,
        }
    }
}

const SHARD_COUNT: usize = 16;

/// Per-device last-accepted-fix store with the sampling policy applied on
/// top.
///
/// The map is sharded by device id so two sessions claiming the same
/// device serialize on one shard lock while unrelated devices do not
/// contend. Baselines are replaced only when a fix is accepted.
pub struct SampleGate {
    cfg: SamplingConfig,
    shards: Vec<Mutex<HashMap<String, Baseline>>>,
}

impl SampleGate {
    pub fn new(cfg: SamplingConfig) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        Self { cfg, shards }
    }

    fn shard(&self, device_id: &str) -> &Mutex<HashMap<String, Baseline>> {
        let mut hasher = DefaultHasher::new();
        device_id.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARD_COUNT]
    }

    /// Decide whether `fix` is materially new for its device, and on
    /// accept replace the stored baseline under the same lock.
    pub fn evaluate(&self, fix: &Fix) -> SampleVerdict {
        let mut map = self
            .shard(&fix.device_id)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let verdict = match map.get(&fix.device_id) {
            None => SampleVerdict::First,
            Some(prev) => {
                let distance_km = geo::haversine_km(prev.lat, prev.lng, fix.lat, fix.lng);
                let elapsed_secs = (fix.timestamp - prev.timestamp).num_seconds();

                if distance_km >= self.cfg.min_distance_km {
                    SampleVerdict::Moved
                } else if elapsed_secs >= self.cfg.min_interval_secs {
                    SampleVerdict::Refreshed
                } else if fix.speed_kmh == 0 && prev.speed_kmh > 0 {
                    // A vehicle coming to a stop is an event in itself,
                    // even when geographically indistinguishable from the
                    // previous fix.
                    SampleVerdict::Stopped
                } else {
                    SampleVerdict::Duplicate
                }
            }
        };

        if verdict.accepted() {
            map.insert(fix.device_id.clone(), Baseline::from(fix));
        }
        verdict
    }

    /// Number of devices with a stored baseline.
    pub fn tracked_devices(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(|p| p.into_inner()).len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fix_at(lat: f64, lng: f64, speed_kmh: u8, secs: u32) -> Fix {
        Fix {
            device_id: "0123456789abcdef".to_string(),
            lat,
            lng,
            speed_kmh,
            course_deg: 0,
            altitude_m: 0.0,
            accuracy_m: 0,
            timestamp: Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap()
                + chrono::Duration::seconds(secs as i64),
        }
    }

    // About 10 m of latitude.
    const DEG_10M: f64 = 0.00009;
    // About 50 m of latitude.
    const DEG_50M: f64 = 0.00045;
    // About 1 m of latitude.
    const DEG_1M: f64 = 0.000009;

    #[test]
    fn first_fix_is_always_accepted() {
        let gate = SampleGate::new(SamplingConfig::default());
        assert_eq!(gate.evaluate(&fix_at(-32.7, -60.7, 30, 0)), SampleVerdict::First);
        assert_eq!(gate.tracked_devices(), 1);
    }

    #[test]
    fn near_duplicate_below_both_thresholds_is_rejected() {
        let gate = SampleGate::new(SamplingConfig::default());
        gate.evaluate(&fix_at(-32.7, -60.7, 30, 0));
        let verdict = gate.evaluate(&fix_at(-32.7 + DEG_10M, -60.7, 30, 60));
        assert_eq!(verdict, SampleVerdict::Duplicate);
        assert!(!verdict.accepted());
    }

    #[test]
    fn stop_transition_overrides_thresholds() {
        let gate = SampleGate::new(SamplingConfig::default());
        gate.evaluate(&fix_at(-32.7, -60.7, 40, 0));
        let verdict = gate.evaluate(&fix_at(-32.7 + DEG_10M, -60.7, 0, 60));
        assert_eq!(verdict, SampleVerdict::Stopped);
    }

    #[test]
    fn stop_transition_requires_previous_movement() {
        let gate = SampleGate::new(SamplingConfig::default());
        gate.evaluate(&fix_at(-32.7, -60.7, 0, 0));
        // Already stopped; staying stopped is a duplicate.
        let verdict = gate.evaluate(&fix_at(-32.7, -60.7, 0, 60));
        assert_eq!(verdict, SampleVerdict::Duplicate);
    }

    #[test]
    fn distance_threshold_admits_regardless_of_time() {
        let gate = SampleGate::new(SamplingConfig::default());
        gate.evaluate(&fix_at(-32.7, -60.7, 30, 0));
        let verdict = gate.evaluate(&fix_at(-32.7 + DEG_50M, -60.7, 30, 10));
        assert_eq!(verdict, SampleVerdict::Moved);
    }

    #[test]
    fn interval_threshold_admits_regardless_of_distance() {
        let gate = SampleGate::new(SamplingConfig::default());
        gate.evaluate(&fix_at(-32.7, -60.7, 30, 0));
        let verdict = gate.evaluate(&fix_at(-32.7 + DEG_1M, -60.7, 30, 600));
        assert_eq!(verdict, SampleVerdict::Refreshed);
    }

    #[test]
    fn rejected_fix_does_not_move_the_baseline() {
        let gate = SampleGate::new(SamplingConfig::default());
        gate.evaluate(&fix_at(-32.7, -60.7, 30, 0));
        // Creep in 10 m steps; each compares against the original
        // baseline, so the third step crosses the 30 m threshold.
        assert_eq!(
            gate.evaluate(&fix_at(-32.7 + DEG_10M, -60.7, 30, 10)),
            SampleVerdict::Duplicate
        );
        assert_eq!(
            gate.evaluate(&fix_at(-32.7 + 2.0 * DEG_10M, -60.7, 30, 20)),
            SampleVerdict::Duplicate
        );
        assert_eq!(
            gate.evaluate(&fix_at(-32.7 + 3.5 * DEG_10M, -60.7, 30, 30)),
            SampleVerdict::Moved
        );
    }

    #[test]
    fn devices_are_tracked_independently() {
        let gate = SampleGate::new(SamplingConfig::default());
        let mut a = fix_at(-32.7, -60.7, 30, 0);
        let mut b = fix_at(-32.7, -60.7, 30, 0);
        a.device_id = "aaaaaaaaaaaaaaaa".to_string();
        b.device_id = "bbbbbbbbbbbbbbbb".to_string();
        assert_eq!(gate.evaluate(&a), SampleVerdict::First);
        assert_eq!(gate.evaluate(&b), SampleVerdict::First);
        assert_eq!(gate.tracked_devices(), 2);
    }
}
