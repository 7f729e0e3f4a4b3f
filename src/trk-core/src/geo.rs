// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Great-circle math used by the sampling gate and the simulator.

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two WGS84 points, in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_identical_points() {
        assert_eq!(haversine_km(-32.7167, -60.7276, -32.7167, -60.7276), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.19).abs() < 0.1, "got {d}");
    }

    #[test]
    fn rosario_to_cordoba_is_about_330_km() {
        let d = haversine_km(-32.716774, -60.727609, -31.466840, -64.101087);
        assert!((d - 345.0).abs() < 30.0, "got {d}");
    }

    #[test]
    fn symmetric() {
        let a = haversine_km(-32.0, -60.0, -31.0, -64.0);
        let b = haversine_km(-31.0, -64.0, -32.0, -60.0);
        assert!((a - b).abs() < 1e-9);
    }
}
