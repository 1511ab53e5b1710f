use super::LngLat;

/// Mean Earth radius used for great-circle distances (meters).
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_000.0;

/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 first eccentricity squared.
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// GRS80 semi-major axis (meters).
pub const GRS80_A: f64 = 6_378_137.0;
/// GRS80 flattening.
pub const GRS80_F: f64 = 1.0 / 298.257_222_101;

/// Reference ellipsoid parameters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ellipsoid {
    pub a: f64,
    pub f: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        a: WGS84_A,
        f: WGS84_F,
    };
    pub const GRS80: Ellipsoid = Ellipsoid {
        a: GRS80_A,
        f: GRS80_F,
    };

    /// First eccentricity squared.
    pub fn e2(&self) -> f64 {
        self.f * (2.0 - self.f)
    }

    /// First eccentricity.
    pub fn e(&self) -> f64 {
        self.e2().sqrt()
    }

    /// Second eccentricity squared.
    pub fn ep2(&self) -> f64 {
        let e2 = self.e2();
        e2 / (1.0 - e2)
    }
}

/// Great-circle distance between two positions (meters).
pub fn haversine_distance_m(a: LngLat, b: LngLat) -> f64 {
    if a == b {
        return 0.0;
    }
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let s_lat = (dlat * 0.5).sin();
    let s_lng = (dlng * 0.5).sin();
    let h = s_lat * s_lat + lat1.cos() * lat2.cos() * s_lng * s_lng;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_MEAN_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::{EARTH_MEAN_RADIUS_M, Ellipsoid, haversine_distance_m};
    use crate::math::LngLat;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn zero_for_identical_points() {
        let p = LngLat::new(12.5, -33.0);
        assert_eq!(haversine_distance_m(p, p), 0.0);
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = haversine_distance_m(LngLat::new(0.0, 0.0), LngLat::new(0.0, 1.0));
        assert_close(d, EARTH_MEAN_RADIUS_M * 1f64.to_radians(), 1e-6);
    }

    #[test]
    fn symmetric() {
        let a = LngLat::new(-9.2, 32.1);
        let b = LngLat::new(-6.8, 34.0);
        assert_close(haversine_distance_m(a, b), haversine_distance_m(b, a), 1e-9);
    }

    #[test]
    fn antipodal_points_are_half_circumference() {
        let d = haversine_distance_m(LngLat::new(0.0, 0.0), LngLat::new(180.0, 0.0));
        assert_close(d, std::f64::consts::PI * EARTH_MEAN_RADIUS_M, 1e-3);
    }

    #[test]
    fn grs80_and_wgs84_differ_only_slightly() {
        let diff = (Ellipsoid::WGS84.e2() - Ellipsoid::GRS80.e2()).abs();
        assert!(diff > 0.0 && diff < 1e-9);
    }
}
