use foundation::math::{LngLat, haversine_distance_m};
use serde::Serialize;
use thiserror::Error;

use crate::analysis::Statistics;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("profile needs at least 2 positions, got {0}")]
    TooShort(usize),
    #[error("{positions} positions but {samples} elevation samples")]
    LengthMismatch { positions: usize, samples: usize },
    #[error("elevation sample {0} is not finite")]
    NonFinite(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePoint {
    pub distance_km: f64,
    pub elevation_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevationProfile {
    pub points: Vec<ProfilePoint>,
    pub length_km: f64,
    pub min_m: f64,
    pub max_m: f64,
    pub ascent_m: f64,
    pub descent_m: f64,
}

impl ElevationProfile {
    /// Builds a profile from a line and one elevation per vertex.
    pub fn from_samples(line: &[LngLat], elevations_m: &[f64]) -> Result<Self, ProfileError> {
        if line.len() < 2 {
            return Err(ProfileError::TooShort(line.len()));
        }
        if line.len() != elevations_m.len() {
            return Err(ProfileError::LengthMismatch {
                positions: line.len(),
                samples: elevations_m.len(),
            });
        }
        if let Some(idx) = elevations_m.iter().position(|e| !e.is_finite()) {
            return Err(ProfileError::NonFinite(idx));
        }

        let mut points = Vec::with_capacity(line.len());
        let mut distance_m = 0.0;
        for (i, (&p, &elevation_m)) in line.iter().zip(elevations_m).enumerate() {
            if i > 0 {
                distance_m += haversine_distance_m(line[i - 1], p);
            }
            points.push(ProfilePoint {
                distance_km: distance_m / 1_000.0,
                elevation_m,
            });
        }

        let (min_m, max_m) = Statistics::min_max(elevations_m).unwrap_or((0.0, 0.0));
        let (ascent_m, descent_m) = Statistics::ascent_descent(elevations_m);
        Ok(Self {
            points,
            length_km: distance_m / 1_000.0,
            min_m,
            max_m,
            ascent_m,
            descent_m,
        })
    }
}

/// Evenly spaced positions along a line (by great-circle distance), both
/// ends included. Used to choose where to query terrain elevation.
pub fn sample_line(line: &[LngLat], samples: usize) -> Vec<LngLat> {
    if line.len() < 2 || samples < 2 {
        return line.to_vec();
    }
    let segments: Vec<f64> = line
        .windows(2)
        .map(|w| haversine_distance_m(w[0], w[1]))
        .collect();
    let total: f64 = segments.iter().sum();
    if total <= 0.0 {
        return vec![line[0]; samples];
    }

    let mut out = Vec::with_capacity(samples);
    let mut seg = 0;
    let mut seg_start = 0.0;
    for i in 0..samples {
        let target = total * i as f64 / (samples - 1) as f64;
        while seg + 1 < segments.len() && seg_start + segments[seg] < target {
            seg_start += segments[seg];
            seg += 1;
        }
        let t = if segments[seg] > 0.0 {
            ((target - seg_start) / segments[seg]).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let (a, b) = (line[seg], line[seg + 1]);
        // Linear in degrees; segments are short at drawing scale.
        out.push(LngLat::new(
            a.lng + (b.lng - a.lng) * t,
            a.lat + (b.lat - a.lat) * t,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use foundation::math::{LngLat, line_length_km};

    use super::{ElevationProfile, ProfileError, sample_line};

    fn assert_close(a: f64, b: f64, eps: f64) {
        assert!((a - b).abs() <= eps, "expected {a} ~= {b}");
    }

    #[test]
    fn profile_accumulates_distance() {
        let line = [
            LngLat::new(0.0, 0.0),
            LngLat::new(0.0, 0.01),
            LngLat::new(0.01, 0.01),
        ];
        let p = ElevationProfile::from_samples(&line, &[100.0, 180.0, 150.0]).unwrap();
        assert_eq!(p.points[0].distance_km, 0.0);
        assert_close(p.length_km, line_length_km(&line), 1e-12);
        assert_close(p.points[2].distance_km, p.length_km, 1e-12);
        assert_eq!((p.min_m, p.max_m), (100.0, 180.0));
        assert_close(p.ascent_m, 80.0, 1e-9);
        assert_close(p.descent_m, 30.0, 1e-9);
    }

    #[test]
    fn profile_rejects_bad_input() {
        let line = [LngLat::new(0.0, 0.0), LngLat::new(1.0, 0.0)];
        assert_eq!(
            ElevationProfile::from_samples(&line[..1], &[1.0]),
            Err(ProfileError::TooShort(1))
        );
        assert!(matches!(
            ElevationProfile::from_samples(&line, &[1.0]),
            Err(ProfileError::LengthMismatch { .. })
        ));
        assert_eq!(
            ElevationProfile::from_samples(&line, &[1.0, f64::NAN]),
            Err(ProfileError::NonFinite(1))
        );
    }

    #[test]
    fn samples_include_both_ends() {
        let line = [LngLat::new(0.0, 0.0), LngLat::new(0.0, 1.0), LngLat::new(1.0, 1.0)];
        let s = sample_line(&line, 5);
        assert_eq!(s.len(), 5);
        assert_eq!(s[0], line[0]);
        assert_close(s[4].lng, 1.0, 1e-9);
        assert_close(s[4].lat, 1.0, 1e-9);
        // The middle sample lands near the corner.
        assert_close(s[2].lat, 1.0, 0.01);
        assert_close(s[2].lng, 0.0, 0.01);
    }
}
