//! Line length, polygon area and perimeter over lng/lat rings.
//!
//! All results are in kilometre-based units; choosing metres for small values
//! is a presentation concern.

use super::{LngLat, WGS84_A, haversine_distance_m};

/// Sum of great-circle segment lengths (km). Zero for fewer than two points.
pub fn line_length_km(coords: &[LngLat]) -> f64 {
    coords
        .windows(2)
        .map(|w| haversine_distance_m(w[0], w[1]))
        .sum::<f64>()
        / 1000.0
}

/// Length of the outer ring (km).
pub fn polygon_perimeter_km(outer_ring: &[LngLat]) -> f64 {
    line_length_km(&closed(outer_ring))
}

/// Outer ring area minus hole areas (km^2). Never negative.
///
/// Unclosed rings are closed before computing; winding order is irrelevant.
pub fn polygon_area_km2(rings: &[Vec<LngLat>]) -> f64 {
    let Some((outer, holes)) = rings.split_first() else {
        return 0.0;
    };
    let mut area_m2 = ring_area_m2(outer).abs();
    for hole in holes {
        area_m2 -= ring_area_m2(hole).abs();
    }
    area_m2.max(0.0) / 1_000_000.0
}

/// Returns true when the ring's first and last positions are identical.
pub fn is_ring_closed(ring: &[LngLat]) -> bool {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) => first == last,
        _ => false,
    }
}

/// Appends the first position when the ring is not closed.
pub fn close_ring(ring: &mut Vec<LngLat>) {
    if is_ring_closed(ring) {
        return;
    }
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }
}

fn closed(ring: &[LngLat]) -> Vec<LngLat> {
    let mut out = ring.to_vec();
    close_ring(&mut out);
    out
}

/// Signed spherical ring area (m^2), Chamberlain & Duquette approximation.
fn ring_area_m2(ring: &[LngLat]) -> f64 {
    let mut pts: Vec<LngLat> = ring.to_vec();
    if pts.len() >= 2 && is_ring_closed(&pts) {
        pts.pop();
    }
    let n = pts.len();
    if n < 3 {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..n {
        let prev = pts[(i + n - 1) % n];
        let cur = pts[i];
        let next = pts[(i + 1) % n];
        total += (next.lng.to_radians() - prev.lng.to_radians()) * cur.lat.to_radians().sin();
    }
    total * WGS84_A * WGS84_A / 2.0
}

#[cfg(test)]
mod tests {
    use super::{
        close_ring, is_ring_closed, line_length_km, polygon_area_km2, polygon_perimeter_km,
    };
    use crate::math::{LngLat, haversine_distance_m};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    fn pts(raw: &[[f64; 2]]) -> Vec<LngLat> {
        raw.iter().copied().map(LngLat::from).collect()
    }

    fn square() -> Vec<LngLat> {
        pts(&[[0.0, 0.0], [0.0, 0.01], [0.01, 0.01], [0.01, 0.0], [0.0, 0.0]])
    }

    #[test]
    fn three_point_line_sums_segments() {
        let line = pts(&[[0.0, 0.0], [0.0, 0.01], [0.01, 0.01]]);
        let expected =
            (haversine_distance_m(line[0], line[1]) + haversine_distance_m(line[1], line[2]))
                / 1000.0;
        let got = line_length_km(&line);
        assert_close(got, expected, 1e-12);
        // Two ~1.112 km legs.
        assert_close(got, 2.224, 0.005);
    }

    #[test]
    fn line_length_is_reversal_invariant() {
        let mut line = pts(&[[-7.6, 33.5], [-7.0, 33.9], [-6.8, 34.0], [-5.0, 35.7]]);
        let forward = line_length_km(&line);
        line.reverse();
        assert_close(line_length_km(&line), forward, 1e-9);
    }

    #[test]
    fn single_point_line_is_zero() {
        assert_eq!(line_length_km(&pts(&[[1.0, 1.0]])), 0.0);
    }

    #[test]
    fn square_area_near_equator() {
        let area = polygon_area_km2(&[square()]);
        assert!(area > 1.0 && area < 1.4, "area {area}");
    }

    #[test]
    fn area_is_winding_invariant_and_positive() {
        let mut ring = square();
        let a = polygon_area_km2(&[ring.clone()]);
        ring.reverse();
        let b = polygon_area_km2(&[ring]);
        assert!(a > 0.0);
        assert_close(a, b, 1e-9);
    }

    #[test]
    fn unclosed_ring_is_closed_before_area() {
        let open = pts(&[[0.0, 0.0], [0.0, 0.01], [0.01, 0.01], [0.01, 0.0]]);
        assert_close(
            polygon_area_km2(&[open]),
            polygon_area_km2(&[square()]),
            1e-12,
        );
    }

    #[test]
    fn holes_are_subtracted() {
        let hole = pts(&[
            [0.002, 0.002],
            [0.004, 0.002],
            [0.004, 0.004],
            [0.002, 0.004],
            [0.002, 0.002],
        ]);
        let full = polygon_area_km2(&[square()]);
        let holed = polygon_area_km2(&[square(), hole.clone()]);
        let hole_area = polygon_area_km2(&[hole]);
        assert_close(holed, full - hole_area, 1e-9);
    }

    #[test]
    fn perimeter_matches_closed_ring_length() {
        let perimeter = polygon_perimeter_km(&square());
        assert_close(perimeter, line_length_km(&square()), 1e-12);
        assert_close(perimeter, 4.448, 0.01);
    }

    #[test]
    fn close_ring_appends_first_point_once() {
        let mut ring = pts(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]);
        assert!(!is_ring_closed(&ring));
        close_ring(&mut ring);
        assert!(is_ring_closed(&ring));
        assert_eq!(ring.len(), 4);
        close_ring(&mut ring);
        assert_eq!(ring.len(), 4);
    }
}
