//! Coordinate reprojection between the named CRSs the map supports.
//!
//! Geographic WGS84 is the hub: every transform goes `from -> WGS84 -> to`.
//! Projected coordinates are `[easting, northing]` in metres, geographic ones
//! are `[longitude, latitude]` in degrees.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::Ellipsoid;

const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

const LCC_MAX_ITERATIONS: usize = 15;
const LCC_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("coordinate is not finite: [{0}, {1}]")]
    NonFinite(f64, f64),
    #[error("geographic coordinate out of range: lng {lng}, lat {lat}")]
    OutOfRange { lng: f64, lat: f64 },
    #[error("unrecognized coordinate reference system `{0}`")]
    UnknownCrs(String),
    #[error("invalid UTM zone {0} (expected 1..=60)")]
    InvalidZone(u8),
    #[error("inverse projection did not converge")]
    NoConvergence,
}

/// Named coordinate reference systems.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Crs {
    /// Geographic lng/lat on WGS84 (EPSG:4326).
    Wgs84,
    /// Universal Transverse Mercator on WGS84.
    Utm { zone: u8, north: bool },
    /// Merchich / Nord Maroc style Lambert conformal conic (2SP, GRS80).
    Merchich,
}

impl Crs {
    pub const UTM_29N: Crs = Crs::Utm {
        zone: 29,
        north: true,
    };

    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Wgs84 => f.write_str("wgs84"),
            Crs::Utm { zone, north } => {
                write!(f, "utm{}{}", zone, if *north { 'n' } else { 's' })
            }
            Crs::Merchich => f.write_str("merchich"),
        }
    }
}

impl FromStr for Crs {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        match key.as_str() {
            "wgs84" | "epsg:4326" => return Ok(Crs::Wgs84),
            "merchich" | "lambert" | "local" | "epsg:26191" => return Ok(Crs::Merchich),
            "utm" => return Ok(Crs::UTM_29N),
            _ => {}
        }

        let Some(rest) = key.strip_prefix("utm") else {
            return Err(ProjectionError::UnknownCrs(s.to_string()));
        };
        let (digits, north) = match rest.chars().last() {
            Some('n') => (&rest[..rest.len() - 1], true),
            Some('s') => (&rest[..rest.len() - 1], false),
            _ => (rest, true),
        };
        let zone: u8 = digits
            .parse()
            .map_err(|_| ProjectionError::UnknownCrs(s.to_string()))?;
        if !(1..=60).contains(&zone) {
            return Err(ProjectionError::InvalidZone(zone));
        }
        Ok(Crs::Utm { zone, north })
    }
}

/// Transforms `point` from `from` to `to`.
pub fn reproject(point: [f64; 2], from: Crs, to: Crs) -> Result<[f64; 2], ProjectionError> {
    let [x, y] = point;
    if !x.is_finite() || !y.is_finite() {
        return Err(ProjectionError::NonFinite(x, y));
    }
    if from == to {
        if from.is_geographic() {
            check_geographic(x, y)?;
        }
        return Ok(point);
    }

    let [lng, lat] = to_wgs84(point, from)?;
    from_wgs84([lng, lat], to)
}

fn to_wgs84(point: [f64; 2], from: Crs) -> Result<[f64; 2], ProjectionError> {
    match from {
        Crs::Wgs84 => {
            check_geographic(point[0], point[1])?;
            Ok(point)
        }
        Crs::Utm { zone, north } => utm_inverse(point, zone, north),
        Crs::Merchich => LambertConic::merchich().inverse(point),
    }
}

fn from_wgs84(lnglat: [f64; 2], to: Crs) -> Result<[f64; 2], ProjectionError> {
    check_geographic(lnglat[0], lnglat[1])?;
    match to {
        Crs::Wgs84 => Ok(lnglat),
        Crs::Utm { zone, north } => utm_forward(lnglat, zone, north),
        Crs::Merchich => Ok(LambertConic::merchich().forward(lnglat)),
    }
}

fn check_geographic(lng: f64, lat: f64) -> Result<(), ProjectionError> {
    if !(-180.0..=180.0).contains(&lng) || !(-90.0..=90.0).contains(&lat) {
        return Err(ProjectionError::OutOfRange { lng, lat });
    }
    Ok(())
}

fn utm_central_meridian_rad(zone: u8) -> Result<f64, ProjectionError> {
    if !(1..=60).contains(&zone) {
        return Err(ProjectionError::InvalidZone(zone));
    }
    Ok((f64::from(zone) * 6.0 - 183.0).to_radians())
}

/// Meridian arc length from the equator to `phi` (Snyder 3-21).
fn meridian_arc(ell: Ellipsoid, phi: f64) -> f64 {
    let e2 = ell.e2();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    ell.a
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

fn utm_forward(lnglat: [f64; 2], zone: u8, north: bool) -> Result<[f64; 2], ProjectionError> {
    let ell = Ellipsoid::WGS84;
    let lambda0 = utm_central_meridian_rad(zone)?;
    let phi = lnglat[1].to_radians();
    let lambda = lnglat[0].to_radians();

    let e2 = ell.e2();
    let ep2 = ell.ep2();
    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let tan_phi = phi.tan();

    let n = ell.a / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ep2 * cos_phi * cos_phi;
    let a = cos_phi * (lambda - lambda0);
    let m = meridian_arc(ell, phi);

    let a2 = a * a;
    let a3 = a2 * a;
    let a4 = a3 * a;
    let a5 = a4 * a;
    let a6 = a5 * a;

    let x = UTM_K0
        * n
        * (a + (1.0 - t + c) * a3 / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0)
        + UTM_FALSE_EASTING;
    let mut y = UTM_K0
        * (m + n
            * tan_phi
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));
    if !north {
        y += UTM_FALSE_NORTHING_SOUTH;
    }
    Ok([x, y])
}

fn utm_inverse(xy: [f64; 2], zone: u8, north: bool) -> Result<[f64; 2], ProjectionError> {
    let ell = Ellipsoid::WGS84;
    let lambda0 = utm_central_meridian_rad(zone)?;
    let e2 = ell.e2();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let ep2 = ell.ep2();

    let x = xy[0] - UTM_FALSE_EASTING;
    let y = if north {
        xy[1]
    } else {
        xy[1] - UTM_FALSE_NORTHING_SOUTH
    };

    let m = y / UTM_K0;
    let mu = m / (ell.a * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));
    let sqrt_1_e2 = (1.0 - e2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();
    let w = 1.0 - e2 * sin_phi1 * sin_phi1;
    let n1 = ell.a / w.sqrt();
    let t1 = tan_phi1 * tan_phi1;
    let c1 = ep2 * cos_phi1 * cos_phi1;
    let r1 = ell.a * (1.0 - e2) / w.powf(1.5);
    let d = x / (n1 * UTM_K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let phi = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0 - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d6
                    / 720.0);
    let lambda = lambda0
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d5
                / 120.0)
            / cos_phi1;

    let out = [lambda.to_degrees(), phi.to_degrees()];
    if !out[0].is_finite() || !out[1].is_finite() {
        return Err(ProjectionError::NonFinite(xy[0], xy[1]));
    }
    check_geographic(out[0], out[1])?;
    Ok(out)
}

/// Lambert conformal conic with two standard parallels (Snyder 15-1..15-11).
#[derive(Debug, Copy, Clone)]
struct LambertConic {
    ell: Ellipsoid,
    lambda0: f64,
    x0: f64,
    y0: f64,
    n: f64,
    big_f: f64,
    rho0: f64,
}

impl LambertConic {
    fn new(ell: Ellipsoid, lat1: f64, lat2: f64, lat0: f64, lon0: f64, x0: f64, y0: f64) -> Self {
        let phi1 = lat1.to_radians();
        let phi2 = lat2.to_radians();
        let phi0 = lat0.to_radians();
        let e = ell.e();

        let m1 = lcc_m(e, phi1);
        let m2 = lcc_m(e, phi2);
        let t1 = lcc_t(e, phi1);
        let t2 = lcc_t(e, phi2);
        let t0 = lcc_t(e, phi0);

        let n = if (phi1 - phi2).abs() < 1e-12 {
            phi1.sin()
        } else {
            (m1.ln() - m2.ln()) / (t1.ln() - t2.ln())
        };
        let big_f = m1 / (n * t1.powf(n));
        let rho0 = ell.a * big_f * t0.powf(n);

        Self {
            ell,
            lambda0: lon0.to_radians(),
            x0,
            y0,
            n,
            big_f,
            rho0,
        }
    }

    fn merchich() -> Self {
        Self::new(Ellipsoid::GRS80, 33.0, 35.0, 34.0, -6.0, 500_000.0, 0.0)
    }

    fn forward(&self, lnglat: [f64; 2]) -> [f64; 2] {
        let phi = lnglat[1].to_radians();
        let lambda = lnglat[0].to_radians();
        let t = lcc_t(self.ell.e(), phi);
        let rho = self.ell.a * self.big_f * t.powf(self.n);
        let theta = self.n * (lambda - self.lambda0);
        [
            self.x0 + rho * theta.sin(),
            self.y0 + self.rho0 - rho * theta.cos(),
        ]
    }

    fn inverse(&self, xy: [f64; 2]) -> Result<[f64; 2], ProjectionError> {
        let e = self.ell.e();
        let dx = xy[0] - self.x0;
        let dy = self.rho0 - (xy[1] - self.y0);
        let sign = self.n.signum();
        let rho = sign * (dx * dx + dy * dy).sqrt();
        let theta = (sign * dx).atan2(sign * dy);
        let t = (rho / (self.ell.a * self.big_f)).powf(1.0 / self.n);

        let mut phi = FRAC_PI_2 - 2.0 * t.atan();
        let mut converged = false;
        for _ in 0..LCC_MAX_ITERATIONS {
            let es = e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
            let delta = (next - phi).abs();
            phi = next;
            if delta < LCC_TOLERANCE {
                converged = true;
                break;
            }
        }
        if !converged || !phi.is_finite() {
            return Err(ProjectionError::NoConvergence);
        }

        let lambda = theta / self.n + self.lambda0;
        let out = [lambda.to_degrees(), phi.to_degrees()];
        check_geographic(out[0], out[1])?;
        Ok(out)
    }
}

fn lcc_m(e: f64, phi: f64) -> f64 {
    let es = e * phi.sin();
    phi.cos() / (1.0 - es * es).sqrt()
}

fn lcc_t(e: f64, phi: f64) -> f64 {
    let es = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}

#[cfg(test)]
mod tests {
    use super::{Crs, ProjectionError, reproject};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn parses_crs_names() {
        assert_eq!("WGS84".parse::<Crs>().unwrap(), Crs::Wgs84);
        assert_eq!("utm29n".parse::<Crs>().unwrap(), Crs::UTM_29N);
        assert_eq!(
            "utm31s".parse::<Crs>().unwrap(),
            Crs::Utm {
                zone: 31,
                north: false
            }
        );
        assert_eq!("lambert".parse::<Crs>().unwrap(), Crs::Merchich);
        assert!(matches!(
            "mercator".parse::<Crs>(),
            Err(ProjectionError::UnknownCrs(_))
        ));
        assert_eq!(
            "utm61n".parse::<Crs>(),
            Err(ProjectionError::InvalidZone(61))
        );
    }

    #[test]
    fn display_round_trips() {
        for crs in [Crs::Wgs84, Crs::UTM_29N, Crs::Merchich] {
            assert_eq!(crs.to_string().parse::<Crs>().unwrap(), crs);
        }
    }

    #[test]
    fn utm_origin_of_zone() {
        // Zone 29 central meridian is 9 degrees west.
        let xy = reproject([-9.0, 0.0], Crs::Wgs84, Crs::UTM_29N).unwrap();
        assert_close(xy[0], 500_000.0, 1e-6);
        assert_close(xy[1], 0.0, 1e-6);
    }

    #[test]
    fn utm_round_trip() {
        let ll = [-7.6, 33.57];
        let xy = reproject(ll, Crs::Wgs84, Crs::UTM_29N).unwrap();
        assert!(xy[0] > 500_000.0);
        assert!(xy[1] > 3_700_000.0 && xy[1] < 3_750_000.0, "northing {}", xy[1]);
        let back = reproject(xy, Crs::UTM_29N, Crs::Wgs84).unwrap();
        assert_close(back[0], ll[0], 1e-7);
        assert_close(back[1], ll[1], 1e-7);
    }

    #[test]
    fn utm_southern_hemisphere_uses_false_northing() {
        let south = Crs::Utm {
            zone: 33,
            north: false,
        };
        let xy = reproject([15.0, -10.0], Crs::Wgs84, south).unwrap();
        assert_close(xy[0], 500_000.0, 1e-6);
        assert!(xy[1] < 10_000_000.0 && xy[1] > 8_800_000.0);
        let back = reproject(xy, south, Crs::Wgs84).unwrap();
        assert_close(back[1], -10.0, 1e-7);
    }

    #[test]
    fn merchich_origin_maps_to_false_origin() {
        let xy = reproject([-6.0, 34.0], Crs::Wgs84, Crs::Merchich).unwrap();
        assert_close(xy[0], 500_000.0, 1e-6);
        assert_close(xy[1], 0.0, 1e-6);
    }

    #[test]
    fn merchich_round_trip() {
        let ll = [-5.0, 35.5];
        let xy = reproject(ll, Crs::Wgs84, Crs::Merchich).unwrap();
        let back = reproject(xy, Crs::Merchich, Crs::Wgs84).unwrap();
        assert_close(back[0], ll[0], 1e-8);
        assert_close(back[1], ll[1], 1e-8);
    }

    #[test]
    fn projected_to_projected_goes_through_wgs84() {
        let ll = [-6.5, 34.2];
        let utm = reproject(ll, Crs::Wgs84, Crs::UTM_29N).unwrap();
        let lcc = reproject(utm, Crs::UTM_29N, Crs::Merchich).unwrap();
        let direct = reproject(ll, Crs::Wgs84, Crs::Merchich).unwrap();
        assert_close(lcc[0], direct[0], 1e-3);
        assert_close(lcc[1], direct[1], 1e-3);
    }

    #[test]
    fn rejects_non_finite_and_out_of_range() {
        assert!(matches!(
            reproject([f64::NAN, 0.0], Crs::Wgs84, Crs::UTM_29N),
            Err(ProjectionError::NonFinite(..))
        ));
        assert!(matches!(
            reproject([0.0, 95.0], Crs::Wgs84, Crs::UTM_29N),
            Err(ProjectionError::OutOfRange { .. })
        ));
        assert!(matches!(
            reproject([200.0, 0.0], Crs::Wgs84, Crs::Wgs84),
            Err(ProjectionError::OutOfRange { .. })
        ));
    }
}
