//! Equatorial (ICRS) to galactic coordinate conversion.

use nalgebra::{Matrix3, Vector3};

/// Rotation taking ICRS unit vectors to galactic unit vectors
/// (Hipparcos definition, ESA SP-1200 Vol. 1 §1.5.3).
#[rustfmt::skip]
fn icrs_to_galactic() -> Matrix3<f64> {
    Matrix3::new(
        -0.054_875_560_416_215_4, -0.873_437_090_234_885_0, -0.483_835_015_548_713_2,
         0.494_109_427_875_583_7, -0.444_829_629_960_011_2,  0.746_982_244_497_218_9,
        -0.867_666_149_019_004_7, -0.198_076_373_431_201_5,  0.455_983_776_175_066_9,
    )
}

fn radec_to_uvec(ra_deg: f64, dec_deg: f64) -> Vector3<f64> {
    let (sin_ra, cos_ra) = ra_deg.to_radians().sin_cos();
    let (sin_dec, cos_dec) = dec_deg.to_radians().sin_cos();
    Vector3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec)
}

/// Convert (RA, Dec) in degrees to galactic (l, b) in degrees.
///
/// `l` is returned in [0, 360), `b` in [-90, 90].
pub fn equatorial_to_galactic(ra_deg: f64, dec_deg: f64) -> (f64, f64) {
    let g = icrs_to_galactic() * radec_to_uvec(ra_deg, dec_deg);
    let b = g.z.clamp(-1.0, 1.0).asin().to_degrees();
    let l = g.y.atan2(g.x).to_degrees().rem_euclid(360.0);
    (l, b)
}

/// Galactic latitude in degrees of an equatorial position.
pub fn galactic_latitude(ra_deg: f64, dec_deg: f64) -> f64 {
    equatorial_to_galactic(ra_deg, dec_deg).1
}
