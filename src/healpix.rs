//! Nested HEALPix (Hierarchical Equal Area isoLatitude Pixelisation) indexing.
//!
//! The sphere is partitioned into `12 * 4^depth` equal-area pixels. Pixel
//! indices follow the standard nested scheme of Górski et al. (2005): the
//! 12 base faces are numbered
//! - 0–3: north polar cap
//! - 4–7: equatorial belt
//! - 8–11: south polar cap
//!
//! and within each face the `(ix, iy)` grid position is bit-interleaved
//! (`ix` on even bits, `iy` on odd bits). Two consequences the rest of the
//! crate relies on:
//!
//! 1. Coarsening from depth `N` to `N' <= N` is exact integer division of the
//!    pixel index by `4^(N - N')`.
//! 2. Gaia source identifiers embed the depth-12 nested index in bits 35 and
//!    up, so a star's pixel can be read directly off its identifier.
//!
//! All angles are in degrees.

use std::f64::consts::FRAC_PI_2;

use crate::error::{Result, SelectError};

/// Deepest supported hierarchy level (nside = 2^29 still fits a u64 index).
pub const MAX_DEPTH: u8 = 29;

/// Depth of the HEALPix index encoded in Gaia source identifiers.
pub const GAIA_SOURCE_ID_DEPTH: u8 = 12;

/// Bit offset of the depth-12 HEALPix index inside a Gaia source identifier.
const GAIA_SOURCE_ID_SHIFT: u32 = 35;

// Face layout used by the pixel -> center conversion.
const JRLL: [i64; 12] = [2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];
const JPLL: [i64; 12] = [1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7];

/// Nside for a given depth: 2^depth.
pub fn nside(depth: u8) -> u64 {
    1u64 << depth
}

/// Total number of pixels at a given depth: 12 * 4^depth.
pub fn pixel_count(depth: u8) -> u64 {
    12 * nside(depth) * nside(depth)
}

fn check_depth(depth: u8) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(SelectError::DepthOutOfRange {
            depth,
            max: MAX_DEPTH,
        });
    }
    Ok(())
}

fn check_pixel(pixel: u64, depth: u8) -> Result<()> {
    check_depth(depth)?;
    let npix = pixel_count(depth);
    if pixel >= npix {
        return Err(SelectError::PixelOutOfRange {
            pixel,
            depth,
            npix,
        });
    }
    Ok(())
}

/// Map a sky position to its nested pixel index at `depth`.
///
/// `lon_deg` is wrapped into [0, 360); `lat_deg` must lie in [-90, 90].
pub fn ang2pix(lon_deg: f64, lat_deg: f64, depth: u8) -> Result<u64> {
    check_depth(depth)?;
    if !lon_deg.is_finite() || !lat_deg.is_finite() || lat_deg.abs() > 90.0 {
        return Err(SelectError::InvalidCoordinate { lon_deg, lat_deg });
    }

    let ns = nside(depth) as i64;
    let z = lat_deg.to_radians().sin();
    let za = z.abs();
    // tt in [0, 4): which quarter of the sphere in longitude. rem_euclid
    // rounds tiny negative inputs up to exactly 4.0.
    let mut tt = (lon_deg.to_radians() / FRAC_PI_2).rem_euclid(4.0);
    if tt >= 4.0 {
        tt = 0.0;
    }

    let (face, ix, iy) = if za <= 2.0 / 3.0 {
        let temp1 = ns as f64 * (0.5 + tt);
        let temp2 = ns as f64 * z * 0.75;
        let jp = (temp1 - temp2) as i64;
        let jm = (temp1 + temp2) as i64;
        let ifp = jp >> depth;
        let ifm = jm >> depth;
        let face = if ifp == ifm {
            ifp | 4
        } else if ifp < ifm {
            ifp
        } else {
            ifm + 8
        };
        let ix = jm & (ns - 1);
        let iy = ns - (jp & (ns - 1)) - 1;
        (face, ix, iy)
    } else {
        let ntt = (tt as i64).min(3);
        let tp = tt - ntt as f64;
        let tmp = ns as f64 * (3.0 * (1.0 - za)).sqrt();
        let jp = ((tp * tmp) as i64).min(ns - 1);
        let jm = (((1.0 - tp) * tmp) as i64).min(ns - 1);
        if z >= 0.0 {
            (ntt, ns - jm - 1, ns - jp - 1)
        } else {
            (ntt + 8, jp, jm)
        }
    };

    Ok(((face as u64) << (2 * depth as u32)) + xy_to_nested_sub(ix as u64, iy as u64))
}

/// Return the (lon, lat) of the center of a nested pixel, in degrees.
pub fn pix2ang(pixel: u64, depth: u8) -> Result<(f64, f64)> {
    check_pixel(pixel, depth)?;

    let ns = nside(depth) as i64;
    let npface = (ns * ns) as u64;
    let face = (pixel / npface) as usize;
    let (ix, iy) = nested_sub_to_xy(pixel % npface);
    let (ix, iy) = (ix as i64, iy as i64);

    let fact2 = 4.0 / pixel_count(depth) as f64;
    let fact1 = 2.0 * ns as f64 * fact2;

    let jr = JRLL[face] * ns - ix - iy - 1;
    let (nr, z, kshift) = if jr < ns {
        (jr, 1.0 - (jr * jr) as f64 * fact2, 0)
    } else if jr > 3 * ns {
        let nr = 4 * ns - jr;
        (nr, (nr * nr) as f64 * fact2 - 1.0, 0)
    } else {
        (ns, (2 * ns - jr) as f64 * fact1, (jr - ns) & 1)
    };

    let mut jp = (JPLL[face] * nr + ix - iy + 1 + kshift) / 2;
    if jp > 4 * ns {
        jp -= 4 * ns;
    }
    if jp < 1 {
        jp += 4 * ns;
    }

    let phi = (jp as f64 - (kshift + 1) as f64 * 0.5) * (FRAC_PI_2 / nr as f64);
    let lat = z.clamp(-1.0, 1.0).asin().to_degrees();
    Ok((phi.to_degrees().rem_euclid(360.0), lat))
}

/// Re-bin a pixel from `fine_depth` to `coarse_depth` by integer division.
///
/// Fails if `coarse_depth > fine_depth` or if `fine_pixel` is not a valid
/// pixel at `fine_depth`. Never clamps.
pub fn coarsen(fine_pixel: u64, fine_depth: u8, coarse_depth: u8) -> Result<u64> {
    if coarse_depth > fine_depth {
        return Err(SelectError::CoarsenDepth {
            fine_depth,
            coarse_depth,
        });
    }
    check_pixel(fine_pixel, fine_depth)?;
    let shift = 2 * (fine_depth - coarse_depth) as u32;
    Ok(fine_pixel >> shift)
}

/// Pixel of a Gaia source at `depth`, read from its source identifier.
///
/// Gaia packs the depth-12 nested index into `source_id / 2^35`; shallower
/// depths are obtained by further division by `4^(12 - depth)`.
pub fn source_id_to_pixel(source_id: u64, depth: u8) -> Result<u64> {
    if depth > GAIA_SOURCE_ID_DEPTH {
        return Err(SelectError::DepthOutOfRange {
            depth,
            max: GAIA_SOURCE_ID_DEPTH,
        });
    }
    coarsen(
        source_id >> GAIA_SOURCE_ID_SHIFT,
        GAIA_SOURCE_ID_DEPTH,
        depth,
    )
}

/// Bit-interleave (x, y) → sub-index. x provides even bits, y provides odd bits.
fn xy_to_nested_sub(x: u64, y: u64) -> u64 {
    let mut result = 0u64;
    let mut xx = x;
    let mut yy = y;
    let mut bit = 0;
    while xx > 0 || yy > 0 {
        result |= (xx & 1) << bit;
        bit += 1;
        result |= (yy & 1) << bit;
        bit += 1;
        xx >>= 1;
        yy >>= 1;
    }
    result
}

/// De-interleave sub-index → (x, y).
fn nested_sub_to_xy(sub: u64) -> (u64, u64) {
    let mut x = 0u64;
    let mut y = 0u64;
    let mut s = sub;
    let mut bit = 0;
    while s > 0 {
        x |= (s & 1) << bit;
        s >>= 1;
        y |= (s & 1) << bit;
        s >>= 1;
        bit += 1;
    }
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nside_and_pixel_count() {
        assert_eq!(nside(0), 1);
        assert_eq!(nside(5), 32);
        for depth in 0..=MAX_DEPTH {
            assert_eq!(pixel_count(depth), 12 * 4u64.pow(depth as u32));
        }
        assert_eq!(pixel_count(2), 192);
        assert_eq!(pixel_count(5), 12_288);
    }

    #[test]
    fn base_faces() {
        // Face centers at depth 0.
        assert_eq!(ang2pix(45.0, 60.0, 0).unwrap(), 0);
        assert_eq!(ang2pix(135.0, 60.0, 0).unwrap(), 1);
        assert_eq!(ang2pix(315.0, 60.0, 0).unwrap(), 3);
        assert_eq!(ang2pix(1.0, 1.0, 0).unwrap(), 4);
        assert_eq!(ang2pix(90.0, 1.0, 0).unwrap(), 5);
        assert_eq!(ang2pix(45.0, -60.0, 0).unwrap(), 8);
        assert_eq!(ang2pix(225.0, -60.0, 0).unwrap(), 10);
    }

    #[test]
    fn poles_stay_in_range() {
        for depth in 0..10 {
            let north = ang2pix(0.0, 90.0, depth).unwrap();
            let south = ang2pix(0.0, -90.0, depth).unwrap();
            assert!(north < pixel_count(depth) && north / (pixel_count(depth) / 12) < 4);
            assert!(south < pixel_count(depth) && south / (pixel_count(depth) / 12) >= 8);
        }
    }

    #[test]
    fn longitude_wraps() {
        let a = ang2pix(-10.0, 12.0, 6).unwrap();
        let b = ang2pix(350.0, 12.0, 6).unwrap();
        let c = ang2pix(710.0, 12.0, 6).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(ang2pix(-360.0, 12.0, 6).unwrap(), ang2pix(0.0, 12.0, 6).unwrap());
        assert_eq!(ang2pix(360.0, -50.0, 6).unwrap(), ang2pix(0.0, -50.0, 6).unwrap());
    }

    #[test]
    fn tiny_negative_longitude_wraps_to_zero() {
        // sin(lat) lands exactly on the +-2/3 polar cap boundary.
        for z in [2.0f64 / 3.0, -2.0 / 3.0] {
            let lat = z.asin().to_degrees();
            for depth in [0u8, 1, 2, 5, 12] {
                for lon in [-1e-17, -1e-300, -f64::MIN_POSITIVE] {
                    let pixel = ang2pix(lon, lat, depth).unwrap();
                    assert!(pixel < pixel_count(depth), "lon={lon} lat={lat} depth={depth}");
                    assert_eq!(pixel, ang2pix(0.0, lat, depth).unwrap());
                }
            }
        }
    }

    #[test]
    fn invalid_coordinates_rejected() {
        assert!(matches!(
            ang2pix(0.0, 91.0, 3),
            Err(SelectError::InvalidCoordinate { .. })
        ));
        assert!(ang2pix(f64::NAN, 0.0, 3).is_err());
        assert!(matches!(
            ang2pix(0.0, 0.0, MAX_DEPTH + 1),
            Err(SelectError::DepthOutOfRange { .. })
        ));
    }

    #[test]
    fn center_maps_back_to_pixel() {
        for depth in 0..5 {
            for pixel in 0..pixel_count(depth) {
                let (lon, lat) = pix2ang(pixel, depth).unwrap();
                assert!((0.0..360.0).contains(&lon));
                assert!((-90.0..=90.0).contains(&lat));
                assert_eq!(
                    ang2pix(lon, lat, depth).unwrap(),
                    pixel,
                    "depth {depth}: center ({lon}, {lat})"
                );
            }
        }
    }

    #[test]
    fn pix2ang_rejects_out_of_range() {
        assert!(matches!(
            pix2ang(192, 2),
            Err(SelectError::PixelOutOfRange { npix: 192, .. })
        ));
    }

    #[test]
    fn every_pixel_reachable() {
        for depth in 0..3 {
            let mut seen = vec![false; pixel_count(depth) as usize];
            let n = 400;
            for i in 0..n {
                let lon = 360.0 * i as f64 / n as f64;
                for j in 0..n {
                    let lat = -90.0 + 180.0 * j as f64 / (n - 1) as f64;
                    seen[ang2pix(lon, lat, depth).unwrap() as usize] = true;
                }
            }
            assert!(seen.iter().all(|&s| s), "depth {depth}");
        }
    }

    #[test]
    fn coarsen_matches_shallower_lookup() {
        for i in 0..2000 {
            let lon = (i as f64 * 37.13) % 360.0;
            let lat = ((i as f64 * 0.731).sin()) * 89.9;
            let fine = ang2pix(lon, lat, 9).unwrap();
            for coarse_depth in 0..=9 {
                assert_eq!(
                    coarsen(fine, 9, coarse_depth).unwrap(),
                    ang2pix(lon, lat, coarse_depth).unwrap()
                );
            }
        }
    }

    #[test]
    fn coarsen_is_transitive() {
        let fine_depth = 4;
        for p in 0..pixel_count(fine_depth) {
            for coarse in 0..fine_depth {
                let direct = coarsen(p, fine_depth, coarse).unwrap();
                let stepped =
                    coarsen(coarsen(p, fine_depth, coarse + 1).unwrap(), coarse + 1, coarse)
                        .unwrap();
                assert_eq!(direct, stepped);
            }
        }
    }

    #[test]
    fn coarsen_errors() {
        assert!(matches!(
            coarsen(3, 2, 3),
            Err(SelectError::CoarsenDepth { .. })
        ));
        assert!(matches!(
            coarsen(pixel_count(2), 2, 1),
            Err(SelectError::PixelOutOfRange { .. })
        ));
        assert_eq!(coarsen(191, 2, 2).unwrap(), 191);
    }

    #[test]
    fn source_id_encodes_pixel() {
        let hp12 = 12_345_678u64;
        let source_id = (hp12 << 35) + 987_654;
        assert_eq!(
            source_id_to_pixel(source_id, 12).unwrap(),
            hp12
        );
        assert_eq!(
            source_id_to_pixel(source_id, 5).unwrap(),
            coarsen(hp12, 12, 5).unwrap()
        );
        // Matches source_id / 2^(35 + 2 * (12 - 5)).
        assert_eq!(source_id_to_pixel(source_id, 5).unwrap(), source_id / (1u64 << 49));
        assert!(source_id_to_pixel(source_id, 13).is_err());
    }

    #[test]
    fn bit_interleave_roundtrip() {
        for x in 0..32 {
            for y in 0..32 {
                let sub = xy_to_nested_sub(x, y);
                assert_eq!(nested_sub_to_xy(sub), (x, y));
            }
        }
    }
}
