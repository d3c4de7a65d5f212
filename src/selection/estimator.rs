use std::collections::BTreeMap;

use tracing::{debug, info};

use super::{PixelAssignment, SelectionConfig, SkyMap, SkyQuality};
use crate::catalogs::CatalogLoader;
use crate::coords::galactic_latitude;
use crate::counts::{color_bin, mag_bin, ReferenceCountTable};
use crate::error::{Result, SelectError};
use crate::healpix;
use crate::star::{ReferencePhotometry, SubjectField, SubjectStar};

/// Number of CCD crossings per field transit in the astrometric field.
const CCDS_PER_TRANSIT: f64 = 9.0;

/// Selection function of a subject catalog, estimated against a reference
/// count table.
///
/// Construction bins every subject star into a pixel at the table's depth and
/// histograms the stars whose cross-matched photometry falls inside the
/// table's reference window. The quality thresholds in [`SelectionConfig`]
/// are kept but not applied until [`exclude_mask`](Self::exclude_mask) or
/// [`masked_completeness`](Self::masked_completeness) is called.
#[derive(Debug, Clone)]
pub struct SelectionFunction<'a> {
    table: &'a ReferenceCountTable,
    config: SelectionConfig,
    stars: Vec<SubjectStar>,
    photometry: Vec<Option<ReferencePhotometry>>,
    /// Pixel of each star at the base depth.
    pixels: Vec<u64>,
    /// Whether each star's reference photometry is inside the window.
    in_window: Vec<bool>,
    /// In-window subject stars per pixel.
    star_counts: Vec<u64>,
    completeness: SkyMap,
    /// Subject stars per joint (magnitude bin, color bin, pixel) cell.
    joint_counts: BTreeMap<(i64, i64, u64), u64>,
}

impl<'a> SelectionFunction<'a> {
    /// Build the estimator from subject rows and their aligned reference
    /// photometry (`None` for stars without a counterpart).
    ///
    /// Fails if the two inputs differ in length, if the configured depth
    /// differs from the table's, or if a star cannot be assigned a pixel.
    pub fn new(
        stars: Vec<SubjectStar>,
        photometry: Vec<Option<ReferencePhotometry>>,
        table: &'a ReferenceCountTable,
        config: SelectionConfig,
    ) -> Result<Self> {
        if stars.len() != photometry.len() {
            return Err(SelectError::LengthMismatch {
                subject: stars.len(),
                reference: photometry.len(),
            });
        }
        if config.base_depth != table.base_depth() {
            return Err(SelectError::DepthMismatch {
                config: config.base_depth,
                table: table.base_depth(),
            });
        }

        let depth = config.base_depth;
        let pixels = stars
            .iter()
            .map(|s| match config.pixel_assignment {
                PixelAssignment::Position => healpix::ang2pix(s.ra_deg, s.dec_deg, depth),
                PixelAssignment::SourceId => healpix::source_id_to_pixel(s.source_id, depth),
            })
            .collect::<Result<Vec<u64>>>()?;

        let window = table.window();
        let in_window: Vec<bool> = photometry
            .iter()
            .map(|p| p.is_some_and(|p| window.contains(p.j_mag, p.jk())))
            .collect();

        let npix = healpix::pixel_count(depth) as usize;
        if let Some(&pixel) = pixels.iter().find(|&&p| p as usize >= npix) {
            return Err(SelectError::PixelOutOfRange {
                pixel,
                depth,
                npix: npix as u64,
            });
        }
        let mut star_counts = vec![0u64; npix];
        for (&pixel, _) in pixels.iter().zip(&in_window).filter(|(_, &w)| w) {
            star_counts[pixel as usize] += 1;
        }

        let completeness = SkyMap::new(
            depth,
            star_counts
                .iter()
                .zip(table.sky_counts())
                .map(|(&n, &n_ref)| (n_ref > 0).then(|| n as f64 / n_ref as f64))
                .collect(),
        )?;

        let mut joint_counts = BTreeMap::new();
        for (p, &pixel) in photometry.iter().zip(&pixels) {
            if let Some(p) = p {
                *joint_counts
                    .entry((mag_bin(p.jt()), color_bin(p.jk()), pixel))
                    .or_insert(0u64) += 1;
            }
        }

        let n_matched = photometry.iter().filter(|p| p.is_some()).count();
        let n_window: u64 = star_counts.iter().sum();
        info!(
            "Selection function: {} subject stars, {} cross-matched, {} in reference window",
            stars.len(),
            n_matched,
            n_window
        );
        debug!(
            "Completeness defined in {} of {} pixels at depth {}",
            completeness.n_defined(),
            npix,
            depth
        );

        Ok(Self {
            table,
            config,
            stars,
            photometry,
            pixels,
            in_window,
            star_counts,
            completeness,
            joint_counts,
        })
    }

    /// Load both catalogs through `loader` and build the estimator.
    pub fn from_loader<L: CatalogLoader + ?Sized>(
        loader: &L,
        table: &'a ReferenceCountTable,
        config: SelectionConfig,
    ) -> anyhow::Result<Self> {
        let stars = loader.load_subject_catalog()?;
        let ids: Vec<u64> = stars.iter().map(|s| s.source_id).collect();
        let photometry = loader.load_reference_catalog(&ids)?;
        Ok(Self::new(stars, photometry, table, config)?)
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    pub fn table(&self) -> &ReferenceCountTable {
        self.table
    }

    pub fn base_depth(&self) -> u8 {
        self.config.base_depth
    }

    /// Number of subject stars, including those without reference photometry.
    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    pub fn stars(&self) -> &[SubjectStar] {
        &self.stars
    }

    pub fn photometry(&self) -> &[Option<ReferencePhotometry>] {
        &self.photometry
    }

    /// Base-depth pixel of star `i`.
    pub fn pixel_of(&self, i: usize) -> Option<u64> {
        self.pixels.get(i).copied()
    }

    /// Whether star `i` counts toward the completeness numerator.
    pub fn in_window(&self, i: usize) -> bool {
        self.in_window.get(i).copied().unwrap_or(false)
    }

    /// In-window subject stars per pixel.
    pub fn star_counts(&self) -> &[u64] {
        &self.star_counts
    }

    /// Subject/reference count ratio per pixel; `None` where the reference
    /// count is zero.
    pub fn completeness(&self) -> &SkyMap {
        &self.completeness
    }

    /// Completeness of the pixel containing (RA, Dec).
    pub fn completeness_at(&self, ra_deg: f64, dec_deg: f64) -> Result<Option<f64>> {
        let pixel = healpix::ang2pix(ra_deg, dec_deg, self.base_depth())?;
        self.completeness.get(pixel)
    }

    /// Per-pixel sum of `weight` over in-window stars.
    pub fn weighted_counts<F>(&self, weight: F) -> Vec<f64>
    where
        F: Fn(&SubjectStar) -> f64,
    {
        let mut sums = vec![0.0; self.star_counts.len()];
        for ((star, &pixel), _) in self
            .stars
            .iter()
            .zip(&self.pixels)
            .zip(&self.in_window)
            .filter(|(_, &w)| w)
        {
            sums[pixel as usize] += weight(star);
        }
        sums
    }

    /// Per-pixel mean of `weight` over in-window stars.
    ///
    /// Pixels without in-window stars, or whose mean is not finite, are `None`.
    pub fn mean_weight_on_sky<F>(&self, weight: F) -> SkyMap
    where
        F: Fn(&SubjectStar) -> f64,
    {
        let values = self
            .weighted_counts(weight)
            .into_iter()
            .zip(&self.star_counts)
            .map(|(sum, &n)| {
                if n == 0 {
                    return None;
                }
                let mean = sum / n as f64;
                mean.is_finite().then_some(mean)
            })
            .collect();
        SkyMap {
            depth: self.base_depth(),
            values,
        }
    }

    /// Per-pixel mean of `transform(field)` over in-window stars.
    pub fn mean_quantity_on_sky<T>(&self, field: SubjectField, transform: T) -> SkyMap
    where
        T: Fn(f64) -> f64,
    {
        self.mean_weight_on_sky(|s| transform(field.value(s)))
    }

    /// Completeness in a joint (magnitude, color, pixel) cell.
    ///
    /// `mag` is the J-band pseudo-magnitude of the joint table
    /// ([`ReferencePhotometry::jt`]) and `color` is J-Ks. All cross-matched
    /// subject stars count, not only those in the sky-only window. `None`
    /// when the reference cell is empty.
    pub fn joint_completeness(&self, mag: f64, color: f64, pixel: u64) -> Result<Option<f64>> {
        let (mb, cb) = (mag_bin(mag), color_bin(color));
        let n_ref = self.table.joint_count(mb, cb, pixel)?;
        if n_ref == 0 {
            return Ok(None);
        }
        let n = self.joint_counts.get(&(mb, cb, pixel)).copied().unwrap_or(0);
        Ok(Some(n as f64 / n_ref as f64))
    }

    /// Per-pixel astrometric quality of in-window stars.
    pub fn sky_quality(&self) -> Result<SkyQuality> {
        let nobs = |s: &SubjectStar| s.astrometric_n_good_obs_al / CCDS_PER_TRANSIT;
        let nobs_mean = self.mean_weight_on_sky(nobs);
        let nobs_sq = self.mean_weight_on_sky(|s| nobs(s).powi(2));
        let nobs_std = SkyMap {
            depth: self.base_depth(),
            values: nobs_mean
                .values()
                .iter()
                .zip(nobs_sq.values())
                .map(|(m, sq)| match (m, sq) {
                    (Some(m), Some(sq)) => Some((sq - m * m).max(0.0).sqrt()),
                    _ => None,
                })
                .collect(),
        };

        let latitudes = (0..healpix::pixel_count(self.base_depth()))
            .map(|pixel| -> Result<f64> {
                let (ra, dec) = healpix::pix2ang(pixel, self.base_depth())?;
                Ok(galactic_latitude(ra, dec))
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok(SkyQuality {
            nobs_mean,
            nobs_std,
            parallax_error_mean: self
                .mean_quantity_on_sky(SubjectField::ParallaxError, |x| x),
            scan_direction_strength_mean: self
                .mean_quantity_on_sky(SubjectField::ScanDirectionStrengthK4, |x| x),
            galactic_latitude: latitudes,
        })
    }

    /// Pixels failing any of the configured quality thresholds.
    ///
    /// A pixel is excluded when it has no in-window stars, no completeness
    /// estimate, or when any of these hold: mean transits below `min_nobs`,
    /// transit scatter above `max_nobs_std`, mean parallax error above
    /// `max_plxerr`, mean scan-direction strength above `max_scd`,
    /// completeness below `min_comp`, or |b| below `min_lat`.
    pub fn exclude_mask(&self) -> Result<Vec<bool>> {
        let q = self.sky_quality()?;
        let c = &self.config;
        let mask: Vec<bool> = (0..self.star_counts.len())
            .map(|i| {
                let below = |v: Option<f64>, min: f64| v.is_none_or(|v| v < min);
                let above = |v: Option<f64>, max: f64| v.is_none_or(|v| v > max);
                below(q.nobs_mean.values()[i], c.min_nobs)
                    || above(q.nobs_std.values()[i], c.max_nobs_std)
                    || above(q.parallax_error_mean.values()[i], c.max_plxerr)
                    || above(q.scan_direction_strength_mean.values()[i], c.max_scd)
                    || below(self.completeness.values()[i], c.min_comp)
                    || q.galactic_latitude[i].abs() < c.min_lat
            })
            .collect();
        debug!(
            "Quality mask excludes {} of {} pixels",
            mask.iter().filter(|&&m| m).count(),
            mask.len()
        );
        Ok(mask)
    }

    /// Completeness with [`exclude_mask`](Self::exclude_mask) applied.
    pub fn masked_completeness(&self) -> Result<SkyMap> {
        self.completeness.masked(&self.exclude_mask()?)
    }
}
