//! Empirical selection function of an astrometric catalog.
//!
//! The completeness of the subject catalog in a sky pixel is estimated as
//!
//! ```text
//! completeness(pixel) = N_subject(pixel, window) / N_reference(pixel, window)
//! ```
//!
//! where both counts are restricted to the same magnitude/color window (by
//! default `6 < J < 10`, `0 < J-Ks < 0.8` in 2MASS photometry). The reference
//! counts come from a [`ReferenceCountTable`](crate::ReferenceCountTable);
//! the subject counts are histogrammed from the catalog at construction.
//!
//! Pixels with no reference stars carry no estimate and are reported as
//! `None` in a [`SkyMap`], never as zero.

pub mod estimator;

pub use estimator::SelectionFunction;

use crate::counts::DEFAULT_BASE_DEPTH;
use crate::error::{Result, SelectError};
use crate::healpix;

// ── Configuration ───────────────────────────────────────────────────────────

/// How each subject star is assigned to a sky pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelAssignment {
    /// `ang2pix` on the star's (RA, Dec).
    #[default]
    Position,
    /// Read the pixel from the Gaia source identifier (depth ≤ 12 only).
    SourceId,
}

/// Parameters for the selection-function estimator.
///
/// The quality thresholds are stored on the estimator but only applied when
/// explicitly requested through
/// [`SelectionFunction::exclude_mask`] or
/// [`SelectionFunction::masked_completeness`].
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Minimum per-pixel mean number of field transits
    /// (`astrometric_n_good_obs_al / 9`). Default 8.5.
    pub min_nobs: f64,
    /// Maximum per-pixel standard deviation of the number of transits. Default 10.
    pub max_nobs_std: f64,
    /// Maximum per-pixel mean parallax error in mas. Default 1.01, which
    /// effectively disables the cut.
    pub max_plxerr: f64,
    /// Maximum per-pixel mean `scan_direction_strength_k4`. Default 0.7.
    pub max_scd: f64,
    /// Minimum completeness for a pixel to be kept. Default 0.
    pub min_comp: f64,
    /// Minimum absolute galactic latitude of the pixel center, degrees. Default 20.
    pub min_lat: f64,
    /// HEALPix depth of the completeness map; must match the count table. Default 5.
    pub base_depth: u8,
    /// Pixel assignment for subject stars. Default [`PixelAssignment::Position`].
    pub pixel_assignment: PixelAssignment,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_nobs: 8.5,
            max_nobs_std: 10.0,
            max_plxerr: 1.01,
            max_scd: 0.7,
            min_comp: 0.0,
            min_lat: 20.0,
            base_depth: DEFAULT_BASE_DEPTH,
            pixel_assignment: PixelAssignment::Position,
        }
    }
}

// ── Per-pixel maps ──────────────────────────────────────────────────────────

/// One optional value per HEALPix pixel, in nested order.
///
/// `None` marks pixels without an estimate (no reference stars, or no
/// subject stars for a mean).
#[derive(Debug, Clone, PartialEq)]
pub struct SkyMap {
    depth: u8,
    values: Vec<Option<f64>>,
}

impl SkyMap {
    /// Wrap per-pixel values; `values.len()` must equal `pixel_count(depth)`.
    pub fn new(depth: u8, values: Vec<Option<f64>>) -> Result<Self> {
        let npix = healpix::pixel_count(depth);
        if values.len() as u64 != npix {
            return Err(SelectError::MapLength {
                expected: npix as usize,
                found: values.len(),
            });
        }
        Ok(Self { depth, values })
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `pixel`; index error when `pixel` is out of range.
    pub fn get(&self, pixel: u64) -> Result<Option<f64>> {
        self.values
            .get(pixel as usize)
            .copied()
            .ok_or(SelectError::PixelOutOfRange {
                pixel,
                depth: self.depth,
                npix: self.values.len() as u64,
            })
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// `(pixel, value)` for every pixel with an estimate.
    pub fn defined(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i as u64, v)))
    }

    pub fn n_defined(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Mean over defined pixels, `None` if there are none.
    pub fn mean_defined(&self) -> Option<f64> {
        let (sum, n) = self
            .defined()
            .fold((0.0, 0usize), |(sum, n), (_, v)| (sum + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    /// Copy with every pixel flagged in `exclude` set to `None`.
    pub fn masked(&self, exclude: &[bool]) -> Result<SkyMap> {
        if exclude.len() != self.values.len() {
            return Err(SelectError::MapLength {
                expected: self.values.len(),
                found: exclude.len(),
            });
        }
        let values = self
            .values
            .iter()
            .zip(exclude)
            .map(|(v, &ex)| if ex { None } else { *v })
            .collect();
        Ok(SkyMap {
            depth: self.depth,
            values,
        })
    }

    /// Dense array for renderers, with `fill` in undefined pixels.
    pub fn to_dense(&self, fill: f64) -> Vec<f64> {
        self.values.iter().map(|v| v.unwrap_or(fill)).collect()
    }
}

/// Per-pixel astrometric quality statistics of in-window subject stars.
#[derive(Debug, Clone)]
pub struct SkyQuality {
    /// Mean number of field transits, `astrometric_n_good_obs_al / 9`.
    pub nobs_mean: SkyMap,
    /// Standard deviation of the number of field transits.
    pub nobs_std: SkyMap,
    /// Mean parallax error, mas.
    pub parallax_error_mean: SkyMap,
    /// Mean `scan_direction_strength_k4`.
    pub scan_direction_strength_mean: SkyMap,
    /// Galactic latitude of each pixel center, degrees.
    pub galactic_latitude: Vec<f64>,
}
