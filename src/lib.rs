//! # skysel
//!
//! Empirical **selection function** (completeness) of an astrometric star
//! catalog, measured on the sky and in magnitude/color.
//!
//! Given a subject catalog (e.g. Gaia DR1 TGAS) cross-matched to a deeper
//! reference catalog (2MASS), `skysel` counts subject stars per HEALPix pixel
//! inside a fixed reference photometric window and divides by the reference
//! counts in the same pixel and window. The result is a per-pixel
//! completeness map in nested ordering, plus per-pixel means of arbitrary
//! catalog quantities and optional quality masks.
//!
//! ## Features
//!
//! - **Nested HEALPix**: `ang2pix`, `pix2ang`, exact coarsening by integer
//!   division, pixel lookup straight from Gaia source identifiers
//! - **Reference counts**: dense sky-only and sparse joint
//!   (magnitude, color, pixel) 2MASS count tables, loaded once per process
//!   from the crate's `data/` directory and cacheable with
//!   [rkyv](https://docs.rs/rkyv)
//! - **Typed catalogs**: header-addressed CSV readers for subject and
//!   reference rows; cross-match by source identifier with inner-join
//!   semantics
//! - **Deferred quality cuts**: thresholds on number of observations, scan
//!   coverage, parallax error, completeness and galactic latitude are stored
//!   with the estimator and only applied on request
//!
//! ## Example
//!
//! ```no_run
//! use skysel::{CsvCatalogLoader, ReferenceCountTable, SelectionConfig, SelectionFunction};
//! use skysel::SubjectField;
//!
//! let table = ReferenceCountTable::shared().unwrap();
//! // Catalog extracts you provide; they are not shipped with the crate.
//! let loader = CsvCatalogLoader::new("/path/to/tgas.csv", "/path/to/tgas_2mass.csv");
//! let sf = SelectionFunction::from_loader(&loader, table, SelectionConfig::default()).unwrap();
//!
//! // Completeness per pixel; `None` where 2MASS has no stars in the window.
//! let comp = sf.completeness();
//! println!("mean completeness: {:?}", comp.mean_defined());
//!
//! // Mean parallax error on the sky, in mas.
//! let plx_err = sf.mean_quantity_on_sky(SubjectField::ParallaxError, |x| x);
//! let dense = plx_err.to_dense(f64::NAN);
//! assert_eq!(dense.len(), 12 * 4usize.pow(5));
//! ```
//!
//! ## Method overview
//!
//! 1. **Pixel assignment**: every subject star is mapped to a nested HEALPix
//!    pixel at the base depth of the count table (depth 5, nside 32)
//! 2. **Window selection**: stars whose cross-matched 2MASS photometry has
//!    `6 < J < 10` and `0 < J-Ks < 0.8` form the numerator population, the
//!    same population counted in the reference table
//! 3. **Histogram**: in-window stars are counted per pixel, optionally
//!    weighted by any pure per-star function
//! 4. **Ratio**: counts are divided by the reference counts; pixels with no
//!    reference stars have no estimate
//!
//! The approach follows the TGAS selection function of J. Bovy,
//! "Stellar inventory of the solar neighbourhood using Gaia DR1",
//! MNRAS 470, 1360 (2017).

pub mod catalogs;
pub mod coords;
pub mod counts;
pub mod error;
pub mod healpix;
pub mod selection;
pub mod star;

pub use catalogs::{cross_match, CatalogLoader, CsvCatalogLoader};
pub use counts::{JointCount, ReferenceCountTable, ReferenceWindow};
pub use error::SelectError;
pub use selection::{PixelAssignment, SelectionConfig, SelectionFunction, SkyMap, SkyQuality};
pub use star::*;
