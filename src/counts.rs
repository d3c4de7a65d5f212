//! Precomputed 2MASS reference star counts.
//!
//! Two whitespace-delimited tables are read from the crate's `data/` directory:
//!
//! - `2massc_hp5.txt`: `(pixel, count)` rows counting 2MASS stars with
//!   `6 < J < 10` and `0 < J-Ks < 0.8` per nested HEALPix pixel at depth 5.
//! - `2massc_jk_jt_hp5_forsf.txt`: `(mag_index, color_index, pixel, count)`
//!   rows binned jointly in a J-band pseudo-magnitude, J-Ks color and pixel.
//!   The raw indices were produced by `floor(jt * 10)` and
//!   `floor((J-Ks + 0.05) / 1.05 * 3)`; [`mag_center`] and [`color_center`]
//!   invert those formulas.
//!
//! Both were generated by SQL over the 2MASS point-source catalog with the
//! photometric quality cuts `ph_qual` A (or `rd_flg` 1/3) in J and Ks,
//! `use_src = 1` and no extended-source key.
//!
//! The table is immutable once built. [`ReferenceCountTable::shared`] builds
//! the default table at most once per process; estimators borrow whichever
//! table they are handed so tests can use synthetic counts.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use rkyv::{Archive, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SelectError};
use crate::healpix;

/// HEALPix depth of the shipped count tables (nside = 32).
pub const DEFAULT_BASE_DEPTH: u8 = 5;

/// File name of the sky-only count table.
pub const SKY_ONLY_FILE: &str = "2massc_hp5.txt";

/// File name of the joint magnitude/color/sky count table.
pub const JOINT_FILE: &str = "2massc_jk_jt_hp5_forsf.txt";

/// Magnitude bins per magnitude unit in the joint table.
const MAG_BINS_PER_UNIT: f64 = 10.0;
/// Color bins span (-0.05, 1.0) in three steps.
const COLOR_OFFSET: f64 = 0.05;
const COLOR_SPAN: f64 = 1.05;
const COLOR_BINS: f64 = 3.0;

/// Directory holding the shipped count tables, fixed at build time.
pub fn default_data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data")
}

/// Joint-table magnitude bin of a magnitude.
pub fn mag_bin(mag: f64) -> i64 {
    (mag * MAG_BINS_PER_UNIT).floor() as i64
}

/// Joint-table color bin of a J-Ks color.
pub fn color_bin(color: f64) -> i64 {
    ((color + COLOR_OFFSET) / COLOR_SPAN * COLOR_BINS).floor() as i64
}

/// Physical magnitude at the center of a joint-table magnitude bin.
pub fn mag_center(mag_index: i64) -> f64 {
    (mag_index as f64 + 0.5) / MAG_BINS_PER_UNIT
}

/// Physical J-Ks color at the center of a joint-table color bin.
pub fn color_center(color_index: i64) -> f64 {
    (color_index as f64 + 0.5) * COLOR_SPAN / COLOR_BINS - COLOR_OFFSET
}

/// Magnitude/color window a sky-only table was counted in.
///
/// Bounds are exclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
pub struct ReferenceWindow {
    pub mag_min: f64,
    pub mag_max: f64,
    pub color_min: f64,
    pub color_max: f64,
}

impl ReferenceWindow {
    /// `6 < J < 10`, `0 < J-Ks < 0.8`: the window of `2massc_hp5.txt`.
    pub const TWOMASS_J_JK: ReferenceWindow = ReferenceWindow {
        mag_min: 6.0,
        mag_max: 10.0,
        color_min: 0.0,
        color_max: 0.8,
    };

    pub fn contains(&self, mag: f64, color: f64) -> bool {
        mag > self.mag_min && mag < self.mag_max && color > self.color_min && color < self.color_max
    }
}

impl Default for ReferenceWindow {
    fn default() -> Self {
        Self::TWOMASS_J_JK
    }
}

/// One row of the joint count table.
#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
pub struct JointCount {
    pub mag_index: i64,
    pub color_index: i64,
    pub pixel: u64,
    pub count: u64,
}

impl JointCount {
    pub fn mag_center(&self) -> f64 {
        mag_center(self.mag_index)
    }

    pub fn color_center(&self) -> f64 {
        color_center(self.color_index)
    }

    fn key(&self) -> (i64, i64, u64) {
        (self.mag_index, self.color_index, self.pixel)
    }
}

/// Reference-catalog counts per sky pixel, and per (magnitude, color, pixel).
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub struct ReferenceCountTable {
    base_depth: u8,
    window: ReferenceWindow,
    /// Dense, one entry per pixel at `base_depth`.
    sky_counts: Vec<u64>,
    /// Sorted by (mag_index, color_index, pixel), no duplicate keys.
    joint: Vec<JointCount>,
}

static SHARED: OnceLock<ReferenceCountTable> = OnceLock::new();

impl ReferenceCountTable {
    /// Build a table from sparse sky-only `(pixel, count)` pairs and joint rows.
    ///
    /// Pixels absent from `sky` count zero. Any pixel outside
    /// `[0, pixel_count(base_depth))` is rejected.
    pub fn new(
        base_depth: u8,
        window: ReferenceWindow,
        sky: impl IntoIterator<Item = (u64, u64)>,
        joint: impl IntoIterator<Item = JointCount>,
    ) -> Result<Self> {
        if base_depth > healpix::MAX_DEPTH {
            return Err(SelectError::DepthOutOfRange {
                depth: base_depth,
                max: healpix::MAX_DEPTH,
            });
        }
        let npix = healpix::pixel_count(base_depth);
        let out_of_range = |pixel: u64| SelectError::PixelOutOfRange {
            pixel,
            depth: base_depth,
            npix,
        };

        let mut sky_counts = vec![0u64; npix as usize];
        let mut seen = vec![false; npix as usize];
        for (pixel, count) in sky {
            if pixel >= npix {
                return Err(out_of_range(pixel));
            }
            if seen[pixel as usize] {
                warn!("Duplicate sky-only count for pixel {}; keeping the last", pixel);
            }
            seen[pixel as usize] = true;
            sky_counts[pixel as usize] = count;
        }

        let mut joint: Vec<JointCount> = joint.into_iter().collect();
        if let Some(bad) = joint.iter().find(|j| j.pixel >= npix) {
            return Err(out_of_range(bad.pixel));
        }
        // Stable sort keeps file order among duplicates, so keeping the last
        // of each run matches the sky-only behavior.
        joint.sort_by_key(|j| j.key());
        let before = joint.len();
        joint.reverse();
        joint.dedup_by_key(|j| j.key());
        joint.reverse();
        if joint.len() != before {
            warn!("Dropped {} duplicate joint count rows", before - joint.len());
        }

        Ok(Self {
            base_depth,
            window,
            sky_counts,
            joint,
        })
    }

    /// Parse the two count tables from text.
    ///
    /// `sky_path` and `joint_path` only label parse errors.
    pub fn from_text(
        base_depth: u8,
        sky_text: &str,
        sky_path: &Path,
        joint_text: &str,
        joint_path: &Path,
    ) -> Result<Self> {
        let sky = parse_rows::<2>(sky_text, sky_path)?
            .into_iter()
            .map(|(line, [pixel, count])| -> Result<(u64, u64)> {
                Ok((
                    as_count(pixel, sky_path, line, "pixel")?,
                    as_count(count, sky_path, line, "count")?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let joint = parse_rows::<4>(joint_text, joint_path)?
            .into_iter()
            .map(|(line, [mag, color, pixel, count])| -> Result<JointCount> {
                Ok(JointCount {
                    mag_index: as_index(mag, joint_path, line, "magnitude index")?,
                    color_index: as_index(color, joint_path, line, "color index")?,
                    pixel: as_count(pixel, joint_path, line, "pixel")?,
                    count: as_count(count, joint_path, line, "count")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(base_depth, ReferenceWindow::TWOMASS_J_JK, sky, joint)
    }

    /// Load `2massc_hp5.txt` and `2massc_jk_jt_hp5_forsf.txt` from `dir`.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P, base_depth: u8) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let sky_path = dir.join(SKY_ONLY_FILE);
        let joint_path = dir.join(JOINT_FILE);

        info!("Loading reference counts from {}", dir.display());
        let sky_text = std::fs::read_to_string(&sky_path)
            .with_context(|| format!("reading sky-only counts {}", sky_path.display()))?;
        let joint_text = std::fs::read_to_string(&joint_path)
            .with_context(|| format!("reading joint counts {}", joint_path.display()))?;

        let table = Self::from_text(base_depth, &sky_text, &sky_path, &joint_text, &joint_path)?;
        info!(
            "Loaded {} reference stars over {} pixels and {} joint bins",
            table.total_sky_count(),
            table.sky_counts.len(),
            table.joint.len()
        );
        Ok(table)
    }

    /// Load the shipped tables from [`default_data_dir`] at [`DEFAULT_BASE_DEPTH`].
    pub fn load_default() -> anyhow::Result<Self> {
        Self::load_from_dir(default_data_dir(), DEFAULT_BASE_DEPTH)
    }

    /// Process-wide default table, loaded on first call and never rebuilt.
    pub fn shared() -> anyhow::Result<&'static ReferenceCountTable> {
        if let Some(table) = SHARED.get() {
            return Ok(table);
        }
        let table = Self::load_default()?;
        Ok(SHARED.get_or_init(|| table))
    }

    pub fn base_depth(&self) -> u8 {
        self.base_depth
    }

    pub fn window(&self) -> ReferenceWindow {
        self.window
    }

    /// Number of pixels at the base depth.
    pub fn npix(&self) -> u64 {
        self.sky_counts.len() as u64
    }

    /// Reference count in `pixel` within the reference window.
    pub fn sky_count(&self, pixel: u64) -> Result<u64> {
        self.sky_counts
            .get(pixel as usize)
            .copied()
            .ok_or_else(|| self.pixel_error(pixel))
    }

    /// Dense per-pixel reference counts in nested order.
    pub fn sky_counts(&self) -> &[u64] {
        &self.sky_counts
    }

    pub fn total_sky_count(&self) -> u64 {
        self.sky_counts.iter().sum()
    }

    /// Reference count in a joint (magnitude bin, color bin, pixel) cell.
    ///
    /// Cells absent from the table count zero.
    pub fn joint_count(&self, mag_index: i64, color_index: i64, pixel: u64) -> Result<u64> {
        if pixel >= self.npix() {
            return Err(self.pixel_error(pixel));
        }
        let key = (mag_index, color_index, pixel);
        Ok(self
            .joint
            .binary_search_by_key(&key, |j| j.key())
            .map(|i| self.joint[i].count)
            .unwrap_or(0))
    }

    /// Joint count for physical magnitude and color values.
    pub fn joint_count_at(&self, mag: f64, color: f64, pixel: u64) -> Result<u64> {
        self.joint_count(mag_bin(mag), color_bin(color), pixel)
    }

    /// All non-empty joint cells, sorted by (magnitude, color, pixel).
    pub fn joint_rows(&self) -> &[JointCount] {
        &self.joint
    }

    fn pixel_error(&self, pixel: u64) -> SelectError {
        SelectError::PixelOutOfRange {
            pixel,
            depth: self.base_depth,
            npix: self.npix(),
        }
    }

    /// Serialize the table with rkyv.
    pub fn to_rkyv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
        Ok(bytes.to_vec())
    }

    /// Save the parsed table so later runs can skip text parsing.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path, &bytes)
            .with_context(|| format!("writing count table {}", path.display()))?;
        info!("Saved count table to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Load a table written by [`save_to_file`](Self::save_to_file).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading count table {}", path.display()))?;
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(&bytes);
        let table = rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))?;
        if table.sky_counts.len() as u64 != healpix::pixel_count(table.base_depth) {
            anyhow::bail!(
                "count table {} has {} sky pixels, expected {} at depth {}",
                path.display(),
                table.sky_counts.len(),
                healpix::pixel_count(table.base_depth),
                table.base_depth
            );
        }
        debug!(
            "Loaded count table: depth {}, {} joint bins",
            table.base_depth,
            table.joint.len()
        );
        Ok(table)
    }
}

/// Parse whitespace-delimited numeric rows with exactly `N` columns.
///
/// Blank lines and `#` comments are skipped. Returns 1-based line numbers
/// alongside the values.
fn parse_rows<const N: usize>(text: &str, path: &Path) -> Result<Vec<(usize, [f64; N])>> {
    let mut rows = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        let fields: Vec<&str> = content.split_whitespace().collect();
        if fields.len() != N {
            return Err(parse_error(
                path,
                line,
                format!("expected {} columns, found {}", N, fields.len()),
            ));
        }
        let mut values = [0.0; N];
        for (value, field) in values.iter_mut().zip(&fields) {
            *value = field
                .parse::<f64>()
                .map_err(|e| parse_error(path, line, format!("bad number {:?}: {}", field, e)))?;
        }
        rows.push((line, values));
    }
    Ok(rows)
}

fn as_index(value: f64, path: &Path, line: usize, what: &str) -> Result<i64> {
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(parse_error(path, line, format!("{} {} is not an integer", what, value)));
    }
    Ok(value as i64)
}

fn as_count(value: f64, path: &Path, line: usize, what: &str) -> Result<u64> {
    let v = as_index(value, path, line, what)?;
    u64::try_from(v).map_err(|_| parse_error(path, line, format!("{} {} is negative", what, v)))
}

fn parse_error(path: &Path, line: usize, msg: String) -> SelectError {
    SelectError::Parse {
        path: path.to_path_buf(),
        line,
        msg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sky_path() -> PathBuf {
        PathBuf::from(SKY_ONLY_FILE)
    }

    fn joint_path() -> PathBuf {
        PathBuf::from(JOINT_FILE)
    }

    #[test]
    fn sparse_sky_table_is_dense() {
        let sky = "5.0 100\n17 3\n";
        let table =
            ReferenceCountTable::from_text(2, sky, &sky_path(), "", &joint_path()).unwrap();
        assert_eq!(table.sky_counts().len(), 192);
        assert_eq!(table.sky_count(5).unwrap(), 100);
        assert_eq!(table.sky_count(17).unwrap(), 3);
        assert_eq!(table.sky_count(0).unwrap(), 0);
        assert_eq!(table.sky_count(191).unwrap(), 0);
        assert_eq!(table.total_sky_count(), 103);
        assert!(matches!(
            table.sky_count(192),
            Err(SelectError::PixelOutOfRange { npix: 192, .. })
        ));
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let sky = "# pixel count\n\n3 7   # trailing\n";
        let table =
            ReferenceCountTable::from_text(1, sky, &sky_path(), "", &joint_path()).unwrap();
        assert_eq!(table.sky_count(3).unwrap(), 7);
    }

    #[test]
    fn malformed_rows_are_fatal() {
        let bad_cols = ReferenceCountTable::from_text(2, "5 100 3\n", &sky_path(), "", &joint_path());
        assert!(matches!(bad_cols, Err(SelectError::Parse { line: 1, .. })));

        let bad_num = ReferenceCountTable::from_text(2, "1 2\nfive 100\n", &sky_path(), "", &joint_path());
        assert!(matches!(bad_num, Err(SelectError::Parse { line: 2, .. })));

        let frac = ReferenceCountTable::from_text(2, "5.5 100\n", &sky_path(), "", &joint_path());
        assert!(matches!(frac, Err(SelectError::Parse { .. })));

        let negative = ReferenceCountTable::from_text(2, "5 -1\n", &sky_path(), "", &joint_path());
        assert!(matches!(negative, Err(SelectError::Parse { .. })));

        let out_of_range = ReferenceCountTable::from_text(2, "192 1\n", &sky_path(), "", &joint_path());
        assert!(matches!(
            out_of_range,
            Err(SelectError::PixelOutOfRange { pixel: 192, .. })
        ));
    }

    #[test]
    fn joint_lookup() {
        let joint = "80 1 5 12\n80 2 5 4\n95 0 100 1\n";
        let table =
            ReferenceCountTable::from_text(2, "", &sky_path(), joint, &joint_path()).unwrap();
        assert_eq!(table.joint_rows().len(), 3);
        assert_eq!(table.joint_count(80, 1, 5).unwrap(), 12);
        assert_eq!(table.joint_count(80, 2, 5).unwrap(), 4);
        assert_eq!(table.joint_count(80, 0, 5).unwrap(), 0);
        assert!(table.joint_count(80, 1, 500).is_err());

        // 8.05 falls in magnitude bin 80, J-Ks 0.4 in color bin 1.
        assert_eq!(table.joint_count_at(8.05, 0.4, 5).unwrap(), 12);

        let row = table.joint_rows()[0];
        assert!((row.mag_center() - 8.05).abs() < 1e-12);
        assert!((row.color_center() - 0.475).abs() < 1e-12);
    }

    #[test]
    fn bin_centers_roundtrip() {
        for mag_index in 40..140 {
            assert_eq!(mag_bin(mag_center(mag_index)), mag_index);
        }
        for color_index in 0..3 {
            assert_eq!(color_bin(color_center(color_index)), color_index);
        }
        assert!((color_center(0) - 0.125).abs() < 1e-12);
        assert!((color_center(2) - 0.825).abs() < 1e-12);
    }

    #[test]
    fn duplicate_rows_keep_last() {
        let table = ReferenceCountTable::new(
            1,
            ReferenceWindow::default(),
            vec![(2, 10), (2, 11)],
            vec![
                JointCount { mag_index: 70, color_index: 1, pixel: 2, count: 3 },
                JointCount { mag_index: 70, color_index: 1, pixel: 2, count: 9 },
            ],
        )
        .unwrap();
        assert_eq!(table.sky_count(2).unwrap(), 11);
        assert_eq!(table.joint_count(70, 1, 2).unwrap(), 9);
        assert_eq!(table.joint_rows().len(), 1);
    }

    #[test]
    fn window_bounds_are_exclusive() {
        let w = ReferenceWindow::TWOMASS_J_JK;
        assert!(w.contains(8.0, 0.4));
        assert!(!w.contains(6.0, 0.4));
        assert!(!w.contains(10.0, 0.4));
        assert!(!w.contains(11.0, 0.4));
        assert!(!w.contains(8.0, 0.0));
        assert!(!w.contains(8.0, 0.8));
    }

    #[test]
    fn rkyv_roundtrip() {
        let table = ReferenceCountTable::from_text(
            2,
            "5 100\n",
            &sky_path(),
            "80 1 5 12\n",
            &joint_path(),
        )
        .unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        table.save_to_file(file.path()).unwrap();
        let loaded = ReferenceCountTable::load_from_file(file.path()).unwrap();
        assert_eq!(loaded.base_depth(), 2);
        assert_eq!(loaded.sky_counts(), table.sky_counts());
        assert_eq!(loaded.joint_rows(), table.joint_rows());
        assert_eq!(loaded.window(), table.window());
    }

    #[test]
    fn missing_files_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReferenceCountTable::load_from_dir(dir.path(), 5).unwrap_err();
        assert!(err.to_string().contains(SKY_ONLY_FILE));
    }

    #[test]
    fn data_dir_is_not_cwd_relative() {
        assert!(default_data_dir().is_absolute());
        assert!(default_data_dir().ends_with("data"));
    }

    /// Needs the 2MASS count files copied into `data/`.
    #[test]
    #[ignore]
    fn load_default_tables() {
        let table = ReferenceCountTable::load_default().expect("Failed to read 2MASS count tables");
        assert_eq!(table.base_depth(), DEFAULT_BASE_DEPTH);
        assert_eq!(table.npix(), 12_288);
        assert!(table.total_sky_count() > 0);
        assert!(!table.joint_rows().is_empty());

        let shared = ReferenceCountTable::shared().unwrap();
        assert_eq!(shared.sky_counts(), table.sky_counts());
    }
}
