//! Catalog loading and cross-matching.
//!
//! The estimator only needs two aligned columns of rows: subject stars and
//! their reference photometry. [`CatalogLoader`] abstracts where those come
//! from; [`CsvCatalogLoader`] reads them from header-addressed CSV files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use crate::star::{ReferencePhotometry, SubjectStar};

pub mod tgas;
pub mod twomass;

/// Source of subject rows and their cross-matched reference photometry.
pub trait CatalogLoader {
    /// Load every subject-catalog row.
    fn load_subject_catalog(&self) -> anyhow::Result<Vec<SubjectStar>>;

    /// Load reference photometry aligned to `cross_matched_to`.
    ///
    /// The result has exactly one entry per source id, `None` where the
    /// reference catalog has no counterpart.
    fn load_reference_catalog(
        &self,
        cross_matched_to: &[u64],
    ) -> anyhow::Result<Vec<Option<ReferencePhotometry>>>;
}

/// Reads a TGAS-style subject CSV and a 2MASS-style reference CSV.
#[derive(Debug, Clone)]
pub struct CsvCatalogLoader {
    pub subject_path: PathBuf,
    pub reference_path: PathBuf,
}

impl CsvCatalogLoader {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(subject_path: P, reference_path: Q) -> Self {
        Self {
            subject_path: subject_path.into(),
            reference_path: reference_path.into(),
        }
    }
}

impl CatalogLoader for CsvCatalogLoader {
    fn load_subject_catalog(&self) -> anyhow::Result<Vec<SubjectStar>> {
        tgas::read_tgas_csv(&self.subject_path)
    }

    fn load_reference_catalog(
        &self,
        cross_matched_to: &[u64],
    ) -> anyhow::Result<Vec<Option<ReferencePhotometry>>> {
        let rows = twomass::read_twomass_csv(&self.reference_path)?;
        Ok(cross_match(cross_matched_to, rows))
    }
}

/// Align reference rows to `source_ids` by shared source identifier.
///
/// Unmatched ids map to `None`. If a source id appears more than once in
/// `rows`, the first row wins.
pub fn cross_match(
    source_ids: &[u64],
    rows: impl IntoIterator<Item = ReferencePhotometry>,
) -> Vec<Option<ReferencePhotometry>> {
    let mut by_id: HashMap<u64, ReferencePhotometry> = HashMap::new();
    let mut duplicates = 0usize;
    for row in rows {
        if by_id.contains_key(&row.source_id) {
            duplicates += 1;
            continue;
        }
        by_id.insert(row.source_id, row);
    }
    if duplicates > 0 {
        warn!("Ignored {} duplicate reference rows", duplicates);
    }

    let matched: Vec<Option<ReferencePhotometry>> =
        source_ids.iter().map(|id| by_id.get(id).copied()).collect();
    info!(
        "Cross-matched {} of {} subject stars",
        matched.iter().filter(|m| m.is_some()).count(),
        source_ids.len()
    );
    matched
}

// ── CSV column helpers ──────────────────────────────────────────────────────

/// Column positions resolved from a CSV header.
pub(crate) struct Columns<'a> {
    path: &'a Path,
    headers: csv::StringRecord,
}

impl<'a> Columns<'a> {
    pub(crate) fn new(path: &'a Path, headers: csv::StringRecord) -> Self {
        Self { path, headers }
    }

    pub(crate) fn index(&self, name: &str) -> anyhow::Result<usize> {
        self.headers
            .iter()
            .position(|h| h.trim() == name)
            .with_context(|| format!("{}: missing column {:?}", self.path.display(), name))
    }

    pub(crate) fn path(&self) -> &Path {
        self.path
    }
}

/// Parse a required numeric field.
pub(crate) fn parse_field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    idx: usize,
    name: &str,
    path: &Path,
) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    let line = record.position().map(|p| p.line()).unwrap_or(0);
    let raw = record.get(idx).unwrap_or("").trim();
    raw.parse::<T>().map_err(|e| {
        anyhow::anyhow!(
            "{}:{}: column {:?}: bad value {:?}: {}",
            path.display(),
            line,
            name,
            raw,
            e
        )
    })
}

/// Parse an optional numeric field; empty means `None`.
pub(crate) fn parse_optional<T: std::str::FromStr>(
    record: &csv::StringRecord,
    idx: usize,
    name: &str,
    path: &Path,
) -> anyhow::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match record.get(idx).map(str::trim) {
        None | Some("") => Ok(None),
        Some(_) => parse_field(record, idx, name, path).map(Some),
    }
}
