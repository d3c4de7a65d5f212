//! 2MASS reference photometry rows.
//!
//! The reference file carries one row per subject star that has a 2MASS
//! counterpart, keyed by the subject's `source_id`. Rows whose J or Ks
//! magnitude is blank are dropped here so that the cross-match treats them
//! like missing counterparts.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};

use super::{parse_field, parse_optional, Columns};
use crate::star::ReferencePhotometry;

/// Read 2MASS photometry from a CSV file with `source_id`, `j_mag` and
/// `k_mag` columns.
pub fn read_twomass_csv<P: AsRef<Path>>(file: P) -> anyhow::Result<Vec<ReferencePhotometry>> {
    let path = file.as_ref();
    let f = std::fs::File::open(path)
        .with_context(|| format!("opening reference catalog {}", path.display()))?;
    let rows = read_twomass_from_reader(f, path)?;
    info!("Loaded {} reference rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Read 2MASS rows from any reader. `path` only labels errors.
pub fn read_twomass_from_reader<R: Read>(
    reader: R,
    path: &Path,
) -> anyhow::Result<Vec<ReferencePhotometry>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let cols = Columns::new(path, rdr.headers()?.clone());
    let source_id = cols.index("source_id")?;
    let j_mag = cols.index("j_mag")?;
    let k_mag = cols.index("k_mag")?;

    let p = cols.path();
    let mut rows = Vec::new();
    let mut blank = 0usize;
    for result in rdr.records() {
        let record = result?;
        let id: u64 = parse_field(&record, source_id, "source_id", p)?;
        let j: Option<f64> = parse_optional(&record, j_mag, "j_mag", p)?;
        let k: Option<f64> = parse_optional(&record, k_mag, "k_mag", p)?;
        match (j, k) {
            (Some(j_mag), Some(k_mag)) => rows.push(ReferencePhotometry {
                source_id: id,
                j_mag,
                k_mag,
            }),
            _ => blank += 1,
        }
    }
    if blank > 0 {
        debug!("Skipped {} reference rows without J/Ks photometry", blank);
    }
    Ok(rows)
}
