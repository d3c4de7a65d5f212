use std::io::Read;
use std::path::Path;

use anyhow::Context;
use tracing::info;

use super::{parse_field, Columns};
use crate::star::SubjectStar;

/// Read a TGAS-style subject catalog from a CSV file with a header row.
///
/// Required columns: `source_id`, `ra`, `dec`, `parallax`,
/// `parallax_error`, `astrometric_n_good_obs_al`,
/// `scan_direction_strength_k4`, `phot_g_mean_mag`. Extra columns are
/// ignored; a missing column or unparsable value is an error.
pub fn read_tgas_csv<P: AsRef<Path>>(file: P) -> anyhow::Result<Vec<SubjectStar>> {
    let path = file.as_ref();
    let f = std::fs::File::open(path)
        .with_context(|| format!("opening subject catalog {}", path.display()))?;
    let stars = read_tgas_from_reader(f, path)?;
    info!("Loaded {} subject stars from {}", stars.len(), path.display());
    Ok(stars)
}

/// Read TGAS rows from any reader. `path` only labels errors.
pub fn read_tgas_from_reader<R: Read>(reader: R, path: &Path) -> anyhow::Result<Vec<SubjectStar>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let cols = Columns::new(path, rdr.headers()?.clone());

    let source_id = cols.index("source_id")?;
    let ra = cols.index("ra")?;
    let dec = cols.index("dec")?;
    let parallax = cols.index("parallax")?;
    let parallax_error = cols.index("parallax_error")?;
    let n_obs = cols.index("astrometric_n_good_obs_al")?;
    let scd = cols.index("scan_direction_strength_k4")?;
    let gmag = cols.index("phot_g_mean_mag")?;

    let p = cols.path();
    rdr.records()
        .map(|result| -> anyhow::Result<SubjectStar> {
            let record = result?;
            Ok(SubjectStar {
                source_id: parse_field(&record, source_id, "source_id", p)?,
                ra_deg: parse_field(&record, ra, "ra", p)?,
                dec_deg: parse_field(&record, dec, "dec", p)?,
                parallax: parse_field(&record, parallax, "parallax", p)?,
                parallax_error: parse_field(&record, parallax_error, "parallax_error", p)?,
                astrometric_n_good_obs_al: parse_field(
                    &record,
                    n_obs,
                    "astrometric_n_good_obs_al",
                    p,
                )?,
                scan_direction_strength_k4: parse_field(
                    &record,
                    scd,
                    "scan_direction_strength_k4",
                    p,
                )?,
                phot_g_mean_mag: parse_field(&record, gmag, "phot_g_mean_mag", p)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "source_id,ra,dec,parallax,parallax_error,astrometric_n_good_obs_al,scan_direction_strength_k4,phot_g_mean_mag,extra\n";

    #[test]
    fn reads_rows_by_header_name() {
        let data = format!("{HEADER}4295806720,45.0,0.5,6.7,0.25,77,0.1,7.9,x\n");
        let stars = read_tgas_from_reader(data.as_bytes(), Path::new("tgas.csv")).unwrap();
        assert_eq!(stars.len(), 1);
        let s = &stars[0];
        assert_eq!(s.source_id, 4_295_806_720);
        assert_eq!(s.ra_deg, 45.0);
        assert_eq!(s.parallax_error, 0.25);
        assert_eq!(s.astrometric_n_good_obs_al, 77.0);
    }

    #[test]
    fn bad_values_are_errors() {
        let data = format!("{HEADER}1,45.0,,6.7,0.25,77,0.1,7.9,x\n");
        let err = read_tgas_from_reader(data.as_bytes(), Path::new("tgas.csv")).unwrap_err();
        assert!(err.to_string().contains("\"dec\""), "{err}");
    }

    #[test]
    fn missing_column_is_error() {
        let data = "source_id,ra\n1,2\n";
        let err = read_tgas_from_reader(data.as_bytes(), Path::new("tgas.csv")).unwrap_err();
        assert!(err.to_string().contains("missing column"), "{err}");
    }
}
