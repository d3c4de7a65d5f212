/// A row of the subject (astrometric) catalog.
///
/// Field names follow the Gaia TGAS column names. Positions are in degrees,
/// parallaxes in milliarcseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectStar {
    pub source_id: u64,
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub parallax: f64,
    pub parallax_error: f64,
    /// Number of good along-scan observations.
    pub astrometric_n_good_obs_al: f64,
    /// Degree of scan-angle anisotropy (k=4 harmonic); large values mean
    /// poor scan coverage.
    pub scan_direction_strength_k4: f64,
    pub phot_g_mean_mag: f64,
}

/// Reference-catalog (2MASS) photometry cross-matched to a subject star.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePhotometry {
    pub source_id: u64,
    pub j_mag: f64,
    pub k_mag: f64,
}

impl ReferencePhotometry {
    /// J - Ks color.
    pub fn jk(&self) -> f64 {
        self.j_mag - self.k_mag
    }

    /// Color-corrected J-band pseudo-magnitude `J + (J-Ks)^2 + 2.5 (J-Ks)`,
    /// the magnitude axis of the joint reference count table.
    pub fn jt(&self) -> f64 {
        let jk = self.jk();
        self.j_mag + jk * jk + 2.5 * jk
    }
}

/// Numeric subject-catalog columns that can be averaged on the sky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectField {
    RaDeg,
    DecDeg,
    Parallax,
    ParallaxError,
    AstrometricNGoodObsAl,
    ScanDirectionStrengthK4,
    PhotGMeanMag,
}

impl SubjectField {
    /// Read this column from a star.
    pub fn value(self, star: &SubjectStar) -> f64 {
        match self {
            SubjectField::RaDeg => star.ra_deg,
            SubjectField::DecDeg => star.dec_deg,
            SubjectField::Parallax => star.parallax,
            SubjectField::ParallaxError => star.parallax_error,
            SubjectField::AstrometricNGoodObsAl => star.astrometric_n_good_obs_al,
            SubjectField::ScanDirectionStrengthK4 => star.scan_direction_strength_k4,
            SubjectField::PhotGMeanMag => star.phot_g_mean_mag,
        }
    }

    /// Column name as it appears in the catalog files.
    pub fn column_name(self) -> &'static str {
        match self {
            SubjectField::RaDeg => "ra",
            SubjectField::DecDeg => "dec",
            SubjectField::Parallax => "parallax",
            SubjectField::ParallaxError => "parallax_error",
            SubjectField::AstrometricNGoodObsAl => "astrometric_n_good_obs_al",
            SubjectField::ScanDirectionStrengthK4 => "scan_direction_strength_k4",
            SubjectField::PhotGMeanMag => "phot_g_mean_mag",
        }
    }

    /// Look up a column by its catalog name.
    pub fn from_column_name(name: &str) -> Option<Self> {
        [
            SubjectField::RaDeg,
            SubjectField::DecDeg,
            SubjectField::Parallax,
            SubjectField::ParallaxError,
            SubjectField::AstrometricNGoodObsAl,
            SubjectField::ScanDirectionStrengthK4,
            SubjectField::PhotGMeanMag,
        ]
        .into_iter()
        .find(|f| f.column_name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_lookup_by_name() {
        let star = SubjectStar {
            source_id: 1,
            ra_deg: 10.0,
            dec_deg: -5.0,
            parallax: 2.5,
            parallax_error: 0.3,
            astrometric_n_good_obs_al: 90.0,
            scan_direction_strength_k4: 0.2,
            phot_g_mean_mag: 9.1,
        };
        let field = SubjectField::from_column_name("parallax_error").unwrap();
        assert_eq!(field, SubjectField::ParallaxError);
        assert_eq!(field.value(&star), 0.3);
        assert!(SubjectField::from_column_name("radial_velocity").is_none());
    }

    #[test]
    fn jk_color() {
        let phot = ReferencePhotometry {
            source_id: 7,
            j_mag: 8.5,
            k_mag: 8.1,
        };
        assert!((phot.jk() - 0.4).abs() < 1e-12);
        // 8.5 + 0.16 + 1.0
        assert!((phot.jt() - 9.66).abs() < 1e-12);
    }
}
