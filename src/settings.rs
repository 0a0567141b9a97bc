//! Analysis settings and the fixed constants of the density estimator.

use crate::errors::CmDataError;

/// Kernel bandwidth h (nm), independent of the cutoff
pub const BANDWIDTH: f64 = 0.01;
/// Number of histogram bins per 0.01 nm of cutoff
pub const OVERSAMPLING: f64 = 4.0;
/// Extra distance beyond the cutoff that still feeds the estimator (nm)
pub const SIGNAL_MARGIN: f64 = 0.02;
/// Empirical normalization compensating for the kernel truncation at ±2h
pub const TRUNCATION_NORM: f64 = 0.738_535_87;

/// Default cutoff of the density histograms (nm)
pub const DEFAULT_CUTOFF: f64 = 0.75;
/// Default center-of-mass pruning radius (nm)
pub const DEFAULT_MOL_CUTOFF: f64 = 6.0;

#[derive(Clone, Debug)]
pub struct Settings {
    /// Upper bound of the density histogram domain
    pub cutoff: f64,
    /// Center-of-mass distance above which molecule pairs are skipped
    pub mol_cutoff: f64,
    /// Also write the raw per-bin histograms
    pub histo: bool,
    /// File name stem of the intramolecular matrices
    pub intra_stem: String,
    /// File name stem of the intermolecular matrices
    pub inter_stem: String,
    /// Accept every `stride`-th frame; 0 accepts all frames
    pub stride: usize,
    /// Atoms whose name starts with this character are hydrogens
    pub hydrogen_prefix: char,
    /// Worker threads for frame accumulation (0 for all cores)
    pub num_threads: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cutoff: DEFAULT_CUTOFF,
            mol_cutoff: DEFAULT_MOL_CUTOFF,
            histo: false,
            intra_stem: String::from("intramat.ndx"),
            inter_stem: String::from("intermat.ndx"),
            stride: 0,
            hydrogen_prefix: 'H',
            num_threads: 1,
        }
    }
}

impl Settings {
    /// Reject cutoffs that cannot define a histogram domain.
    pub fn validate(&self) -> Result<(), CmDataError> {
        if !(self.cutoff.is_finite() && self.cutoff > 0.0) {
            return Err(CmDataError::InvalidSettings(format!(
                "cutoff must be a positive distance, got {}",
                self.cutoff
            )));
        }
        if !(self.mol_cutoff.is_finite() && self.mol_cutoff > 0.0) {
            return Err(CmDataError::InvalidSettings(format!(
                "mol_cutoff must be a positive distance, got {}",
                self.mol_cutoff
            )));
        }
        Ok(())
    }

    /// Squared center-of-mass pruning radius.
    pub fn mol_cutoff2(&self) -> f64 {
        self.mol_cutoff * self.mol_cutoff
    }

    /// Squared distance below which a contact is recorded for the estimator.
    pub fn signal_cutoff2(&self) -> f64 {
        let cut = self.cutoff + SIGNAL_MARGIN;
        cut * cut
    }

    /// Frame-skip policy applied to the frame index reported by the source.
    pub fn accepts_frame(&self, index: usize) -> bool {
        self.stride == 0 || index % self.stride == 0
    }

    /// Hydrogen-exclusion predicate on atom names.
    pub fn is_hydrogen(&self, atom_name: &str) -> bool {
        atom_name.starts_with(self.hydrogen_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert!((settings.signal_cutoff2() - 0.77 * 0.77).abs() < 1e-12);
        assert!((settings.mol_cutoff2() - 36.0).abs() < 1e-12);
    }

    #[test]
    fn test_bad_cutoffs() {
        let settings = Settings {
            cutoff: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CmDataError::InvalidSettings(_))
        ));

        let settings = Settings {
            mol_cutoff: f64::NAN,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_stride_policy() {
        let every = Settings::default();
        assert!((0..5).all(|i| every.accepts_frame(i)));

        let third = Settings {
            stride: 3,
            ..Default::default()
        };
        let accepted: Vec<usize> = (0..10).filter(|&i| third.accepts_frame(i)).collect();
        assert_eq!(accepted, vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_hydrogen_predicate() {
        let settings = Settings::default();
        assert!(settings.is_hydrogen("HA"));
        assert!(settings.is_hydrogen("H"));
        assert!(!settings.is_hydrogen("CA"));
        assert!(!settings.is_hydrogen("OH"));
        assert!(!settings.is_hydrogen(""));
    }
}
