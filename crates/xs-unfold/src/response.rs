//! Response-matrix diagnostics.

use xs_core::{Error, Result};
use xs_hist::Hist2D;

/// Purity and stability of a square migration matrix (central value).
///
/// Purity of bin `i` is the fraction of events reconstructed in `i` that
/// were generated in `i`; stability is the fraction of events generated in
/// `i` that are reconstructed there. Flow cells are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSummary {
    /// Per in-range bin.
    pub purity: Vec<f64>,
    /// Per in-range bin.
    pub stability: Vec<f64>,
}

impl ResponseSummary {
    /// Summarize the cv universe of `migration` (x = reco, y = true).
    pub fn from_migration(migration: &Hist2D) -> Result<Self> {
        if migration.x_binning() != migration.y_binning() {
            return Err(Error::Unfolding(format!(
                "'{}': purity and stability need identical reco and true binning",
                migration.name()
            )));
        }
        let m = migration.matrix(xs_hist::CV_BAND, 0)?;
        let n = migration.x_binning().n_bins();
        let ratio = |a: f64, b: f64| if b != 0.0 { a / b } else { 0.0 };

        let purity = (1..=n)
            .map(|r| ratio(m[r][r], (1..=n).map(|t| m[r][t]).sum()))
            .collect();
        let stability = (1..=n)
            .map(|t| ratio(m[t][t], (1..=n).map(|r| m[r][t]).sum()))
            .collect();
        Ok(Self { purity, stability })
    }

    /// Smallest purity over bins with content.
    pub fn min_purity(&self) -> Option<f64> {
        self.purity.iter().copied().filter(|p| *p > 0.0).reduce(f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xs_hist::{BandLayout, Binning};

    #[test]
    fn purity_and_stability() {
        let axis = Binning::new(vec![0.0, 1.0, 2.0]).unwrap();
        let mut m = Hist2D::new("m", "", axis.clone(), axis, &BandLayout::cv_only());
        // true bin 1: 3 stay, 1 migrates up; true bin 2: 4 stay.
        m.fill("cv", 0, 0.5, 0.5, 3.0).unwrap();
        m.fill("cv", 0, 1.5, 0.5, 1.0).unwrap();
        m.fill("cv", 0, 1.5, 1.5, 4.0).unwrap();
        let s = ResponseSummary::from_migration(&m).unwrap();
        assert_eq!(s.purity, vec![1.0, 0.8]);
        assert_eq!(s.stability, vec![0.75, 1.0]);
        assert_eq!(s.min_purity(), Some(0.8));
    }

    #[test]
    fn non_square_rejected() {
        let m = Hist2D::new(
            "m",
            "",
            Binning::uniform(2, 0.0, 1.0).unwrap(),
            Binning::uniform(3, 0.0, 1.0).unwrap(),
            &BandLayout::cv_only(),
        );
        assert!(matches!(ResponseSummary::from_migration(&m), Err(Error::Unfolding(_))));
    }
}
