//! Efficiency correction and flux/target normalization.

use xs_core::{Error, Result};
use xs_hist::Hist1D;

/// Flux is stored per m²; cross sections are reported in cm².
pub const UNIT_CONVERSION: f64 = 1.0e4;

/// `numerator / denominator` in every universe.
pub fn efficiency(numerator: &Hist1D, denominator: &Hist1D) -> Result<Hist1D> {
    let mut eff = numerator.clone();
    eff.divide(denominator)?;
    Ok(eff)
}

fn check_target(n_nucleons: f64, exposure: f64) -> Result<f64> {
    if !(n_nucleons.is_finite() && n_nucleons > 0.0) {
        return Err(Error::Validation(format!("nucleon count must be > 0, got {n_nucleons}")));
    }
    if !(exposure.is_finite() && exposure > 0.0) {
        return Err(Error::Validation(format!("exposure must be > 0, got {exposure}")));
    }
    Ok(n_nucleons * exposure)
}

/// Differential cross section from an efficiency-corrected event rate.
///
/// Divides by the integrated flux (identical binning required), converts
/// units, divides by `n_nucleons * exposure` and by bin width.
pub fn normalize(
    efficiency_corrected: &Hist1D,
    flux: &Hist1D,
    n_nucleons: f64,
    exposure: f64,
) -> Result<Hist1D> {
    let target = check_target(n_nucleons, exposure)?;
    let mut out = efficiency_corrected.clone();
    out.divide(flux)?;
    out.scale(UNIT_CONVERSION / target);
    out.scale_width();
    Ok(out)
}

/// Inverse of [`normalize`] for bins with non-zero flux.
pub fn denormalize(
    cross_section: &Hist1D,
    flux: &Hist1D,
    n_nucleons: f64,
    exposure: f64,
) -> Result<Hist1D> {
    let target = check_target(n_nucleons, exposure)?;
    let mut out = cross_section.clone();
    out.unscale_width();
    out.scale(target / UNIT_CONVERSION);
    out.multiply(flux)?;
    Ok(out)
}
