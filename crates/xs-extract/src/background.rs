//! Exposure-scaled background subtraction.

use xs_core::{Error, Result};
use xs_hist::Hist1D;

/// `data - Σ backgrounds · data_exposure / mc_exposure`, universe by universe.
///
/// Data normally has only a central value; it first receives every band of
/// the backgrounds (copies of its cv) so that systematic universes of the
/// simulation propagate into the result. The input is not modified.
pub fn subtract_backgrounds(
    data: &Hist1D,
    backgrounds: &[&Hist1D],
    data_exposure: f64,
    mc_exposure: f64,
) -> Result<Hist1D> {
    for (what, pot) in [("data", data_exposure), ("MC", mc_exposure)] {
        if !(pot.is_finite() && pot > 0.0) {
            return Err(Error::Validation(format!("{what} exposure must be > 0, got {pot}")));
        }
    }
    let scale = -data_exposure / mc_exposure;
    let mut out = data.clone();
    for bkg in backgrounds {
        out.add_missing_bands(&bkg.layout())?;
        log::debug!("subtracting '{}' scaled by {scale} from '{}'", bkg.name(), data.name());
        out.add_scaled(bkg, scale)?;
    }
    Ok(out)
}
