//! Integrated neutrino flux per universe.

use xs_core::{Error, Result};
use xs_hist::{Binning, CV_BAND, Hist1D};

use crate::variation::FLUX_BAND;

/// Flux versus neutrino energy, with one spectrum per flux universe.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxSpectrum {
    hist: Hist1D,
}

impl FluxSpectrum {
    /// Wrap a flux histogram. It must carry the flux band.
    pub fn new(hist: Hist1D) -> Result<Self> {
        if hist.layout().n_universes(FLUX_BAND).is_none() {
            return Err(Error::Config(format!(
                "flux spectrum '{}' has no '{FLUX_BAND}' band",
                hist.name()
            )));
        }
        Ok(Self { hist })
    }

    /// Energy binning.
    pub fn binning(&self) -> &Binning {
        self.hist.binning()
    }

    /// Flux of universe (`band`, `index`) integrated over `[e_min, e_max)`.
    /// Bins straddling a limit contribute in proportion to their overlap.
    pub fn integral(&self, band: &str, index: usize, e_min: f64, e_max: f64) -> Result<f64> {
        let content = &self.hist.bands().universe(band, index)?.sumw;
        let edges = self.hist.binning().edges();
        let mut total = 0.0;
        for (i, w) in edges.windows(2).enumerate() {
            let (lo, hi) = (w[0], w[1]);
            let overlap = hi.min(e_max) - lo.max(e_min);
            if overlap > 0.0 {
                total += content[i + 1] * overlap / (hi - lo);
            }
        }
        Ok(total)
    }
}

/// Histogram with `template`'s binning and universes where every in-range
/// bin holds the integrated flux: flux universes use their own spectrum,
/// every other universe the central one.
pub fn flux_integral(
    spectrum: &FluxSpectrum,
    template: &Hist1D,
    e_min: f64,
    e_max: f64,
    name: &str,
) -> Result<Hist1D> {
    if !(e_min.is_finite() && e_max.is_finite() && e_min < e_max) {
        return Err(Error::Config(format!("flux integral range [{e_min}, {e_max}) is empty")));
    }
    let layout = template.layout();
    let n_flux = spectrum.hist.layout().n_universes(FLUX_BAND).unwrap_or(0);
    if let Some(n) = layout.n_universes(FLUX_BAND)
        && n > n_flux
    {
        return Err(Error::Config(format!(
            "template '{}' has {n} flux universes, spectrum only {n_flux}",
            template.name()
        )));
    }
    let cv = spectrum.integral(CV_BAND, 0, e_min, e_max)?;

    let mut out = Hist1D::new(name, "integrated flux", template.binning().clone(), &layout);
    let n_bins = template.binning().n_bins();
    for (band, n) in layout.iter() {
        for i in 0..n {
            let value = if band == FLUX_BAND {
                spectrum.integral(FLUX_BAND, i, e_min, e_max)?
            } else {
                cv
            };
            let arr = out.bands_mut().universe_mut(band, i)?;
            for cell in 1..=n_bins {
                arr.sumw[cell] = value;
            }
        }
    }
    log::debug!("{name}: integrated cv flux {cv:.6e} over [{e_min}, {e_max})");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;
    use xs_hist::BandLayout;

    fn spectrum() -> FluxSpectrum {
        let layout =
            BandLayout::new(BTreeMap::from([("cv".to_string(), 1), (FLUX_BAND.to_string(), 2)]))
                .unwrap();
        let binning = Binning::new(vec![0.0, 2.0, 4.0, 6.0]).unwrap();
        let mut h = Hist1D::new("flux", "E_nu", binning, &layout);
        for (e, w) in [(1.0, 10.0), (3.0, 20.0), (5.0, 30.0)] {
            h.fill("cv", 0, e, w).unwrap();
            h.fill(FLUX_BAND, 0, e, 0.9 * w).unwrap();
            h.fill(FLUX_BAND, 1, e, 1.1 * w).unwrap();
        }
        FluxSpectrum::new(h).unwrap()
    }

    #[test]
    fn partial_bins_count_by_overlap() {
        let s = spectrum();
        assert_relative_eq!(s.integral("cv", 0, 0.0, 6.0).unwrap(), 60.0);
        assert_relative_eq!(s.integral("cv", 0, 1.0, 4.0).unwrap(), 25.0);
        assert_relative_eq!(s.integral(FLUX_BAND, 1, 0.0, 6.0).unwrap(), 66.0, max_relative = 1e-12);
    }

    #[test]
    fn integral_histogram_follows_template() {
        let layout = BandLayout::new(BTreeMap::from([
            ("cv".to_string(), 1),
            (FLUX_BAND.to_string(), 2),
            ("MuonEnergy".to_string(), 2),
        ]))
        .unwrap();
        let template = Hist1D::new("t", "", Binning::new(vec![0.0, 1.0, 2.0]).unwrap(), &layout);
        let out =
            flux_integral(&spectrum(), &template, 0.0, 6.0, "pt_reweightedflux_integrated").unwrap();
        assert_eq!(out.cv().sumw, vec![0.0, 60.0, 60.0, 0.0]);
        let flux0 = out.bands().universe(FLUX_BAND, 0).unwrap();
        assert_relative_eq!(flux0.sumw[2], 54.0, max_relative = 1e-12);
        assert_eq!(out.bands().universe("MuonEnergy", 1).unwrap().sumw[1], 60.0);
        assert!(flux_integral(&spectrum(), &template, 3.0, 3.0, "x").is_err());
    }

    #[test]
    fn spectrum_needs_flux_band() {
        let binning = Binning::new(vec![0.0, 1.0]).unwrap();
        let h = Hist1D::new("flux", "", binning, &BandLayout::cv_only());
        assert!(matches!(FluxSpectrum::new(h), Err(Error::Config(_))));
    }
}
