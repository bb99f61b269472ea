//! One-dimensional histogram accumulator with per-universe error bands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use xs_core::{Error, Result};

use crate::bands::{BandLayout, Bands, BinArray, CV_BAND};
use crate::binning::Binning;
use crate::uncertainty::{BinUncertainty, CovarianceMatrix, band_deviation};

/// A 1D histogram holding one content array per universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist1D {
    name: String,
    title: String,
    binning: Binning,
    bands: Bands,
    /// Extra statistical covariance matrices (e.g. from unfolding), by name.
    #[serde(default)]
    covariances: BTreeMap<String, CovarianceMatrix>,
    /// Number of central-value fills.
    entries: u64,
}

impl Hist1D {
    /// Empty histogram for every universe in `layout`.
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        binning: Binning,
        layout: &BandLayout,
    ) -> Self {
        let bands = Bands::new(layout, binning.n_cells());
        Self {
            name: name.into(),
            title: title.into(),
            binning,
            bands,
            covariances: BTreeMap::new(),
            entries: 0,
        }
    }

    /// Build a histogram from per-cell cv contents (flows included) and
    /// sumw2. Used by code that produces histograms from arrays, e.g. the
    /// flux integral.
    pub fn from_cv(
        name: impl Into<String>,
        binning: Binning,
        sumw: Vec<f64>,
        sumw2: Vec<f64>,
    ) -> Result<Self> {
        let n = binning.n_cells();
        if sumw.len() != n || sumw2.len() != n {
            return Err(Error::Binning(format!(
                "from_cv: expected {n} cells, got sumw={} sumw2={}",
                sumw.len(),
                sumw2.len()
            )));
        }
        let mut h = Self::new(name, "", binning, &BandLayout::cv_only());
        *h.bands.universe_mut(CV_BAND, 0)? = BinArray { sumw, sumw2 };
        Ok(h)
    }

    /// Histogram name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename in place.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Axis title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Binning.
    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    /// Band layout.
    pub fn layout(&self) -> BandLayout {
        self.bands.layout()
    }

    /// Universe contents.
    pub fn bands(&self) -> &Bands {
        &self.bands
    }

    /// Mutable universe contents, for producers that write whole arrays.
    pub fn bands_mut(&mut self) -> &mut Bands {
        &mut self.bands
    }

    /// Central-value array (flows included).
    pub fn cv(&self) -> &BinArray {
        self.bands.cv()
    }

    /// Central-value contents of the in-range bins.
    pub fn cv_values(&self) -> Vec<f64> {
        self.cv().sumw[1..=self.binning.n_bins()].to_vec()
    }

    /// Number of central-value fills.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Sum of the central value over in-range bins.
    pub fn integral(&self) -> f64 {
        self.cv_values().iter().sum()
    }

    /// Add `weight` at `value` in universe `index` of `band`.
    ///
    /// Out-of-range values go to the under/overflow cells.
    pub fn fill(&mut self, band: &str, index: usize, value: f64, weight: f64) -> Result<()> {
        if !weight.is_finite() {
            return Err(Error::Data(format!(
                "non-finite weight {weight} filling '{}' ({band}[{index}])",
                self.name
            )));
        }
        let cell = self.binning.find_cell(value);
        self.bands.universe_mut(band, index)?.fill(cell, weight);
        if band == CV_BAND {
            self.entries += 1;
        }
        Ok(())
    }

    /// Add `other` bin-by-bin in every universe.
    pub fn merge(&mut self, other: &Hist1D) -> Result<()> {
        self.add_scaled(other, 1.0)?;
        self.entries += other.entries;
        Ok(())
    }

    /// `self += c * other` in every universe. Covariances add with `c²`.
    pub fn add_scaled(&mut self, other: &Hist1D, c: f64) -> Result<()> {
        let what = format!("adding '{}' to '{}'", other.name, self.name);
        self.binning.ensure_same(&other.binning, &what)?;
        self.bands.add_scaled(&other.bands, c)?;
        for (name, cov) in &other.covariances {
            let mut scaled = cov.clone();
            scaled.scale(c * c);
            match self.covariances.get_mut(name) {
                Some(mine) => mine.add(&scaled)?,
                None => {
                    self.covariances.insert(name.clone(), scaled);
                }
            }
        }
        Ok(())
    }

    /// Multiply every universe (and covariance) by `f`.
    pub fn scale(&mut self, f: f64) {
        self.bands.scale(f);
        for cov in self.covariances.values_mut() {
            cov.scale(f * f);
        }
    }

    /// Divide each in-range bin by its width. Flow cells are left alone.
    pub fn scale_width(&mut self) {
        for cell in 1..=self.binning.n_bins() {
            let w = self.binning.width(cell).unwrap_or(1.0);
            self.scale_cell(cell, 1.0 / w);
        }
    }

    /// Multiply each in-range bin by its width (inverse of [`scale_width`](Self::scale_width)).
    pub fn unscale_width(&mut self) {
        for cell in 1..=self.binning.n_bins() {
            let w = self.binning.width(cell).unwrap_or(1.0);
            self.scale_cell(cell, w);
        }
    }

    fn scale_cell(&mut self, cell: usize, f: f64) {
        for arr in self.bands.arrays_mut() {
            arr.scale_cell(cell, f);
        }
        for cov in self.covariances.values_mut() {
            cov.scale_cell(cell, f);
        }
    }

    /// Bin-by-bin ratio `self / other`, universe by universe.
    ///
    /// Both histograms must share binning and error bands. Cells with a zero
    /// denominator become zero. Errors propagate as uncorrelated.
    pub fn divide(&mut self, other: &Hist1D) -> Result<()> {
        let what = format!("dividing '{}' by '{}'", self.name, other.name);
        self.binning.ensure_same(&other.binning, &what)?;
        self.layout().ensure_same(&other.layout(), &what)?;

        let cv_den = other.cv().sumw.clone();
        for cov in self.covariances.values_mut() {
            for (cell, &d) in cv_den.iter().enumerate() {
                cov.scale_cell(cell, if d != 0.0 { 1.0 / d } else { 0.0 });
            }
        }

        for (band, universes) in other.bands.iter() {
            for (i, den) in universes.iter().enumerate() {
                let num = self.bands.universe_mut(band, i)?;
                for cell in 0..num.sumw.len() {
                    let (a, b) = (num.sumw[cell], den.sumw[cell]);
                    if b == 0.0 {
                        num.sumw[cell] = 0.0;
                        num.sumw2[cell] = 0.0;
                        continue;
                    }
                    let (va, vb) = (num.sumw2[cell], den.sumw2[cell]);
                    num.sumw[cell] = a / b;
                    num.sumw2[cell] = (va * b * b + vb * a * a) / (b * b * b * b);
                }
            }
        }
        Ok(())
    }

    /// Give this histogram every band of `layout` it lacks, each universe a
    /// copy of the central value. Data carries no systematic universes, but
    /// quantities derived from it need the same bands as the simulation.
    pub fn add_missing_bands(&mut self, layout: &BandLayout) -> Result<()> {
        self.bands.fill_missing_from_cv(layout)
    }

    /// Attach a statistical covariance matrix (dimension = number of cells).
    pub fn push_covariance(
        &mut self,
        name: impl Into<String>,
        cov: CovarianceMatrix,
    ) -> Result<()> {
        let name = name.into();
        if cov.dim() != self.binning.n_cells() {
            return Err(Error::Binning(format!(
                "covariance '{name}' is {0}x{0}, histogram '{1}' has {2} cells",
                cov.dim(),
                self.name,
                self.binning.n_cells()
            )));
        }
        self.covariances.insert(name, cov);
        Ok(())
    }

    /// Named covariance matrix, if attached.
    pub fn covariance(&self, name: &str) -> Option<&CovarianceMatrix> {
        self.covariances.get(name)
    }

    /// Names of attached covariance matrices.
    pub fn covariance_names(&self) -> impl Iterator<Item = &str> {
        self.covariances.keys().map(|k| k.as_str())
    }

    /// Statistical variance of `cell`: cv sumw2 plus attached covariance diagonals.
    pub fn stat_variance(&self, cell: usize) -> f64 {
        self.cv().sumw2[cell] + self.covariances.values().map(|c| c.get(cell, cell)).sum::<f64>()
    }

    /// Up/down deviation of `band` around the central value for each in-range bin.
    pub fn band_errors(&self, band: &str) -> Result<Vec<(f64, f64)>> {
        let universes = self
            .bands
            .band(band)
            .ok_or_else(|| Error::NotFound(format!("band '{band}' in '{}'", self.name)))?;
        let cv = &self.cv().sumw;
        Ok((1..=self.binning.n_bins())
            .map(|cell| {
                let vals: Vec<f64> = universes.iter().map(|u| u.sumw[cell]).collect();
                band_deviation(cv[cell], &vals)
            })
            .collect())
    }

    /// Central value with total uncertainty for every in-range bin.
    ///
    /// Statistical variance and each non-cv band's deviation are added in
    /// quadrature, separately for the upward and downward side.
    pub fn cv_with_uncertainty(&self) -> Vec<BinUncertainty> {
        let cv = &self.cv().sumw;
        let n_bins = self.binning.n_bins();
        let mut up2 = vec![0.0; n_bins];
        let mut down2 = vec![0.0; n_bins];

        for (band, universes) in self.bands.iter() {
            if band == CV_BAND {
                continue;
            }
            for cell in 1..=n_bins {
                let vals: Vec<f64> = universes.iter().map(|u| u.sumw[cell]).collect();
                let (up, down) = band_deviation(cv[cell], &vals);
                up2[cell - 1] += up * up;
                down2[cell - 1] += down * down;
            }
        }

        (1..=n_bins)
            .map(|cell| {
                let stat2 = self.stat_variance(cell).max(0.0);
                BinUncertainty {
                    value: cv[cell],
                    err_up: (stat2 + up2[cell - 1]).sqrt(),
                    err_down: (stat2 + down2[cell - 1]).sqrt(),
                    stat: stat2.sqrt(),
                }
            })
            .collect()
    }

    /// Bin-by-bin product `self * other`, universe by universe.
    ///
    /// Same requirements as [`divide`](Self::divide), of which it is the
    /// inverse for cells with a non-zero factor.
    pub fn multiply(&mut self, other: &Hist1D) -> Result<()> {
        let what = format!("multiplying '{}' by '{}'", self.name, other.name);
        self.binning.ensure_same(&other.binning, &what)?;
        self.layout().ensure_same(&other.layout(), &what)?;

        let cv_factor = other.cv().sumw.clone();
        for cov in self.covariances.values_mut() {
            for (cell, &f) in cv_factor.iter().enumerate() {
                cov.scale_cell(cell, f);
            }
        }

        for (band, universes) in other.bands.iter() {
            for (i, fac) in universes.iter().enumerate() {
                let arr = self.bands.universe_mut(band, i)?;
                for cell in 0..arr.sumw.len() {
                    let (a, b) = (arr.sumw[cell], fac.sumw[cell]);
                    arr.sumw2[cell] = arr.sumw2[cell] * b * b + fac.sumw2[cell] * a * a;
                    arr.sumw[cell] = a * b;
                }
            }
        }
        Ok(())
    }

    /// Check invariants of a deserialized histogram.
    pub fn validate(&self) -> Result<()> {
        self.bands.validate(self.binning.n_cells())?;
        for (name, cov) in &self.covariances {
            if cov.dim() != self.binning.n_cells() {
                return Err(Error::Binning(format!(
                    "covariance '{name}' of '{}' has dimension {}",
                    self.name,
                    cov.dim()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn flux_layout(n: usize) -> BandLayout {
        BandLayout::new(BTreeMap::from([("cv".to_string(), 1), ("flux".to_string(), n)])).unwrap()
    }

    fn edges() -> Binning {
        Binning::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap()
    }

    #[test]
    fn fill_routes_flows() {
        let mut h = Hist1D::new("h", "x", edges(), &BandLayout::cv_only());
        for x in [0.5, 1.5, 2.5, 0.5, -1.0, 3.5] {
            h.fill("cv", 0, x, 1.0).unwrap();
        }
        assert_eq!(h.cv().sumw, vec![1.0, 2.0, 1.0, 1.0, 1.0]);
        assert_eq!(h.cv_values(), vec![2.0, 1.0, 1.0]);
        assert_eq!(h.entries(), 6);
    }

    #[test]
    fn fill_with_weight_tracks_sumw2() {
        let mut h = Hist1D::new("h", "x", edges(), &BandLayout::cv_only());
        h.fill("cv", 0, 0.5, 2.0).unwrap();
        h.fill("cv", 0, 1.5, 3.0).unwrap();
        h.fill("cv", 0, 0.5, 1.0).unwrap();
        assert_eq!(h.cv_values(), vec![3.0, 3.0, 0.0]);
        assert_eq!(&h.cv().sumw2[1..3], &[5.0, 9.0]);
    }

    #[test]
    fn fill_unknown_universe_is_error() {
        let mut h = Hist1D::new("h", "x", edges(), &flux_layout(2));
        assert!(h.fill("flux", 2, 0.5, 1.0).is_err());
        assert!(h.fill("genie", 0, 0.5, 1.0).is_err());
        assert!(h.fill("cv", 0, 0.5, f64::NAN).is_err());
    }

    #[test]
    fn universes_accumulate_independently() {
        let mut h = Hist1D::new("h", "x", edges(), &flux_layout(2));
        h.fill("cv", 0, 0.5, 1.0).unwrap();
        h.fill("flux", 0, 0.5, 1.1).unwrap();
        h.fill("flux", 1, 0.5, 0.8).unwrap();
        assert_eq!(h.entries(), 1);
        let flux = h.bands().band("flux").unwrap();
        assert_relative_eq!(flux[0].sumw[1], 1.1);
        assert_relative_eq!(flux[1].sumw[1], 0.8);
        let errs = h.band_errors("flux").unwrap();
        assert_relative_eq!(errs[0].0, 0.1, epsilon = 1e-12);
        assert_relative_eq!(errs[0].1, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn merge_checks_binning_and_bands() {
        let mut a = Hist1D::new("a", "x", edges(), &flux_layout(2));
        let b = Hist1D::new("b", "x", Binning::new(vec![0.0, 1.0]).unwrap(), &flux_layout(2));
        assert!(matches!(a.merge(&b), Err(Error::Binning(_))));
        let c = Hist1D::new("c", "x", edges(), &flux_layout(3));
        assert!(matches!(a.merge(&c), Err(Error::Config(_))));
    }

    #[test]
    fn scale_width_divides_in_range_only() {
        let b = Binning::new(vec![0.0, 0.5, 2.0]).unwrap();
        let mut h = Hist1D::new("h", "x", b, &BandLayout::cv_only());
        h.fill("cv", 0, 0.25, 1.0).unwrap();
        h.fill("cv", 0, 1.0, 3.0).unwrap();
        h.fill("cv", 0, 5.0, 7.0).unwrap();
        h.scale_width();
        assert_relative_eq!(h.cv().sumw[1], 2.0);
        assert_relative_eq!(h.cv().sumw[2], 2.0);
        assert_relative_eq!(h.cv().sumw[3], 7.0);
        h.unscale_width();
        assert_relative_eq!(h.cv().sumw[2], 3.0);
    }

    #[test]
    fn divide_handles_zero_denominator() {
        let mut num = Hist1D::new("num", "x", edges(), &BandLayout::cv_only());
        let mut den = Hist1D::new("den", "x", edges(), &BandLayout::cv_only());
        num.fill("cv", 0, 0.5, 2.0).unwrap();
        num.fill("cv", 0, 1.5, 2.0).unwrap();
        den.fill("cv", 0, 0.5, 4.0).unwrap();
        num.divide(&den).unwrap();
        assert_relative_eq!(num.cv().sumw[1], 0.5);
        assert_eq!(num.cv().sumw[2], 0.0);
    }

    #[test]
    fn multiply_undoes_divide() {
        let mut h = Hist1D::new("h", "x", edges(), &BandLayout::cv_only());
        let mut f = Hist1D::new("f", "x", edges(), &BandLayout::cv_only());
        h.fill("cv", 0, 0.5, 3.0).unwrap();
        f.fill("cv", 0, 0.5, 4.0).unwrap();
        let before = h.cv().sumw[1];
        h.divide(&f).unwrap();
        h.multiply(&f).unwrap();
        assert_relative_eq!(h.cv().sumw[1], before, epsilon = 1e-12);
    }

    #[test]
    fn cv_with_uncertainty_adds_bands_in_quadrature() {
        let layout = BandLayout::new(BTreeMap::from([
            ("cv".to_string(), 1),
            ("a".to_string(), 2),
            ("b".to_string(), 1),
        ]))
        .unwrap();
        let mut h = Hist1D::new("h", "x", Binning::new(vec![0.0, 1.0]).unwrap(), &layout);
        // cv = 10 with sumw2 = 100 (one fill of weight 10).
        h.fill("cv", 0, 0.5, 10.0).unwrap();
        h.fill("a", 0, 0.5, 13.0).unwrap();
        h.fill("a", 1, 0.5, 10.0).unwrap();
        h.fill("b", 0, 0.5, 6.0).unwrap();
        let u = h.cv_with_uncertainty();
        assert_eq!(u.len(), 1);
        assert_relative_eq!(u[0].value, 10.0);
        assert_relative_eq!(u[0].stat, 10.0);
        assert_relative_eq!(u[0].err_up, (100.0_f64 + 9.0).sqrt());
        assert_relative_eq!(u[0].err_down, (100.0_f64 + 16.0).sqrt());
    }

    #[test]
    fn data_gets_missing_bands() {
        let mut data = Hist1D::new("data", "x", edges(), &BandLayout::cv_only());
        data.fill("cv", 0, 1.5, 1.0).unwrap();
        data.add_missing_bands(&flux_layout(4)).unwrap();
        assert_eq!(data.layout(), flux_layout(4));
        assert_eq!(data.band_errors("flux").unwrap()[1], (0.0, 0.0));
    }

    #[test]
    fn covariance_follows_scaling() {
        let axis = Binning::new(vec![0.0, 2.0]).unwrap();
        let mut h = Hist1D::new("h", "x", axis, &BandLayout::cv_only());
        let mut cells = vec![0.0; 9];
        cells[4] = 4.0;
        let cov = CovarianceMatrix::from_row_major(3, cells).unwrap();
        h.push_covariance("unfoldingCov", cov).unwrap();
        h.scale_width();
        assert_relative_eq!(h.covariance("unfoldingCov").unwrap().get(1, 1), 1.0);
        assert_relative_eq!(h.stat_variance(1), 1.0);
        assert!(h.push_covariance("bad", CovarianceMatrix::zeros(2)).is_err());
    }
}
