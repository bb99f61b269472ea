//! Per-universe content storage shared by 1D and 2D histograms.
//!
//! A histogram does not *inherit* its systematic bands: it owns a [`Bands`]
//! map from band name to one [`BinArray`] per universe. The central value is
//! simply universe 0 of band [`CV_BAND`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use xs_core::{Error, Result};

/// Name of the band holding the central value.
pub const CV_BAND: &str = "cv";

/// Number of universes per band. Must contain `"cv"` with exactly one universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandLayout(BTreeMap<String, usize>);

impl BandLayout {
    /// Validate and wrap a band → universe-count map.
    pub fn new(bands: BTreeMap<String, usize>) -> Result<Self> {
        match bands.get(CV_BAND) {
            Some(1) => {}
            Some(n) => {
                return Err(Error::Config(format!(
                    "band \"{CV_BAND}\" must hold exactly one universe, found {n}"
                )));
            }
            None => return Err(Error::Config(format!("no \"{CV_BAND}\" band in layout"))),
        }
        if let Some((name, _)) = bands.iter().find(|(_, n)| **n == 0) {
            return Err(Error::Config(format!("band \"{name}\" has no universes")));
        }
        Ok(Self(bands))
    }

    /// Layout with only the central value (data histograms).
    pub fn cv_only() -> Self {
        Self(BTreeMap::from([(CV_BAND.to_string(), 1)]))
    }

    /// Universe count of `band`, if present.
    pub fn n_universes(&self, band: &str) -> Option<usize> {
        self.0.get(band).copied()
    }

    /// Bands in name order with their universe counts.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Total number of universes, cv included.
    pub fn total_universes(&self) -> usize {
        self.0.values().sum()
    }

    /// Fail with [`Error::Config`] unless both layouts are identical.
    pub fn ensure_same(&self, other: &BandLayout, what: &str) -> Result<()> {
        if self != other {
            let mine: Vec<_> = self.iter().map(|(b, n)| format!("{b}:{n}")).collect();
            let theirs: Vec<_> = other.iter().map(|(b, n)| format!("{b}:{n}")).collect();
            return Err(Error::Config(format!(
                "{what}: error band mismatch [{}] vs [{}]",
                mine.join(", "),
                theirs.join(", ")
            )));
        }
        Ok(())
    }
}

/// Sum of weights and sum of squared weights per cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinArray {
    /// Sum of weights per cell.
    pub sumw: Vec<f64>,
    /// Sum of squared weights per cell.
    pub sumw2: Vec<f64>,
}

impl BinArray {
    /// Zero-filled array of `n_cells` cells.
    pub fn zeros(n_cells: usize) -> Self {
        Self { sumw: vec![0.0; n_cells], sumw2: vec![0.0; n_cells] }
    }

    #[inline]
    pub(crate) fn fill(&mut self, cell: usize, weight: f64) {
        self.sumw[cell] += weight;
        self.sumw2[cell] += weight * weight;
    }

    pub(crate) fn add_scaled(&mut self, other: &BinArray, c: f64) {
        for (a, b) in self.sumw.iter_mut().zip(&other.sumw) {
            *a += c * b;
        }
        let c2 = c * c;
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += c2 * b;
        }
    }

    pub(crate) fn scale_cell(&mut self, cell: usize, f: f64) {
        self.sumw[cell] *= f;
        self.sumw2[cell] *= f * f;
    }

    /// Sum over every cell, flows included.
    pub fn total(&self) -> f64 {
        self.sumw.iter().sum()
    }
}

/// Content arrays for every universe of every band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    n_cells: usize,
    bands: BTreeMap<String, Vec<BinArray>>,
}

impl Bands {
    /// Zero-filled bands for `layout`, each array of `n_cells` cells.
    pub fn new(layout: &BandLayout, n_cells: usize) -> Self {
        let bands = layout
            .iter()
            .map(|(name, n)| (name.to_string(), vec![BinArray::zeros(n_cells); n]))
            .collect();
        Self { n_cells, bands }
    }

    /// Layout these bands were built for.
    pub fn layout(&self) -> BandLayout {
        BandLayout(self.bands.iter().map(|(k, v)| (k.clone(), v.len())).collect())
    }

    /// Check a deserialized value: valid layout and consistent array sizes.
    pub fn validate(&self, expected_cells: usize) -> Result<()> {
        BandLayout::new(self.layout().0)?;
        if self.n_cells != expected_cells {
            return Err(Error::Binning(format!(
                "bands hold {} cells, binning needs {expected_cells}",
                self.n_cells
            )));
        }
        for (name, universes) in &self.bands {
            for (i, u) in universes.iter().enumerate() {
                if u.sumw.len() != self.n_cells || u.sumw2.len() != self.n_cells {
                    return Err(Error::Binning(format!(
                        "band \"{name}\" universe {i} has {} cells, expected {}",
                        u.sumw.len(),
                        self.n_cells
                    )));
                }
            }
        }
        Ok(())
    }

    /// Cells per array.
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// Central-value array.
    pub fn cv(&self) -> &BinArray {
        // BandLayout::new guarantees the cv band exists with one universe.
        &self.bands[CV_BAND][0]
    }

    /// All universes of `band`.
    pub fn band(&self, band: &str) -> Option<&[BinArray]> {
        self.bands.get(band).map(|v| v.as_slice())
    }

    /// Iterate bands in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[BinArray])> {
        self.bands.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Iterate every universe array mutably.
    pub fn arrays_mut(&mut self) -> impl Iterator<Item = &mut BinArray> {
        self.bands.values_mut().flat_map(|v| v.iter_mut())
    }

    /// Universe `index` of `band`.
    pub fn universe(&self, band: &str, index: usize) -> Result<&BinArray> {
        self.bands
            .get(band)
            .and_then(|v| v.get(index))
            .ok_or_else(|| Error::Config(format!("no universe {index} in band \"{band}\"")))
    }

    /// Mutable universe `index` of `band`.
    pub fn universe_mut(&mut self, band: &str, index: usize) -> Result<&mut BinArray> {
        self.bands
            .get_mut(band)
            .and_then(|v| v.get_mut(index))
            .ok_or_else(|| Error::Config(format!("no universe {index} in band \"{band}\"")))
    }

    /// Element-wise `self += c * other` for every universe; layouts must match.
    pub fn add_scaled(&mut self, other: &Bands, c: f64) -> Result<()> {
        self.layout().ensure_same(&other.layout(), "add")?;
        if self.n_cells != other.n_cells {
            return Err(Error::Binning(format!(
                "add: cell count mismatch {} vs {}",
                self.n_cells, other.n_cells
            )));
        }
        for (name, mine) in self.bands.iter_mut() {
            for (a, b) in mine.iter_mut().zip(&other.bands[name]) {
                a.add_scaled(b, c);
            }
        }
        Ok(())
    }

    /// Multiply every universe by `f`.
    pub fn scale(&mut self, f: f64) {
        for arr in self.arrays_mut() {
            for cell in 0..arr.sumw.len() {
                arr.scale_cell(cell, f);
            }
        }
    }

    /// Add every band of `layout` that is missing here, each universe a copy
    /// of the central value. Bands present in both must agree in size.
    pub fn fill_missing_from_cv(&mut self, layout: &BandLayout) -> Result<()> {
        let cv = self.cv().clone();
        for (name, n) in layout.iter() {
            match self.bands.get(name) {
                Some(existing) if existing.len() != n => {
                    return Err(Error::Config(format!(
                        "band \"{name}\" has {} universes, expected {n}",
                        existing.len()
                    )));
                }
                Some(_) => {}
                None => {
                    self.bands.insert(name.to_string(), vec![cv.clone(); n]);
                }
            }
        }
        Ok(())
    }
}
