//! Two-dimensional histogram accumulator (migration matrices, 2D observables).

use serde::{Deserialize, Serialize};
use xs_core::{Error, Result};

use crate::bands::{BandLayout, Bands, BinArray, CV_BAND};
use crate::binning::Binning;
use crate::hist1d::Hist1D;

/// A 2D histogram holding one content array per universe.
///
/// Cells are stored x-fastest: cell `(ix, iy)` lives at `iy * nx_cells + ix`,
/// with flows on both axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist2D {
    name: String,
    title: String,
    x: Binning,
    y: Binning,
    bands: Bands,
    entries: u64,
}

impl Hist2D {
    /// Empty histogram for every universe in `layout`.
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        x: Binning,
        y: Binning,
        layout: &BandLayout,
    ) -> Self {
        let bands = Bands::new(layout, x.n_cells() * y.n_cells());
        Self { name: name.into(), title: title.into(), x, y, bands, entries: 0 }
    }

    /// Histogram name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename in place.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Axis titles.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// X-axis binning.
    pub fn x_binning(&self) -> &Binning {
        &self.x
    }

    /// Y-axis binning.
    pub fn y_binning(&self) -> &Binning {
        &self.y
    }

    /// Band layout.
    pub fn layout(&self) -> BandLayout {
        self.bands.layout()
    }

    /// Universe contents.
    pub fn bands(&self) -> &Bands {
        &self.bands
    }

    /// Central-value array.
    pub fn cv(&self) -> &BinArray {
        self.bands.cv()
    }

    /// Number of central-value fills.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Flat index of cell `(ix, iy)`.
    #[inline]
    pub fn cell(&self, ix: usize, iy: usize) -> usize {
        iy * self.x.n_cells() + ix
    }

    /// Add `weight` at `(x, y)` in universe `index` of `band`.
    pub fn fill(&mut self, band: &str, index: usize, x: f64, y: f64, weight: f64) -> Result<()> {
        if !weight.is_finite() {
            return Err(Error::Data(format!(
                "non-finite weight {weight} filling '{}' ({band}[{index}])",
                self.name
            )));
        }
        let cell = self.cell(self.x.find_cell(x), self.y.find_cell(y));
        self.bands.universe_mut(band, index)?.fill(cell, weight);
        if band == CV_BAND {
            self.entries += 1;
        }
        Ok(())
    }

    fn ensure_same_axes(&self, other: &Hist2D, what: &str) -> Result<()> {
        self.x.ensure_same(&other.x, &format!("{what} (x axis)"))?;
        self.y.ensure_same(&other.y, &format!("{what} (y axis)"))
    }

    /// Add `other` cell-by-cell in every universe.
    pub fn merge(&mut self, other: &Hist2D) -> Result<()> {
        self.add_scaled(other, 1.0)?;
        self.entries += other.entries;
        Ok(())
    }

    /// `self += c * other` in every universe.
    pub fn add_scaled(&mut self, other: &Hist2D, c: f64) -> Result<()> {
        self.ensure_same_axes(other, &format!("adding '{}' to '{}'", other.name, self.name))?;
        self.bands.add_scaled(&other.bands, c)
    }

    /// Multiply every universe by `f`.
    pub fn scale(&mut self, f: f64) {
        self.bands.scale(f);
    }

    /// Give this histogram every band of `layout` it lacks (copies of cv).
    pub fn add_missing_bands(&mut self, layout: &BandLayout) -> Result<()> {
        self.bands.fill_missing_from_cv(layout)
    }

    /// Content of universe `index` of `band` as `matrix[ix][iy]`, flows included.
    pub fn matrix(&self, band: &str, index: usize) -> Result<Vec<Vec<f64>>> {
        let arr = self.bands.universe(band, index)?;
        Ok((0..self.x.n_cells())
            .map(|ix| (0..self.y.n_cells()).map(|iy| arr.sumw[self.cell(ix, iy)]).collect())
            .collect())
    }

    fn project(&self, onto_x: bool) -> Hist1D {
        let (axis, name) = if onto_x {
            (self.x.clone(), format!("{}_px", self.name))
        } else {
            (self.y.clone(), format!("{}_py", self.name))
        };
        let mut out = Hist1D::new(name, self.title.clone(), axis, &self.layout());
        for (band, universes) in self.bands.iter() {
            for (i, src) in universes.iter().enumerate() {
                // Band/universe come from our own layout, which `out` shares.
                let Ok(dst) = out.bands_mut().universe_mut(band, i) else { continue };
                for iy in 0..self.y.n_cells() {
                    for ix in 0..self.x.n_cells() {
                        let c = self.cell(ix, iy);
                        let k = if onto_x { ix } else { iy };
                        dst.sumw[k] += src.sumw[c];
                        dst.sumw2[k] += src.sumw2[c];
                    }
                }
            }
        }
        out
    }

    /// Sum over y (flows included) for every x cell.
    pub fn project_x(&self) -> Hist1D {
        self.project(true)
    }

    /// Sum over x (flows included) for every y cell.
    pub fn project_y(&self) -> Hist1D {
        self.project(false)
    }

    /// Check invariants of a deserialized histogram.
    pub fn validate(&self) -> Result<()> {
        self.bands.validate(self.x.n_cells() * self.y.n_cells())
    }
}
