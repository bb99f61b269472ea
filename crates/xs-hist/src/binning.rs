//! Variable-width binning with explicit underflow/overflow cells.

use serde::{Deserialize, Serialize};
use xs_core::{Error, Result};

/// Sorted bin edges of one axis.
///
/// Cell indices follow the usual convention: cell `0` is the underflow,
/// cells `1..=n_bins` are the bins, cell `n_bins + 1` is the overflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Binning {
    edges: Vec<f64>,
}

impl Binning {
    /// Build a binning from strictly increasing, finite edges.
    pub fn new(edges: impl Into<Vec<f64>>) -> Result<Self> {
        let edges = edges.into();
        if edges.len() < 2 {
            return Err(Error::Binning(format!(
                "need at least 2 edges to define a bin, got {}",
                edges.len()
            )));
        }
        if let Some(bad) = edges.iter().find(|e| !e.is_finite()) {
            return Err(Error::Binning(format!("non-finite bin edge {bad}")));
        }
        for (i, pair) in edges.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(Error::Binning(format!(
                    "edges must be strictly increasing (edge {} = {} >= edge {} = {})",
                    i,
                    pair[0],
                    i + 1,
                    pair[1]
                )));
            }
        }
        Ok(Self { edges })
    }

    /// `n` equal-width bins on `[lo, hi)`.
    pub fn uniform(n: usize, lo: f64, hi: f64) -> Result<Self> {
        if n == 0 {
            return Err(Error::Binning("uniform binning needs at least one bin".into()));
        }
        let width = (hi - lo) / n as f64;
        Self::new((0..=n).map(|i| lo + width * i as f64).collect::<Vec<_>>())
    }

    /// Bin edges (length = n_bins + 1).
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of bins, excluding under/overflow.
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Number of cells, including under/overflow.
    pub fn n_cells(&self) -> usize {
        self.edges.len() + 1
    }

    /// Lower edge of the first bin.
    pub fn low(&self) -> f64 {
        self.edges[0]
    }

    /// Upper edge of the last bin.
    pub fn high(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Cell containing `value`. NaN lands in the underflow.
    pub fn find_cell(&self, value: f64) -> usize {
        if value.is_nan() || value < self.low() {
            return 0;
        }
        if value >= self.high() {
            return self.n_cells() - 1;
        }
        // partition_point: number of edges <= value, which is the 1-based bin.
        self.edges.partition_point(|&e| e <= value)
    }

    /// Width of cell `cell`; under/overflow have no width.
    pub fn width(&self, cell: usize) -> Option<f64> {
        if cell == 0 || cell > self.n_bins() {
            return None;
        }
        Some(self.edges[cell] - self.edges[cell - 1])
    }

    /// Centre of bin `cell` (1-based).
    pub fn center(&self, cell: usize) -> Option<f64> {
        if cell == 0 || cell > self.n_bins() {
            return None;
        }
        Some(0.5 * (self.edges[cell] + self.edges[cell - 1]))
    }

    /// Fail with [`Error::Binning`] unless `other` has identical edges.
    pub fn ensure_same(&self, other: &Binning, what: &str) -> Result<()> {
        if self != other {
            return Err(Error::Binning(format!(
                "{what}: binning mismatch ({} bins on [{}, {}] vs {} bins on [{}, {}])",
                self.n_bins(),
                self.low(),
                self.high(),
                other.n_bins(),
                other.low(),
                other.high()
            )));
        }
        Ok(())
    }
}

impl TryFrom<Vec<f64>> for Binning {
    type Error = Error;

    fn try_from(edges: Vec<f64>) -> Result<Self> {
        Binning::new(edges)
    }
}

impl From<Binning> for Vec<f64> {
    fn from(b: Binning) -> Self {
        b.edges
    }
}
