//! Central value with an uncertainty envelope built from universe spread.

use serde::{Deserialize, Serialize};
use xs_core::{Error, Result};

/// Per-cell central value and asymmetric total uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinUncertainty {
    /// Central value.
    pub value: f64,
    /// Upward total uncertainty (stat ⊕ systematic).
    pub err_up: f64,
    /// Downward total uncertainty (stat ⊕ systematic).
    pub err_down: f64,
    /// Statistical part alone.
    pub stat: f64,
}

/// Deviation of one band around the central value in one cell.
///
/// One- and two-universe bands are treated as ±1σ shifts: the largest upward
/// and downward deviations are returned separately. Bands with more
/// universes are random throws: the rms deviation around `cv` is returned
/// symmetrically.
pub fn band_deviation(cv: f64, universes: &[f64]) -> (f64, f64) {
    match universes.len() {
        0 => (0.0, 0.0),
        1 | 2 => {
            let mut up = 0.0_f64;
            let mut down = 0.0_f64;
            for &u in universes {
                let d = u - cv;
                if d > 0.0 {
                    up = up.max(d);
                } else {
                    down = down.max(-d);
                }
            }
            (up, down)
        }
        n => {
            let ss: f64 = universes.iter().map(|u| (u - cv) * (u - cv)).sum();
            let rms = (ss / n as f64).sqrt();
            (rms, rms)
        }
    }
}

/// Square symmetric matrix stored row-major, indexed by histogram cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "CovarianceMatrixDto", try_from = "CovarianceMatrixDto")]
pub struct CovarianceMatrix {
    n: usize,
    data: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct CovarianceMatrixDto {
    n: usize,
    data: Vec<f64>,
}

impl From<CovarianceMatrix> for CovarianceMatrixDto {
    fn from(c: CovarianceMatrix) -> Self {
        Self { n: c.n, data: c.data }
    }
}

impl TryFrom<CovarianceMatrixDto> for CovarianceMatrix {
    type Error = String;
    fn try_from(dto: CovarianceMatrixDto) -> std::result::Result<Self, Self::Error> {
        CovarianceMatrix::from_row_major(dto.n, dto.data).map_err(|e| e.to_string())
    }
}

impl CovarianceMatrix {
    /// Wrap a row-major `n × n` buffer.
    pub fn from_row_major(n: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != n * n {
            return Err(Error::Validation(format!(
                "covariance buffer has {} entries, expected {n}x{n}",
                data.len()
            )));
        }
        Ok(Self { n, data })
    }

    /// Zero matrix.
    pub fn zeros(n: usize) -> Self {
        Self { n, data: vec![0.0; n * n] }
    }

    /// Dimension.
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Element `(i, j)`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    /// Set element `(i, j)`.
    pub fn set(&mut self, i: usize, j: usize, v: f64) {
        self.data[i * self.n + j] = v;
    }

    /// Diagonal entries.
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.get(i, i)).collect()
    }

    /// Row-major storage.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Element-wise `self += other`.
    pub(crate) fn add(&mut self, other: &CovarianceMatrix) -> Result<()> {
        if other.n != self.n {
            return Err(Error::Binning(format!(
                "cannot add {}x{} covariance to {}x{}",
                other.n, other.n, self.n, self.n
            )));
        }
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        Ok(())
    }

    /// Multiply every element by `f`.
    pub(crate) fn scale(&mut self, f: f64) {
        for v in &mut self.data {
            *v *= f;
        }
    }

    /// Multiply row `i` and column `i` by `f` (cell `i` rescaled by `f`).
    pub(crate) fn scale_cell(&mut self, i: usize, f: f64) {
        for j in 0..self.n {
            self.data[i * self.n + j] *= f;
            self.data[j * self.n + i] *= f;
        }
    }
}
