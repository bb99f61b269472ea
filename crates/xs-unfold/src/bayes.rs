//! D'Agostini iterative Bayesian unfolding.
//!
//! With response `P(r|t) = M[r][t] / T_t` (T the truth projection of the
//! migration matrix M) and efficiency `ε_t = Σ_r P(r|t)`, each iteration
//! folds the current prior `p`, builds the unfolding matrix
//! `U[t][r] = P(r|t) p_t / (f_r ε_t)` with `f = P p`, and sets `p ← U d`.
//! The statistical covariance of the result is `U diag(var_d) Uᵀ` using the
//! unfolding matrix of the last iteration.
//!
//! # References
//!
//! - G. D'Agostini, "A multidimensional unfolding method based on Bayes'
//!   theorem", Nucl. Instrum. Meth. A 362 (1995) 487.
//! - T. Adye, "Unfolding algorithms and tests using RooUnfold",
//!   PHYSTAT 2011, arXiv:1105.1160.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use xs_core::{Error, Result};
use xs_hist::{CV_BAND, CovarianceMatrix, Hist1D, Hist2D};

use crate::covariance::conform_covariance;

/// Iterations used for the statistical covariance unless overridden.
pub const NOMINAL_COVARIANCE_ITERATIONS: usize = 4;

/// Name under which the unfolding covariance is attached to the result.
pub const UNFOLDING_COVARIANCE: &str = "unfoldingCov";

/// Unfolded spectrum over in-range true bins.
#[derive(Debug, Clone, PartialEq)]
pub struct UnfoldResult {
    /// Unfolded contents.
    pub values: DVector<f64>,
    /// Statistical covariance of `values`.
    pub covariance: DMatrix<f64>,
}

/// Iterative Bayesian unfolding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BayesUnfold {
    iterations: usize,
    covariance_iterations: usize,
}

impl BayesUnfold {
    /// Unfold with `iterations` iterations. Zero is rejected when unfolding.
    pub fn new(iterations: usize) -> Self {
        Self { iterations, covariance_iterations: NOMINAL_COVARIANCE_ITERATIONS }
    }

    /// Iterations of the separate central-value run whose covariance is
    /// attached to the result.
    pub fn covariance_iterations(mut self, n: usize) -> Self {
        self.covariance_iterations = n;
        self
    }

    /// Production iteration count.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Unfold `data` (variance `data_var`) through `migration`, a
    /// `reco × true` matrix of event counts.
    pub fn unfold_vector(
        &self,
        data: &DVector<f64>,
        data_var: &DVector<f64>,
        migration: &DMatrix<f64>,
    ) -> Result<UnfoldResult> {
        iterate(data, data_var, migration, self.iterations)
    }

    /// Unfold every universe of `folded` through the same universe of
    /// `migration` (x = reco, y = true).
    ///
    /// Universes missing from `folded` use its central value. The result has
    /// the migration's true binning and error bands; its cv `sumw2` is the
    /// diagonal of the covariance, which is attached (diagonal zeroed) as
    /// [`UNFOLDING_COVARIANCE`].
    pub fn unfold_hist(&self, folded: &Hist1D, migration: &Hist2D) -> Result<Hist1D> {
        if folded.binning() != migration.x_binning() {
            return Err(Error::Unfolding(format!(
                "'{}' has {} bins but the reco axis of '{}' has {}",
                folded.name(),
                folded.binning().n_bins(),
                migration.name(),
                migration.x_binning().n_bins()
            )));
        }
        let layout = migration.layout();
        let keys: Vec<(String, usize)> = layout
            .iter()
            .flat_map(|(band, n)| (0..n).map(move |i| (band.to_string(), i)))
            .collect();

        let results = keys
            .par_iter()
            .map(|(band, i)| {
                let (data, var, response) = universe_inputs(folded, migration, band, *i)?;
                iterate(&data, &var, &response, self.iterations).map_err(|e| match e {
                    Error::Unfolding(msg) => Error::Unfolding(format!(
                        "'{}' universe {band}[{i}]: {msg}",
                        migration.name()
                    )),
                    other => other,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let true_binning = migration.y_binning().clone();
        let n_true = true_binning.n_bins();
        let mut out = Hist1D::new(
            format!("{}_unfolded", folded.name()),
            folded.title(),
            true_binning.clone(),
            &layout,
        );
        for ((band, i), res) in keys.iter().zip(&results) {
            let arr = out.bands_mut().universe_mut(band, *i)?;
            for t in 0..n_true {
                arr.sumw[t + 1] = res.values[t];
                arr.sumw2[t + 1] = res.covariance[(t, t)];
            }
        }

        let cv_cov = if self.covariance_iterations == self.iterations {
            let pos = keys.iter().position(|(b, i)| b == CV_BAND && *i == 0);
            match pos {
                Some(p) => results[p].covariance.clone(),
                None => return Err(Error::Unfolding("migration has no cv universe".into())),
            }
        } else {
            let (data, var, response) = universe_inputs(folded, migration, CV_BAND, 0)?;
            iterate(&data, &var, &response, self.covariance_iterations)?.covariance
        };

        let n_cells = true_binning.n_cells();
        let mut cells = DMatrix::<f64>::zeros(n_true + 2, n_true + 2);
        cells.view_mut((1, 1), (n_true, n_true)).copy_from(&cv_cov);
        let mut cells = conform_covariance(cells, n_cells);

        let cv = out.bands_mut().universe_mut(CV_BAND, 0)?;
        for c in 0..n_cells {
            cv.sumw2[c] = cells[(c, c)];
            cells[(c, c)] = 0.0;
        }
        let row_major = (0..n_cells).flat_map(|i| (0..n_cells).map(move |j| (i, j)));
        let cov = CovarianceMatrix::from_row_major(
            n_cells,
            row_major.map(|(i, j)| cells[(i, j)]).collect(),
        )?;
        out.push_covariance(UNFOLDING_COVARIANCE, cov)?;

        log::info!(
            "unfolded '{}' through '{}': {} iterations, {} universes",
            folded.name(),
            migration.name(),
            self.iterations,
            keys.len()
        );
        Ok(out)
    }
}

/// In-range data, variance and response of one universe.
fn universe_inputs(
    folded: &Hist1D,
    migration: &Hist2D,
    band: &str,
    index: usize,
) -> Result<(DVector<f64>, DVector<f64>, DMatrix<f64>)> {
    let arr = folded.bands().universe(band, index).unwrap_or_else(|_| folded.cv());
    let m = migration.matrix(band, index)?;
    let n_reco = migration.x_binning().n_bins();
    let n_true = migration.y_binning().n_bins();
    let data = DVector::from_fn(n_reco, |r, _| arr.sumw[r + 1]);
    let var = DVector::from_fn(n_reco, |r, _| arr.sumw2[r + 1]);
    let response = DMatrix::from_fn(n_reco, n_true, |r, t| m[r + 1][t + 1]);
    Ok((data, var, response))
}

fn iterate(
    data: &DVector<f64>,
    data_var: &DVector<f64>,
    migration: &DMatrix<f64>,
    iterations: usize,
) -> Result<UnfoldResult> {
    let (n_reco, n_true) = migration.shape();
    if iterations == 0 {
        return Err(Error::Unfolding("iteration count must be at least 1".into()));
    }
    if data.len() != n_reco || data_var.len() != n_reco {
        return Err(Error::Unfolding(format!(
            "data has {} bins, response has {n_reco} reco bins",
            data.len()
        )));
    }
    if migration.iter().chain(data.iter()).chain(data_var.iter()).any(|v| !v.is_finite()) {
        return Err(Error::Unfolding("non-finite input".into()));
    }

    let truth = DVector::from_iterator(n_true, migration.column_iter().map(|c| c.sum()));
    if truth.iter().all(|&t| t == 0.0) {
        return Err(Error::Unfolding("migration matrix is empty".into()));
    }

    let mut response = migration.clone();
    for (t, mut col) in response.column_iter_mut().enumerate() {
        if truth[t] != 0.0 {
            col /= truth[t];
        } else {
            col.fill(0.0);
        }
    }
    let efficiency = DVector::from_iterator(n_true, response.column_iter().map(|c| c.sum()));

    let mut prior = truth;
    let mut unfold = DMatrix::<f64>::zeros(n_true, n_reco);
    for _ in 0..iterations {
        let folded = &response * &prior;
        for t in 0..n_true {
            for r in 0..n_reco {
                unfold[(t, r)] = if folded[r] != 0.0 && efficiency[t] != 0.0 {
                    response[(r, t)] * prior[t] / (folded[r] * efficiency[t])
                } else {
                    0.0
                };
            }
        }
        prior = &unfold * data;
    }

    let covariance = &unfold * DMatrix::from_diagonal(data_var) * unfold.transpose();
    if prior.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
        return Err(Error::Unfolding("unfolding produced non-finite values".into()));
    }
    Ok(UnfoldResult { values: prior, covariance })
}
