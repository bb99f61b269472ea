//! Covariance shape contract.

use nalgebra::DMatrix;

/// Force `cov` to `n × n`.
///
/// Unfolding back ends do not always agree on whether flow cells are part
/// of the covariance, so a mismatch is logged and resolved by truncating or
/// zero-padding from the top-left corner. Never fails.
pub fn conform_covariance(cov: DMatrix<f64>, n: usize) -> DMatrix<f64> {
    if cov.nrows() == n && cov.ncols() == n {
        return cov;
    }
    log::warn!(
        "covariance is {}x{} but the histogram has {n} cells; resizing to {n}x{n}",
        cov.nrows(),
        cov.ncols()
    );
    cov.resize(n, n, 0.0)
}
