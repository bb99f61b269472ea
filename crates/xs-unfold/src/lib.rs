//! # xs-unfold
//!
//! Bayesian iterative unfolding (D'Agostini) of reconstructed distributions.
//!
//! [`BayesUnfold::unfold_hist`] unfolds every universe of a background
//! subtracted histogram through the same universe of a migration matrix and
//! attaches the statistical covariance of the central value as
//! [`UNFOLDING_COVARIANCE`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bayes;
pub mod covariance;
pub mod response;

pub use bayes::{BayesUnfold, NOMINAL_COVARIANCE_ITERATIONS, UNFOLDING_COVARIANCE, UnfoldResult};
pub use covariance::conform_covariance;
pub use response::ResponseSummary;
