//! # xs-hist
//!
//! Weighted histogram accumulators for systematic-universe analyses.
//!
//! Every histogram owns one content array per universe, grouped in named
//! bands. Filling a universe never touches another, so the spread across a
//! band estimates that source's uncertainty while the `"cv"` band carries the
//! central value.
//!
//! ## Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use xs_hist::{BandLayout, Binning, Hist1D};
//!
//! let layout = BandLayout::new(BTreeMap::from([
//!     ("cv".to_string(), 1),
//!     ("flux".to_string(), 2),
//! ]))
//! .unwrap();
//! let mut h = Hist1D::new("pt", "p_T [GeV/c]", Binning::new(vec![0.0, 0.5, 1.0]).unwrap(), &layout);
//! h.fill("cv", 0, 0.3, 1.0).unwrap();
//! h.fill("flux", 0, 0.3, 1.1).unwrap();
//! h.fill("flux", 1, 0.3, 0.9).unwrap();
//! let bins = h.cv_with_uncertainty();
//! assert_eq!(bins[0].value, 1.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bands;
pub mod binning;
pub mod hist1d;
pub mod hist2d;
pub mod store;
pub mod uncertainty;

pub use bands::{BandLayout, Bands, BinArray, CV_BAND};
pub use binning::Binning;
pub use hist1d::Hist1D;
pub use hist2d::Hist2D;
pub use store::{HISTOGRAM_FILE_SCHEMA, HistogramFile, HistogramStore};
pub use uncertainty::{BinUncertainty, CovarianceMatrix, band_deviation};
