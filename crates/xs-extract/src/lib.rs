//! # xs-extract
//!
//! Turns event-loop histograms into differential cross sections.
//!
//! For every (material, observable) pair the [`Extraction`] pipeline sums
//! the ingredients of the material's targets, subtracts exposure-scaled
//! backgrounds from data, unfolds through the migration matrix, divides by
//! the efficiency and normalizes by integrated flux, nucleon count, exposure
//! and bin width. A failing pair is reported and the others still run.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod ingredients;
pub mod normalize;
pub mod pipeline;

pub use background::subtract_backgrounds;
pub use ingredients::Ingredients;
pub use normalize::{UNIT_CONVERSION, denormalize, efficiency, normalize};
pub use pipeline::{
    CrossSectionArtifact, EXTRACTION_SCHEMA, Extraction, ExtractionConfig, ExtractionFailure,
    ExtractionReport, artifact_file_name,
};
