//! # xs-event
//!
//! Systematic-universe event loop for cross-section analyses.
//!
//! Each simulated event is evaluated once per universe of a
//! [`VariationSet`]. A [`Region`]'s [`Cutter`] decides whether it is
//! selected and whether it is signal; its [`Variable`]s then fill reco,
//! migration, efficiency and background histograms for that universe.
//! [`EventLoop::finish`] moves everything into [`xs_hist::HistogramFile`]s
//! for the extraction step.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod config;
pub mod cuts;
pub mod cutter;
pub mod event;
pub mod event_loop;
pub mod flux;
pub mod model;
pub mod region;
pub mod source;
pub mod universe;
pub mod variable;
pub mod variation;

pub use classify::{
    BackgroundCategory, InteractionChannel, TruthOrigin, VertexCategory, VertexClassifier,
};
pub use config::{ANALYSIS_SCHEMA, AnalysisConfig, FluxConfig, RegionConfig, VariableConfig};
pub use cuts::{CutSpec, EventContext, RecoCut, TruthCut};
pub use cutter::{CutStats, CutTable, Cutter, Selection};
pub use event::{Event, TruthEvent};
pub use event_loop::{EventLoop, EventLoopOutput, Exposure, FluxIntegration, Pass, PassSummary};
pub use flux::{FluxSpectrum, flux_integral};
pub use model::{FieldWeight, Model, Reweighter, UniverseWeight};
pub use region::Region;
pub use source::ColumnarSource;
pub use universe::{CentralValue, LateralShift, Universe, UniverseKey, VectorWeight, WeightShift};
pub use variable::{RecoExtractor, RecoValue, TrueValue, TruthExtractor, Variable, Variable2D};
pub use variation::{FLUX_BAND, VariationConfig, VariationSet};
