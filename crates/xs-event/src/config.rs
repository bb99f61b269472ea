//! JSON analysis configuration.
//!
//! ```json
//! {
//!   "schema_version": "xsec_analysis_v0",
//!   "weight_field": "wgt",
//!   "variations": { "n_flux_universes": 100 },
//!   "regions": [{
//!     "name": "tracker",
//!     "precuts": [{ "type": "max_angle", "field": "theta_mu", "degrees": 17.0 }],
//!     "signal": [{ "type": "equals", "field": "mc_current", "value": 1 }],
//!     "variables": [{
//!       "name": "pTmu", "label": "p_T [GeV/c]", "binning": [0.0, 0.25, 0.5, 1.0],
//!       "reco": { "field": "pt" }, "truth": { "field": "mc_pt" }
//!     }]
//!   }]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use xs_core::{Error, Result};
use xs_hist::Binning;

use crate::classify::VertexClassifier;
use crate::cuts::{CutSpec, RecoCut, TruthCut};
use crate::cutter::Cutter;
use crate::event_loop::EventLoop;
use crate::model::Model;
use crate::region::{DEFAULT_CURRENT_FIELD, Region};
use crate::variable::{RecoExtractor, TruthExtractor, Variable, Variable2D};
use crate::variation::{VariationConfig, VariationSet};

/// Schema tag expected in analysis configuration files.
pub const ANALYSIS_SCHEMA: &str = "xsec_analysis_v0";

/// How one side (reco or truth) of a variable is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuantityConfig {
    /// Field name.
    pub field: String,
    /// Multiplier applied after reading (e.g. `1e-3` for MeV to GeV).
    #[serde(default = "one")]
    pub scale: f64,
    /// Read element `candidate` of a vector field (reco only).
    #[serde(default)]
    pub candidate: bool,
}

fn one() -> f64 {
    1.0
}

/// One 1D observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableConfig {
    /// Name (histogram prefix).
    pub name: String,
    /// Axis label.
    #[serde(default)]
    pub label: String,
    /// Bin edges.
    pub binning: Binning,
    /// Reconstructed side.
    pub reco: QuantityConfig,
    /// Truth side.
    pub truth: QuantityConfig,
}

/// A 2D observable made of two 1D variables of the same region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Variable2DConfig {
    /// Name (histogram prefix).
    pub name: String,
    /// Name of the x variable.
    pub x: String,
    /// Name of the y variable.
    pub y: String,
}

/// One region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    /// Region name (target label in histogram names).
    pub name: String,
    /// Pre-selection, in order.
    #[serde(default)]
    pub precuts: Vec<CutSpec>,
    /// Mutually exclusive sidebands.
    #[serde(default)]
    pub sidebands: Vec<CutSpec>,
    /// Signal definition (truth).
    #[serde(default)]
    pub signal: Vec<CutSpec>,
    /// Phase space (truth).
    #[serde(default)]
    pub phase_space: Vec<CutSpec>,
    /// 1D observables.
    pub variables: Vec<VariableConfig>,
    /// 2D observables.
    #[serde(default)]
    pub variables_2d: Vec<Variable2DConfig>,
    /// Interaction-current field for background classification.
    #[serde(default = "default_current_field")]
    pub current_field: String,
    /// Vertex classification.
    #[serde(default)]
    pub vertex: Option<VertexClassifier>,
    /// Interaction-channel field; enables the per-channel splits.
    #[serde(default)]
    pub channel_field: Option<String>,
    /// Fiducial nucleon count.
    #[serde(default)]
    pub nucleons: Option<f64>,
}

fn default_current_field() -> String {
    DEFAULT_CURRENT_FIELD.to_string()
}

/// Flux input for the integrated-flux histograms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FluxConfig {
    /// Histogram file holding the spectrum.
    pub file: String,
    /// Histogram name in that file.
    #[serde(default = "default_flux_hist")]
    pub histogram: String,
    /// Lower neutrino energy.
    pub e_min: f64,
    /// Upper neutrino energy.
    pub e_max: f64,
}

fn default_flux_hist() -> String {
    "flux".to_string()
}

/// Top-level analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Must equal [`ANALYSIS_SCHEMA`].
    pub schema_version: String,
    /// Central MC weight field (none: unit weight).
    #[serde(default)]
    pub weight_field: Option<String>,
    /// Universes.
    #[serde(default)]
    pub variations: VariationConfig,
    /// Regions.
    pub regions: Vec<RegionConfig>,
    /// Flux integration.
    #[serde(default)]
    pub flux: Option<FluxConfig>,
    /// Free-form tags carried into logs.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl AnalysisConfig {
    /// Parse and check the schema tag.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: AnalysisConfig = serde_json::from_str(text)?;
        if cfg.schema_version != ANALYSIS_SCHEMA {
            return Err(Error::Config(format!(
                "unsupported schema_version '{}' (expected '{ANALYSIS_SCHEMA}')",
                cfg.schema_version
            )));
        }
        if cfg.regions.is_empty() {
            return Err(Error::Config("no regions configured".into()));
        }
        Ok(cfg)
    }

    /// Read a configuration file.
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Build regions, model and variation sets into a ready event loop.
    pub fn build(&self) -> Result<EventLoop> {
        let mc = VariationSet::from_config(&self.variations)?;
        let truth = VariationSet::from_config(&self.variations)?;
        let model = Model::standard(self.weight_field.as_deref());
        let regions = self.regions.iter().map(RegionConfig::build).collect::<Result<Vec<_>>>()?;
        for (k, v) in &self.tags {
            log::info!("tag {k} = {v}");
        }
        EventLoop::new(regions, model, mc, truth)
    }
}

impl RegionConfig {
    /// Build the region.
    pub fn build(&self) -> Result<Region> {
        let reco = |specs: &[CutSpec]| -> Result<Vec<Box<dyn RecoCut>>> {
            specs.iter().map(CutSpec::build_reco).collect()
        };
        let truth = |specs: &[CutSpec]| -> Result<Vec<Box<dyn TruthCut>>> {
            specs.iter().map(CutSpec::build_truth).collect()
        };
        let cutter = Cutter::new(
            reco(&self.precuts)?,
            reco(&self.sidebands)?,
            truth(&self.signal)?,
            truth(&self.phase_space)?,
        )?;

        let variables: Vec<Variable> =
            self.variables.iter().map(VariableConfig::build).collect::<Result<_>>()?;
        let mut variables_2d = Vec::with_capacity(self.variables_2d.len());
        for v2 in &self.variables_2d {
            let find = |name: &str| {
                variables.iter().find(|v| v.name() == name).ok_or_else(|| {
                    Error::Config(format!(
                        "region '{}': 2D variable '{}' refers to unknown variable '{name}'",
                        self.name, v2.name
                    ))
                })
            };
            variables_2d.push(Variable2D::new(&v2.name, find(&v2.x)?, find(&v2.y)?));
        }

        let mut region = Region::new(&self.name, cutter).current_field(&self.current_field);
        for v in variables {
            region = region.variable(v);
        }
        for v in variables_2d {
            region = region.variable_2d(v);
        }
        if let Some(c) = &self.vertex {
            region = region.vertex_classifier(c.clone());
        }
        if let Some(f) = &self.channel_field {
            region = region.channel_field(f);
        }
        if let Some(n) = self.nucleons {
            region = region.nucleons(n);
        }
        Ok(region)
    }
}

impl VariableConfig {
    /// Build the variable.
    pub fn build(&self) -> Result<Variable> {
        if self.truth.candidate {
            return Err(Error::Config(format!(
                "variable '{}': candidate selection is reco-only",
                self.name
            )));
        }
        for q in [&self.reco, &self.truth] {
            if !(q.scale.is_finite() && q.scale != 0.0) {
                return Err(Error::Config(format!(
                    "variable '{}': scale must be finite and non-zero",
                    self.name
                )));
            }
        }
        let reco = if self.reco.candidate {
            RecoExtractor::candidate(&self.reco.field, self.reco.scale)
        } else {
            RecoExtractor::field(&self.reco.field, self.reco.scale)
        };
        let truth = TruthExtractor::field(&self.truth.field, self.truth.scale);
        let label = if self.label.is_empty() { self.name.clone() } else { self.label.clone() };
        Ok(Variable::new(&self.name, label, self.binning.clone(), reco, truth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "schema_version": "xsec_analysis_v0",
        "weight_field": "wgt",
        "variations": { "n_flux_universes": 4 },
        "regions": [{
            "name": "tracker",
            "precuts": [{ "type": "max_angle", "field": "theta_mu", "degrees": 17.0 }],
            "signal": [{ "type": "equals", "field": "mc_current", "value": 1 }],
            "variables": [
                { "name": "pTmu", "binning": [0.0, 0.5, 1.0],
                  "reco": { "field": "pt" }, "truth": { "field": "mc_pt" } },
                { "name": "pZmu", "binning": [0.0, 5.0, 10.0],
                  "reco": { "field": "pz", "scale": 0.001 }, "truth": { "field": "mc_pz", "scale": 0.001 } }
            ],
            "variables_2d": [{ "name": "pZmu_pTmu", "x": "pZmu", "y": "pTmu" }],
            "nucleons": 3.2e30
        }]
    }"#;

    #[test]
    fn builds_event_loop() {
        let cfg = AnalysisConfig::from_json(CONFIG).unwrap();
        let lp = cfg.build().unwrap();
        let region = &lp.regions()[0];
        assert_eq!(region.name(), "tracker");
        assert_eq!(region.variables().len(), 2);
        assert_eq!(region.variables_2d()[0].name(), "pZmu_pTmu");
        assert_eq!(region.cutter().n_precuts(), 1);
        assert_eq!(region.variables()[0].hists().unwrap().prefix(), "pTmu_tracker");
    }

    #[test]
    fn wrong_schema_rejected() {
        let text = CONFIG.replace("xsec_analysis_v0", "xsec_analysis_v9");
        assert!(matches!(AnalysisConfig::from_json(&text), Err(Error::Config(_))));
    }

    #[test]
    fn unknown_2d_component_rejected() {
        let text = CONFIG.replace(r#""x": "pZmu""#, r#""x": "Emu""#);
        let cfg = AnalysisConfig::from_json(&text).unwrap();
        assert!(matches!(cfg.build(), Err(Error::Config(_))));
    }

    #[test]
    fn bad_binning_is_a_parse_error() {
        let text = CONFIG.replace("[0.0, 0.5, 1.0]", "[1.0, 0.5]");
        assert!(AnalysisConfig::from_json(&text).is_err());
    }
}
