//! Event categories used to split selected events.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use xs_core::Result;

use crate::event::{Event, TruthEvent};

/// Interaction-current code of neutral-current events.
pub const NEUTRAL_CURRENT: i64 = 2;

/// Background class of a selected event that fails the signal definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackgroundCategory {
    /// Neutral-current interaction.
    NeutralCurrent,
    /// Anything else.
    Other,
}

impl BackgroundCategory {
    /// Every category, in storage order.
    pub const ALL: [BackgroundCategory; 2] =
        [BackgroundCategory::NeutralCurrent, BackgroundCategory::Other];

    /// Classify from the interaction-current field.
    pub fn classify(event: &TruthEvent<'_>, current_field: &str) -> Result<Self> {
        Ok(if event.int(current_field)? == NEUTRAL_CURRENT {
            BackgroundCategory::NeutralCurrent
        } else {
            BackgroundCategory::Other
        })
    }

    /// Short label used in histogram names.
    pub fn label(self) -> &'static str {
        match self {
            BackgroundCategory::NeutralCurrent => "NC",
            BackgroundCategory::Other => "Other",
        }
    }
}

impl fmt::Display for BackgroundCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// GENIE interaction channel of a simulated event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InteractionChannel {
    /// Quasi-elastic (code 1).
    QuasiElastic,
    /// Resonant pion production (code 2).
    Resonant,
    /// Deep inelastic (code 3).
    DeepInelastic,
    /// Meson-exchange current, 2p2h (code 8).
    TwoParticleTwoHole,
    /// Any other code.
    Other,
}

impl InteractionChannel {
    /// Map a GENIE interaction-type code.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => InteractionChannel::QuasiElastic,
            2 => InteractionChannel::Resonant,
            3 => InteractionChannel::DeepInelastic,
            8 => InteractionChannel::TwoParticleTwoHole,
            _ => InteractionChannel::Other,
        }
    }

    /// Classify from the interaction-type field.
    pub fn classify(event: &TruthEvent<'_>, channel_field: &str) -> Result<Self> {
        Ok(Self::from_code(event.int(channel_field)?))
    }

    /// Label used in histogram names.
    pub fn label(self) -> &'static str {
        match self {
            InteractionChannel::QuasiElastic => "QE",
            InteractionChannel::Resonant => "RES",
            InteractionChannel::DeepInelastic => "DIS",
            InteractionChannel::TwoParticleTwoHole => "2p2h",
            InteractionChannel::Other => "Other",
        }
    }
}

impl fmt::Display for InteractionChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a simulated interaction really happened, for events reconstructed
/// next to a target or in a sideband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TruthOrigin {
    /// Inside a nuclear target.
    Target,
    /// In the planes just upstream of a target.
    Upstream,
    /// In the planes just downstream of a target.
    Downstream,
    /// Anywhere else.
    Other,
}

impl TruthOrigin {
    /// Label used in histogram names.
    pub fn label(self) -> &'static str {
        match self {
            TruthOrigin::Target => "TrueTarget",
            TruthOrigin::Upstream => "TrueUS",
            TruthOrigin::Downstream => "TrueDS",
            TruthOrigin::Other => "TrueOther",
        }
    }
}

impl fmt::Display for TruthOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a selected event's reconstructed vertex sits relative to the
/// passive nuclear targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VertexCategory {
    /// Inside solid target `n`.
    Target(i64),
    /// Inside the water target.
    Water,
    /// In the planes just upstream of target `n`.
    Upstream(i64),
    /// In the planes just downstream of target `n`.
    Downstream(i64),
    /// Anywhere else.
    Elsewhere,
}

impl VertexCategory {
    /// Label used in histogram names.
    pub fn label(self) -> String {
        match self {
            VertexCategory::Target(n) => format!("Target{n}"),
            VertexCategory::Water => "Water".to_string(),
            VertexCategory::Upstream(n) => format!("US_Target{n}"),
            VertexCategory::Downstream(n) => format!("DS_Target{n}"),
            VertexCategory::Elsewhere => "Other".to_string(),
        }
    }
}

impl fmt::Display for VertexCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Field names and lookup tables for vertex classification.
///
/// A plane is addressed by `module * 10 + plane`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VertexClassifier {
    /// Reconstructed target code field.
    #[serde(default = "default_target_field")]
    pub target_field: String,
    /// Reconstructed segment field.
    #[serde(default = "default_segment_field")]
    pub segment_field: String,
    /// Reconstructed vertex module field.
    #[serde(default = "default_module_field")]
    pub module_field: String,
    /// Reconstructed vertex plane field.
    #[serde(default = "default_plane_field")]
    pub plane_field: String,
    /// Segment number of the water target.
    #[serde(default = "default_water_segment")]
    pub water_segment: i64,
    /// Highest solid-target code.
    #[serde(default = "default_n_targets")]
    pub n_targets: i64,
    /// Module-plane codes just upstream of each target.
    #[serde(default)]
    pub upstream_planes: BTreeMap<i64, i64>,
    /// Module-plane codes just downstream of each target.
    #[serde(default)]
    pub downstream_planes: BTreeMap<i64, i64>,
    /// True target id field (positive inside a target).
    #[serde(default = "default_truth_target_field")]
    pub truth_target_field: String,
    /// True vertex module field.
    #[serde(default = "default_truth_module_field")]
    pub truth_module_field: String,
    /// True vertex plane field.
    #[serde(default = "default_truth_plane_field")]
    pub truth_plane_field: String,
}

fn default_target_field() -> String {
    "ann_target_code".to_string()
}
fn default_segment_field() -> String {
    "ann_segment".to_string()
}
fn default_module_field() -> String {
    "ann_vtx_module".to_string()
}
fn default_plane_field() -> String {
    "ann_vtx_plane".to_string()
}
fn default_truth_target_field() -> String {
    "truth_target_id".to_string()
}
fn default_truth_module_field() -> String {
    "truth_vtx_module".to_string()
}
fn default_truth_plane_field() -> String {
    "truth_vtx_plane".to_string()
}
fn default_water_segment() -> i64 {
    36
}
fn default_n_targets() -> i64 {
    5
}

impl Default for VertexClassifier {
    fn default() -> Self {
        Self {
            target_field: default_target_field(),
            segment_field: default_segment_field(),
            module_field: default_module_field(),
            plane_field: default_plane_field(),
            water_segment: default_water_segment(),
            n_targets: default_n_targets(),
            upstream_planes: BTreeMap::new(),
            downstream_planes: BTreeMap::new(),
            truth_target_field: default_truth_target_field(),
            truth_module_field: default_truth_module_field(),
            truth_plane_field: default_truth_plane_field(),
        }
    }
}

impl VertexClassifier {
    /// Classify the reconstructed vertex of `event`.
    pub fn classify(&self, event: &Event<'_>) -> Result<VertexCategory> {
        if event.int(&self.segment_field)? == self.water_segment {
            return Ok(VertexCategory::Water);
        }
        let code = event.int(&self.target_field)?;
        if (1..=self.n_targets).contains(&code) {
            return Ok(VertexCategory::Target(code));
        }
        let mod_plane = event.int(&self.module_field)? * 10 + event.int(&self.plane_field)?;
        if let Some(t) = self.upstream_planes.get(&mod_plane) {
            return Ok(VertexCategory::Upstream(*t));
        }
        if let Some(t) = self.downstream_planes.get(&mod_plane) {
            return Ok(VertexCategory::Downstream(*t));
        }
        Ok(VertexCategory::Elsewhere)
    }

    /// Classify the true vertex of a simulated event.
    pub fn truth_origin(&self, event: &TruthEvent<'_>) -> Result<TruthOrigin> {
        if event.int(&self.truth_target_field)? > 0 {
            return Ok(TruthOrigin::Target);
        }
        let mod_plane =
            event.int(&self.truth_module_field)? * 10 + event.int(&self.truth_plane_field)?;
        Ok(if self.upstream_planes.contains_key(&mod_plane) {
            TruthOrigin::Upstream
        } else if self.downstream_planes.contains_key(&mod_plane) {
            TruthOrigin::Downstream
        } else {
            TruthOrigin::Other
        })
    }
}
