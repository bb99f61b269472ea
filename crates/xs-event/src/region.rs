//! A detector region: one cutter plus the observables filled behind it.

use xs_core::{Error, Result};
use xs_hist::BandLayout;

use crate::classify::{BackgroundCategory, InteractionChannel, VertexCategory, VertexClassifier};
use crate::cuts::EventContext;
use crate::cutter::Cutter;
use crate::event::Event;
use crate::model::Model;
use crate::universe::{Universe, UniverseKey};
use crate::variable::{Variable, Variable2D};

/// Default interaction-current field used for background classification.
pub const DEFAULT_CURRENT_FIELD: &str = "mc_current";

/// Cuts and observables for one region (e.g. `"tracker"`, `"nuke"`).
///
/// # Example
///
/// ```
/// use xs_event::{Cutter, CutSpec, Region, Variable};
/// use xs_hist::Binning;
///
/// let cutter = Cutter::new(
///     vec![CutSpec::Above { field: "emu".into(), value: 2.0, name: None }.build_reco().unwrap()],
///     vec![],
///     vec![],
///     vec![],
/// )
/// .unwrap();
/// let region = Region::new("tracker", cutter)
///     .variable(Variable::from_fields(
///         "pTmu",
///         "p_T [GeV/c]",
///         Binning::new(vec![0.0, 0.5, 1.0]).unwrap(),
///         "pt",
///         "mc_pt",
///     ))
///     .nucleons(3.2e30);
/// assert_eq!(region.name(), "tracker");
/// ```
pub struct Region {
    name: String,
    cutter: Cutter,
    variables: Vec<Variable>,
    variables_2d: Vec<Variable2D>,
    vertex_classifier: Option<VertexClassifier>,
    current_field: String,
    channel_field: Option<String>,
    nucleons: Option<f64>,
}

impl Region {
    /// Region named `name` selecting with `cutter`.
    pub fn new(name: impl Into<String>, cutter: Cutter) -> Self {
        Self {
            name: name.into(),
            cutter,
            variables: Vec::new(),
            variables_2d: Vec::new(),
            vertex_classifier: None,
            current_field: DEFAULT_CURRENT_FIELD.to_string(),
            channel_field: None,
            nucleons: None,
        }
    }

    /// Add a 1D observable.
    pub fn variable(mut self, variable: Variable) -> Self {
        self.variables.push(variable);
        self
    }

    /// Add a 2D observable.
    pub fn variable_2d(mut self, variable: Variable2D) -> Self {
        self.variables_2d.push(variable);
        self
    }

    /// Split selected events by reconstructed vertex position.
    pub fn vertex_classifier(mut self, classifier: VertexClassifier) -> Self {
        self.vertex_classifier = Some(classifier);
        self
    }

    /// Field holding the interaction-current code.
    pub fn current_field(mut self, field: impl Into<String>) -> Self {
        self.current_field = field.into();
        self
    }

    /// Split selected signal (and in-target events) by the interaction
    /// channel read from `field`.
    pub fn channel_field(mut self, field: impl Into<String>) -> Self {
        self.channel_field = Some(field.into());
        self
    }

    /// Fiducial nucleon count, written next to the histograms.
    pub fn nucleons(mut self, n: f64) -> Self {
        self.nucleons = Some(n);
        self
    }

    /// Region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cutter.
    pub fn cutter(&self) -> &Cutter {
        &self.cutter
    }

    pub(crate) fn cutter_mut(&mut self) -> &mut Cutter {
        &mut self.cutter
    }

    /// 1D observables.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// 2D observables.
    pub fn variables_2d(&self) -> &[Variable2D] {
        &self.variables_2d
    }

    /// Fiducial nucleon count, if set.
    pub fn fiducial_nucleons(&self) -> Option<f64> {
        self.nucleons
    }

    pub(crate) fn into_parts(self) -> (String, Vec<Variable>, Vec<Variable2D>, Option<f64>) {
        (self.name, self.variables, self.variables_2d, self.nucleons)
    }

    pub(crate) fn initialize(&mut self, mc: &BandLayout, truth: &BandLayout) -> Result<()> {
        if let Some(n) = self.nucleons
            && !(n.is_finite() && n > 0.0)
        {
            return Err(Error::Config(format!(
                "region '{}': fiducial nucleons must be > 0, got {n}",
                self.name
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        let names = self
            .variables
            .iter()
            .map(|v| v.name())
            .chain(self.variables_2d.iter().map(|v| v.name()));
        for name in names {
            if !seen.insert(name.to_string()) {
                return Err(Error::Config(format!(
                    "region '{}': duplicate variable '{name}'",
                    self.name
                )));
            }
        }
        for v in &mut self.variables {
            v.initialize(&self.name, mc, truth)?;
        }
        for v in &mut self.variables_2d {
            v.initialize(&self.name, mc, truth)?;
        }
        Ok(())
    }

    /// One simulated entry in one universe.
    pub(crate) fn process_mc_reco(
        &mut self,
        event: &Event<'_>,
        universe: &dyn Universe,
        key: UniverseKey<'_>,
        model: &Model,
        cv_weight: f64,
    ) -> Result<()> {
        let mut ctx = EventContext::default();
        if !self.cutter.is_mc_selected(event, universe, &mut ctx, cv_weight)?.all() {
            return Ok(());
        }
        let weight = model.weight(event, universe)?;
        let truth = event.truth()?;

        if let Some(i) = ctx.sideband {
            let sideband = sideband_name(&self.cutter, i)?;
            let origin = match &self.vertex_classifier {
                Some(c) => Some(c.truth_origin(&truth)?),
                None => None,
            };
            for v in &mut self.variables {
                let r = v.reco_value(event, universe, &ctx)?;
                v.fill_mc_sideband(sideband, origin, key, r, weight)?;
            }
            return Ok(());
        }

        let vertex = match &self.vertex_classifier {
            Some(c) => Some(c.classify(event)?),
            None => None,
        };
        let in_target = matches!(vertex, Some(VertexCategory::Target(_) | VertexCategory::Water));
        let channel = match &self.channel_field {
            Some(f) if in_target => Some(InteractionChannel::classify(&truth, f)?),
            _ => None,
        };
        let origin = match (&self.vertex_classifier, vertex) {
            (Some(c), Some(VertexCategory::Upstream(_) | VertexCategory::Downstream(_))) => {
                Some(c.truth_origin(&truth)?)
            }
            _ => None,
        };

        let mut reco = Vec::with_capacity(self.variables.len());
        for v in &mut self.variables {
            let r = v.reco_value(event, universe, &ctx)?;
            v.fill_mc_reco(key, r, weight)?;
            if let Some(cat) = vertex {
                v.fill_mc_by_vertex(cat, key, r, weight)?;
                if let Some(ch) = channel {
                    v.fill_mc_by_channel(cat, ch, key, r, weight)?;
                }
                if let Some(o) = origin {
                    v.fill_mc_by_origin(cat, o, key, r, weight)?;
                }
            }
            reco.push(r);
        }
        let mut reco_2d = Vec::with_capacity(self.variables_2d.len());
        for v in &mut self.variables_2d {
            let r = v.reco_values(event, universe, &ctx)?;
            v.fill_mc_reco(key, r, weight)?;
            reco_2d.push(r);
        }

        if self.cutter.is_signal(&truth, universe, weight)? {
            for (v, r) in self.variables.iter_mut().zip(&reco) {
                let t = v.true_value(&truth, universe)?;
                v.fill_efficiency_numerator(key, t, weight)?;
                v.fill_migration(key, *r, t, weight)?;
                v.fill_signal_reco(key, *r, weight)?;
            }
            let signal_channel = match &self.channel_field {
                Some(f) => Some(InteractionChannel::classify(&truth, f)?),
                None => None,
            };
            for (v, r) in self.variables_2d.iter_mut().zip(&reco_2d) {
                let t = v.true_values(&truth, universe)?;
                v.fill_efficiency_numerator(key, t, weight)?;
                if let Some(ch) = signal_channel {
                    v.fill_signal_by_channel(ch, key, *r, weight)?;
                }
            }
        } else {
            let category = BackgroundCategory::classify(&truth, &self.current_field)?;
            for (v, r) in self.variables.iter_mut().zip(&reco) {
                v.fill_background(category, key, *r, weight)?;
                if let Some(cat) = vertex.filter(|_| in_target) {
                    v.fill_background_by_vertex(cat, category, key, *r, weight)?;
                }
            }
            for (v, r) in self.variables_2d.iter_mut().zip(&reco_2d) {
                v.fill_background(category, key, *r, weight)?;
            }
        }
        Ok(())
    }

    /// One truth-sample entry in one universe.
    pub(crate) fn process_truth(
        &mut self,
        event: &Event<'_>,
        universe: &dyn Universe,
        key: UniverseKey<'_>,
        model: &Model,
        cv_weight: f64,
    ) -> Result<()> {
        let truth = event.truth()?;
        if !self.cutter.is_efficiency_denominator(&truth, universe, cv_weight)? {
            return Ok(());
        }
        let weight = model.weight(event, universe)?;
        for v in &mut self.variables {
            let t = v.true_value(&truth, universe)?;
            v.fill_efficiency_denominator(key, t, weight)?;
        }
        for v in &mut self.variables_2d {
            let t = v.true_values(&truth, universe)?;
            v.fill_efficiency_denominator(key, t, weight)?;
        }
        Ok(())
    }

    /// One data entry (central value only).
    pub(crate) fn process_data(
        &mut self,
        event: &Event<'_>,
        universe: &dyn Universe,
    ) -> Result<()> {
        let mut ctx = EventContext::default();
        if !self.cutter.is_data_selected(event, universe, &mut ctx)?.all() {
            return Ok(());
        }
        if let Some(i) = ctx.sideband {
            let sideband = sideband_name(&self.cutter, i)?;
            for v in &mut self.variables {
                let r = v.reco_value(event, universe, &ctx)?;
                v.fill_data_sideband(sideband, r)?;
            }
            return Ok(());
        }
        let vertex = match &self.vertex_classifier {
            Some(c) => Some(c.classify(event)?),
            None => None,
        };
        for v in &mut self.variables {
            let r = v.reco_value(event, universe, &ctx)?;
            v.fill_data(r)?;
            if let Some(cat) = vertex {
                v.fill_data_by_vertex(cat, r)?;
            }
        }
        for v in &mut self.variables_2d {
            let r = v.reco_values(event, universe, &ctx)?;
            v.fill_data(r)?;
        }
        Ok(())
    }
}

fn sideband_name(cutter: &Cutter, i: usize) -> Result<&str> {
    cutter
        .sideband_name(i)
        .ok_or_else(|| Error::Config(format!("sideband {i} is not defined")))
}
