//! Observables and the histograms they own.
//!
//! A [`Variable`] pairs a reconstructed and a true extractor with a binning.
//! Reco-side fills take [`RecoValue`] and truth-side fills take
//! [`TrueValue`], so the two cannot be swapped by accident.

use std::collections::BTreeMap;
use std::sync::Arc;

use xs_core::{Error, Result};
use xs_hist::{BandLayout, Binning, CV_BAND, Hist1D, Hist2D};

use crate::classify::{BackgroundCategory, InteractionChannel, TruthOrigin, VertexCategory};
use crate::cuts::EventContext;
use crate::event::{Event, TruthEvent};
use crate::universe::{Universe, UniverseKey};

/// A reconstructed-level value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct RecoValue(pub f64);

/// A truth-level value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TrueValue(pub f64);

type RecoFn = dyn Fn(&Event<'_>, &dyn Universe, &EventContext) -> Result<f64> + Send + Sync;
type TruthFn = dyn Fn(&TruthEvent<'_>, &dyn Universe) -> Result<f64> + Send + Sync;

/// Computes a reconstructed value in a universe.
#[derive(Clone)]
pub struct RecoExtractor(Arc<RecoFn>);

impl RecoExtractor {
    /// Arbitrary extractor.
    pub fn new(
        f: impl Fn(&Event<'_>, &dyn Universe, &EventContext) -> Result<f64> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    /// Scalar field times `scale`, shifted by the universe.
    pub fn field(field: impl Into<String>, scale: f64) -> Self {
        let field = field.into();
        Self::new(move |ev, u, _| Ok(u.reco(ev, &field)? * scale))
    }

    /// Element of a vector field at the event's selected candidate.
    pub fn candidate(field: impl Into<String>, scale: f64) -> Self {
        let field = field.into();
        Self::new(move |ev, _, ctx| {
            let idx = ctx.candidate.ok_or_else(|| {
                Error::Data(format!("entry {}: no candidate selected for '{field}'", ev.entry()))
            })?;
            let values = ev.vec(&field)?;
            values.get(idx).map(|v| v * scale).ok_or_else(|| {
                Error::Data(format!(
                    "entry {}: candidate {idx} out of range for '{field}' ({} elements)",
                    ev.entry(),
                    values.len()
                ))
            })
        })
    }

    fn eval(&self, ev: &Event<'_>, u: &dyn Universe, ctx: &EventContext) -> Result<RecoValue> {
        (self.0)(ev, u, ctx).map(RecoValue)
    }
}

/// Computes a true value in a universe.
#[derive(Clone)]
pub struct TruthExtractor(Arc<TruthFn>);

impl TruthExtractor {
    /// Arbitrary extractor.
    pub fn new(
        f: impl Fn(&TruthEvent<'_>, &dyn Universe) -> Result<f64> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    /// Scalar truth field times `scale`.
    pub fn field(field: impl Into<String>, scale: f64) -> Self {
        let field = field.into();
        Self::new(move |ev, u| Ok(u.truth(ev, &field)? * scale))
    }

    fn eval(&self, ev: &TruthEvent<'_>, u: &dyn Universe) -> Result<TrueValue> {
        (self.0)(ev, u).map(TrueValue)
    }
}

/// Histograms owned by one [`Variable`].
#[derive(Debug, Clone)]
pub struct VariableHists {
    layout: BandLayout,
    prefix: String,
    /// Selected data.
    pub data: Hist1D,
    /// All selected simulation ("fake data").
    pub selected_mc_reco: Hist1D,
    /// Selected signal, reconstructed value.
    pub selected_signal_reco: Hist1D,
    /// Selected signal, true value.
    pub efficiency_numerator: Hist1D,
    /// All truth-sample signal, true value.
    pub efficiency_denominator: Hist1D,
    /// Selected signal, (reco, true).
    pub migration: Hist2D,
    /// Selected non-signal by category.
    pub backgrounds: BTreeMap<BackgroundCategory, Hist1D>,
    /// Selected simulation by vertex category.
    pub mc_by_vertex: BTreeMap<VertexCategory, Hist1D>,
    /// Selected data by vertex category.
    pub data_by_vertex: BTreeMap<VertexCategory, Hist1D>,
    /// In-target simulation by vertex category and interaction channel.
    pub channels_by_vertex: BTreeMap<(VertexCategory, InteractionChannel), Hist1D>,
    /// In-target background by vertex category.
    pub backgrounds_by_vertex: BTreeMap<(VertexCategory, BackgroundCategory), Hist1D>,
    /// Simulation next to a target by vertex category and true origin.
    pub origins_by_vertex: BTreeMap<(VertexCategory, TruthOrigin), Hist1D>,
    /// Sideband simulation, split by true origin when vertices are classified.
    pub mc_sidebands: BTreeMap<(String, Option<TruthOrigin>), Hist1D>,
    /// Sideband data.
    pub data_sidebands: BTreeMap<String, Hist1D>,
}

impl VariableHists {
    fn new(prefix: &str, label: &str, binning: &Binning, layout: &BandLayout) -> Self {
        let h = |kind: &str, layout: &BandLayout| {
            Hist1D::new(format!("{prefix}_{kind}"), label, binning.clone(), layout)
        };
        let backgrounds = BackgroundCategory::ALL
            .iter()
            .map(|c| (*c, h(format!("background_{c}").as_str(), layout)))
            .collect();
        Self {
            layout: layout.clone(),
            prefix: prefix.to_string(),
            data: h("data", &BandLayout::cv_only()),
            selected_mc_reco: h("selected_mc_reco", layout),
            selected_signal_reco: h("selected_signal_reco", layout),
            efficiency_numerator: h("efficiency_numerator", layout),
            efficiency_denominator: h("efficiency_denominator", layout),
            migration: Hist2D::new(
                format!("{prefix}_migration"),
                format!("{label} reco;{label} true"),
                binning.clone(),
                binning.clone(),
                layout,
            ),
            backgrounds,
            mc_by_vertex: BTreeMap::new(),
            data_by_vertex: BTreeMap::new(),
            channels_by_vertex: BTreeMap::new(),
            backgrounds_by_vertex: BTreeMap::new(),
            origins_by_vertex: BTreeMap::new(),
            mc_sidebands: BTreeMap::new(),
            data_sidebands: BTreeMap::new(),
        }
    }

    /// Histogram-name prefix (`<variable>_<region>`).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Band layout of the simulation histograms.
    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }

    /// Histogram under `key`, created empty on first use.
    fn lazy<'a, K: Ord>(
        map: &'a mut BTreeMap<K, Hist1D>,
        key: K,
        template: &Hist1D,
        name: impl FnOnce() -> String,
        layout: &BandLayout,
    ) -> &'a mut Hist1D {
        map.entry(key).or_insert_with(|| {
            Hist1D::new(name(), template.title(), template.binning().clone(), layout)
        })
    }
}

/// A one-dimensional observable.
pub struct Variable {
    name: String,
    label: String,
    binning: Binning,
    reco: RecoExtractor,
    truth: TruthExtractor,
    hists: Option<VariableHists>,
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("binning", &self.binning)
            .finish_non_exhaustive()
    }
}

impl Variable {
    /// Observable with explicit extractors.
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        binning: Binning,
        reco: RecoExtractor,
        truth: TruthExtractor,
    ) -> Self {
        Self { name: name.into(), label: label.into(), binning, reco, truth, hists: None }
    }

    /// Observable read from one reco field and one truth field.
    pub fn from_fields(
        name: impl Into<String>,
        label: impl Into<String>,
        binning: Binning,
        reco_field: &str,
        truth_field: &str,
    ) -> Self {
        Self::new(
            name,
            label,
            binning,
            RecoExtractor::field(reco_field, 1.0),
            TruthExtractor::field(truth_field, 1.0),
        )
    }

    /// Name (histogram prefix).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Axis label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Binning (shared by the reco and true axes).
    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    /// Reconstructed value in `universe`.
    pub fn reco_value(
        &self,
        event: &Event<'_>,
        universe: &dyn Universe,
        ctx: &EventContext,
    ) -> Result<RecoValue> {
        self.reco.eval(event, universe, ctx)
    }

    /// True value in `universe`.
    pub fn true_value(&self, event: &TruthEvent<'_>, universe: &dyn Universe) -> Result<TrueValue> {
        self.truth.eval(event, universe)
    }

    /// Allocate histograms for `region`. Simulation histograms get every
    /// universe of `mc`; reconstructed and truth passes must share a layout.
    pub fn initialize(&mut self, region: &str, mc: &BandLayout, truth: &BandLayout) -> Result<()> {
        mc.ensure_same(truth, &format!("variable '{}' (reco vs truth universes)", self.name))?;
        let prefix = format!("{}_{region}", self.name);
        self.hists = Some(VariableHists::new(&prefix, &self.label, &self.binning, mc));
        Ok(())
    }

    /// Histograms, once initialized.
    pub fn hists(&self) -> Result<&VariableHists> {
        self.hists.as_ref().ok_or_else(|| self.uninitialized())
    }

    /// Release the histograms.
    pub fn into_hists(self) -> Result<VariableHists> {
        match self.hists {
            Some(h) => Ok(h),
            None => Err(Error::Config(format!("variable '{}' was never initialized", self.name))),
        }
    }

    fn uninitialized(&self) -> Error {
        Error::Config(format!("variable '{}' has no histograms (not initialized)", self.name))
    }

    fn hists_mut(&mut self) -> Result<&mut VariableHists> {
        match self.hists.as_mut() {
            Some(h) => Ok(h),
            None => Err(Error::Config(format!(
                "variable '{}' has no histograms (not initialized)",
                self.name
            ))),
        }
    }

    /// Selected data event (cv, unit weight).
    pub fn fill_data(&mut self, value: RecoValue) -> Result<()> {
        self.hists_mut()?.data.fill(CV_BAND, 0, value.0, 1.0)
    }

    /// Selected simulated event.
    pub fn fill_mc_reco(&mut self, key: UniverseKey<'_>, value: RecoValue, w: f64) -> Result<()> {
        self.hists_mut()?.selected_mc_reco.fill(key.band, key.index, value.0, w)
    }

    /// Selected signal event, reconstructed value.
    pub fn fill_signal_reco(
        &mut self,
        key: UniverseKey<'_>,
        value: RecoValue,
        w: f64,
    ) -> Result<()> {
        self.hists_mut()?.selected_signal_reco.fill(key.band, key.index, value.0, w)
    }

    /// Selected signal event, true value.
    pub fn fill_efficiency_numerator(
        &mut self,
        key: UniverseKey<'_>,
        value: TrueValue,
        w: f64,
    ) -> Result<()> {
        self.hists_mut()?.efficiency_numerator.fill(key.band, key.index, value.0, w)
    }

    /// Truth-sample signal event.
    pub fn fill_efficiency_denominator(
        &mut self,
        key: UniverseKey<'_>,
        value: TrueValue,
        w: f64,
    ) -> Result<()> {
        self.hists_mut()?.efficiency_denominator.fill(key.band, key.index, value.0, w)
    }

    /// Selected signal event, (reco, true).
    pub fn fill_migration(
        &mut self,
        key: UniverseKey<'_>,
        reco: RecoValue,
        truth: TrueValue,
        w: f64,
    ) -> Result<()> {
        self.hists_mut()?.migration.fill(key.band, key.index, reco.0, truth.0, w)
    }

    /// Selected background event.
    pub fn fill_background(
        &mut self,
        category: BackgroundCategory,
        key: UniverseKey<'_>,
        value: RecoValue,
        w: f64,
    ) -> Result<()> {
        let name = self.name.clone();
        let h = self.hists_mut()?.backgrounds.get_mut(&category).ok_or_else(|| {
            Error::Config(format!("variable '{name}': no background histogram for {category}"))
        })?;
        h.fill(key.band, key.index, value.0, w)
    }

    /// Selected simulated event in a vertex category.
    ///
    /// Filled with the event weight `w` in every universe, like the other
    /// simulation histograms, so the per-target splits sum to
    /// `selected_mc_reco`.
    pub fn fill_mc_by_vertex(
        &mut self,
        category: VertexCategory,
        key: UniverseKey<'_>,
        value: RecoValue,
        w: f64,
    ) -> Result<()> {
        let hists = self.hists_mut()?;
        let prefix = &hists.prefix;
        let h = VariableHists::lazy(
            &mut hists.mc_by_vertex,
            category,
            &hists.selected_mc_reco,
            || format!("{prefix}_mc_{category}"),
            &hists.layout,
        );
        h.fill(key.band, key.index, value.0, w)
    }

    /// In-target simulated event by interaction channel (event weight).
    pub fn fill_mc_by_channel(
        &mut self,
        category: VertexCategory,
        channel: InteractionChannel,
        key: UniverseKey<'_>,
        value: RecoValue,
        w: f64,
    ) -> Result<()> {
        let hists = self.hists_mut()?;
        let prefix = &hists.prefix;
        let h = VariableHists::lazy(
            &mut hists.channels_by_vertex,
            (category, channel),
            &hists.selected_mc_reco,
            || format!("{prefix}_mc_{category}_channel_{channel}"),
            &hists.layout,
        );
        h.fill(key.band, key.index, value.0, w)
    }

    /// In-target background event (event weight).
    pub fn fill_background_by_vertex(
        &mut self,
        category: VertexCategory,
        background: BackgroundCategory,
        key: UniverseKey<'_>,
        value: RecoValue,
        w: f64,
    ) -> Result<()> {
        let hists = self.hists_mut()?;
        let prefix = &hists.prefix;
        let h = VariableHists::lazy(
            &mut hists.backgrounds_by_vertex,
            (category, background),
            &hists.selected_mc_reco,
            || format!("{prefix}_mc_{category}_background_{background}"),
            &hists.layout,
        );
        h.fill(key.band, key.index, value.0, w)
    }

    /// Simulated event reconstructed next to a target, by true origin
    /// (event weight).
    pub fn fill_mc_by_origin(
        &mut self,
        category: VertexCategory,
        origin: TruthOrigin,
        key: UniverseKey<'_>,
        value: RecoValue,
        w: f64,
    ) -> Result<()> {
        let hists = self.hists_mut()?;
        let prefix = &hists.prefix;
        let h = VariableHists::lazy(
            &mut hists.origins_by_vertex,
            (category, origin),
            &hists.selected_mc_reco,
            || format!("{prefix}_mc_{category}_{origin}"),
            &hists.layout,
        );
        h.fill(key.band, key.index, value.0, w)
    }

    /// Simulated event in sideband `sideband` (event weight).
    pub fn fill_mc_sideband(
        &mut self,
        sideband: &str,
        origin: Option<TruthOrigin>,
        key: UniverseKey<'_>,
        value: RecoValue,
        w: f64,
    ) -> Result<()> {
        let hists = self.hists_mut()?;
        let prefix = &hists.prefix;
        let h = VariableHists::lazy(
            &mut hists.mc_sidebands,
            (sideband.to_string(), origin),
            &hists.selected_mc_reco,
            || match origin {
                Some(o) => format!("{prefix}_sideband_{sideband}_{o}"),
                None => format!("{prefix}_sideband_{sideband}"),
            },
            &hists.layout,
        );
        h.fill(key.band, key.index, value.0, w)
    }

    /// Selected data event in a vertex category.
    pub fn fill_data_by_vertex(
        &mut self,
        category: VertexCategory,
        value: RecoValue,
    ) -> Result<()> {
        let hists = self.hists_mut()?;
        let prefix = &hists.prefix;
        let h = VariableHists::lazy(
            &mut hists.data_by_vertex,
            category,
            &hists.data,
            || format!("{prefix}_data_{category}"),
            &BandLayout::cv_only(),
        );
        h.fill(CV_BAND, 0, value.0, 1.0)
    }

    /// Data event in sideband `sideband`.
    pub fn fill_data_sideband(&mut self, sideband: &str, value: RecoValue) -> Result<()> {
        let hists = self.hists_mut()?;
        let prefix = &hists.prefix;
        let h = VariableHists::lazy(
            &mut hists.data_sidebands,
            sideband.to_string(),
            &hists.data,
            || format!("{prefix}_data_sideband_{sideband}"),
            &BandLayout::cv_only(),
        );
        h.fill(CV_BAND, 0, value.0, 1.0)
    }
}

/// Histograms owned by one [`Variable2D`].
#[derive(Debug, Clone)]
pub struct Variable2DHists {
    layout: BandLayout,
    prefix: String,
    /// Selected data.
    pub data: Hist2D,
    /// All selected simulation.
    pub selected_mc_reco: Hist2D,
    /// Selected signal, true values.
    pub efficiency_numerator: Hist2D,
    /// Truth-sample signal, true values.
    pub efficiency_denominator: Hist2D,
    /// Selected non-signal by category.
    pub backgrounds: BTreeMap<BackgroundCategory, Hist2D>,
    /// Selected signal, reconstructed values, by interaction channel.
    pub signal_by_channel: BTreeMap<InteractionChannel, Hist2D>,
}

/// A two-dimensional observable built from two [`Variable`]s.
pub struct Variable2D {
    name: String,
    x: (Binning, RecoExtractor, TruthExtractor),
    y: (Binning, RecoExtractor, TruthExtractor),
    title: String,
    hists: Option<Variable2DHists>,
}

impl std::fmt::Debug for Variable2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable2D").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Variable2D {
    /// Combine `x` and `y`; extractors and binnings are shared with them.
    pub fn new(name: impl Into<String>, x: &Variable, y: &Variable) -> Self {
        Self {
            name: name.into(),
            x: (x.binning.clone(), x.reco.clone(), x.truth.clone()),
            y: (y.binning.clone(), y.reco.clone(), y.truth.clone()),
            title: format!("{};{}", x.label, y.label),
            hists: None,
        }
    }

    /// Name (histogram prefix).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reconstructed (x, y).
    pub fn reco_values(
        &self,
        event: &Event<'_>,
        universe: &dyn Universe,
        ctx: &EventContext,
    ) -> Result<(RecoValue, RecoValue)> {
        Ok((self.x.1.eval(event, universe, ctx)?, self.y.1.eval(event, universe, ctx)?))
    }

    /// True (x, y).
    pub fn true_values(
        &self,
        event: &TruthEvent<'_>,
        universe: &dyn Universe,
    ) -> Result<(TrueValue, TrueValue)> {
        Ok((self.x.2.eval(event, universe)?, self.y.2.eval(event, universe)?))
    }

    /// Allocate histograms for `region`.
    pub fn initialize(&mut self, region: &str, mc: &BandLayout, truth: &BandLayout) -> Result<()> {
        mc.ensure_same(truth, &format!("variable '{}' (reco vs truth universes)", self.name))?;
        let prefix = format!("{}_{region}", self.name);
        let h = |kind: &str, layout: &BandLayout| {
            Hist2D::new(
                format!("{prefix}_{kind}"),
                self.title.clone(),
                self.x.0.clone(),
                self.y.0.clone(),
                layout,
            )
        };
        let backgrounds = BackgroundCategory::ALL
            .iter()
            .map(|c| (*c, h(format!("background_{c}").as_str(), mc)))
            .collect();
        self.hists = Some(Variable2DHists {
            layout: mc.clone(),
            prefix: prefix.clone(),
            data: h("data", &BandLayout::cv_only()),
            selected_mc_reco: h("selected_mc_reco", mc),
            efficiency_numerator: h("efficiency_numerator", mc),
            efficiency_denominator: h("efficiency_denominator", mc),
            backgrounds,
            signal_by_channel: BTreeMap::new(),
        });
        Ok(())
    }

    /// Histograms, once initialized.
    pub fn hists(&self) -> Result<&Variable2DHists> {
        self.hists.as_ref().ok_or_else(|| {
            Error::Config(format!("variable '{}' has no histograms (not initialized)", self.name))
        })
    }

    /// Release the histograms.
    pub fn into_hists(self) -> Result<Variable2DHists> {
        match self.hists {
            Some(h) => Ok(h),
            None => Err(Error::Config(format!("variable '{}' was never initialized", self.name))),
        }
    }

    fn hists_mut(&mut self) -> Result<&mut Variable2DHists> {
        match self.hists.as_mut() {
            Some(h) => Ok(h),
            None => Err(Error::Config(format!(
                "variable '{}' has no histograms (not initialized)",
                self.name
            ))),
        }
    }

    /// Selected data event.
    pub fn fill_data(&mut self, v: (RecoValue, RecoValue)) -> Result<()> {
        self.hists_mut()?.data.fill(CV_BAND, 0, v.0.0, v.1.0, 1.0)
    }

    /// Selected simulated event.
    pub fn fill_mc_reco(
        &mut self,
        key: UniverseKey<'_>,
        v: (RecoValue, RecoValue),
        w: f64,
    ) -> Result<()> {
        self.hists_mut()?.selected_mc_reco.fill(key.band, key.index, v.0.0, v.1.0, w)
    }

    /// Selected signal event, true values.
    pub fn fill_efficiency_numerator(
        &mut self,
        key: UniverseKey<'_>,
        v: (TrueValue, TrueValue),
        w: f64,
    ) -> Result<()> {
        self.hists_mut()?.efficiency_numerator.fill(key.band, key.index, v.0.0, v.1.0, w)
    }

    /// Truth-sample signal event.
    pub fn fill_efficiency_denominator(
        &mut self,
        key: UniverseKey<'_>,
        v: (TrueValue, TrueValue),
        w: f64,
    ) -> Result<()> {
        self.hists_mut()?.efficiency_denominator.fill(key.band, key.index, v.0.0, v.1.0, w)
    }

    /// Selected background event.
    pub fn fill_background(
        &mut self,
        category: BackgroundCategory,
        key: UniverseKey<'_>,
        v: (RecoValue, RecoValue),
        w: f64,
    ) -> Result<()> {
        let name = self.name.clone();
        let h = self.hists_mut()?.backgrounds.get_mut(&category).ok_or_else(|| {
            Error::Config(format!("variable '{name}': no background histogram for {category}"))
        })?;
        h.fill(key.band, key.index, v.0.0, v.1.0, w)
    }

    /// Selected signal event by interaction channel, reconstructed values.
    pub fn fill_signal_by_channel(
        &mut self,
        channel: InteractionChannel,
        key: UniverseKey<'_>,
        v: (RecoValue, RecoValue),
        w: f64,
    ) -> Result<()> {
        let hists = self.hists_mut()?;
        let h = hists.signal_by_channel.entry(channel).or_insert_with(|| {
            let t = &hists.selected_mc_reco;
            Hist2D::new(
                format!("{}_signal_{channel}", hists.prefix),
                t.title(),
                t.x_binning().clone(),
                t.y_binning().clone(),
                &hists.layout,
            )
        });
        h.fill(key.band, key.index, v.0.0, v.1.0, w)
    }
}

impl Variable2DHists {
    /// Histogram-name prefix (`<variable>_<region>`).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Band layout of the simulation histograms.
    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }
}
