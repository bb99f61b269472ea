//! The three-pass event loop.
//!
//! 1. Reconstructed simulation: every entry is evaluated in every universe
//!    of the MC variation set; selected events fill the reco, signal,
//!    migration and background histograms.
//! 2. Truth simulation: every entry in every universe of the truth set
//!    fills the efficiency denominator.
//! 3. Data: central value only; selected events fill the data histograms.
//!
//! Entries are processed strictly in index order and each entry is finished
//! in every universe before the next one is read.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use xs_core::{Error, EventSource, MetadataStore, POT_USED, Result, SourceKind};
use xs_hist::{HistogramFile, HistogramStore};

use crate::cutter::CutStats;
use crate::event::Event;
use crate::flux::{FluxSpectrum, flux_integral};
use crate::model::Model;
use crate::region::Region;
use crate::universe::UniverseKey;
use crate::variation::VariationSet;

/// Entries between progress messages.
pub const PROGRESS_INTERVAL: usize = 1000;

/// Which pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Reconstructed simulation.
    McReco,
    /// Truth simulation.
    Truth,
    /// Data.
    Data,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pass::McReco => "MC reco",
            Pass::Truth => "truth",
            Pass::Data => "data",
        })
    }
}

/// What one pass did.
#[derive(Debug, Clone)]
pub struct PassSummary {
    /// The pass.
    pub pass: Pass,
    /// Entries read.
    pub n_entries: usize,
    /// Cut statistics per region, captured before they were reset.
    pub cut_stats: Vec<(String, CutStats)>,
}

/// Exposures written next to the histograms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exposure {
    /// Simulated protons on target.
    pub mc_pot: f64,
    /// Recorded protons on target.
    pub data_pot: f64,
}

/// Flux integration settings for [`EventLoop::finish`].
#[derive(Debug, Clone)]
pub struct FluxIntegration {
    /// Flux per energy bin, per universe.
    pub spectrum: FluxSpectrum,
    /// Lower neutrino energy.
    pub e_min: f64,
    /// Upper neutrino energy.
    pub e_max: f64,
}

/// Event-loop results: one store for simulation, one for data.
#[derive(Debug, Clone)]
pub struct EventLoopOutput {
    /// Simulation histograms, flux integrals, nucleon counts and exposure.
    pub mc: HistogramFile,
    /// Data histograms and exposure.
    pub data: HistogramFile,
}

impl EventLoopOutput {
    /// Write both stores.
    pub fn write(&self, mc_path: &Path, data_path: &Path) -> Result<()> {
        self.mc.save(mc_path)?;
        self.data.save(data_path)?;
        log::info!("wrote {} and {}", mc_path.display(), data_path.display());
        Ok(())
    }
}

/// Drives regions over event sources.
pub struct EventLoop {
    regions: Vec<Region>,
    model: Model,
    mc: VariationSet,
    truth: VariationSet,
    data: VariationSet,
}

impl EventLoop {
    /// Set up histograms for every region. Fails on duplicate region names or
    /// when the reco and truth universes differ.
    pub fn new(
        mut regions: Vec<Region>,
        model: Model,
        mc: VariationSet,
        truth: VariationSet,
    ) -> Result<Self> {
        let mut names = BTreeSet::new();
        for r in &regions {
            if !names.insert(r.name().to_string()) {
                return Err(Error::Config(format!("duplicate region '{}'", r.name())));
            }
        }
        let (mc_layout, truth_layout) = (mc.layout(), truth.layout());
        for r in &mut regions {
            r.initialize(&mc_layout, &truth_layout)?;
        }
        log::info!(
            "event loop: {} regions, {} MC universes, model [{}]",
            regions.len(),
            mc_layout.total_universes(),
            model.names().join(", ")
        );
        Ok(Self { regions, model, mc, truth, data: VariationSet::cv_only() })
    }

    /// Regions in configuration order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Pass 1: reconstructed simulation.
    pub fn run_mc_reco(&mut self, source: &mut dyn EventSource) -> Result<PassSummary> {
        expect_kind(Pass::McReco, source, &[SourceKind::Reco])?;
        let Self { regions, model, mc, .. } = self;
        let n = source.n_entries();
        log::info!("starting {} loop over {n} entries", Pass::McReco);
        for i in 0..n {
            progress(Pass::McReco, i, n);
            source.reposition(i)?;
            let event = Event::new(&*source);
            let cv_weight = model.weight(&event, mc.cv()).map_err(at(Pass::McReco, i))?;
            // Universes are stateless views, so the cursor stays on entry i.
            for (band, universes) in mc.iter() {
                for (index, universe) in universes.iter().enumerate() {
                    let key = UniverseKey { band, index };
                    for region in regions.iter_mut() {
                        region
                            .process_mc_reco(&event, universe.as_ref(), key, model, cv_weight)
                            .map_err(at(Pass::McReco, i))?;
                    }
                }
            }
        }
        Ok(self.close_pass(Pass::McReco, n))
    }

    /// Pass 2: truth simulation (efficiency denominator).
    pub fn run_truth(&mut self, source: &mut dyn EventSource) -> Result<PassSummary> {
        expect_kind(Pass::Truth, source, &[SourceKind::Truth, SourceKind::Reco])?;
        let Self { regions, model, truth, .. } = self;
        let n = source.n_entries();
        log::info!("starting {} loop over {n} entries", Pass::Truth);
        for i in 0..n {
            progress(Pass::Truth, i, n);
            source.reposition(i)?;
            let event = Event::new(&*source);
            let cv_weight = model.weight(&event, truth.cv()).map_err(at(Pass::Truth, i))?;
            for (band, universes) in truth.iter() {
                for (index, universe) in universes.iter().enumerate() {
                    let key = UniverseKey { band, index };
                    for region in regions.iter_mut() {
                        region
                            .process_truth(&event, universe.as_ref(), key, model, cv_weight)
                            .map_err(at(Pass::Truth, i))?;
                    }
                }
            }
        }
        Ok(self.close_pass(Pass::Truth, n))
    }

    /// Pass 3: data, central value only.
    pub fn run_data(&mut self, source: &mut dyn EventSource) -> Result<PassSummary> {
        expect_kind(Pass::Data, source, &[SourceKind::Data])?;
        let Self { regions, data, .. } = self;
        let n = source.n_entries();
        log::info!("starting {} loop over {n} entries", Pass::Data);
        for i in 0..n {
            progress(Pass::Data, i, n);
            source.reposition(i)?;
            let event = Event::new(&*source);
            for region in regions.iter_mut() {
                region.process_data(&event, data.cv()).map_err(at(Pass::Data, i))?;
            }
        }
        Ok(self.close_pass(Pass::Data, n))
    }

    fn close_pass(&mut self, pass: Pass, n_entries: usize) -> PassSummary {
        let mut cut_stats = Vec::with_capacity(self.regions.len());
        for region in &mut self.regions {
            log::info!("{pass} cut summary for region '{}':\n{}", region.name(), region.cutter());
            cut_stats.push((region.name().to_string(), region.cutter().stats().clone()));
            region.cutter_mut().reset_stats();
        }
        PassSummary { pass, n_entries, cut_stats }
    }

    /// Move every histogram into the output stores.
    ///
    /// With `flux`, each 1D variable gets `<prefix>_reweightedflux_integrated`
    /// built on its efficiency-numerator binning.
    pub fn finish(
        self,
        exposure: Exposure,
        flux: Option<&FluxIntegration>,
    ) -> Result<EventLoopOutput> {
        for (what, pot) in [("MC", exposure.mc_pot), ("data", exposure.data_pot)] {
            if !(pot.is_finite() && pot >= 0.0) {
                return Err(Error::Validation(format!("{what} exposure must be >= 0, got {pot}")));
            }
        }
        let mut mc = HistogramFile::new();
        let mut data = HistogramFile::new();

        for region in self.regions {
            let (name, variables, variables_2d, nucleons) = region.into_parts();
            for var in variables {
                let h = var.into_hists()?;
                let prefix = h.prefix().to_string();
                if let Some(f) = flux {
                    let integrated = flux_integral(
                        &f.spectrum,
                        &h.efficiency_numerator,
                        f.e_min,
                        f.e_max,
                        &format!("{prefix}_reweightedflux_integrated"),
                    )?;
                    mc.put_hist1d(integrated);
                }
                if let Some(n) = nucleons {
                    mc.set_parameter(&format!("{prefix}_fiducial_nucleons"), n)?;
                }
                data.put_hist1d(h.data);
                for hist in h.data_by_vertex.into_values().chain(h.data_sidebands.into_values()) {
                    data.put_hist1d(hist);
                }
                mc.put_hist1d(h.selected_mc_reco);
                mc.put_hist1d(h.selected_signal_reco);
                mc.put_hist1d(h.efficiency_numerator);
                mc.put_hist1d(h.efficiency_denominator);
                mc.put_hist2d(h.migration);
                let splits = h
                    .backgrounds
                    .into_values()
                    .chain(h.mc_by_vertex.into_values())
                    .chain(h.channels_by_vertex.into_values())
                    .chain(h.backgrounds_by_vertex.into_values())
                    .chain(h.origins_by_vertex.into_values())
                    .chain(h.mc_sidebands.into_values());
                for hist in splits {
                    mc.put_hist1d(hist);
                }
            }
            for var in variables_2d {
                let h = var.into_hists()?;
                data.put_hist2d(h.data);
                mc.put_hist2d(h.selected_mc_reco);
                mc.put_hist2d(h.efficiency_numerator);
                mc.put_hist2d(h.efficiency_denominator);
                for hist in h.backgrounds.into_values().chain(h.signal_by_channel.into_values()) {
                    mc.put_hist2d(hist);
                }
            }
            log::debug!("region '{name}' written");
        }
        mc.set_parameter(POT_USED, exposure.mc_pot)?;
        data.set_parameter(POT_USED, exposure.data_pot)?;
        Ok(EventLoopOutput { mc, data })
    }
}

fn expect_kind(pass: Pass, source: &dyn EventSource, allowed: &[SourceKind]) -> Result<()> {
    if allowed.contains(&source.kind()) {
        Ok(())
    } else {
        Err(Error::Config(format!("{pass} pass cannot run on a {} sample", source.kind())))
    }
}

fn progress(pass: Pass, i: usize, n: usize) {
    if i % PROGRESS_INTERVAL == 0 {
        log::debug!("{pass}: {i} / {n}");
    }
}

/// Prefix data errors with the pass and entry they happened at.
fn at(pass: Pass, entry: usize) -> impl Fn(Error) -> Error {
    move |e| match e {
        Error::Data(msg) => Error::Data(format!("{pass} pass, entry {entry}: {msg}")),
        other => other,
    }
}
