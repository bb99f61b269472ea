//! Ordered selection with pass-count bookkeeping.

use std::fmt;

use xs_core::{Error, Result};

use crate::cuts::{EventContext, RecoCut, TruthCut};
use crate::event::{Event, TruthEvent};
use crate::universe::Universe;

/// Maximum number of pre-selection cuts a [`Selection`] can hold.
pub const MAX_RECO_CUTS: usize = 64;

/// Outcome of the reconstructed-level selection for one event in one universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    passed: u64,
    n_precuts: usize,
    sideband: Option<usize>,
}

impl Selection {
    /// Whether every pre-selection cut passed.
    pub fn all(&self) -> bool {
        let mask = if self.n_precuts == 64 { u64::MAX } else { (1u64 << self.n_precuts) - 1 };
        self.passed & mask == mask
    }

    /// Whether pre-selection cut `i` passed. Cuts after the first failure
    /// are not evaluated and report `false`.
    pub fn passed(&self, i: usize) -> bool {
        i < self.n_precuts && self.passed & (1u64 << i) != 0
    }

    /// Sideband the event fell into, if any.
    pub fn sideband(&self) -> Option<usize> {
        self.sideband
    }

    /// Selected and outside every sideband.
    pub fn in_signal_region(&self) -> bool {
        self.all() && self.sideband.is_none()
    }
}

/// Pass counts for one cut.
#[derive(Debug, Clone, PartialEq)]
pub struct CutCount {
    /// Cut name.
    pub name: String,
    /// Unweighted count.
    pub raw: u64,
    /// Weighted count.
    pub weighted: f64,
}

impl CutCount {
    fn new(name: &str) -> Self {
        Self { name: name.to_string(), raw: 0, weighted: 0.0 }
    }

    fn record(&mut self, weight: f64) {
        self.raw += 1;
        self.weighted += weight;
    }
}

/// One table of cumulative pass counts.
#[derive(Debug, Clone, PartialEq)]
pub struct CutTable {
    /// Events offered to the first cut.
    pub seen: CutCount,
    /// One row per cut, cumulative.
    pub cuts: Vec<CutCount>,
}

impl CutTable {
    fn new(names: &[&str]) -> Self {
        Self {
            seen: CutCount::new("all events"),
            cuts: names.iter().map(|n| CutCount::new(n)).collect(),
        }
    }

    fn reset(&mut self) {
        for c in std::iter::once(&mut self.seen).chain(self.cuts.iter_mut()) {
            c.raw = 0;
            c.weighted = 0.0;
        }
    }

    /// Final row (or `seen` when the table has no cuts).
    pub fn last(&self) -> &CutCount {
        self.cuts.last().unwrap_or(&self.seen)
    }
}

impl fmt::Display for CutTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.cuts.iter().map(|c| c.name.len()).chain([self.seen.name.len()]).max();
        let width = width.unwrap_or(0);
        let base = self.seen.weighted;
        writeln!(f, "{:<width$}  {:>10}  {:>14}  {:>8}", "cut", "raw", "weighted", "eff")?;
        writeln!(f, "{:<width$}  {:>10}  {:>14.3}  {:>8}", self.seen.name, self.seen.raw, base, "")?;
        let mut prev = base;
        for c in &self.cuts {
            let eff = if prev > 0.0 { c.weighted / prev } else { 0.0 };
            writeln!(f, "{:<width$}  {:>10}  {:>14.3}  {:>8.4}", c.name, c.raw, c.weighted, eff)?;
            prev = c.weighted;
        }
        Ok(())
    }
}

/// All pass counts kept by a [`Cutter`].
#[derive(Debug, Clone, PartialEq)]
pub struct CutStats {
    /// Pre-selection cuts (cv universe, reconstructed samples).
    pub reco: CutTable,
    /// Sideband membership among selected events.
    pub sidebands: Vec<CutCount>,
    /// Signal definition then phase space, among selected events.
    pub signal: CutTable,
    /// Signal definition then phase space, on the truth sample.
    pub truth: CutTable,
}

impl fmt::Display for CutStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reconstructed selection:")?;
        write!(f, "{}", self.reco)?;
        for s in &self.sidebands {
            writeln!(f, "  sideband {}: {} ({:.3})", s.name, s.raw, s.weighted)?;
        }
        if self.signal.seen.raw > 0 {
            writeln!(f, "Selected signal:")?;
            write!(f, "{}", self.signal)?;
        }
        if self.truth.seen.raw > 0 {
            writeln!(f, "Efficiency denominator:")?;
            write!(f, "{}", self.truth)?;
        }
        Ok(())
    }
}

/// Ordered selection: pre-selection → sidebands → signal definition →
/// phase space.
///
/// Pass counts are only recorded while evaluating the central-value
/// universe, so they describe the nominal selection.
pub struct Cutter {
    precuts: Vec<Box<dyn RecoCut>>,
    sidebands: Vec<Box<dyn RecoCut>>,
    signal: Vec<Box<dyn TruthCut>>,
    phase_space: Vec<Box<dyn TruthCut>>,
    stats: CutStats,
}

impl Cutter {
    /// Assemble a cutter.
    pub fn new(
        precuts: Vec<Box<dyn RecoCut>>,
        sidebands: Vec<Box<dyn RecoCut>>,
        signal: Vec<Box<dyn TruthCut>>,
        phase_space: Vec<Box<dyn TruthCut>>,
    ) -> Result<Self> {
        if precuts.len() > MAX_RECO_CUTS {
            return Err(Error::Config(format!(
                "{} pre-selection cuts exceed the limit of {MAX_RECO_CUTS}",
                precuts.len()
            )));
        }
        let precut_names: Vec<&str> = precuts.iter().map(|c| c.name()).collect();
        let truth_names: Vec<&str> =
            signal.iter().chain(phase_space.iter()).map(|c| c.name()).collect();
        let stats = CutStats {
            reco: CutTable::new(&precut_names),
            sidebands: sidebands.iter().map(|c| CutCount::new(c.name())).collect(),
            signal: CutTable::new(&truth_names),
            truth: CutTable::new(&truth_names),
        };
        Ok(Self { precuts, sidebands, signal, phase_space, stats })
    }

    /// Number of pre-selection cuts.
    pub fn n_precuts(&self) -> usize {
        self.precuts.len()
    }

    /// Name of sideband `i`.
    pub fn sideband_name(&self, i: usize) -> Option<&str> {
        self.sidebands.get(i).map(|c| c.name())
    }

    /// Pass counts so far.
    pub fn stats(&self) -> &CutStats {
        &self.stats
    }

    /// Zero all pass counts.
    pub fn reset_stats(&mut self) {
        self.stats.reco.reset();
        self.stats.signal.reset();
        self.stats.truth.reset();
        for s in &mut self.stats.sidebands {
            s.raw = 0;
            s.weighted = 0.0;
        }
    }

    /// Reconstructed-level selection of a simulated event.
    ///
    /// `weight` only feeds the pass counts of the central-value universe.
    pub fn is_mc_selected(
        &mut self,
        event: &Event<'_>,
        universe: &dyn Universe,
        ctx: &mut EventContext,
        weight: f64,
    ) -> Result<Selection> {
        self.select(event, universe, ctx, weight)
    }

    /// Reconstructed-level selection of a data event (unit weight).
    pub fn is_data_selected(
        &mut self,
        event: &Event<'_>,
        universe: &dyn Universe,
        ctx: &mut EventContext,
    ) -> Result<Selection> {
        self.select(event, universe, ctx, 1.0)
    }

    fn select(
        &mut self,
        event: &Event<'_>,
        universe: &dyn Universe,
        ctx: &mut EventContext,
        weight: f64,
    ) -> Result<Selection> {
        let record = universe.is_cv();
        if record {
            self.stats.reco.seen.record(weight);
        }
        let mut sel = Selection { passed: 0, n_precuts: self.precuts.len(), sideband: None };
        for (i, cut) in self.precuts.iter().enumerate() {
            if !cut.pass(event, universe, ctx)? {
                return Ok(sel);
            }
            sel.passed |= 1u64 << i;
            if record {
                self.stats.reco.cuts[i].record(weight);
            }
        }

        for (i, cut) in self.sidebands.iter().enumerate() {
            if cut.pass(event, universe, ctx)? {
                if let Some(first) = sel.sideband {
                    return Err(Error::Data(format!(
                        "entry {}: sidebands '{}' and '{}' both match",
                        event.entry(),
                        self.sidebands[first].name(),
                        cut.name()
                    )));
                }
                sel.sideband = Some(i);
                if record {
                    self.stats.sidebands[i].record(weight);
                }
            }
        }
        ctx.sideband = sel.sideband;
        Ok(sel)
    }

    /// Whether a selected simulated event is signal: passes the signal
    /// definition and the phase-space cuts.
    pub fn is_signal(
        &mut self,
        event: &TruthEvent<'_>,
        universe: &dyn Universe,
        weight: f64,
    ) -> Result<bool> {
        let record = universe.is_cv();
        let table = record.then_some((&mut self.stats.signal, weight));
        run_truth_cuts(&self.signal, &self.phase_space, event, universe, table)
    }

    /// Whether a truth-sample event enters the efficiency denominator.
    pub fn is_efficiency_denominator(
        &mut self,
        event: &TruthEvent<'_>,
        universe: &dyn Universe,
        weight: f64,
    ) -> Result<bool> {
        let record = universe.is_cv();
        let table = record.then_some((&mut self.stats.truth, weight));
        run_truth_cuts(&self.signal, &self.phase_space, event, universe, table)
    }
}

fn run_truth_cuts(
    signal: &[Box<dyn TruthCut>],
    phase_space: &[Box<dyn TruthCut>],
    event: &TruthEvent<'_>,
    universe: &dyn Universe,
    mut record: Option<(&mut CutTable, f64)>,
) -> Result<bool> {
    if let Some((table, w)) = record.as_mut() {
        table.seen.record(*w);
    }
    for (i, cut) in signal.iter().chain(phase_space.iter()).enumerate() {
        if !cut.pass(event, universe)? {
            return Ok(false);
        }
        if let Some((table, w)) = record.as_mut() {
            table.cuts[i].record(*w);
        }
    }
    Ok(true)
}

impl fmt::Display for Cutter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cuts::CutSpec;
    use crate::source::ColumnarSource;
    use crate::universe::{CentralValue, WeightShift};
    use xs_core::{EventSource, SourceKind};

    fn above(field: &str, value: f64) -> CutSpec {
        CutSpec::Above { field: field.into(), value, name: None }
    }

    #[test]
    fn counts_one_of_three() {
        let mut src = ColumnarSource::new(SourceKind::Reco)
            .with_scalar("x", vec![1.0, 5.0, 10.0])
            .build()
            .unwrap();
        let mut cutter =
            Cutter::new(vec![above("x", 5.0).build_reco().unwrap()], vec![], vec![], vec![])
                .unwrap();
        let mut selected = vec![];
        for i in 0..3 {
            src.reposition(i).unwrap();
            let mut ctx = EventContext::default();
            let sel = cutter.is_mc_selected(&Event::new(&src), &CentralValue, &mut ctx, 1.0);
            if sel.unwrap().all() {
                selected.push(i);
            }
        }
        // 5 is not above 5.
        assert_eq!(selected, vec![2]);
        assert_eq!(cutter.stats().reco.seen.raw, 3);
        assert_eq!(cutter.stats().reco.last().raw, 1);
    }

    #[test]
    fn cumulative_counts_stop_at_first_failure() {
        let mut src = ColumnarSource::new(SourceKind::Reco)
            .with_scalar("x", vec![1.0, 5.0, 10.0])
            .build()
            .unwrap();
        let mut cutter = Cutter::new(
            vec![above("x", 3.0).build_reco().unwrap(), above("x", 7.0).build_reco().unwrap()],
            vec![],
            vec![],
            vec![],
        )
        .unwrap();
        let mut selected = 0;
        for i in 0..3 {
            src.reposition(i).unwrap();
            let ev = Event::new(&src);
            let mut ctx = EventContext::default();
            let sel = cutter.is_mc_selected(&ev, &CentralValue, &mut ctx, 1.0).unwrap();
            if sel.all() {
                selected += 1;
            }
            if i == 1 {
                assert!(sel.passed(0));
                assert!(!sel.passed(1));
            }
        }
        assert_eq!(selected, 1);
        let stats = cutter.stats();
        assert_eq!(stats.reco.seen.raw, 3);
        assert_eq!(stats.reco.cuts[0].raw, 2);
        assert_eq!(stats.reco.cuts[1].raw, 1);
        assert_eq!(stats.reco.last().raw, 1);

        let table = cutter.to_string();
        assert!(table.contains("x > 7"));

        cutter.reset_stats();
        assert_eq!(cutter.stats().reco.seen.raw, 0);
    }

    #[test]
    fn non_cv_universes_do_not_count() {
        let src = ColumnarSource::new(SourceKind::Reco)
            .with_scalar("x", vec![5.0])
            .build()
            .unwrap();
        let mut cutter =
            Cutter::new(vec![above("x", 3.0).build_reco().unwrap()], vec![], vec![], vec![])
                .unwrap();
        let ev = Event::new(&src);
        let shifted = WeightShift::new("xsec", 0.1, 1.0);
        let mut ctx = EventContext::default();
        assert!(cutter.is_mc_selected(&ev, &shifted, &mut ctx, 2.0).unwrap().all());
        assert_eq!(cutter.stats().reco.seen.raw, 0);
        assert!(cutter.is_mc_selected(&ev, &CentralValue, &mut ctx, 2.0).unwrap().all());
        assert_eq!(cutter.stats().reco.cuts[0].weighted, 2.0);
    }

    #[test]
    fn overlapping_sidebands_are_an_error() {
        let src = ColumnarSource::new(SourceKind::Reco)
            .with_scalar("x", vec![5.0])
            .build()
            .unwrap();
        let mut cutter = Cutter::new(
            vec![],
            vec![above("x", 1.0).build_reco().unwrap(), above("x", 2.0).build_reco().unwrap()],
            vec![],
            vec![],
        )
        .unwrap();
        let mut ctx = EventContext::default();
        let r = cutter.is_data_selected(&Event::new(&src), &CentralValue, &mut ctx);
        assert!(matches!(r, Err(Error::Data(_))));
    }

    #[test]
    fn sideband_is_recorded() {
        let src = ColumnarSource::new(SourceKind::Data)
            .with_scalar("x", vec![5.0])
            .build()
            .unwrap();
        let mut cutter = Cutter::new(
            vec![above("x", 0.0).build_reco().unwrap()],
            vec![above("x", 9.0).build_reco().unwrap(), above("x", 4.0).build_reco().unwrap()],
            vec![],
            vec![],
        )
        .unwrap();
        let mut ctx = EventContext::default();
        let sel = cutter.is_data_selected(&Event::new(&src), &CentralValue, &mut ctx).unwrap();
        assert!(sel.all());
        assert_eq!(sel.sideband(), Some(1));
        assert!(!sel.in_signal_region());
        assert_eq!(ctx.sideband, Some(1));
    }

    #[test]
    fn signal_and_denominator_tables() {
        let src = ColumnarSource::new(SourceKind::Truth)
            .with_scalar("current", vec![1.0])
            .with_scalar("theta", vec![0.1])
            .build()
            .unwrap();
        let signal = CutSpec::Equals { field: "current".into(), value: 1, name: None };
        let ps = CutSpec::MaxAngle { field: "theta".into(), degrees: 17.0, name: None };
        let mut cutter = Cutter::new(
            vec![],
            vec![],
            vec![signal.build_truth().unwrap()],
            vec![ps.build_truth().unwrap()],
        )
        .unwrap();
        let truth = Event::new(&src).truth().unwrap();
        assert!(cutter.is_efficiency_denominator(&truth, &CentralValue, 0.5).unwrap());
        assert_eq!(cutter.stats().truth.last().raw, 1);
        assert_eq!(cutter.stats().signal.seen.raw, 0);
        assert!(cutter.is_signal(&truth, &CentralValue, 0.5).unwrap());
        assert_eq!(cutter.stats().signal.last().weighted, 0.5);
    }
}
