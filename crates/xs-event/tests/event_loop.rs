use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use xs_core::{Error, MetadataStore, SourceKind};
use xs_event::{
    AnalysisConfig, ColumnarSource, EventLoop, Exposure, FLUX_BAND, FluxIntegration, FluxSpectrum,
};
use xs_hist::{BandLayout, Binning, Hist1D, HistogramStore};

const CONFIG: &str = r#"{
    "schema_version": "xsec_analysis_v0",
    "weight_field": "wgt",
    "variations": {
        "n_flux_universes": 3,
        "flux_weight_field": "flux_w",
        "lateral": [{ "band": "MuonEnergy", "field": "pt", "fractional_sigma": 0.05 }],
        "vertical": [{ "band": "Target", "fractional_sigma": 0.02 }]
    },
    "regions": [{
        "name": "tracker",
        "precuts": [
            { "type": "max_angle", "field": "theta_mu", "degrees": 17.0 },
            { "type": "above", "field": "pt", "value": 0.0 }
        ],
        "signal": [{ "type": "equals", "field": "mc_current", "value": 1 }],
        "phase_space": [{ "type": "max_angle", "field": "mc_theta_mu", "degrees": 20.0 }],
        "variables": [{
            "name": "pTmu", "label": "p_T [GeV/c]",
            "binning": [0.0, 0.25, 0.5, 0.75, 1.0, 1.5],
            "reco": { "field": "pt" }, "truth": { "field": "mc_pt" }
        }],
        "nucleons": 3.23e30
    }]
}"#;

struct Sample {
    mc: ColumnarSource,
    truth: ColumnarSource,
    data: ColumnarSource,
}

fn sample(n: usize, seed: u64) -> Sample {
    let mut rng = StdRng::seed_from_u64(seed);
    let smear = Normal::new(0.0, 0.05).unwrap();
    let (mut pt, mut mc_pt, mut theta, mut mc_theta) = (vec![], vec![], vec![], vec![]);
    let (mut current, mut wgt, mut flux_w) = (vec![], vec![], vec![]);
    for _ in 0..n {
        let t: f64 = rng.gen_range(0.0..1.4);
        let th: f64 = rng.gen_range(0.0..0.4);
        mc_pt.push(t);
        pt.push(t + smear.sample(&mut rng));
        mc_theta.push(th);
        theta.push(th + smear.sample(&mut rng) * 0.1);
        current.push(if rng.gen_bool(0.8) { 1.0 } else { 2.0 });
        wgt.push(rng.gen_range(0.8..1.2));
        flux_w.push((0..3).map(|_| rng.gen_range(0.9..1.1)).collect::<Vec<f64>>());
    }
    let build = |kind| {
        ColumnarSource::new(kind)
            .with_scalar("pt", pt.clone())
            .with_scalar("mc_pt", mc_pt.clone())
            .with_scalar("theta_mu", theta.clone())
            .with_scalar("mc_theta_mu", mc_theta.clone())
            .with_scalar("mc_current", current.clone())
            .with_scalar("wgt", wgt.clone())
            .with_vector("flux_w", flux_w.clone())
            .build()
            .unwrap()
    };
    let data = ColumnarSource::new(SourceKind::Data)
        .with_scalar("pt", pt.clone())
        .with_scalar("theta_mu", theta.clone())
        .build()
        .unwrap();
    Sample { mc: build(SourceKind::Reco), truth: build(SourceKind::Truth), data }
}

fn flux() -> FluxIntegration {
    let layout = BandLayout::new(
        [("cv".to_string(), 1), (FLUX_BAND.to_string(), 3)].into_iter().collect(),
    )
    .unwrap();
    let mut h = Hist1D::new("flux", "E_nu", Binning::uniform(10, 0.0, 20.0).unwrap(), &layout);
    for bin in 0..10 {
        let e = 1.0 + 2.0 * bin as f64;
        h.fill("cv", 0, e, 1e-8).unwrap();
        for u in 0..3 {
            h.fill(FLUX_BAND, u, e, 1e-8 * (0.95 + 0.05 * u as f64)).unwrap();
        }
    }
    FluxIntegration { spectrum: FluxSpectrum::new(h).unwrap(), e_min: 0.0, e_max: 100.0 }
}

fn run(s: &mut Sample) -> xs_event::EventLoopOutput {
    let mut lp: EventLoop = AnalysisConfig::from_json(CONFIG).unwrap().build().unwrap();
    lp.run_mc_reco(&mut s.mc).unwrap();
    lp.run_truth(&mut s.truth).unwrap();
    lp.run_data(&mut s.data).unwrap();
    lp.finish(Exposure { mc_pot: 2.0e20, data_pot: 1.0e20 }, Some(&flux())).unwrap()
}

#[test]
fn end_to_end_thousand_events() {
    let mut s = sample(1000, 42);
    let out = run(&mut s);

    let reco = out.mc.hist1d("pTmu_tracker_selected_mc_reco").unwrap();
    let signal = out.mc.hist1d("pTmu_tracker_selected_signal_reco").unwrap();
    let nc = out.mc.hist1d("pTmu_tracker_background_NC").unwrap();
    let other = out.mc.hist1d("pTmu_tracker_background_Other").unwrap();
    let migration = out.mc.hist2d("pTmu_tracker_migration").unwrap();
    let num = out.mc.hist1d("pTmu_tracker_efficiency_numerator").unwrap();
    let den = out.mc.hist1d("pTmu_tracker_efficiency_denominator").unwrap();
    let data = out.data.hist1d("pTmu_tracker_data").unwrap();

    assert!(reco.cv().total() > 0.0);
    // Every selected event is either signal or one background, in every universe.
    for (band, universes) in reco.bands().iter() {
        for (i, u) in universes.iter().enumerate() {
            let sig = signal.bands().universe(band, i).unwrap();
            let b1 = nc.bands().universe(band, i).unwrap();
            let b2 = other.bands().universe(band, i).unwrap();
            for c in 0..u.sumw.len() {
                assert_relative_eq!(
                    u.sumw[c],
                    sig.sumw[c] + b1.sumw[c] + b2.sumw[c],
                    epsilon = 1e-9
                );
            }
        }
    }
    // Migration reco projection is the signal reco distribution.
    let px = migration.project_x();
    for (a, b) in px.cv().sumw.iter().zip(&signal.cv().sumw) {
        assert_relative_eq!(*a, *b, epsilon = 1e-9);
    }
    assert_eq!(nc.entries() + other.entries() + signal.entries(), reco.entries());
    // Selected signal is a subset of the truth-sample signal.
    assert!(num.cv().total() <= den.cv().total() + 1e-9);
    assert!(den.layout().n_universes("MuonEnergy").is_some());
    // Data has the central value only and unit weights.
    assert_eq!(data.layout(), BandLayout::cv_only());
    assert_eq!(data.cv().total(), data.entries() as f64);

    assert_eq!(out.mc.parameter("POTUsed").unwrap(), 2.0e20);
    assert_eq!(out.data.parameter("POTUsed").unwrap(), 1.0e20);
    assert_eq!(out.mc.parameter("pTmu_tracker_fiducial_nucleons").unwrap(), 3.23e30);
    let flux = out.mc.hist1d("pTmu_tracker_reweightedflux_integrated").unwrap();
    assert_relative_eq!(flux.cv().sumw[1], 1e-7, max_relative = 1e-12);
    assert_eq!(flux.binning(), num.binning());
}

#[test]
fn replay_is_bit_identical() {
    let a = run(&mut sample(300, 7));
    let b = run(&mut sample(300, 7));
    assert_eq!(a.mc, b.mc);
    assert_eq!(a.data, b.data);
}

#[test]
fn central_value_matches_cv_only_run() {
    let full = run(&mut sample(500, 21));

    let mut cv_only: serde_json::Value = serde_json::from_str(CONFIG).unwrap();
    cv_only["variations"] = serde_json::json!({ "n_flux_universes": 0 });
    let mut s = sample(500, 21);
    let mut lp = AnalysisConfig::from_json(&cv_only.to_string()).unwrap().build().unwrap();
    lp.run_mc_reco(&mut s.mc).unwrap();
    lp.run_truth(&mut s.truth).unwrap();
    lp.run_data(&mut s.data).unwrap();
    let nominal = lp.finish(Exposure { mc_pot: 2.0e20, data_pot: 1.0e20 }, None).unwrap();

    let kinds = [
        "selected_mc_reco",
        "selected_signal_reco",
        "efficiency_numerator",
        "efficiency_denominator",
        "background_NC",
        "background_Other",
    ];
    for kind in kinds {
        let name = format!("pTmu_tracker_{kind}");
        let a = full.mc.hist1d(&name).unwrap();
        let b = nominal.mc.hist1d(&name).unwrap();
        assert_eq!(b.layout(), BandLayout::cv_only(), "{name}");
        assert_eq!(a.cv(), b.cv(), "{name}");
    }
    let a = full.mc.hist2d("pTmu_tracker_migration").unwrap();
    let b = nominal.mc.hist2d("pTmu_tracker_migration").unwrap();
    assert_eq!(a.matrix("cv", 0).unwrap(), b.matrix("cv", 0).unwrap());
    assert_eq!(full.data, nominal.data);
}

#[test]
fn lateral_shift_changes_only_its_band() {
    let out = run(&mut sample(500, 3));
    let reco = out.mc.hist1d("pTmu_tracker_selected_mc_reco").unwrap();
    let cv = &reco.cv().sumw;
    let flux0 = &reco.bands().universe(FLUX_BAND, 0).unwrap().sumw;
    let shifted = &reco.bands().universe("MuonEnergy", 1).unwrap().sumw;
    assert_ne!(cv, shifted);
    // Flux universes only reweight, so they populate the same cells as cv.
    for (a, b) in cv.iter().zip(flux0) {
        assert_eq!(*a == 0.0, *b == 0.0);
    }
}

#[test]
fn pass_kinds_are_enforced() {
    let mut s = sample(10, 1);
    let mut lp = AnalysisConfig::from_json(CONFIG).unwrap().build().unwrap();
    assert!(matches!(lp.run_mc_reco(&mut s.data), Err(Error::Config(_))));
    assert!(matches!(lp.run_data(&mut s.mc), Err(Error::Config(_))));
}

#[test]
fn missing_field_aborts_pass_with_entry() {
    let mut src = ColumnarSource::new(SourceKind::Reco)
        .with_scalar("pt", vec![0.3, 0.6])
        .with_scalar("wgt", vec![1.0, 1.0])
        .with_vector("flux_w", vec![vec![1.0; 3], vec![1.0; 3]])
        .build()
        .unwrap();
    let mut lp = AnalysisConfig::from_json(CONFIG).unwrap().build().unwrap();
    match lp.run_mc_reco(&mut src) {
        Err(Error::Data(msg)) => {
            assert!(msg.contains("entry 0"), "{msg}");
            assert!(msg.contains("theta_mu"), "{msg}");
        }
        other => panic!("expected data error, got {other:?}"),
    }
}

#[test]
fn pass_summary_reports_cut_flow() {
    let mut s = sample(200, 11);
    let mut lp = AnalysisConfig::from_json(CONFIG).unwrap().build().unwrap();
    let summary = lp.run_mc_reco(&mut s.mc).unwrap();
    assert_eq!(summary.n_entries, 200);
    let (region, stats) = &summary.cut_stats[0];
    assert_eq!(region, "tracker");
    assert_eq!(stats.reco.seen.raw, 200);
    assert!(stats.reco.cuts[0].raw >= stats.reco.cuts[1].raw);
    // Stats were reset after the pass.
    assert_eq!(lp.regions()[0].cutter().stats().reco.seen.raw, 0);
}
