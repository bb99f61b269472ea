use std::time::{SystemTime, UNIX_EPOCH};

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use xs_core::{Error, SourceKind};
use xs_event::{
    AnalysisConfig, ColumnarSource, EventLoopOutput, Exposure, FLUX_BAND, FluxIntegration,
    FluxSpectrum,
};
use xs_extract::{CrossSectionArtifact, Extraction, ExtractionConfig};
use xs_hist::{BandLayout, Binning, Hist1D};
use xs_unfold::UNFOLDING_COVARIANCE;

const ANALYSIS: &str = r#"{
    "schema_version": "xsec_analysis_v0",
    "variations": { "n_flux_universes": 2, "flux_weight_field": "flux_w" },
    "regions": [{
        "name": "tracker",
        "precuts": [{ "type": "above", "field": "pt", "value": 0.0 }],
        "signal": [{ "type": "equals", "field": "mc_current", "value": 1 }],
        "variables": [{
            "name": "pTmu", "binning": [0.0, 0.25, 0.5, 0.75, 1.0, 1.5],
            "reco": { "field": "pt" }, "truth": { "field": "mc_pt" }
        }],
        "nucleons": 3.0e30
    }]
}"#;

const EXTRACTION: &str = r#"{
    "schema_version": "xsec_extraction_v0",
    "iterations": 6,
    "observables": ["pTmu"],
    "materials": { "Tracker": ["tracker"], "Lead": ["Target2"] }
}"#;

const POT: f64 = 1.0e20;

/// Unit-weight simulation whose reco columns double as data, so that the
/// extracted cross section must reproduce the simulated one.
fn event_loop_output(n: usize, seed: u64) -> EventLoopOutput {
    let mut rng = StdRng::seed_from_u64(seed);
    let smear = Normal::new(0.0, 0.04).unwrap();
    let (mut pt, mut mc_pt, mut current, mut flux_w) = (vec![], vec![], vec![], vec![]);
    for _ in 0..n {
        let t: f64 = rng.gen_range(0.05..1.4);
        mc_pt.push(t);
        pt.push(t + smear.sample(&mut rng));
        current.push(if rng.gen_bool(0.85) { 1.0 } else { 2.0 });
        flux_w.push(vec![rng.gen_range(0.9..1.1), rng.gen_range(0.9..1.1)]);
    }
    let mc = |kind| {
        ColumnarSource::new(kind)
            .with_scalar("pt", pt.clone())
            .with_scalar("mc_pt", mc_pt.clone())
            .with_scalar("mc_current", current.clone())
            .with_vector("flux_w", flux_w.clone())
            .build()
            .unwrap()
    };
    let mut data =
        ColumnarSource::new(SourceKind::Data).with_scalar("pt", pt.clone()).build().unwrap();

    let layout = BandLayout::new(
        [("cv".to_string(), 1), (FLUX_BAND.to_string(), 2)].into_iter().collect(),
    )
    .unwrap();
    let energy = Binning::uniform(4, 0.0, 8.0).unwrap();
    let mut spectrum = Hist1D::new("flux", "E_nu", energy, &layout);
    for e in [1.0, 3.0, 5.0, 7.0] {
        spectrum.fill("cv", 0, e, 2.5e-9).unwrap();
        spectrum.fill(FLUX_BAND, 0, e, 2.4e-9).unwrap();
        spectrum.fill(FLUX_BAND, 1, e, 2.6e-9).unwrap();
    }
    let flux =
        FluxIntegration { spectrum: FluxSpectrum::new(spectrum).unwrap(), e_min: 0.0, e_max: 8.0 };

    let mut lp = AnalysisConfig::from_json(ANALYSIS).unwrap().build().unwrap();
    lp.run_mc_reco(&mut mc(SourceKind::Reco)).unwrap();
    lp.run_truth(&mut mc(SourceKind::Truth)).unwrap();
    lp.run_data(&mut data).unwrap();
    lp.finish(Exposure { mc_pot: POT, data_pot: POT }, Some(&flux)).unwrap()
}

fn tmp_dir(name: &str) -> std::path::PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut dir = std::env::temp_dir();
    dir.push(format!("xsec_extract_{}_{nanos}_{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn measured_cross_section_closes_on_simulation() {
    let out = event_loop_output(1000, 5);
    let ex = Extraction::new(ExtractionConfig::from_json(EXTRACTION).unwrap()).unwrap();
    let report = ex.run(&out.data, &out.mc).unwrap();

    assert_eq!(report.artifacts.len(), 1);
    let a: &CrossSectionArtifact = &report.artifacts[0];
    assert_eq!((a.material.as_str(), a.observable.as_str()), ("Tracker", "pTmu"));

    let measured = a.cross_section.cv_values();
    let simulated = a.simulated_cross_section.cv_values();
    for (m, s) in measured.iter().zip(&simulated) {
        assert!(*s > 0.0);
        assert_relative_eq!(*m, *s, max_relative = 0.05);
    }
    // Integrated flux was 1e-8 per m² in every bin.
    assert_relative_eq!(a.flux_reweighted.cv().sumw[1], 1.0e-8, max_relative = 1e-12);
    assert!(a.unfolded.covariance(UNFOLDING_COVARIANCE).is_some());
    assert!(a.cross_section.cv_with_uncertainty().iter().all(|b| b.err_up.is_finite()));
    assert_eq!(a.background_subtracted.layout(), a.unfolded.layout());
}

#[test]
fn missing_material_is_recorded_not_fatal() {
    let out = event_loop_output(300, 6);
    let ex = Extraction::new(ExtractionConfig::from_json(EXTRACTION).unwrap()).unwrap();
    let report = ex.run(&out.data, &out.mc).unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 1);
    let f = &report.failures[0];
    assert_eq!(f.material, "Lead");
    assert!(matches!(f.error, Error::NotFound(_)));
    assert!(f.to_string().contains("Lead"));
}

#[test]
fn playlists_divide_flux_and_nucleons() {
    let out = event_loop_output(300, 8);
    let one = Extraction::new(ExtractionConfig::from_json(EXTRACTION).unwrap()).unwrap();
    let two = one.clone().playlists(2).unwrap();
    let (ra, rb) = (one.run(&out.data, &out.mc).unwrap(), two.run(&out.data, &out.mc).unwrap());
    let (a, b) = (&ra.artifacts[0], &rb.artifacts[0]);
    assert_relative_eq!(b.flux_reweighted.cv().sumw[1], 0.5 * a.flux_reweighted.cv().sumw[1]);
    // Flux and nucleons both halve, so the cross section scales by four.
    assert_relative_eq!(
        b.cross_section.cv().sumw[2],
        4.0 * a.cross_section.cv().sumw[2],
        max_relative = 1e-9
    );
}

#[test]
fn artifact_files_are_never_overwritten() {
    let out = event_loop_output(200, 9);
    let ex = Extraction::new(ExtractionConfig::from_json(EXTRACTION).unwrap()).unwrap();
    let report = ex.run(&out.data, &out.mc).unwrap();
    let dir = tmp_dir("artifacts");
    let path = report.artifacts[0].write(&dir).unwrap();
    assert!(path.ends_with("Tracker_pTmu_crossSection.json"));
    assert!(matches!(report.artifacts[0].write(&dir), Err(Error::Io(_))));
    let _ = std::fs::remove_dir_all(&dir);
}
