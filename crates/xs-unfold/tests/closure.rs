use std::collections::BTreeMap;

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use xs_hist::{BandLayout, Binning, Hist2D};
use xs_unfold::{BayesUnfold, ResponseSummary, UNFOLDING_COVARIANCE};

fn layout() -> BandLayout {
    BandLayout::new(BTreeMap::from([("cv".to_string(), 1), ("Flux".to_string(), 3)])).unwrap()
}

/// 1000 events, true values inside the axis, reco smeared by `sigma`
/// (zero gives a diagonal matrix).
fn migration(sigma: f64, seed: u64) -> Hist2D {
    let axis = Binning::new(vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0]).unwrap();
    let mut m = Hist2D::new("pTmu_migration", "reco;true", axis.clone(), axis, &layout());
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..1000 {
        let t: f64 = rng.gen_range(0.01..0.99);
        let r = if sigma > 0.0 { t + Normal::new(0.0, sigma).unwrap().sample(&mut rng) } else { t };
        let w: f64 = rng.gen_range(0.5..1.5);
        m.fill("cv", 0, r, t, w).unwrap();
        for u in 0..3 {
            m.fill("Flux", u, r, t, w * (0.9 + 0.1 * u as f64)).unwrap();
        }
    }
    m
}

/// Truth spectrum restricted to events reconstructed in range.
fn expected_truth(m: &Hist2D, band: &str, index: usize) -> Vec<f64> {
    let cells = m.matrix(band, index).unwrap();
    let n = m.x_binning().n_bins();
    (1..=n).map(|t| (1..=n).map(|r| cells[r][t]).sum()).collect()
}

#[test]
fn identity_kernel_closes() {
    let m = migration(0.0, 1);
    let folded = m.project_x();
    let out = BayesUnfold::new(4).unfold_hist(&folded, &m).unwrap();
    for (band, n) in layout().iter() {
        for i in 0..n {
            let got = &out.bands().universe(band, i).unwrap().sumw;
            let data = &folded.bands().universe(band, i).unwrap().sumw;
            for c in 1..=5 {
                assert_relative_eq!(got[c], data[c], max_relative = 1e-6);
            }
        }
    }
    let s = ResponseSummary::from_migration(&m).unwrap();
    assert!(s.purity.iter().all(|&p| (p - 1.0).abs() < 1e-12));
}

#[test]
fn smeared_closure_recovers_truth() {
    let m = migration(0.08, 2);
    let folded = m.project_x();
    let out = BayesUnfold::new(10).unfold_hist(&folded, &m).unwrap();
    for (band, n) in layout().iter() {
        for i in 0..n {
            let expected = expected_truth(&m, band, i);
            let got = &out.bands().universe(band, i).unwrap().sumw;
            for (t, e) in expected.iter().enumerate() {
                assert_relative_eq!(got[t + 1], *e, max_relative = 1e-6);
            }
        }
    }
    // Smearing mixes neighbouring bins.
    let s = ResponseSummary::from_migration(&m).unwrap();
    assert!(s.min_purity().unwrap() < 1.0);
}

#[test]
fn covariance_has_one_row_per_true_cell() {
    let m = migration(0.05, 3);
    let out = BayesUnfold::new(2).unfold_hist(&m.project_x(), &m).unwrap();
    let cov = out.covariance(UNFOLDING_COVARIANCE).unwrap();
    assert_eq!(cov.dim(), m.y_binning().n_cells());
    assert_eq!(cov.get(0, 0), 0.0);
    // Flow cells carry nothing.
    assert!((0..cov.dim()).all(|j| cov.get(0, j) == 0.0 && cov.get(cov.dim() - 1, j) == 0.0));
    assert!(out.cv().sumw2[1..=5].iter().all(|&v| v > 0.0));
    assert_eq!(out.layout(), m.layout());
}

#[test]
fn parallel_unfolding_is_deterministic() {
    let m = migration(0.1, 4);
    let folded = m.project_x();
    let unfold = BayesUnfold::new(5).covariance_iterations(2);
    let a = unfold.unfold_hist(&folded, &m).unwrap();
    let b = unfold.unfold_hist(&folded, &m).unwrap();
    assert_eq!(a, b);
}
