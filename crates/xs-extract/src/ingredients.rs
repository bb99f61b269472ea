//! Event-loop histograms needed for one (material, observable) pair.

use xs_core::{Error, MetadataStore, Result};
use xs_hist::{Hist1D, Hist2D, HistogramStore};

/// Inputs of one extraction, summed over the material's targets.
#[derive(Debug, Clone)]
pub struct Ingredients {
    /// Selected data.
    pub data: Hist1D,
    /// Reco × true migration of selected signal.
    pub migration: Hist2D,
    /// Selected signal at true value.
    pub efficiency_numerator: Hist1D,
    /// All signal in the phase space at true value.
    pub efficiency_denominator: Hist1D,
    /// One histogram per background category.
    pub backgrounds: Vec<Hist1D>,
    /// Integrated flux on the efficiency binning.
    pub flux: Hist1D,
    /// Fiducial nucleons.
    pub nucleons: f64,
}

/// Store key of ingredient `kind` for `observable` in region `target`.
pub fn ingredient_name(observable: &str, target: &str, kind: &str) -> String {
    format!("{observable}_{target}_{kind}")
}

impl Ingredients {
    /// Read and sum the ingredients of `targets`.
    ///
    /// Histograms come from `data` (selected data) and `mc` (everything
    /// else); background categories are looked up as
    /// `<observable>_<target>_background_<category>`.
    pub fn gather<D, M>(
        data: &D,
        mc: &M,
        observable: &str,
        targets: &[String],
        background_categories: &[String],
    ) -> Result<Self>
    where
        D: HistogramStore,
        M: HistogramStore + MetadataStore,
    {
        let Some((first, rest)) = targets.split_first() else {
            return Err(Error::Config(format!("'{observable}': no targets to extract")));
        };
        let data_hist = |t: &str| data.hist1d(&ingredient_name(observable, t, "data")).cloned();
        let mc_hist = |t: &str, kind: &str| mc.hist1d(&ingredient_name(observable, t, kind));
        let migration = |t: &str| mc.hist2d(&ingredient_name(observable, t, "migration"));
        let nucleons = |t: &str| mc.parameter(&ingredient_name(observable, t, "fiducial_nucleons"));
        let background_kinds: Vec<String> =
            background_categories.iter().map(|c| format!("background_{c}")).collect();

        let mut out = Self {
            data: data_hist(first)?,
            migration: migration(first)?.clone(),
            efficiency_numerator: mc_hist(first, "efficiency_numerator")?.clone(),
            efficiency_denominator: mc_hist(first, "efficiency_denominator")?.clone(),
            backgrounds: background_kinds
                .iter()
                .map(|k| mc_hist(first, k).cloned())
                .collect::<Result<_>>()?,
            flux: mc_hist(first, "reweightedflux_integrated")?.clone(),
            nucleons: nucleons(first)?,
        };

        for t in rest {
            out.data.merge(&data_hist(t)?)?;
            out.migration.merge(migration(t)?)?;
            out.efficiency_numerator.merge(mc_hist(t, "efficiency_numerator")?)?;
            out.efficiency_denominator.merge(mc_hist(t, "efficiency_denominator")?)?;
            for (sum, k) in out.backgrounds.iter_mut().zip(&background_kinds) {
                sum.merge(mc_hist(t, k)?)?;
            }
            out.flux.merge(mc_hist(t, "reweightedflux_integrated")?)?;
            out.nucleons += nucleons(t)?;
        }
        log::debug!(
            "'{observable}': gathered {} targets, {} backgrounds, {} nucleons",
            targets.len(),
            out.backgrounds.len(),
            out.nucleons
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xs_hist::{BandLayout, Binning, HistogramFile};

    fn h1(name: &str, w: f64) -> Hist1D {
        let axis = Binning::uniform(2, 0.0, 2.0).unwrap();
        let mut h = Hist1D::new(name, "", axis, &BandLayout::cv_only());
        h.fill("cv", 0, 0.5, w).unwrap();
        h
    }

    fn stores(targets: &[&str]) -> (HistogramFile, HistogramFile) {
        let (mut data, mut mc) = (HistogramFile::new(), HistogramFile::new());
        let axis = Binning::uniform(2, 0.0, 2.0).unwrap();
        for t in targets {
            let n = |k: &str| ingredient_name("pTmu", t, k);
            data.put_hist1d(h1(&n("data"), 10.0));
            let mut m =
                Hist2D::new(n("migration"), "", axis.clone(), axis.clone(), &BandLayout::cv_only());
            m.fill("cv", 0, 0.5, 0.5, 4.0).unwrap();
            mc.put_hist2d(m);
            mc.put_hist1d(h1(&n("efficiency_numerator"), 4.0));
            mc.put_hist1d(h1(&n("efficiency_denominator"), 8.0));
            mc.put_hist1d(h1(&n("background_NC"), 1.0));
            mc.put_hist1d(h1(&n("reweightedflux_integrated"), 1e-8));
            mc.set_parameter(&n("fiducial_nucleons"), 1e30).unwrap();
        }
        (data, mc)
    }

    #[test]
    fn targets_are_summed() {
        let (data, mc) = stores(&["Target1", "Target2"]);
        let targets = vec!["Target1".to_string(), "Target2".to_string()];
        let ing = Ingredients::gather(&data, &mc, "pTmu", &targets, &["NC".to_string()]).unwrap();
        assert_eq!(ing.data.cv().sumw[1], 20.0);
        assert_eq!(ing.backgrounds.len(), 1);
        assert_eq!(ing.backgrounds[0].cv().sumw[1], 2.0);
        assert_eq!(ing.migration.entries(), 2);
        assert_eq!(ing.nucleons, 2e30);
    }

    #[test]
    fn missing_ingredient_is_not_found() {
        let (data, mc) = stores(&["Target1"]);
        let targets = vec!["Target1".to_string(), "Target9".to_string()];
        let res = Ingredients::gather(&data, &mc, "pTmu", &targets, &[]);
        assert!(matches!(res, Err(Error::NotFound(_))));
        let res = Ingredients::gather(&data, &mc, "pTmu", &targets[..1], &["Other".to_string()]);
        assert!(matches!(res, Err(Error::NotFound(_))));
    }
}
