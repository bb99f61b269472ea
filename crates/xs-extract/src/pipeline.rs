//! Per (material, observable) extraction pipeline.
//!
//! ```json
//! {
//!   "schema_version": "xsec_extraction_v0",
//!   "iterations": 4,
//!   "observables": ["pTmu"],
//!   "materials": { "Lead": ["Target2", "Target3"], "Tracker": ["tracker"] }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xs_core::{Error, MetadataStore, POT_USED, Result};
use xs_event::BackgroundCategory;
use xs_hist::{Hist1D, HistogramFile, HistogramStore};
use xs_unfold::BayesUnfold;

use crate::background::subtract_backgrounds;
use crate::ingredients::Ingredients;
use crate::normalize::{efficiency, normalize};

/// Schema tag expected in extraction configuration files.
pub const EXTRACTION_SCHEMA: &str = "xsec_extraction_v0";

/// What to extract and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Must equal [`EXTRACTION_SCHEMA`].
    pub schema_version: String,
    /// Unfolding iterations.
    pub iterations: usize,
    /// Iterations of the covariance run (default: the unfolding's nominal).
    #[serde(default)]
    pub covariance_iterations: Option<usize>,
    /// Observable names; empty means every observable with a data histogram.
    #[serde(default)]
    pub observables: Vec<String>,
    /// Material name → target labels (event-loop region names) summed into it.
    pub materials: BTreeMap<String, Vec<String>>,
    /// Background category labels to subtract.
    #[serde(default = "default_backgrounds")]
    pub backgrounds: Vec<String>,
    /// Playlists merged into the inputs; flux and nucleons are divided by it.
    #[serde(default = "one")]
    pub num_merged_playlists: u32,
}

fn default_backgrounds() -> Vec<String> {
    BackgroundCategory::ALL.iter().map(|c| c.label().to_string()).collect()
}

fn one() -> u32 {
    1
}

impl ExtractionConfig {
    /// Parse and check.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: ExtractionConfig = serde_json::from_str(text)?;
        if cfg.schema_version != EXTRACTION_SCHEMA {
            return Err(Error::Config(format!(
                "unsupported schema_version '{}' (expected '{EXTRACTION_SCHEMA}')",
                cfg.schema_version
            )));
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read a configuration file.
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::Config("iterations must be at least 1".into()));
        }
        if self.num_merged_playlists == 0 {
            return Err(Error::Config("num_merged_playlists must be at least 1".into()));
        }
        if self.materials.is_empty() {
            return Err(Error::Config("no materials configured".into()));
        }
        if let Some((name, _)) = self.materials.iter().find(|(_, t)| t.is_empty()) {
            return Err(Error::Config(format!("material '{name}' has no targets")));
        }
        Ok(())
    }
}

/// File written by [`CrossSectionArtifact::write`] for one pair.
pub fn artifact_file_name(material: &str, observable: &str) -> String {
    format!("{material}_{observable}_crossSection.json")
}

/// Results of one (material, observable) pair.
#[derive(Debug, Clone)]
pub struct CrossSectionArtifact {
    /// Material name.
    pub material: String,
    /// Observable name.
    pub observable: String,
    /// Data minus scaled backgrounds.
    pub background_subtracted: Hist1D,
    /// Unfolded event rate, before efficiency correction.
    pub unfolded: Hist1D,
    /// Efficiency × acceptance.
    pub efficiency: Hist1D,
    /// Integrated flux used for normalization.
    pub flux_reweighted: Hist1D,
    /// Measured cross section.
    pub cross_section: Hist1D,
    /// Simulated signal rate (efficiency denominator).
    pub simulated_event_rate: Hist1D,
    /// Simulated cross section, normalized like the measurement.
    pub simulated_cross_section: Hist1D,
}

impl CrossSectionArtifact {
    /// Keys of the stored histograms, in field order.
    pub const KEYS: [&'static str; 7] = [
        "backgroundSubtracted",
        "unfolded",
        "efficiency",
        "flux_reweighted",
        "crossSection",
        "simulatedEventRate",
        "simulatedCrossSection",
    ];

    /// File name for this pair.
    pub fn file_name(&self) -> String {
        artifact_file_name(&self.material, &self.observable)
    }

    /// Histogram store with every result under its fixed key.
    pub fn to_store(&self) -> HistogramFile {
        let hists = [
            &self.background_subtracted,
            &self.unfolded,
            &self.efficiency,
            &self.flux_reweighted,
            &self.cross_section,
            &self.simulated_event_rate,
            &self.simulated_cross_section,
        ];
        let mut store = HistogramFile::new();
        for (key, h) in Self::KEYS.iter().zip(hists) {
            let mut h = h.clone();
            h.set_name(*key);
            store.put_hist1d(h);
        }
        store
    }

    /// Write into `dir`; fails if the file already exists.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        self.to_store().save_new(&path)?;
        log::info!("wrote {}", path.display());
        Ok(path)
    }
}

/// A pair that could not be extracted.
#[derive(Debug)]
pub struct ExtractionFailure {
    /// Material name.
    pub material: String,
    /// Observable name.
    pub observable: String,
    /// What went wrong.
    pub error: Error,
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to extract a cross section for material {} and observable {}: {}",
            self.material, self.observable, self.error
        )
    }
}

/// Outcome of a batch.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Successful pairs, observable-major.
    pub artifacts: Vec<CrossSectionArtifact>,
    /// Failed pairs.
    pub failures: Vec<ExtractionFailure>,
}

impl ExtractionReport {
    /// No pair failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Configured extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    config: ExtractionConfig,
}

impl Extraction {
    /// Wrap a checked configuration.
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Override the unfolding iteration count.
    pub fn iterations(mut self, iterations: usize) -> Result<Self> {
        self.config.iterations = iterations;
        self.config.validate()?;
        Ok(self)
    }

    /// Override the number of merged playlists.
    pub fn playlists(mut self, n: u32) -> Result<Self> {
        self.config.num_merged_playlists = n;
        self.config.validate()?;
        Ok(self)
    }

    /// The configuration in effect.
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    fn unfolder(&self) -> BayesUnfold {
        let unfold = BayesUnfold::new(self.config.iterations);
        match self.config.covariance_iterations {
            Some(n) => unfold.covariance_iterations(n),
            None => unfold,
        }
    }

    /// Observables to extract: the configured list, or every observable with
    /// a `<observable>_<target>_data` histogram for a configured target.
    pub fn observables(&self, data: &HistogramFile) -> Vec<String> {
        if !self.config.observables.is_empty() {
            return self.config.observables.clone();
        }
        let suffixes: BTreeSet<String> =
            self.config.materials.values().flatten().map(|t| format!("_{t}_data")).collect();
        let found: BTreeSet<String> = data
            .names()
            .filter_map(|name| {
                suffixes.iter().find_map(|s| name.strip_suffix(s.as_str())).map(str::to_string)
            })
            .filter(|prefix| !prefix.is_empty())
            .collect();
        found.into_iter().collect()
    }

    /// Artifact file names [`run`](Self::run) would write for `data`.
    pub fn output_files(&self, data: &HistogramFile) -> Vec<String> {
        let observables = self.observables(data);
        observables
            .iter()
            .flat_map(|o| self.config.materials.keys().map(move |m| artifact_file_name(m, o)))
            .collect()
    }

    /// Extract every (material, observable) pair.
    ///
    /// Missing exposures abort. A pair whose error is recoverable (missing
    /// ingredient, unfolding failure) is logged and recorded; any other error
    /// aborts the batch.
    pub fn run(&self, data: &HistogramFile, mc: &HistogramFile) -> Result<ExtractionReport> {
        let data_pot = data.parameter(POT_USED)?;
        let mc_pot = mc.parameter(POT_USED)?;
        log::info!("data POT {data_pot:e}, MC POT {mc_pot:e}");

        let mut report = ExtractionReport::default();
        for observable in self.observables(data) {
            for (material, targets) in &self.config.materials {
                log::info!("extracting '{observable}' for material '{material}'");
                let result = Ingredients::gather(
                    data,
                    mc,
                    &observable,
                    targets,
                    &self.config.backgrounds,
                )
                .and_then(|ing| self.extract_one(ing, material, &observable, data_pot, mc_pot));
                match result {
                    Ok(artifact) => report.artifacts.push(artifact),
                    Err(error) if error.is_recoverable() => {
                        let failure = ExtractionFailure {
                            material: material.clone(),
                            observable: observable.clone(),
                            error,
                        };
                        log::error!("{failure}");
                        report.failures.push(failure);
                    }
                    Err(error) => return Err(error),
                }
            }
        }
        Ok(report)
    }

    /// Run the full chain on gathered ingredients.
    pub fn extract_one(
        &self,
        ingredients: Ingredients,
        material: &str,
        observable: &str,
        data_pot: f64,
        mc_pot: f64,
    ) -> Result<CrossSectionArtifact> {
        let Ingredients {
            data,
            migration,
            efficiency_numerator,
            efficiency_denominator,
            backgrounds,
            mut flux,
            nucleons,
        } = ingredients;
        let playlists = f64::from(self.config.num_merged_playlists);
        // Valid only while the integrated flux is the same in every playlist.
        flux.scale(1.0 / playlists);
        let nucleons = nucleons / playlists;

        let refs: Vec<&Hist1D> = backgrounds.iter().collect();
        let background_subtracted = subtract_backgrounds(&data, &refs, data_pot, mc_pot)?;
        let unfolded = self.unfolder().unfold_hist(&background_subtracted, &migration)?;
        let efficiency = efficiency(&efficiency_numerator, &efficiency_denominator)?;

        let mut corrected = unfolded.clone();
        corrected.divide(&efficiency)?;
        let cross_section = normalize(&corrected, &flux, nucleons, data_pot)?;
        let simulated_cross_section =
            normalize(&efficiency_denominator, &flux, nucleons, mc_pot)?;

        Ok(CrossSectionArtifact {
            material: material.to_string(),
            observable: observable.to_string(),
            background_subtracted,
            unfolded,
            efficiency,
            flux_reweighted: flux,
            cross_section,
            simulated_event_rate: efficiency_denominator,
            simulated_cross_section,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "schema_version": "xsec_extraction_v0",
        "iterations": 4,
        "materials": { "Lead": ["Target2", "Target3"], "Tracker": ["tracker"] }
    }"#;

    #[test]
    fn defaults() {
        let cfg = ExtractionConfig::from_json(CONFIG).unwrap();
        assert_eq!(cfg.backgrounds, vec!["NC".to_string(), "Other".to_string()]);
        assert_eq!(cfg.num_merged_playlists, 1);
        assert!(cfg.observables.is_empty());
    }

    #[test]
    fn invalid_configs_rejected() {
        let zero = CONFIG.replace(r#""iterations": 4"#, r#""iterations": 0"#);
        assert!(matches!(ExtractionConfig::from_json(&zero), Err(Error::Config(_))));
        let empty = CONFIG.replace(r#"["tracker"]"#, "[]");
        assert!(matches!(ExtractionConfig::from_json(&empty), Err(Error::Config(_))));
        let ex = Extraction::new(ExtractionConfig::from_json(CONFIG).unwrap()).unwrap();
        assert!(ex.playlists(0).is_err());
    }

    #[test]
    fn observables_discovered_from_data() {
        use xs_hist::{BandLayout, Binning};
        let ex = Extraction::new(ExtractionConfig::from_json(CONFIG).unwrap()).unwrap();
        let mut data = HistogramFile::new();
        let b = Binning::uniform(1, 0.0, 1.0).unwrap();
        let names =
            ["pTmu_tracker_data", "Q2_Target2_data", "pTmu_tracker_data_Water", "x_Other_data"];
        for name in names {
            data.put_hist1d(Hist1D::new(name, "", b.clone(), &BandLayout::cv_only()));
        }
        assert_eq!(ex.observables(&data), vec!["Q2".to_string(), "pTmu".to_string()]);
    }

    #[test]
    fn output_files_cover_every_pair() {
        let json =
            CONFIG.replace(r#""iterations": 4"#, r#""iterations": 4, "observables": ["pTmu"]"#);
        let ex = Extraction::new(ExtractionConfig::from_json(&json).unwrap()).unwrap();
        assert_eq!(
            ex.output_files(&HistogramFile::new()),
            vec!["Lead_pTmu_crossSection.json".to_string(), "Tracker_pTmu_crossSection.json".into()]
        );
    }

    #[test]
    fn artifact_keys_and_file_name() {
        use xs_hist::{BandLayout, Binning};
        let b = Binning::uniform(1, 0.0, 1.0).unwrap();
        let h = Hist1D::new("h", "", b, &BandLayout::cv_only());
        let a = CrossSectionArtifact {
            material: "Lead".into(),
            observable: "pTmu".into(),
            background_subtracted: h.clone(),
            unfolded: h.clone(),
            efficiency: h.clone(),
            flux_reweighted: h.clone(),
            cross_section: h.clone(),
            simulated_event_rate: h.clone(),
            simulated_cross_section: h,
        };
        assert_eq!(a.file_name(), "Lead_pTmu_crossSection.json");
        let store = a.to_store();
        let names: Vec<&str> = store.names().collect();
        let mut keys = CrossSectionArtifact::KEYS.to_vec();
        keys.sort();
        assert_eq!(names, keys);
    }
}
