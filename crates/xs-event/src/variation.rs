//! The set of universes an event loop pass runs over.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use xs_core::{Error, Result};
use xs_hist::{BandLayout, CV_BAND};

use crate::universe::{CentralValue, LateralShift, Universe, VectorWeight, WeightShift};

/// Band name of the flux universes.
pub const FLUX_BAND: &str = "Flux";

/// Universes grouped by band. The `"cv"` band always holds exactly one
/// central-value universe.
pub struct VariationSet {
    bands: BTreeMap<String, Vec<Box<dyn Universe>>>,
}

impl std::fmt::Debug for VariationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.bands.iter().map(|(k, v)| (k, v.len()))).finish()
    }
}

impl VariationSet {
    /// Validate and wrap a band map.
    pub fn new(bands: BTreeMap<String, Vec<Box<dyn Universe>>>) -> Result<Self> {
        for (band, universes) in &bands {
            if universes.is_empty() {
                return Err(Error::Config(format!("variation band '{band}' has no universes")));
            }
            if let Some(u) = universes.iter().find(|u| u.band() != band.as_str()) {
                return Err(Error::Config(format!(
                    "universe '{}' reports band '{}' but is stored under '{band}'",
                    u.name(),
                    u.band()
                )));
            }
        }
        match bands.get(CV_BAND) {
            Some(cv) if cv.len() == 1 => Ok(Self { bands }),
            _ => Err(Error::Config(format!(
                "variation set needs exactly one '{CV_BAND}' universe"
            ))),
        }
    }

    /// Only the central value (used for data).
    pub fn cv_only() -> Self {
        let mut bands: BTreeMap<String, Vec<Box<dyn Universe>>> = BTreeMap::new();
        bands.insert(CV_BAND.to_string(), vec![Box::new(CentralValue)]);
        Self { bands }
    }

    /// Build the standard set from configuration.
    pub fn from_config(config: &VariationConfig) -> Result<Self> {
        let mut bands: BTreeMap<String, Vec<Box<dyn Universe>>> = BTreeMap::new();
        bands.insert(CV_BAND.to_string(), vec![Box::new(CentralValue)]);

        let n_flux = if config.skip_systematics {
            config.n_flux_universes.min(2)
        } else {
            config.n_flux_universes
        };
        if n_flux == 1 {
            return Err(Error::Config(
                "n_flux_universes must be 0 or at least 2 (a single universe has no spread)".into(),
            ));
        }
        if n_flux > 0 {
            let flux: Vec<Box<dyn Universe>> = (0..n_flux)
                .map(|i| {
                    Box::new(VectorWeight::new(FLUX_BAND, &config.flux_weight_field, i))
                        as Box<dyn Universe>
                })
                .collect();
            bands.insert(FLUX_BAND.to_string(), flux);
        }

        if !config.skip_systematics {
            for l in &config.lateral {
                check_sigma(&l.band, l.fractional_sigma)?;
                let pair: Vec<Box<dyn Universe>> = [-1.0, 1.0]
                    .into_iter()
                    .map(|n| {
                        Box::new(LateralShift::new(&l.band, &l.field, l.fractional_sigma, n))
                            as Box<dyn Universe>
                    })
                    .collect();
                insert_band(&mut bands, &l.band, pair)?;
            }
            for v in &config.vertical {
                check_sigma(&v.band, v.fractional_sigma)?;
                let pair: Vec<Box<dyn Universe>> = [-1.0, 1.0]
                    .into_iter()
                    .map(|n| {
                        Box::new(WeightShift::new(&v.band, v.fractional_sigma, n))
                            as Box<dyn Universe>
                    })
                    .collect();
                insert_band(&mut bands, &v.band, pair)?;
            }
        }

        let set = Self::new(bands)?;
        log::info!(
            "variation set: {} universes in {} bands",
            set.layout().total_universes(),
            set.bands.len()
        );
        Ok(set)
    }

    /// The central-value universe.
    pub fn cv(&self) -> &dyn Universe {
        // `new` guarantees the cv band holds one universe.
        self.bands[CV_BAND][0].as_ref()
    }

    /// Universes of one band.
    pub fn resolve(&self, band: &str) -> Result<&[Box<dyn Universe>]> {
        self.bands
            .get(band)
            .map(|v| v.as_slice())
            .ok_or_else(|| Error::NotFound(format!("variation band '{band}'")))
    }

    /// Bands in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Box<dyn Universe>])> {
        self.bands.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Band name → universe count, for sizing histograms.
    pub fn layout(&self) -> BandLayout {
        // Every band is non-empty and cv has one universe, so this cannot fail.
        BandLayout::new(self.bands.iter().map(|(k, v)| (k.clone(), v.len())).collect())
            .unwrap_or_else(|_| BandLayout::cv_only())
    }
}

fn check_sigma(band: &str, sigma: f64) -> Result<()> {
    if !(sigma.is_finite() && sigma >= 0.0) {
        return Err(Error::Config(format!("band '{band}': fractional_sigma must be >= 0")));
    }
    Ok(())
}

fn insert_band(
    bands: &mut BTreeMap<String, Vec<Box<dyn Universe>>>,
    band: &str,
    universes: Vec<Box<dyn Universe>>,
) -> Result<()> {
    if bands.contains_key(band) {
        return Err(Error::Config(format!("duplicate variation band '{band}'")));
    }
    bands.insert(band.to_string(), universes);
    Ok(())
}

/// A reconstructed field shifted by ±1σ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LateralShiftConfig {
    /// Band name.
    pub band: String,
    /// Reconstructed field the shift applies to.
    pub field: String,
    /// One-sigma fractional shift.
    pub fractional_sigma: f64,
}

/// A constant ±1σ weight shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightShiftConfig {
    /// Band name.
    pub band: String,
    /// One-sigma fractional weight change.
    pub fractional_sigma: f64,
}

/// Which universes to build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariationConfig {
    /// Keep only cv plus a minimal two-universe flux band.
    #[serde(default)]
    pub skip_systematics: bool,
    /// Number of flux universes (0 disables the band).
    #[serde(default = "default_n_flux")]
    pub n_flux_universes: usize,
    /// Per-event vector field holding one flux weight per universe.
    #[serde(default = "default_flux_field")]
    pub flux_weight_field: String,
    /// Lateral (reconstructed-quantity) systematics.
    #[serde(default)]
    pub lateral: Vec<LateralShiftConfig>,
    /// Vertical (weight) systematics.
    #[serde(default)]
    pub vertical: Vec<WeightShiftConfig>,
}

fn default_n_flux() -> usize {
    100
}

fn default_flux_field() -> String {
    "mc_wgt_Flux_BeamFocus".to_string()
}

impl Default for VariationConfig {
    fn default() -> Self {
        Self {
            skip_systematics: false,
            n_flux_universes: default_n_flux(),
            flux_weight_field: default_flux_field(),
            lateral: Vec::new(),
            vertical: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VariationConfig {
        VariationConfig {
            n_flux_universes: 5,
            lateral: vec![LateralShiftConfig {
                band: "MuonEnergy".into(),
                field: "emu".into(),
                fractional_sigma: 0.02,
            }],
            vertical: vec![WeightShiftConfig { band: "Target".into(), fractional_sigma: 0.014 }],
            ..Default::default()
        }
    }

    #[test]
    fn standard_set_layout() {
        let set = VariationSet::from_config(&config()).unwrap();
        let layout = set.layout();
        assert_eq!(layout.n_universes("cv"), Some(1));
        assert_eq!(layout.n_universes(FLUX_BAND), Some(5));
        assert_eq!(layout.n_universes("MuonEnergy"), Some(2));
        assert_eq!(layout.n_universes("Target"), Some(2));
        assert!(set.cv().is_cv());
        assert_eq!(set.resolve("MuonEnergy").unwrap()[1].name(), "MuonEnergy_+1sigma");
        assert!(matches!(set.resolve("GENIE"), Err(Error::NotFound(_))));
    }

    #[test]
    fn skip_systematics_keeps_minimal_flux() {
        let cfg = VariationConfig { skip_systematics: true, ..config() };
        let set = VariationSet::from_config(&cfg).unwrap();
        let layout = set.layout();
        assert_eq!(layout.n_universes(FLUX_BAND), Some(2));
        assert_eq!(layout.n_universes("MuonEnergy"), None);
        assert_eq!(layout.total_universes(), 3);
    }

    #[test]
    fn invalid_sets_rejected() {
        let one_flux = VariationConfig { n_flux_universes: 1, ..config() };
        assert!(matches!(VariationSet::from_config(&one_flux), Err(Error::Config(_))));

        let mut dup = config();
        dup.vertical.push(WeightShiftConfig { band: "MuonEnergy".into(), fractional_sigma: 0.1 });
        assert!(VariationSet::from_config(&dup).is_err());

        let no_cv: BTreeMap<String, Vec<Box<dyn Universe>>> = BTreeMap::new();
        assert!(VariationSet::new(no_cv).is_err());
    }

    #[test]
    fn config_defaults_from_json() {
        let cfg: VariationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, VariationConfig::default());
        assert_eq!(cfg.n_flux_universes, 100);
    }
}
