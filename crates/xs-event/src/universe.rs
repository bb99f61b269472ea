//! Systematic universes.
//!
//! A universe is one alternative version of the world: it may shift
//! reconstructed quantities (lateral systematics) or rescale the event
//! weight (vertical systematics). Universes are stateless views over the
//! current entry, so evaluating one never disturbs another.

use std::fmt;

use xs_core::{Error, Result};
use xs_hist::CV_BAND;

use crate::event::{Event, TruthEvent};

/// Address of one universe: band name plus index within the band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniverseKey<'a> {
    /// Band name.
    pub band: &'a str,
    /// Index within the band.
    pub index: usize,
}

impl UniverseKey<'static> {
    /// The central-value universe.
    pub const CV: UniverseKey<'static> = UniverseKey { band: CV_BAND, index: 0 };
}

impl fmt::Display for UniverseKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.band, self.index)
    }
}

/// One systematic universe.
pub trait Universe: Send + Sync {
    /// Human-readable name (for logs).
    fn name(&self) -> &str;

    /// Band this universe belongs to.
    fn band(&self) -> &str;

    /// Whether this is the central-value universe.
    fn is_cv(&self) -> bool {
        self.band() == CV_BAND
    }

    /// Reconstructed scalar `field` as seen in this universe.
    fn reco(&self, event: &Event<'_>, field: &str) -> Result<f64> {
        event.f64(field)
    }

    /// True scalar `field`. Detector systematics never move truth.
    fn truth(&self, event: &TruthEvent<'_>, field: &str) -> Result<f64> {
        event.f64(field)
    }

    /// Weight of this universe relative to the central value.
    fn weight_factor(&self, event: &Event<'_>) -> Result<f64> {
        let _ = event;
        Ok(1.0)
    }
}

/// The nominal universe.
#[derive(Debug, Clone, Default)]
pub struct CentralValue;

impl Universe for CentralValue {
    fn name(&self) -> &str {
        "CV"
    }

    fn band(&self) -> &str {
        CV_BAND
    }
}

/// Shifts one reconstructed field by `n_sigma` times a fractional uncertainty.
#[derive(Debug, Clone)]
pub struct LateralShift {
    band: String,
    name: String,
    field: String,
    shift: f64,
}

impl LateralShift {
    /// `field -> field * (1 + n_sigma * fractional_sigma)`.
    pub fn new(
        band: impl Into<String>,
        field: impl Into<String>,
        fractional_sigma: f64,
        n_sigma: f64,
    ) -> Self {
        let band = band.into();
        let name = format!("{band}_{n_sigma:+}sigma");
        Self { band, name, field: field.into(), shift: n_sigma * fractional_sigma }
    }
}

impl Universe for LateralShift {
    fn name(&self) -> &str {
        &self.name
    }

    fn band(&self) -> &str {
        &self.band
    }

    fn reco(&self, event: &Event<'_>, field: &str) -> Result<f64> {
        let v = event.f64(field)?;
        if field == self.field { Ok(v * (1.0 + self.shift)) } else { Ok(v) }
    }
}

/// Rescales the event weight by `1 + n_sigma * fractional_sigma`.
#[derive(Debug, Clone)]
pub struct WeightShift {
    band: String,
    name: String,
    factor: f64,
}

impl WeightShift {
    /// Constant weight shift.
    pub fn new(band: impl Into<String>, fractional_sigma: f64, n_sigma: f64) -> Self {
        let band = band.into();
        let name = format!("{band}_{n_sigma:+}sigma");
        Self { band, name, factor: 1.0 + n_sigma * fractional_sigma }
    }
}

impl Universe for WeightShift {
    fn name(&self) -> &str {
        &self.name
    }

    fn band(&self) -> &str {
        &self.band
    }

    fn weight_factor(&self, _event: &Event<'_>) -> Result<f64> {
        Ok(self.factor)
    }
}

/// Weight taken from element `index` of a per-event vector field
/// (e.g. one flux reweight per universe).
#[derive(Debug, Clone)]
pub struct VectorWeight {
    band: String,
    name: String,
    field: String,
    index: usize,
}

impl VectorWeight {
    /// Universe `index` of `band`, reading `field[index]`.
    pub fn new(band: impl Into<String>, field: impl Into<String>, index: usize) -> Self {
        let band = band.into();
        let name = format!("{band}_{index}");
        Self { band, name, field: field.into(), index }
    }
}

impl Universe for VectorWeight {
    fn name(&self) -> &str {
        &self.name
    }

    fn band(&self) -> &str {
        &self.band
    }

    fn weight_factor(&self, event: &Event<'_>) -> Result<f64> {
        let weights = event.vec(&self.field)?;
        weights.get(self.index).copied().ok_or_else(|| {
            Error::Data(format!(
                "entry {}: '{}' has {} elements, universe {} needs index {}",
                event.entry(),
                self.field,
                weights.len(),
                self.name,
                self.index
            ))
        })
    }
}
